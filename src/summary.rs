//! Training summary over a recent window of runs.
//!
//! Besides the run aggregates, a summary can carry the conditions each run was
//! done in ([`RunWeather`]) and the latest recovery readings from the sleep
//! tracker ([`SleepRecord`], [`ReadinessRecord`]). Its `Display` renders the
//! whole thing as plain-text context lines.

use std::collections::HashMap;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::stats::mean;
use crate::{RunSummary, RunType};

/// Default look-back window in days.
pub const DEFAULT_WINDOW_DAYS: i64 = 28;
/// How many runs the recent list keeps.
pub const RECENT_RUN_COUNT: usize = 7;
/// Nights of sleep kept in a summary.
pub const SLEEP_DAYS: usize = 5;
/// Readiness scores kept in a summary.
pub const READINESS_DAYS: usize = 7;

// ============================================================================
// Conditions & Recovery
// ============================================================================

/// Weather at the time of one run. Either reading may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunWeather {
    pub activity_id: i64,
    pub temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

/// One night of sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub day: NaiveDate,
    /// Total time asleep in seconds
    pub total_sleep_duration: i64,
}

impl SleepRecord {
    pub fn hours(&self) -> f64 {
        self.total_sleep_duration as f64 / 3600.0
    }
}

impl fmt::Display for SleepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1} hrs sleep", self.day, self.hours())
    }
}

/// One daily readiness score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessRecord {
    pub timestamp: NaiveDateTime,
    pub score: i64,
}

impl fmt::Display for ReadinessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: readiness score {}", self.timestamp.date(), self.score)
    }
}

/// Lowest and highest of a set of readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Range of the finite values, `None` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some(Self { min: v, max: v }),
                Some(r) => Some(Self {
                    min: r.min.min(v),
                    max: r.max.max(v),
                }),
            })
    }
}

// ============================================================================
// Summary
// ============================================================================

/// One line of the recent-runs list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentRun {
    pub activity_id: i64,
    pub start_date_local: NaiveDateTime,
    pub distance_km: f64,
    pub pace_min_per_km: Option<f64>,
    pub average_heartrate: Option<f64>,
    /// Stored label, `Unknown` when none
    pub run_type: RunType,
    pub temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
}

impl fmt::Display for RecentRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.1} km",
            self.start_date_local.date(),
            self.distance_km
        )?;
        if let Some(pace) = self.pace_min_per_km {
            write!(f, " @ {:.2}/km", pace)?;
        }
        if let Some(hr) = self.average_heartrate {
            write!(f, " | HR {} bpm", hr as i64)?;
        }
        // Weather only shows with both readings
        if let (Some(temp), Some(humidity)) = (self.temp_c, self.humidity_pct) {
            write!(f, " | {:.1}°C, {:.0}%", temp, humidity)?;
        }
        write!(f, " | {}", self.run_type)
    }
}

/// Aggregates over the runs in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub window_days: i64,
    pub run_count: usize,
    pub total_distance_km: f64,
    pub longest_run_km: f64,
    /// Lowest known pace in min/km
    pub fastest_pace_min_per_km: Option<f64>,
    /// Mean over runs with a heart-rate reading
    pub mean_heartrate: Option<f64>,
    /// Temperature range over window runs with a reading
    pub temperature_c: Option<ValueRange>,
    pub humidity_pct: Option<ValueRange>,
    /// Up to seven runs, newest first
    pub recent: Vec<RecentRun>,
    /// Latest nights, newest first
    pub sleep: Vec<SleepRecord>,
    /// Latest readiness scores, newest first
    pub readiness: Vec<ReadinessRecord>,
}

impl TrainingSummary {
    /// Summarise runs starting on or after midnight `days` days before `now`.
    ///
    /// Runs without a start time are ignored. Returns `None` for an empty window.
    pub fn from_runs(
        runs: &[RunSummary],
        labels: &HashMap<i64, RunType>,
        weather: &HashMap<i64, RunWeather>,
        now: NaiveDateTime,
        days: i64,
    ) -> Option<Self> {
        let cutoff = (now.date() - Duration::days(days)).and_hms_opt(0, 0, 0)?;

        let mut window: Vec<(&RunSummary, NaiveDateTime)> = runs
            .iter()
            .filter_map(|r| r.start_date_local.map(|start| (r, start)))
            .filter(|(_, start)| *start >= cutoff)
            .collect();
        if window.is_empty() {
            return None;
        }
        window.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.activity_id.cmp(&b.0.activity_id)));

        let heartrates: Vec<f64> = window
            .iter()
            .filter_map(|(r, _)| r.average_heartrate)
            .filter(|hr| *hr > 0.0)
            .collect();

        let fastest_pace_min_per_km = window
            .iter()
            .filter_map(|(r, _)| r.pace_min_per_km)
            .filter(|p| p.is_finite() && *p > 0.0)
            .min_by(f64::total_cmp);

        let conditions: Vec<&RunWeather> = window
            .iter()
            .filter_map(|(r, _)| weather.get(&r.activity_id))
            .collect();

        let recent = window
            .iter()
            .take(RECENT_RUN_COUNT)
            .map(|(r, start)| {
                let w = weather.get(&r.activity_id);
                RecentRun {
                    activity_id: r.activity_id,
                    start_date_local: *start,
                    distance_km: r.distance_km,
                    pace_min_per_km: r.pace_min_per_km,
                    average_heartrate: r.average_heartrate,
                    run_type: labels
                        .get(&r.activity_id)
                        .copied()
                        .unwrap_or(RunType::Unknown),
                    temp_c: w.and_then(|w| w.temp_c),
                    humidity_pct: w.and_then(|w| w.humidity_pct),
                }
            })
            .collect();

        Some(Self {
            window_days: days,
            run_count: window.len(),
            total_distance_km: window.iter().map(|(r, _)| r.distance_km).sum(),
            longest_run_km: window
                .iter()
                .map(|(r, _)| r.distance_km)
                .fold(0.0, f64::max),
            fastest_pace_min_per_km,
            mean_heartrate: mean(&heartrates),
            temperature_c: ValueRange::from_values(conditions.iter().filter_map(|w| w.temp_c)),
            humidity_pct: ValueRange::from_values(conditions.iter().filter_map(|w| w.humidity_pct)),
            recent,
            sleep: Vec::new(),
            readiness: Vec::new(),
        })
    }

    /// [`Self::from_runs`] over the default 28-day window.
    pub fn last_four_weeks(
        runs: &[RunSummary],
        labels: &HashMap<i64, RunType>,
        weather: &HashMap<i64, RunWeather>,
        now: NaiveDateTime,
    ) -> Option<Self> {
        Self::from_runs(runs, labels, weather, now, DEFAULT_WINDOW_DAYS)
    }

    /// Attach recovery readings, keeping the latest five nights and seven scores.
    pub fn with_recovery(
        mut self,
        mut sleep: Vec<SleepRecord>,
        mut readiness: Vec<ReadinessRecord>,
    ) -> Self {
        sleep.sort_by(|a, b| b.day.cmp(&a.day));
        sleep.truncate(SLEEP_DAYS);
        readiness.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readiness.truncate(READINESS_DAYS);
        self.sleep = sleep;
        self.readiness = readiness;
        self
    }
}

impl fmt::Display for TrainingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Recent runs:")?;
        for run in &self.recent {
            writeln!(f, "{}", run)?;
        }

        writeln!(f)?;
        writeln!(f, "{}-day summary:", self.window_days)?;
        writeln!(f, "- Runs: {}, {:.1} km total", self.run_count, self.total_distance_km)?;
        writeln!(f, "- Longest run: {:.1} km", self.longest_run_km)?;
        if let Some(pace) = self.fastest_pace_min_per_km {
            writeln!(f, "- Fastest pace: {:.2} min/km", pace)?;
        }
        if let Some(hr) = self.mean_heartrate {
            writeln!(f, "- Avg HR: {:.0} bpm", hr)?;
        }

        if self.temperature_c.is_some() || self.humidity_pct.is_some() {
            writeln!(f)?;
            writeln!(f, "Weather:")?;
            if let Some(t) = self.temperature_c {
                writeln!(f, "- Temp range: {:.1} to {:.1}°C", t.min, t.max)?;
            }
            if let Some(h) = self.humidity_pct {
                writeln!(f, "- Humidity range: {:.0} to {:.0}%", h.min, h.max)?;
            }
        }

        if !self.sleep.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sleep (last {} days):", SLEEP_DAYS)?;
            for night in &self.sleep {
                writeln!(f, "- {}", night)?;
            }
        }
        if !self.readiness.is_empty() {
            writeln!(f)?;
            writeln!(f, "Readiness (last {} days):", READINESS_DAYS)?;
            for score in &self.readiness {
                writeln!(f, "- {}", score)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap()
    }

    fn runs() -> Vec<RunSummary> {
        vec![
            RunSummary::new(1, Some(day(1)), 21.1, 116.0).with_heartrate(Some(150.0), None),
            RunSummary::new(2, Some(day(20)), 5.0, 22.5).with_heartrate(Some(170.0), None),
            RunSummary::new(3, Some(day(25)), 8.0, 48.0),
            RunSummary::new(4, None, 30.0, 180.0),
            RunSummary::new(5, Some(day(10)), 12.0, 66.0).with_heartrate(Some(140.0), None),
        ]
    }

    fn weather(activity_id: i64, temp_c: Option<f64>, humidity_pct: Option<f64>) -> (i64, RunWeather) {
        (
            activity_id,
            RunWeather {
                activity_id,
                temp_c,
                humidity_pct,
            },
        )
    }

    fn recent_run() -> RecentRun {
        RecentRun {
            activity_id: 1,
            start_date_local: day(3),
            distance_km: 10.0,
            pace_min_per_km: Some(5.5),
            average_heartrate: Some(148.6),
            run_type: RunType::TempoRun,
            temp_c: None,
            humidity_pct: None,
        }
    }

    #[test]
    fn test_window_aggregates() {
        let labels = HashMap::from([(2, RunType::Interval)]);
        let summary =
            TrainingSummary::from_runs(&runs(), &labels, &HashMap::new(), day(28), 10).unwrap();

        // Cutoff is June 18th: runs 2 and 3
        assert_eq!(summary.run_count, 2);
        assert!((summary.total_distance_km - 13.0).abs() < 1e-9);
        assert_eq!(summary.longest_run_km, 8.0);
        assert_eq!(summary.fastest_pace_min_per_km, Some(4.5));
        assert_eq!(summary.mean_heartrate, Some(170.0));
        assert_eq!(summary.temperature_c, None);

        let ids: Vec<i64> = summary.recent.iter().map(|r| r.activity_id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(summary.recent[0].run_type, RunType::Unknown);
        assert_eq!(summary.recent[1].run_type, RunType::Interval);
    }

    #[test]
    fn test_four_week_window() {
        let summary =
            TrainingSummary::last_four_weeks(&runs(), &HashMap::new(), &HashMap::new(), day(28))
                .unwrap();
        // Cutoff is May 31st, so June 1st falls inside
        assert_eq!(summary.run_count, 4);
        assert_eq!(summary.longest_run_km, 21.1);
        assert!((summary.mean_heartrate.unwrap() - 460.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window() {
        let later = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let none = HashMap::new();
        assert!(TrainingSummary::last_four_weeks(&runs(), &HashMap::new(), &none, later).is_none());
        assert!(TrainingSummary::last_four_weeks(&[], &HashMap::new(), &none, later).is_none());
    }

    #[test]
    fn test_recent_list_is_capped() {
        let many: Vec<RunSummary> = (1..=10)
            .map(|d| RunSummary::new(d as i64, Some(day(d)), 5.0, 30.0))
            .collect();
        let summary =
            TrainingSummary::last_four_weeks(&many, &HashMap::new(), &HashMap::new(), day(12))
                .unwrap();
        assert_eq!(summary.run_count, 10);
        assert_eq!(summary.recent.len(), RECENT_RUN_COUNT);
        assert_eq!(summary.recent[0].activity_id, 10);
    }

    #[test]
    fn test_weather_ranges_cover_window_only() {
        let conditions = HashMap::from([
            weather(1, Some(30.0), Some(95.0)), // outside the 10-day window
            weather(2, Some(18.5), Some(72.0)),
            weather(3, Some(24.0), None),
        ]);
        let summary =
            TrainingSummary::from_runs(&runs(), &HashMap::new(), &conditions, day(28), 10).unwrap();

        assert_eq!(summary.temperature_c, Some(ValueRange { min: 18.5, max: 24.0 }));
        assert_eq!(summary.humidity_pct, Some(ValueRange { min: 72.0, max: 72.0 }));
        // Newest first: run 3 has no humidity reading
        assert_eq!(summary.recent[0].temp_c, Some(24.0));
        assert_eq!(summary.recent[0].humidity_pct, None);
        assert_eq!(summary.recent[1].humidity_pct, Some(72.0));
    }

    #[test]
    fn test_value_range_skips_non_finite() {
        assert_eq!(ValueRange::from_values(std::iter::empty()), None);
        assert_eq!(ValueRange::from_values([f64::NAN]), None);
        assert_eq!(
            ValueRange::from_values([12.0, f64::NAN, 4.0, 9.0]),
            Some(ValueRange { min: 4.0, max: 12.0 })
        );
    }

    #[test]
    fn test_recent_run_display() {
        assert_eq!(
            recent_run().to_string(),
            "2024-06-03: 10.0 km @ 5.50/km | HR 148 bpm | tempo run"
        );

        let humid = RecentRun {
            temp_c: Some(21.5),
            humidity_pct: Some(64.0),
            ..recent_run()
        };
        assert_eq!(
            humid.to_string(),
            "2024-06-03: 10.0 km @ 5.50/km | HR 148 bpm | 21.5°C, 64% | tempo run"
        );

        // A lone temperature is not shown
        let partial = RecentRun {
            temp_c: Some(21.5),
            ..recent_run()
        };
        assert!(!partial.to_string().contains("°C"));
    }

    #[test]
    fn test_recovery_keeps_latest_readings() {
        let sleep: Vec<SleepRecord> = (1..=8)
            .map(|d| SleepRecord {
                day: NaiveDate::from_ymd_opt(2024, 6, d).unwrap(),
                total_sleep_duration: 25_200 + d as i64 * 360,
            })
            .collect();
        let readiness: Vec<ReadinessRecord> = (1..=10)
            .map(|d| ReadinessRecord {
                timestamp: day(d),
                score: 60 + d as i64,
            })
            .collect();

        let summary =
            TrainingSummary::last_four_weeks(&runs(), &HashMap::new(), &HashMap::new(), day(28))
                .unwrap()
                .with_recovery(sleep, readiness);

        assert_eq!(summary.sleep.len(), SLEEP_DAYS);
        assert_eq!(summary.sleep[0].day, NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
        assert_eq!(summary.sleep[0].to_string(), "2024-06-08: 7.8 hrs sleep");
        assert_eq!(summary.readiness.len(), READINESS_DAYS);
        assert_eq!(summary.readiness[0].score, 70);
        assert_eq!(summary.readiness[6].to_string(), "2024-06-04: readiness score 64");
    }

    #[test]
    fn test_summary_renders_context_lines() {
        let conditions = HashMap::from([weather(2, Some(18.5), Some(72.0))]);
        let sleep = vec![SleepRecord {
            day: NaiveDate::from_ymd_opt(2024, 6, 27).unwrap(),
            total_sleep_duration: 27_000,
        }];
        let summary = TrainingSummary::from_runs(&runs(), &HashMap::new(), &conditions, day(28), 10)
            .unwrap()
            .with_recovery(sleep, Vec::new());

        let text = summary.to_string();
        assert!(text.starts_with("Recent runs:\n2024-06-25: 8.0 km @ 6.00/km | unknown\n"));
        assert!(text.contains("10-day summary:\n"));
        assert!(text.contains("- Longest run: 8.0 km\n"));
        assert!(text.contains("- Fastest pace: 4.50 min/km\n"));
        assert!(text.contains("- Avg HR: 170 bpm\n"));
        assert!(text.contains("- Temp range: 18.5 to 18.5°C\n"));
        assert!(text.contains("Sleep (last 5 days):\n- 2024-06-27: 7.5 hrs sleep\n"));
        assert!(!text.contains("Readiness"));
    }
}
