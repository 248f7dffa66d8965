//! Stream feature extraction from per-second heart-rate and speed samples.
//!
//! Turns the raw time series of each activity into a handful of bounded
//! aggregates: pace and heart-rate variability, effort-spike rate, time above
//! the high-intensity heart rate, and a work-to-rest ratio.
//!
//! ## Filtering
//! Speeds outside `(0, max_valid_speed_mps)` and heart rates outside
//! `(0, max_valid_hr_bpm)` are dropped before any aggregation (not clamped).
//! A sample with neither reading left is discarded. An activity needs strictly
//! more than `min_valid_samples` remaining samples, otherwise it is omitted
//! from the output entirely.
//!
//! ## Example
//! ```rust
//! use run_classifier::{extract_stream_features, FeatureConfig, StreamSample};
//!
//! let samples: Vec<StreamSample> = (0..60)
//!     .map(|t| StreamSample::new(7, t, Some(130.0 + (t % 10) as f64), Some(3.2)))
//!     .collect();
//! let features = extract_stream_features(&samples, &FeatureConfig::default());
//! assert!(features[&7].hr_cv.unwrap() < 0.1);
//! ```

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::stats::{coefficient_of_variation, mean, ratio};
use crate::{FeatureConfig, StreamSample};

/// Detail-view pace bounds in min/km (exclusive).
const DETAIL_PACE_RANGE: (f64, f64) = (2.0, 20.0);
/// Detail-view heart-rate bounds in bpm (exclusive).
const DETAIL_HR_RANGE: (f64, f64) = (60.0, 220.0);

/// Per-activity aggregates derived from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFeatures {
    pub activity_id: i64,
    /// Samples left after sensor-range filtering
    pub valid_samples: usize,
    /// stddev / mean of per-sample pace, clamped to `pace_cv_cap`
    pub pace_cv: Option<f64>,
    /// stddev / mean of heart rate, clamped to `hr_cv_cap`
    pub hr_cv: Option<f64>,
    /// Consecutive heart-rate rises above the spike delta, per valid sample
    pub effort_spike_rate: f64,
    /// Share of heart-rate samples above the high-intensity threshold
    pub high_intensity_fraction: f64,
    /// High-intensity sample count over low-intensity sample count
    pub work_rest_ratio: f64,
    /// Mean speed in m/s (kept for pace fallback)
    pub mean_speed_mps: Option<f64>,
    /// Mean heart rate in bpm (kept for heart-rate fallback)
    pub mean_heartrate: Option<f64>,
}

/// A sample after sensor-range filtering.
#[derive(Debug, Clone, Copy)]
struct CleanSample {
    heartrate: Option<f64>,
    speed: Option<f64>,
}

fn clean_sample(sample: &StreamSample, config: &FeatureConfig) -> Option<CleanSample> {
    let heartrate = sample
        .heartrate
        .filter(|hr| *hr > 0.0 && *hr < config.max_valid_hr_bpm);
    let speed = sample
        .velocity_smooth
        .filter(|v| *v > 0.0 && *v < config.max_valid_speed_mps);
    if heartrate.is_none() && speed.is_none() {
        None
    } else {
        Some(CleanSample { heartrate, speed })
    }
}

/// Speed (m/s) to pace (min/km).
pub fn pace_from_speed(speed_mps: f64) -> f64 {
    1000.0 / (speed_mps * 60.0)
}

/// Compute stream features for a single activity.
///
/// `samples` must all belong to `activity_id`; they are ordered by elapsed
/// time here. Returns `None` when too few valid samples remain.
pub fn extract_activity_features(
    activity_id: i64,
    samples: &[StreamSample],
    config: &FeatureConfig,
) -> Option<StreamFeatures> {
    let mut ordered: Vec<&StreamSample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.time_sec);

    let clean: Vec<CleanSample> = ordered
        .iter()
        .filter_map(|s| clean_sample(s, config))
        .collect();

    if clean.len() <= config.min_valid_samples {
        debug!(
            "[Streams] Activity {}: {} valid samples, need more than {}",
            activity_id,
            clean.len(),
            config.min_valid_samples
        );
        return None;
    }

    let paces: Vec<f64> = clean
        .iter()
        .filter_map(|s| s.speed)
        .map(pace_from_speed)
        .collect();
    let speeds: Vec<f64> = clean.iter().filter_map(|s| s.speed).collect();
    let heartrates: Vec<f64> = clean.iter().filter_map(|s| s.heartrate).collect();

    let spikes = heartrates
        .windows(2)
        .filter(|w| w[1] - w[0] > config.spike_delta_bpm)
        .count();

    let above = heartrates
        .iter()
        .filter(|hr| **hr > config.high_intensity_hr)
        .count();
    let at_or_below = heartrates.len() - above;

    // No rest samples at all: divide by one so an all-out effort keeps a large ratio
    let work_rest_ratio = if above == 0 {
        0.0
    } else {
        above as f64 / at_or_below.max(1) as f64
    };

    Some(StreamFeatures {
        activity_id,
        valid_samples: clean.len(),
        pace_cv: coefficient_of_variation(&paces, config.pace_cv_cap),
        hr_cv: coefficient_of_variation(&heartrates, config.hr_cv_cap),
        effort_spike_rate: ratio(spikes as f64, clean.len() as f64),
        high_intensity_fraction: ratio(above as f64, heartrates.len() as f64),
        work_rest_ratio,
        mean_speed_mps: mean(&speeds),
        mean_heartrate: mean(&heartrates),
    })
}

/// Group samples by activity, in activity ID order.
fn group_by_activity(samples: &[StreamSample]) -> BTreeMap<i64, Vec<StreamSample>> {
    let mut groups: BTreeMap<i64, Vec<StreamSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.activity_id).or_default().push(*sample);
    }
    groups
}

fn log_summary(activity_count: usize, features: &HashMap<i64, StreamFeatures>) {
    info!(
        "[Streams] Extracted features for {}/{} activities",
        features.len(),
        activity_count
    );
}

/// Compute stream features for every activity present in `samples`.
///
/// Activities with too few valid samples are absent from the result; callers
/// fill their defaults explicitly.
pub fn extract_stream_features(
    samples: &[StreamSample],
    config: &FeatureConfig,
) -> HashMap<i64, StreamFeatures> {
    let groups = group_by_activity(samples);
    let features: HashMap<i64, StreamFeatures> = groups
        .iter()
        .filter_map(|(id, group)| {
            extract_activity_features(*id, group, config).map(|f| (*id, f))
        })
        .collect();
    log_summary(groups.len(), &features);
    features
}

/// Parallel version of [`extract_stream_features`].
/// Worth it once the batch carries a few hundred thousand samples.
#[cfg(feature = "parallel")]
pub fn extract_stream_features_parallel(
    samples: &[StreamSample],
    config: &FeatureConfig,
) -> HashMap<i64, StreamFeatures> {
    if samples.len() < 100_000 {
        // Fall back to sequential for small datasets
        return extract_stream_features(samples, config);
    }

    let groups: Vec<(i64, Vec<StreamSample>)> = group_by_activity(samples).into_iter().collect();
    let features: HashMap<i64, StreamFeatures> = groups
        .par_iter()
        .filter_map(|(id, group)| {
            extract_activity_features(*id, group, config).map(|f| (*id, f))
        })
        .collect();
    log_summary(groups.len(), &features);
    features
}

/// One cleaned point for the pace / heart-rate chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetailPoint {
    pub time_sec: i64,
    /// Pace in min/km
    pub pace_min_per_km: f64,
    pub heartrate: f64,
}

/// Chart-ready stream for one run: time ordered, plausible pace and heart rate only.
pub fn detail_stream(samples: &[StreamSample]) -> Vec<DetailPoint> {
    let mut points: Vec<DetailPoint> = samples
        .iter()
        .filter_map(|s| {
            let speed = s.velocity_smooth.filter(|v| *v > 0.0)?;
            let heartrate = s.heartrate?;
            let pace = pace_from_speed(speed);
            let pace_ok = pace > DETAIL_PACE_RANGE.0 && pace < DETAIL_PACE_RANGE.1;
            let hr_ok = heartrate > DETAIL_HR_RANGE.0 && heartrate < DETAIL_HR_RANGE.1;
            (pace_ok && hr_ok).then_some(DetailPoint {
                time_sec: s.time_sec,
                pace_min_per_km: pace,
                heartrate,
            })
        })
        .collect();
    points.sort_by_key(|p| p.time_sec);
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_run(activity_id: i64, count: i64) -> Vec<StreamSample> {
        (0..count)
            .map(|t| StreamSample::new(activity_id, t, Some(130.0), Some(3.0)))
            .collect()
    }

    #[test]
    fn test_too_few_samples_omitted() {
        let config = FeatureConfig::default();
        // Exactly 10 valid samples is not enough
        let samples = steady_run(1, 10);
        assert!(extract_stream_features(&samples, &config).is_empty());

        let samples = steady_run(1, 11);
        assert_eq!(extract_stream_features(&samples, &config).len(), 1);
    }

    #[test]
    fn test_out_of_range_values_excluded() {
        let config = FeatureConfig::default();
        let mut samples = steady_run(1, 20);
        // Garbage readings must not count toward variability
        samples.push(StreamSample::new(1, 20, Some(300.0), Some(25.0)));
        samples.push(StreamSample::new(1, 21, Some(-5.0), Some(0.0)));
        samples.push(StreamSample::new(1, 22, None, None));

        let features = extract_stream_features(&samples, &config);
        let f = &features[&1];
        assert_eq!(f.valid_samples, 20);
        // Constant pace leaves only rounding noise in the deviation
        assert!(f.pace_cv.unwrap() < 1e-12);
        assert!(f.hr_cv.unwrap() < 1e-12);
        assert!((f.mean_heartrate.unwrap() - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_spike_rate_counts_rises_only() {
        let config = FeatureConfig::default();
        let hrs = [120.0, 140.0, 120.0, 140.0, 120.0, 125.0, 130.0, 135.0, 140.0, 145.0, 150.0, 150.0];
        let samples: Vec<StreamSample> = hrs
            .iter()
            .enumerate()
            .map(|(t, hr)| StreamSample::new(1, t as i64, Some(*hr), Some(3.0)))
            .collect();

        let f = extract_activity_features(1, &samples, &config).unwrap();
        // Two rises of +20, the drops and +5 steps do not count
        assert!((f.effort_spike_rate - 2.0 / 12.0).abs() < 1e-12);

        let strict = extract_activity_features(1, &samples, &FeatureConfig::strict()).unwrap();
        assert!((strict.effort_spike_rate - 2.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_samples_ordered_before_deltas() {
        let config = FeatureConfig::default();
        // Stored out of order: sorted by time this is a smooth ramp with no spikes
        let samples: Vec<StreamSample> = (0..20)
            .rev()
            .map(|t| StreamSample::new(1, t, Some(100.0 + t as f64 * 2.0), Some(3.0)))
            .collect();
        let f = extract_activity_features(1, &samples, &config).unwrap();
        assert_eq!(f.effort_spike_rate, 0.0);
    }

    #[test]
    fn test_intensity_fractions() {
        let config = FeatureConfig::default();
        // 6 samples above 141, 12 at or below, 2 speed-only samples
        let mut samples: Vec<StreamSample> = (0..18)
            .map(|t| {
                let hr = if t < 6 { 160.0 } else { 141.0 };
                StreamSample::new(1, t, Some(hr), Some(3.5))
            })
            .collect();
        samples.push(StreamSample::new(1, 18, None, Some(3.5)));
        samples.push(StreamSample::new(1, 19, None, Some(3.5)));

        let f = extract_activity_features(1, &samples, &config).unwrap();
        assert_eq!(f.valid_samples, 20);
        assert!((f.high_intensity_fraction - 6.0 / 18.0).abs() < 1e-12);
        assert!((f.work_rest_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_heart_rate_sensor() {
        let config = FeatureConfig::default();
        let samples: Vec<StreamSample> = (0..30)
            .map(|t| StreamSample::new(1, t, None, Some(2.5 + (t % 3) as f64 * 0.5)))
            .collect();
        let f = extract_activity_features(1, &samples, &config).unwrap();
        assert_eq!(f.hr_cv, None);
        assert_eq!(f.mean_heartrate, None);
        assert_eq!(f.high_intensity_fraction, 0.0);
        assert_eq!(f.work_rest_ratio, 0.0);
        assert!(f.pace_cv.unwrap() > 0.0);
    }

    #[test]
    fn test_cv_respects_caps() {
        let samples: Vec<StreamSample> = (0..40)
            .map(|t| {
                let (hr, v) = if t % 2 == 0 { (40.0, 0.2) } else { (240.0, 19.0) };
                StreamSample::new(1, t, Some(hr), Some(v))
            })
            .collect();

        for config in [FeatureConfig::default(), FeatureConfig::strict()] {
            let f = extract_activity_features(1, &samples, &config).unwrap();
            let pace_cv = f.pace_cv.unwrap();
            let hr_cv = f.hr_cv.unwrap();
            assert!((0.0..=config.pace_cv_cap).contains(&pace_cv));
            assert!((0.0..=config.hr_cv_cap).contains(&hr_cv));
        }
    }

    #[test]
    fn test_all_out_effort_without_rest_samples() {
        let config = FeatureConfig::default();
        let samples: Vec<StreamSample> = (0..15)
            .map(|t| StreamSample::new(1, t, Some(175.0), Some(5.0)))
            .collect();
        let f = extract_activity_features(1, &samples, &config).unwrap();
        assert_eq!(f.high_intensity_fraction, 1.0);
        assert_eq!(f.work_rest_ratio, 15.0);
    }

    #[test]
    fn test_groups_multiple_activities() {
        let config = FeatureConfig::default();
        let mut samples = steady_run(1, 30);
        samples.extend(steady_run(2, 5));
        samples.extend(steady_run(3, 30));

        let features = extract_stream_features(&samples, &config);
        assert_eq!(features.len(), 2);
        assert!(features.contains_key(&1));
        assert!(!features.contains_key(&2));
        assert!(features.contains_key(&3));
    }

    #[test]
    fn test_detail_stream_filters_noise() {
        let samples = vec![
            StreamSample::new(1, 3, Some(150.0), Some(3.0)),
            StreamSample::new(1, 1, Some(140.0), Some(3.2)),
            // Standing still: pace above 20 min/km
            StreamSample::new(1, 2, Some(140.0), Some(0.5)),
            // Heart-rate dropout
            StreamSample::new(1, 4, Some(30.0), Some(3.0)),
            StreamSample::new(1, 5, None, Some(3.0)),
        ];
        let points = detail_stream(&samples);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].time_sec, 1);
        assert_eq!(points[1].time_sec, 3);
        assert!((points[1].pace_min_per_km - 1000.0 / 180.0).abs() < 1e-12);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let config = FeatureConfig::default();
        // 40 activities x 3000 samples, above the sequential cut-over
        let samples: Vec<StreamSample> = (0..40)
            .flat_map(|id| {
                (0..3000).map(move |t| {
                    let hr = 120.0 + ((t * 7 + id) % 50) as f64;
                    let speed = 2.5 + ((t + id * 3) % 20) as f64 * 0.1;
                    StreamSample::new(id, t, Some(hr), Some(speed))
                })
            })
            .collect();
        assert!(samples.len() > 100_000);

        let sequential = extract_stream_features(&samples, &config);
        let parallel = extract_stream_features_parallel(&samples, &config);
        assert_eq!(sequential.len(), 40);
        assert_eq!(parallel, sequential);
    }
}
