//! Feature rows: one record per run combining summary fields with stream aggregates.
//!
//! Derivation order per run:
//! 1. pace from the summary, else from the stream's mean speed
//! 2. average heart rate from the summary, else from the stream's mean
//! 3. elevation gain defaults to 0
//! 4. stream-derived variability / intensity fields default to 0 when the
//!    extractor produced nothing for the activity
//! 5. normalized pace = pace / median pace of the batch
//! 6. distance / duration ratio (km per hour of moving time)
//! 7. heart-rate intensity = avg HR / assumed max HR, 0 without a reading
//! 8. variability and intensity composite scores
//! 9. anything still missing takes the batch median of its column
//!
//! Normalized pace is batch-relative: the same run can get a different value
//! depending on which other runs are in the batch.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::stats::median_of_known;
use crate::streams::{pace_from_speed, StreamFeatures};
use crate::{FeatureConfig, RunSummary};

/// Number of columns fed to the cluster fallback.
pub const CLUSTER_FEATURE_COUNT: usize = 14;

/// Weights of the variability score: pace CV, HR CV, effort-spike rate.
const VARIABILITY_WEIGHTS: [f64; 3] = [0.4, 0.3, 0.3];
/// Weights of the intensity score: HR intensity, high-intensity fraction.
const INTENSITY_WEIGHTS: [f64; 2] = [0.6, 0.4];

/// Fully populated feature record for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub activity_id: i64,
    pub distance_km: f64,
    pub moving_time_min: f64,
    /// min/km
    pub pace_min_per_km: f64,
    pub elevation_gain_m: f64,
    pub avg_heartrate: f64,
    pub pace_cv: f64,
    pub hr_cv: f64,
    pub effort_spike_rate: f64,
    pub high_intensity_fraction: f64,
    pub work_rest_ratio: f64,
    /// Pace divided by the batch median pace
    pub normalized_pace: f64,
    /// Distance over moving hours (km/h)
    pub distance_duration_ratio: f64,
    /// Average heart rate over the assumed max heart rate
    pub hr_intensity: f64,
    pub variability_score: f64,
    pub intensity_score: f64,
    /// Whether stream aggregates were available for this run
    pub has_stream_features: bool,
}

impl FeatureRow {
    /// All-zero row, handy as a base for struct update syntax.
    pub fn empty(activity_id: i64) -> Self {
        Self {
            activity_id,
            distance_km: 0.0,
            moving_time_min: 0.0,
            pace_min_per_km: 0.0,
            elevation_gain_m: 0.0,
            avg_heartrate: 0.0,
            pace_cv: 0.0,
            hr_cv: 0.0,
            effort_spike_rate: 0.0,
            high_intensity_fraction: 0.0,
            work_rest_ratio: 0.0,
            normalized_pace: 0.0,
            distance_duration_ratio: 0.0,
            hr_intensity: 0.0,
            variability_score: 0.0,
            intensity_score: 0.0,
            has_stream_features: false,
        }
    }

    /// Numeric columns in the order the cluster fallback scales them.
    pub fn cluster_vector(&self) -> [f64; CLUSTER_FEATURE_COUNT] {
        [
            self.distance_km,
            self.pace_min_per_km,
            self.elevation_gain_m,
            self.avg_heartrate,
            self.pace_cv,
            self.hr_cv,
            self.effort_spike_rate,
            self.high_intensity_fraction,
            self.work_rest_ratio,
            self.normalized_pace,
            self.distance_duration_ratio,
            self.hr_intensity,
            self.variability_score,
            self.intensity_score,
        ]
    }
}

/// 0.4 × pace CV + 0.3 × HR CV + 0.3 × effort-spike rate.
pub fn variability_score(pace_cv: f64, hr_cv: f64, effort_spike_rate: f64) -> f64 {
    let [wp, wh, ws] = VARIABILITY_WEIGHTS;
    wp * pace_cv + wh * hr_cv + ws * effort_spike_rate
}

/// 0.6 × HR intensity + 0.4 × high-intensity fraction.
pub fn intensity_score(hr_intensity: f64, high_intensity_fraction: f64) -> f64 {
    let [wh, wf] = INTENSITY_WEIGHTS;
    wh * hr_intensity + wf * high_intensity_fraction
}

/// Intermediate row where summary-derived columns may still be missing.
struct PartialRow {
    activity_id: i64,
    distance_km: Option<f64>,
    moving_time_min: Option<f64>,
    pace: Option<f64>,
    elevation_gain_m: f64,
    avg_heartrate: Option<f64>,
    pace_cv: f64,
    hr_cv: f64,
    effort_spike_rate: f64,
    high_intensity_fraction: f64,
    work_rest_ratio: f64,
    normalized_pace: Option<f64>,
    distance_duration_ratio: Option<f64>,
    hr_intensity: f64,
    has_stream_features: bool,
}

fn non_negative(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn partial_row(
    run: &RunSummary,
    stream: Option<&StreamFeatures>,
    config: &FeatureConfig,
) -> PartialRow {
    let pace = positive(run.pace_min_per_km).or_else(|| {
        positive(stream.and_then(|s| s.mean_speed_mps)).map(pace_from_speed)
    });
    let avg_heartrate =
        positive(run.average_heartrate).or_else(|| positive(stream.and_then(|s| s.mean_heartrate)));

    let distance_km = non_negative(run.distance_km);
    let moving_time_min = non_negative(run.moving_time_min);
    let distance_duration_ratio = match (distance_km, moving_time_min) {
        (Some(d), Some(t)) if t > 0.0 => Some(d / (t / 60.0)),
        _ => None,
    };

    let hr_intensity = avg_heartrate
        .map(|hr| hr / config.assumed_max_hr)
        .unwrap_or(0.0);

    PartialRow {
        activity_id: run.activity_id,
        distance_km,
        moving_time_min,
        pace,
        elevation_gain_m: non_negative(run.total_elevation_gain_m).unwrap_or(0.0),
        avg_heartrate,
        pace_cv: stream.and_then(|s| s.pace_cv).unwrap_or(0.0),
        hr_cv: stream.and_then(|s| s.hr_cv).unwrap_or(0.0),
        effort_spike_rate: stream.map_or(0.0, |s| s.effort_spike_rate),
        high_intensity_fraction: stream.map_or(0.0, |s| s.high_intensity_fraction),
        work_rest_ratio: stream.map_or(0.0, |s| s.work_rest_ratio),
        normalized_pace: None,
        distance_duration_ratio,
        hr_intensity,
        has_stream_features: stream.is_some(),
    }
}

/// Median of a column, 0 when no run in the batch has a value.
fn column_median(rows: &[PartialRow], column: impl Fn(&PartialRow) -> Option<f64>) -> f64 {
    let values: Vec<Option<f64>> = rows.iter().map(column).collect();
    median_of_known(&values).unwrap_or(0.0)
}

/// Build one feature row per run, in input order.
///
/// Pure and deterministic for a given batch; runs missing from `stream_features`
/// get zeroed stream fields.
pub fn build_feature_rows(
    runs: &[RunSummary],
    stream_features: &HashMap<i64, StreamFeatures>,
    config: &FeatureConfig,
) -> Vec<FeatureRow> {
    let mut partial: Vec<PartialRow> = runs
        .iter()
        .map(|run| partial_row(run, stream_features.get(&run.activity_id), config))
        .collect();

    // Batch-relative pace
    let batch_pace_median = column_median(&partial, |r| r.pace);
    if batch_pace_median > 0.0 {
        for row in &mut partial {
            row.normalized_pace = row.pace.map(|p| p / batch_pace_median);
        }
    }

    let fill = FillValues {
        distance_km: column_median(&partial, |r| r.distance_km),
        moving_time_min: column_median(&partial, |r| r.moving_time_min),
        pace: batch_pace_median,
        avg_heartrate: column_median(&partial, |r| r.avg_heartrate),
        normalized_pace: column_median(&partial, |r| r.normalized_pace),
        distance_duration_ratio: column_median(&partial, |r| r.distance_duration_ratio),
    };

    let rows: Vec<FeatureRow> = partial.into_iter().map(|r| fill.complete(r)).collect();
    debug!(
        "[Features] Built {} rows ({} with stream features), batch median pace {:.2} min/km",
        rows.len(),
        rows.iter().filter(|r| r.has_stream_features).count(),
        batch_pace_median
    );
    rows
}

/// Batch medians used for anything still missing after derivation.
struct FillValues {
    distance_km: f64,
    moving_time_min: f64,
    pace: f64,
    avg_heartrate: f64,
    normalized_pace: f64,
    distance_duration_ratio: f64,
}

impl FillValues {
    fn complete(&self, r: PartialRow) -> FeatureRow {
        FeatureRow {
            activity_id: r.activity_id,
            distance_km: r.distance_km.unwrap_or(self.distance_km),
            moving_time_min: r.moving_time_min.unwrap_or(self.moving_time_min),
            pace_min_per_km: r.pace.unwrap_or(self.pace),
            elevation_gain_m: r.elevation_gain_m,
            avg_heartrate: r.avg_heartrate.unwrap_or(self.avg_heartrate),
            pace_cv: r.pace_cv,
            hr_cv: r.hr_cv,
            effort_spike_rate: r.effort_spike_rate,
            high_intensity_fraction: r.high_intensity_fraction,
            work_rest_ratio: r.work_rest_ratio,
            normalized_pace: r.normalized_pace.unwrap_or(self.normalized_pace),
            distance_duration_ratio: r
                .distance_duration_ratio
                .unwrap_or(self.distance_duration_ratio),
            hr_intensity: r.hr_intensity,
            variability_score: variability_score(r.pace_cv, r.hr_cv, r.effort_spike_rate),
            intensity_score: intensity_score(r.hr_intensity, r.high_intensity_fraction),
            has_stream_features: r.has_stream_features,
        }
    }
}
