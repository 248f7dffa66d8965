//! # Run Classifier
//!
//! Run-type classification for a personal running-analytics dashboard.
//!
//! This library provides:
//! - Stream feature extraction from per-second heart-rate / speed samples
//! - Feature rows combining run summaries with bounded stream aggregates
//! - An ordered rule classifier with a seeded k-means fallback
//! - SQLite persistence of the activity → run type mapping
//!
//! ## Features
//!
//! - **`persistence`** (default) - SQLite storage for runs, streams and labels
//! - **`parallel`** - Extract stream features for many activities with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use run_classifier::{classify_by_rules, FeatureRow, RunType};
//!
//! let row = FeatureRow {
//!     distance_km: 21.0,
//!     variability_score: 0.1,
//!     intensity_score: 0.3,
//!     ..FeatureRow::empty(1)
//! };
//! assert_eq!(classify_by_rules(&row), Some(RunType::LongRun));
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ClassifyError, Result};

// Tunable parameters
pub mod config;
pub use config::{ClusterConfig, FeatureConfig, PipelineConfig};

// Guarded descriptive statistics
pub mod stats;

// Stream feature extraction (per-activity aggregates from raw samples)
pub mod streams;
pub use streams::{detail_stream, extract_stream_features, DetailPoint, StreamFeatures};
#[cfg(feature = "parallel")]
pub use streams::extract_stream_features_parallel;

// Feature rows (summary + stream aggregates, batch-relative normalisation)
pub mod features;
pub use features::{build_feature_rows, FeatureRow};

// Ordered threshold rules
pub mod rules;
pub use rules::{classify_by_rules, evaluate_rules, RuleMatch};

// Robust scaling + seeded k-means fallback
pub mod cluster;
pub use cluster::{cluster_fallback, ClusterProfile, FallbackResult};

// Storage-access interface handed to the pipeline
pub mod storage;
pub use storage::{ClassificationSink, RunSource};

// Stage orchestration
pub mod pipeline;
pub use pipeline::{
    classify_batch, run_pipeline, BatchOutcome, LabelDecision, LabelSource, PipelineReport,
};

// Recent training summary
pub mod summary;
pub use summary::{
    ReadinessRecord, RecentRun, RunWeather, SleepRecord, TrainingSummary, ValueRange,
};

// SQLite classification store
#[cfg(feature = "persistence")]
pub mod store;
#[cfg(feature = "persistence")]
pub use store::SqliteStore;

// ============================================================================
// Core Types
// ============================================================================

/// Whether a (longitude, latitude) point lies on the globe.
fn on_globe(point: &Point<f64>) -> bool {
    (-90.0..=90.0).contains(&point.y()) && (-180.0..=180.0).contains(&point.x())
}

/// One completed run activity, as delivered by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Stable provider activity ID
    pub activity_id: i64,
    /// Local start time
    pub start_date_local: Option<NaiveDateTime>,
    pub name: Option<String>,
    /// Distance in kilometres
    pub distance_km: f64,
    /// Moving time in minutes
    pub moving_time_min: f64,
    /// Average pace in min/km (None when distance is 0)
    pub pace_min_per_km: Option<f64>,
    /// Total elevation gain in metres
    pub total_elevation_gain_m: f64,
    /// Average heart rate (None when no sensor was worn)
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    /// Encoded route polyline (precision 5)
    pub summary_polyline: Option<String>,
}

impl RunSummary {
    /// Create a run from its raw totals, deriving pace.
    pub fn new(
        activity_id: i64,
        start_date_local: Option<NaiveDateTime>,
        distance_km: f64,
        moving_time_min: f64,
    ) -> Self {
        let pace_min_per_km = if distance_km > 0.0 {
            Some(moving_time_min / distance_km)
        } else {
            None
        };
        Self {
            activity_id,
            start_date_local,
            name: None,
            distance_km,
            moving_time_min,
            pace_min_per_km,
            total_elevation_gain_m: 0.0,
            average_heartrate: None,
            max_heartrate: None,
            summary_polyline: None,
        }
    }

    /// Set heart-rate averages.
    pub fn with_heartrate(mut self, average: Option<f64>, max: Option<f64>) -> Self {
        self.average_heartrate = average;
        self.max_heartrate = max;
        self
    }

    /// Set elevation gain (missing readings are stored as 0).
    pub fn with_elevation(mut self, elevation_gain_m: Option<f64>) -> Self {
        self.total_elevation_gain_m = elevation_gain_m.unwrap_or(0.0);
        self
    }

    /// First point of the encoded route as `(x = longitude, y = latitude)`.
    pub fn start_coordinate(&self) -> Option<Point<f64>> {
        let encoded = self.summary_polyline.as_deref()?;
        if encoded.is_empty() {
            return None;
        }
        let line: LineString<f64> = polyline::decode_polyline(encoded, 5).ok()?;
        let first = line.points().next()?;
        on_globe(&first).then_some(first)
    }
}

/// One time-series observation within a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSample {
    pub activity_id: i64,
    /// Elapsed seconds since the start of the run
    pub time_sec: i64,
    /// Instantaneous heart rate (bpm)
    pub heartrate: Option<f64>,
    /// Smoothed speed (m/s)
    pub velocity_smooth: Option<f64>,
    /// Cumulative distance (m)
    pub distance_m: Option<f64>,
}

impl StreamSample {
    pub fn new(
        activity_id: i64,
        time_sec: i64,
        heartrate: Option<f64>,
        velocity_smooth: Option<f64>,
    ) -> Self {
        Self {
            activity_id,
            time_sec,
            heartrate,
            velocity_smooth,
            distance_m: None,
        }
    }
}

/// Semantic workout label assigned to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RunType {
    LongRun,
    Interval,
    TempoRun,
    EasyRun,
    SpeedWork,
    RecoveryRun,
    /// Not enough runs in the batch to classify, or no stored label
    Unknown,
}

impl RunType {
    /// Every label, in display order.
    pub const ALL: [RunType; 7] = [
        RunType::LongRun,
        RunType::Interval,
        RunType::TempoRun,
        RunType::EasyRun,
        RunType::SpeedWork,
        RunType::RecoveryRun,
        RunType::Unknown,
    ];

    /// Label string persisted and shown in the dashboard.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::LongRun => "long run",
            RunType::Interval => "interval",
            RunType::TempoRun => "tempo run",
            RunType::EasyRun => "easy run",
            RunType::SpeedWork => "speed work",
            RunType::RecoveryRun => "recovery run",
            RunType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        RunType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ClassifyError::InvalidRunType {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for RunType {
    type Error = ClassifyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RunType> for String {
    fn from(value: RunType) -> Self {
        value.as_str().to_string()
    }
}

/// Persisted label for one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub activity_id: i64,
    pub run_type: RunType,
    pub classified_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
