//! Tunable parameters for feature extraction and the cluster fallback.
//!
//! The ordered rule thresholds are fixed constants in [`crate::rules`].

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result};

/// Configuration for stream feature extraction and feature building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// An activity needs strictly more valid samples than this to get stream features.
    /// Default: 10
    pub min_valid_samples: usize,

    /// Upper bound applied to the pace coefficient of variation.
    /// Default: 2.0 (strict: 1.5)
    pub pace_cv_cap: f64,

    /// Upper bound applied to the heart-rate coefficient of variation.
    /// Default: 1.0 (strict: 0.8)
    pub hr_cv_cap: f64,

    /// Consecutive heart-rate rise (bpm) counted as an effort spike.
    /// Default: 15.0 (strict: 10.0)
    pub spike_delta_bpm: f64,

    /// Heart rate above which a sample counts as high intensity.
    /// Default: 141.0 (~75% of a 185-190 max)
    pub high_intensity_hr: f64,

    /// Assumed near-max heart rate used for heart-rate intensity.
    /// Default: 185.0
    pub assumed_max_hr: f64,

    /// Speeds outside (0, this) m/s are dropped before aggregation.
    /// Default: 20.0
    pub max_valid_speed_mps: f64,

    /// Heart rates outside (0, this) bpm are dropped before aggregation.
    /// Default: 250.0
    pub max_valid_hr_bpm: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_valid_samples: 10,
            pace_cv_cap: 2.0,
            hr_cv_cap: 1.0,
            spike_delta_bpm: 15.0,
            high_intensity_hr: 141.0,
            assumed_max_hr: 185.0,
            max_valid_speed_mps: 20.0,
            max_valid_hr_bpm: 250.0,
        }
    }
}

impl FeatureConfig {
    /// Tighter variability bounds and a lower spike threshold.
    pub fn strict() -> Self {
        Self {
            pace_cv_cap: 1.5,
            hr_cv_cap: 0.8,
            spike_delta_bpm: 10.0,
            ..Self::default()
        }
    }
}

/// Configuration for the unsupervised fallback over unlabeled runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Unlabeled subsets of this size or smaller skip clustering and become "recovery run".
    /// Default: 3
    pub min_population: usize,

    /// Upper bound on the number of groups.
    /// Default: 4
    pub max_clusters: usize,

    /// Seed for centroid initialisation. Same input + same seed = same groups.
    /// Default: 42
    pub seed: u64,

    /// Lloyd iteration cap per restart.
    /// Default: 300
    pub max_iterations: usize,

    /// Number of k-means++ restarts; the lowest-inertia result wins.
    /// Default: 10
    pub n_init: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_population: 3,
            max_clusters: 4,
            seed: 42,
            max_iterations: 300,
            n_init: 10,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub cluster: ClusterConfig,
    /// Batches with fewer runs than this are labeled "unknown" wholesale.
    /// Default: 5
    pub min_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            cluster: ClusterConfig::default(),
            min_batch_size: 5,
        }
    }
}

impl PipelineConfig {
    /// Default pipeline with the stricter feature variant.
    pub fn strict() -> Self {
        Self {
            features: FeatureConfig::strict(),
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON configuration; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        let f = &self.features;
        if !(f.pace_cv_cap > 0.0 && f.hr_cv_cap > 0.0) {
            return Err(ClassifyError::config("variability caps must be positive"));
        }
        if !(f.assumed_max_hr > 0.0) {
            return Err(ClassifyError::config("assumed_max_hr must be positive"));
        }
        if !(f.max_valid_speed_mps > 0.0 && f.max_valid_hr_bpm > 0.0) {
            return Err(ClassifyError::config("sensor ranges must be positive"));
        }
        if self.cluster.max_clusters == 0 {
            return Err(ClassifyError::config("max_clusters must be at least 1"));
        }
        if self.cluster.n_init == 0 || self.cluster.max_iterations == 0 {
            return Err(ClassifyError::config(
                "n_init and max_iterations must be at least 1",
            ));
        }
        Ok(())
    }
}
