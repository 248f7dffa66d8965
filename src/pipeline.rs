//! Stage orchestration: extractor → builder → rules → cluster fallback.
//!
//! [`classify_batch`] is the pure core over an in-memory batch.
//! [`run_pipeline`] wraps it with storage access: reads go through a
//! [`RunSource`], labels go out through a [`ClassificationSink`], and any
//! storage failure is logged and degraded rather than returned.
//!
//! ## Example
//!
//! ```rust
//! use run_classifier::{classify_batch, PipelineConfig, RunSummary, RunType};
//!
//! let runs: Vec<RunSummary> = (1..=3)
//!     .map(|id| RunSummary::new(id, None, 10.0, 55.0))
//!     .collect();
//! let outcome = classify_batch(&runs, &[], &PipelineConfig::default());
//!
//! // Too few runs to classify meaningfully
//! assert!(outcome.decisions.iter().all(|d| d.run_type == RunType::Unknown));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::cluster::cluster_fallback;
use crate::features::{build_feature_rows, FeatureRow};
use crate::rules::evaluate_rules;
use crate::storage::{ClassificationSink, RunSource};
use crate::{Classification, PipelineConfig, RunSummary, RunType, StreamSample};

/// Which stage produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelSource {
    /// An ordered rule fired (1-based rule number)
    Rules { rule: u8 },
    /// Named from the group it was clustered into
    Cluster { cluster: usize },
    /// Unlabeled remainder too small to cluster
    SmallRemainder,
    /// Batch below the minimum size; nothing was classified
    DegenerateBatch,
}

/// Final label for one run and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelDecision {
    pub activity_id: i64,
    pub run_type: RunType,
    pub source: LabelSource,
}

/// Result of classifying one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Feature rows in input order (empty for a degenerate batch)
    pub rows: Vec<FeatureRow>,
    /// One decision per input run, in input order
    pub decisions: Vec<LabelDecision>,
}

impl BatchOutcome {
    /// Activity → label mapping.
    pub fn labels(&self) -> HashMap<i64, RunType> {
        self.decisions
            .iter()
            .map(|d| (d.activity_id, d.run_type))
            .collect()
    }

    /// Label for one activity, if it was part of the batch.
    pub fn label_for(&self, activity_id: i64) -> Option<RunType> {
        self.decisions
            .iter()
            .find(|d| d.activity_id == activity_id)
            .map(|d| d.run_type)
    }

    /// Stamp every decision for persistence.
    pub fn classifications(&self, classified_at: DateTime<Utc>) -> Vec<Classification> {
        self.decisions
            .iter()
            .map(|d| Classification {
                activity_id: d.activity_id,
                run_type: d.run_type,
                classified_at,
            })
            .collect()
    }

    /// Count decisions matching a predicate on their source.
    fn count_where(&self, f: impl Fn(&LabelSource) -> bool) -> usize {
        self.decisions.iter().filter(|d| f(&d.source)).count()
    }
}

/// Classify a full batch of runs.
///
/// Pure: identical runs, samples and config always give identical decisions.
pub fn classify_batch(
    runs: &[RunSummary],
    samples: &[StreamSample],
    config: &PipelineConfig,
) -> BatchOutcome {
    if runs.len() < config.min_batch_size {
        info!(
            "[Pipeline] {} runs is below the minimum batch of {}, labeling all unknown",
            runs.len(),
            config.min_batch_size
        );
        return BatchOutcome {
            rows: Vec::new(),
            decisions: runs
                .iter()
                .map(|r| LabelDecision {
                    activity_id: r.activity_id,
                    run_type: RunType::Unknown,
                    source: LabelSource::DegenerateBatch,
                })
                .collect(),
        };
    }

    #[cfg(feature = "parallel")]
    let stream_features =
        crate::streams::extract_stream_features_parallel(samples, &config.features);
    #[cfg(not(feature = "parallel"))]
    let stream_features = crate::streams::extract_stream_features(samples, &config.features);

    let rows = build_feature_rows(runs, &stream_features, &config.features);

    let mut decisions: Vec<Option<LabelDecision>> = rows
        .iter()
        .map(|row| {
            evaluate_rules(row).map(|m| LabelDecision {
                activity_id: row.activity_id,
                run_type: m.run_type,
                source: LabelSource::Rules { rule: m.rule },
            })
        })
        .collect();

    let unlabeled: Vec<usize> = decisions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_none())
        .map(|(i, _)| i)
        .collect();

    if !unlabeled.is_empty() {
        let subset: Vec<FeatureRow> = unlabeled.iter().map(|&i| rows[i].clone()).collect();
        let fallback = cluster_fallback(&subset, &config.cluster);
        for (&i, label) in unlabeled.iter().zip(&fallback.labels) {
            decisions[i] = Some(LabelDecision {
                activity_id: label.activity_id,
                run_type: label.run_type,
                source: match label.cluster {
                    Some(cluster) => LabelSource::Cluster { cluster },
                    None => LabelSource::SmallRemainder,
                },
            });
        }
    }

    let decisions: Vec<LabelDecision> = decisions
        .into_iter()
        .zip(&rows)
        .map(|(d, row)| {
            d.unwrap_or(LabelDecision {
                activity_id: row.activity_id,
                run_type: RunType::RecoveryRun,
                source: LabelSource::SmallRemainder,
            })
        })
        .collect();

    let outcome = BatchOutcome { rows, decisions };
    info!(
        "[Pipeline] Classified {} runs: {} by rules, {} by clustering, {} small remainder",
        outcome.decisions.len(),
        outcome.count_where(|s| matches!(s, LabelSource::Rules { .. })),
        outcome.count_where(|s| matches!(s, LabelSource::Cluster { .. })),
        outcome.count_where(|s| matches!(s, LabelSource::SmallRemainder)),
    );
    outcome
}

/// What one pipeline invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Runs read from the source
    pub runs: usize,
    /// Activities that had any stream samples
    pub runs_with_streams: usize,
    pub rule_labeled: usize,
    pub cluster_labeled: usize,
    pub small_remainder: usize,
    pub degenerate: usize,
    /// Whether the sink accepted the labels
    pub persisted: bool,
}

/// Read the current batch, classify it, and write every label with `now`.
///
/// Never fails: a failed run read yields an empty batch, a failed stream read
/// yields a batch without stream features, a failed write is reported as
/// `persisted == false`.
pub fn run_pipeline<S, K>(
    source: &S,
    sink: &mut K,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> PipelineReport
where
    S: RunSource + ?Sized,
    K: ClassificationSink + ?Sized,
{
    let runs = match source.load_runs() {
        Ok(runs) => runs,
        Err(e) => {
            error!("[Pipeline] Failed to load runs: {}", e);
            Vec::new()
        }
    };

    let ids: Vec<i64> = runs.iter().map(|r| r.activity_id).collect();
    let samples = if ids.is_empty() {
        Vec::new()
    } else {
        match source.load_streams(&ids) {
            Ok(samples) => samples,
            Err(e) => {
                error!("[Pipeline] Failed to load streams, continuing without: {}", e);
                Vec::new()
            }
        }
    };

    let mut with_streams: Vec<i64> = samples.iter().map(|s| s.activity_id).collect();
    with_streams.sort_unstable();
    with_streams.dedup();

    let outcome = classify_batch(&runs, &samples, config);

    let mut report = PipelineReport {
        runs: runs.len(),
        runs_with_streams: with_streams.len(),
        rule_labeled: outcome.count_where(|s| matches!(s, LabelSource::Rules { .. })),
        cluster_labeled: outcome.count_where(|s| matches!(s, LabelSource::Cluster { .. })),
        small_remainder: outcome.count_where(|s| matches!(s, LabelSource::SmallRemainder)),
        degenerate: outcome.count_where(|s| matches!(s, LabelSource::DegenerateBatch)),
        persisted: false,
    };

    if outcome.decisions.is_empty() {
        warn!("[Pipeline] No runs to classify");
        return report;
    }

    match sink.upsert_classifications(&outcome.classifications(now)) {
        Ok(written) => {
            info!("[Pipeline] Persisted {} labels", written);
            report.persisted = true;
        }
        Err(e) => error!("[Pipeline] Failed to persist labels: {}", e),
    }

    report
}
