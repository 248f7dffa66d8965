//! Cluster fallback for runs the rules could not label.
//!
//! Algorithm:
//! 1. Small remainders (≤ `min_population` runs) are all "recovery run"
//! 2. Robust-scale every feature column: `(x - median) / IQR`
//! 3. k-means with k-means++ seeding from a fixed-seed ChaCha generator,
//!    `n_init` restarts, lowest inertia kept
//! 4. Name each group from the unscaled means of its members
//!
//! Identical input and seed always give identical groups.

use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureRow, CLUSTER_FEATURE_COUNT};
use crate::stats::{interquartile_range, mean, median};
use crate::{ClusterConfig, RunType};

type Point = [f64; CLUSTER_FEATURE_COUNT];

/// Group-naming thresholds, mirroring the intent of the ordered rules.
const LONG_GROUP_MIN_DISTANCE_KM: f64 = 15.0;
const SHORT_GROUP_MAX_DISTANCE_KM: f64 = 6.0;
const INTERVAL_GROUP_MIN_WORK_REST: f64 = 0.23;
const INTERVAL_GROUP_MIN_VARIABILITY: f64 = 0.25;
const TEMPO_GROUP_MIN_INTENSITY: f64 = 0.6;
const EASY_GROUP_MAX_VARIABILITY: f64 = 0.2;
const EASY_GROUP_MAX_INTENSITY: f64 = 0.6;

/// Summary of one group and the label it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub mean_distance_km: f64,
    pub mean_variability: f64,
    pub mean_intensity: f64,
    pub mean_work_rest: f64,
    pub run_type: RunType,
}

impl ClusterProfile {
    fn from_members(cluster: usize, members: &[&FeatureRow]) -> Self {
        let column = |f: fn(&FeatureRow) -> f64| {
            let values: Vec<f64> = members.iter().map(|r| f(*r)).collect();
            mean(&values).unwrap_or(0.0)
        };
        let mut profile = Self {
            cluster,
            size: members.len(),
            mean_distance_km: column(|r| r.distance_km),
            mean_variability: column(|r| r.variability_score),
            mean_intensity: column(|r| r.intensity_score),
            mean_work_rest: column(|r| r.work_rest_ratio),
            run_type: RunType::RecoveryRun,
        };
        profile.run_type = name_cluster(&profile);
        profile
    }
}

/// Semantic name for a group from its mean characteristics.
pub fn name_cluster(profile: &ClusterProfile) -> RunType {
    let short = profile.mean_distance_km <= SHORT_GROUP_MAX_DISTANCE_KM;

    if profile.mean_distance_km >= LONG_GROUP_MIN_DISTANCE_KM {
        RunType::LongRun
    } else if short
        && profile.mean_work_rest > INTERVAL_GROUP_MIN_WORK_REST
        && profile.mean_variability > INTERVAL_GROUP_MIN_VARIABILITY
    {
        RunType::Interval
    } else if profile.mean_intensity > TEMPO_GROUP_MIN_INTENSITY {
        RunType::TempoRun
    } else if short
        && profile.mean_variability < EASY_GROUP_MAX_VARIABILITY
        && profile.mean_intensity < EASY_GROUP_MAX_INTENSITY
    {
        RunType::EasyRun
    } else {
        RunType::RecoveryRun
    }
}

/// Label assigned to one run by the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabel {
    pub activity_id: i64,
    /// Group index, `None` when the remainder was too small to cluster
    pub cluster: Option<usize>,
    pub run_type: RunType,
}

/// Result of the fallback over the unlabeled subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    /// One entry per input row, in input order
    pub labels: Vec<ClusterLabel>,
    /// Empty when clustering was skipped
    pub profiles: Vec<ClusterProfile>,
}

/// Label the rows the rule classifier left unclassified.
pub fn cluster_fallback(rows: &[FeatureRow], config: &ClusterConfig) -> FallbackResult {
    if rows.len() <= config.min_population {
        return FallbackResult {
            labels: rows
                .iter()
                .map(|r| ClusterLabel {
                    activity_id: r.activity_id,
                    cluster: None,
                    run_type: RunType::RecoveryRun,
                })
                .collect(),
            profiles: Vec::new(),
        };
    }

    let points: Vec<Point> = rows.iter().map(FeatureRow::cluster_vector).collect();
    let scaled = robust_scale(&points);
    let k = config.max_clusters.clamp(1, rows.len());
    let assignments = kmeans(&scaled, k, config);

    let profiles: Vec<ClusterProfile> = (0..k)
        .filter_map(|cluster| {
            let members: Vec<&FeatureRow> = rows
                .iter()
                .zip(&assignments)
                .filter(|(_, a)| **a == cluster)
                .map(|(r, _)| r)
                .collect();
            if members.is_empty() {
                return None;
            }
            let profile = ClusterProfile::from_members(cluster, &members);
            debug!(
                "[Cluster] Group {}: {} runs, {:.1} km, var {:.2}, int {:.2}, w/r {:.2} -> {}",
                profile.cluster,
                profile.size,
                profile.mean_distance_km,
                profile.mean_variability,
                profile.mean_intensity,
                profile.mean_work_rest,
                profile.run_type
            );
            Some(profile)
        })
        .collect();

    let labels = rows
        .iter()
        .zip(&assignments)
        .map(|(row, cluster)| ClusterLabel {
            activity_id: row.activity_id,
            cluster: Some(*cluster),
            run_type: profiles
                .iter()
                .find(|p| p.cluster == *cluster)
                .map_or(RunType::RecoveryRun, |p| p.run_type),
        })
        .collect();

    FallbackResult { labels, profiles }
}

/// Scale each column to zero median and unit interquartile range.
///
/// Columns with no spread are only centred.
pub fn robust_scale(points: &[Point]) -> Vec<Point> {
    let mut centers = [0.0; CLUSTER_FEATURE_COUNT];
    let mut scales = [1.0; CLUSTER_FEATURE_COUNT];

    for j in 0..CLUSTER_FEATURE_COUNT {
        let column: Vec<f64> = points.iter().map(|p| p[j]).collect();
        centers[j] = median(&column).unwrap_or(0.0);
        let iqr = interquartile_range(&column).unwrap_or(0.0);
        if iqr.is_finite() && iqr > 1e-12 {
            scales[j] = iqr;
        }
    }

    points
        .iter()
        .map(|p| {
            let mut scaled = [0.0; CLUSTER_FEATURE_COUNT];
            for j in 0..CLUSTER_FEATURE_COUNT {
                let v = (p[j] - centers[j]) / scales[j];
                scaled[j] = if v.is_finite() { v } else { 0.0 };
            }
            scaled
        })
        .collect()
}

fn squared_dist(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_dist(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// k-means++ seeding: spread initial picks proportionally to squared distance.
fn init_centroids(points: &[Point], k: usize, rng: &mut ChaCha8Rng) -> Vec<Point> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..n)]);

    while centroids.len() < k {
        let dists: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = dists.iter().sum();
        if total < 1e-15 {
            // All points coincide with existing centroids
            centroids.push(points[rng.gen_range(0..n)]);
            continue;
        }

        let threshold = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut chosen = n - 1;
        for (i, d) in dists.iter().enumerate() {
            cumulative += d;
            if cumulative > threshold {
                chosen = i;
                break;
            }
        }
        centroids.push(points[chosen]);
    }

    centroids
}

/// One Lloyd run from the given centroids. Returns assignments and inertia.
fn lloyd(points: &[Point], mut centroids: Vec<Point>, max_iterations: usize) -> (Vec<usize>, f64) {
    let k = centroids.len();
    let mut assignments = vec![usize::MAX; points.len()];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let (cluster, _) = nearest(point, &centroids);
            if assignments[i] != cluster {
                assignments[i] = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![[0.0; CLUSTER_FEATURE_COUNT]; k];
        let mut counts = vec![0usize; k];
        for (point, &cluster) in points.iter().zip(&assignments) {
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(point.iter()) {
                *s += v;
            }
        }
        for c in 0..k {
            // Empty groups keep their previous centroid
            if counts[c] > 0 {
                for s in sums[c].iter_mut() {
                    *s /= counts[c] as f64;
                }
                centroids[c] = sums[c];
            }
        }
    }

    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(p, &c)| squared_dist(p, &centroids[c]))
        .sum();
    (assignments, inertia)
}

/// Seeded k-means over already-scaled points.
pub fn kmeans(points: &[Point], k: usize, config: &ClusterConfig) -> Vec<usize> {
    if points.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(points.len());
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut best: Option<(Vec<usize>, f64)> = None;
    for _ in 0..config.n_init.max(1) {
        let centroids = init_centroids(points, k, &mut rng);
        let (assignments, inertia) = lloyd(points, centroids, config.max_iterations.max(1));
        let better = best.as_ref().map_or(true, |(_, b)| inertia < *b);
        if better {
            best = Some((assignments, inertia));
        }
    }

    best.map(|(assignments, _)| assignments).unwrap_or_default()
}
