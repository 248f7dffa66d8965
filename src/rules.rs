//! Ordered threshold rules over a feature row.
//!
//! Rules are evaluated top to bottom and the first match wins. Runs longer
//! than [`INTERVAL_MAX_DISTANCE_KM`] can never be labeled "interval" here.
//! A row matching no rule is left for the cluster fallback.
//!
//! The thresholds are empirically tuned and kept exactly as they are.

use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::RunType;

/// Distance at or above which a run is always a long run.
pub const LONG_RUN_MIN_DISTANCE_KM: f64 = 15.0;
/// Interval rules only apply at or below this distance.
pub const INTERVAL_MAX_DISTANCE_KM: f64 = 6.0;
/// Tempo pace window in min/km (inclusive).
pub const TEMPO_PACE_RANGE: (f64, f64) = (5.5, 6.3);

/// Which rule fired, 1-based in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule: u8,
    pub run_type: RunType,
}

impl RuleMatch {
    fn new(rule: u8, run_type: RunType) -> Self {
        Self { rule, run_type }
    }
}

/// Evaluate the ordered rules and report the first one that matches.
pub fn evaluate_rules(row: &FeatureRow) -> Option<RuleMatch> {
    let distance = row.distance_km;
    let pace = row.pace_min_per_km;
    let variability = row.variability_score;
    let intensity = row.intensity_score;
    let interval_eligible = distance <= INTERVAL_MAX_DISTANCE_KM;

    // 1. Absolute: long distance wins regardless of anything else
    if distance >= LONG_RUN_MIN_DISTANCE_KM {
        return Some(RuleMatch::new(1, RunType::LongRun));
    }

    // 2. Structured intervals: variable, with real work/rest alternation
    if interval_eligible
        && variability > 0.25
        && row.work_rest_ratio > 0.23
        && row.high_intensity_fraction > 0.18
    {
        return Some(RuleMatch::new(2, RunType::Interval));
    }

    // 3. Fast and variable but not sustained hard
    if interval_eligible && variability > 0.3 && pace < 5.5 && intensity < 0.5 {
        return Some(RuleMatch::new(3, RunType::Interval));
    }

    // 4. Short, steady, relaxed
    if interval_eligible && variability < 0.2 && intensity < 0.6 {
        return Some(RuleMatch::new(4, RunType::EasyRun));
    }

    // 5. Steady effort in the tempo pace window
    if distance >= 5.0
        && (TEMPO_PACE_RANGE.0..=TEMPO_PACE_RANGE.1).contains(&pace)
        && variability < 0.25
    {
        return Some(RuleMatch::new(5, RunType::TempoRun));
    }

    // 6. Mid-distance with strong variation
    if distance > 4.0 && distance <= 12.0 && variability > 0.4 {
        return Some(RuleMatch::new(6, RunType::TempoRun));
    }

    // 7. Short and hard
    if distance <= 8.0 && intensity > 0.75 {
        return Some(RuleMatch::new(7, RunType::SpeedWork));
    }

    // 8. Longer variable hard efforts
    if distance > INTERVAL_MAX_DISTANCE_KM && variability > 0.3 && intensity > 0.5 {
        return Some(RuleMatch::new(8, RunType::TempoRun));
    }

    // 9. Short variable efforts at low intensity
    if interval_eligible && variability > 0.3 && intensity < 0.5 {
        return Some(RuleMatch::new(9, RunType::Interval));
    }

    None
}

/// Label a row by rules alone; `None` defers to clustering.
pub fn classify_by_rules(row: &FeatureRow) -> Option<RunType> {
    evaluate_rules(row).map(|m| m.run_type)
}
