//! Descriptive statistics used across the pipeline, on top of `statrs`.
//!
//! The wrappers drop non-finite values first and guard every denominator:
//! empty input yields `None` (or 0 for plain ratios) instead of NaN or infinity.
//!
//! Quantiles follow `statrs` (the R-8 median-unbiased estimator).

use statrs::statistics::{Data, OrderStatistics, Statistics};

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean of finite values.
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    if finite.is_empty() {
        return None;
    }
    Some(finite.mean())
}

/// Sample standard deviation (n - 1 denominator). Needs at least two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    if finite.len() < 2 {
        return None;
    }
    Some(finite.std_dev())
}

/// Quantile of finite values, `q` clamped to [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let finite = finite(values);
    if finite.is_empty() {
        return None;
    }
    let mut data = Data::new(finite);
    Some(data.quantile(q.clamp(0.0, 1.0)))
}

/// Median of finite values.
pub fn median(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    if finite.is_empty() {
        return None;
    }
    let mut data = Data::new(finite);
    Some(data.median())
}

/// Upper minus lower quartile of finite values.
pub fn interquartile_range(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    if finite.is_empty() {
        return None;
    }
    let mut data = Data::new(finite);
    Some(data.interquartile_range())
}

/// Median over optional values, ignoring the missing ones.
pub fn median_of_known(values: &[Option<f64>]) -> Option<f64> {
    let known: Vec<f64> = values.iter().flatten().copied().collect();
    median(&known)
}

/// `numerator / denominator`, or 0 when the denominator is not positive.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && numerator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

/// Coefficient of variation (stddev / mean) clamped into `[0, cap]`.
///
/// Returns `None` when it cannot be computed (fewer than two values or a
/// non-positive mean).
pub fn coefficient_of_variation(values: &[f64], cap: f64) -> Option<f64> {
    let m = mean(values)?;
    if m <= 0.0 {
        return None;
    }
    let sd = sample_std(values)?;
    let cv = sd / m;
    if cv.is_finite() {
        Some(cv.clamp(0.0, cap))
    } else {
        Some(cap)
    }
}
