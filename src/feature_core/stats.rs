//! Nullable statistics over plain slices
//!
//! Every function returns `None` where the quantity is undefined (too few
//! points, zero variance, non-finite result) instead of coercing to zero.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n-1 denominator)
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(sum_sq / (n - 1) as f64)
}

/// Sample standard deviation (n-1 denominator)
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(|v| v.sqrt())
}

/// Sample covariance (n-1 denominator)
pub fn sample_covariance(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x)?;
    let mean_y = mean(y)?;
    let sum: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();
    let cov = sum / (x.len() - 1) as f64;
    cov.is_finite().then_some(cov)
}

/// Pearson correlation, clamped to [-1, 1]
///
/// Zero-variance inputs yield `None`.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let cov = sample_covariance(x, y)?;
    let std_x = sample_std_dev(x)?;
    let std_y = sample_std_dev(y)?;

    if std_x == 0.0 || std_y == 0.0 {
        return None;
    }

    let r = cov / (std_x * std_y);
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Divide, returning `None` for a zero or non-finite result
pub fn checked_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let q = numerator / denominator;
    q.is_finite().then_some(q)
}
