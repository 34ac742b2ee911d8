//! Degree-2 polynomial decomposition of rolling windows
//!
//! Each window `[i-W, i)` is fitted with `y = a·x² + b·x + c` and reported
//! by the evaluated contribution of every term at the window's last point,
//! so windows of different lengths are directly comparable.
//!
//! # Domains
//!
//! - `raw`: window positions are centred and scaled onto `[-1, 1]` before
//!   fitting. Price magnitudes would otherwise dominate the normal equations.
//! - `momentum`: positions are used as-is (`x = 0..W-1`). The momentum series
//!   is already normalised; rescaling here changes the meaning of every term.

use super::series::DerivedSeries;
use super::window::{Domain, WindowSpec};

/// Minimum number of points for a quadratic fit
pub const MIN_FIT_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl QuadraticFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    InsufficientPoints(usize),
    Singular,
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::InsufficientPoints(n) => {
                write!(f, "Insufficient points for quadratic fit: {}", n)
            }
            FitError::Singular => write!(f, "Singular normal equations"),
        }
    }
}

impl std::error::Error for FitError {}

/// Term-based regression output at a window's last point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionTerm {
    pub quadratic_term: f64,
    pub linear_term: f64,
    pub constant_term: f64,
    pub residual: f64,
    /// `None` when the window has zero variance
    pub r2: Option<f64>,
    pub rmse: f64,
    pub prediction: f64,
}

impl RegressionTerm {
    /// Values in column order: quadratic, linear, constant, residual, r2, rmse, prediction
    pub fn columns(&self) -> [Option<f64>; 7] {
        [
            Some(self.quadratic_term),
            Some(self.linear_term),
            Some(self.constant_term),
            Some(self.residual),
            self.r2,
            Some(self.rmse),
            Some(self.prediction),
        ]
    }
}

/// Least-squares quadratic fit, coefficients in the caller's x coordinates
///
/// The normal equations are solved in a centred/scaled basis internally and
/// mapped back, which keeps large unscaled positions well conditioned without
/// changing the fitted polynomial.
pub fn fit_quadratic(xs: &[f64], ys: &[f64]) -> Result<QuadraticFit, FitError> {
    let n = xs.len().min(ys.len());
    if n < MIN_FIT_POINTS {
        return Err(FitError::InsufficientPoints(n));
    }

    let (lo, hi) = xs[..n]
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(*x), hi.max(*x))
        });
    let shift = (lo + hi) / 2.0;
    let scale = (hi - lo) / 2.0;
    if scale <= 0.0 || !scale.is_finite() {
        return Err(FitError::Singular);
    }

    // Sums of u^k and y·u^k in the internal basis u = (x - shift) / scale
    let mut s = [0.0_f64; 5];
    let mut t = [0.0_f64; 3];
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let u = (x - shift) / scale;
        let mut p = 1.0;
        for k in 0..5 {
            s[k] += p;
            if k < 3 {
                t[k] += y * p;
            }
            p *= u;
        }
    }

    let mut m = [
        [s[4], s[3], s[2], t[2]],
        [s[3], s[2], s[1], t[1]],
        [s[2], s[1], s[0], t[0]],
    ];
    let [alpha, beta, gamma] = solve3(&mut m).ok_or(FitError::Singular)?;

    // y = α u² + β u + γ with u = (x - shift) / scale
    let inv = 1.0 / scale;
    let a = alpha * inv * inv;
    let b = beta * inv - 2.0 * alpha * shift * inv * inv;
    let c = alpha * shift * shift * inv * inv - beta * shift * inv + gamma;

    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return Err(FitError::Singular);
    }

    Ok(QuadraticFit { a, b, c })
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 matrix
fn solve3(m: &mut [[f64; 4]; 3]) -> Option<[f64; 3]> {
    let magnitude = m
        .iter()
        .flat_map(|row| row[..3].iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if magnitude == 0.0 || !magnitude.is_finite() {
        return None;
    }
    let tolerance = magnitude * 1e-12;

    for col in 0..3 {
        let pivot_row = (col..3).max_by(|a, b| {
            m[*a][col]
                .abs()
                .partial_cmp(&m[*b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot_row][col].abs() <= tolerance {
            return None;
        }
        m.swap(col, pivot_row);

        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut out = [0.0; 3];
    for row in (0..3).rev() {
        let mut acc = m[row][3];
        for k in row + 1..3 {
            acc -= m[row][k] * out[k];
        }
        out[row] = acc / m[row][row];
    }
    Some(out)
}

pub struct RegressionDecomposer {
    spec: WindowSpec,
}

impl RegressionDecomposer {
    pub fn new(spec: WindowSpec) -> Self {
        Self { spec }
    }

    /// Map a window position `0..W` onto the fitting axis for this domain
    pub fn position_to_x(&self, position: usize) -> f64 {
        match self.spec.domain {
            Domain::Raw => {
                let half = (self.spec.observations().saturating_sub(1) as f64 / 2.0).max(1.0);
                (position as f64 - half) / half
            }
            Domain::Momentum => position as f64,
        }
    }

    /// Decompose one window of `(position, y)` points
    ///
    /// The last point must sit at position `W-1`; its value is the actual the
    /// residual is measured against.
    pub fn decompose(&self, points: &[(usize, f64)]) -> Result<RegressionTerm, FitError> {
        if points.len() < MIN_FIT_POINTS {
            return Err(FitError::InsufficientPoints(points.len()));
        }

        let xs: Vec<f64> = points.iter().map(|(p, _)| self.position_to_x(*p)).collect();
        let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let fit = fit_quadratic(&xs, &ys)?;

        let (last_position, y_last) = points[points.len() - 1];
        let x_last = self.position_to_x(last_position);

        let quadratic_term = fit.a * x_last * x_last;
        let linear_term = fit.b * x_last;
        let constant_term = fit.c;
        let prediction = quadratic_term + linear_term + constant_term;

        let n = ys.len() as f64;
        let y_mean = ys.iter().sum::<f64>() / n;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (x, y) in xs.iter().zip(&ys) {
            ss_res += (y - fit.evaluate(*x)).powi(2);
            ss_tot += (y - y_mean).powi(2);
        }

        let r2 = if ss_tot > f64::EPSILON * y_mean.abs().max(1.0) * n {
            Some(1.0 - ss_res / ss_tot)
        } else {
            None
        };

        Ok(RegressionTerm {
            quadratic_term,
            linear_term,
            constant_term,
            residual: y_last - prediction,
            r2,
            rmse: (ss_res / n).sqrt(),
            prediction,
        })
    }

    /// Collect the window ending just before `i` in this decomposer's domain
    fn window_points(&self, series: &DerivedSeries, i: usize) -> Option<Vec<(usize, f64)>> {
        let w = self.spec.observations();
        if w == 0 || i < w || i > series.len() || !series.is_contiguous(i - w, i - 1) {
            return None;
        }

        let start = i - w;
        let points: Vec<(usize, f64)> = match self.spec.domain {
            Domain::Raw => (0..w).map(|p| (p, series.values[start + p])).collect(),
            Domain::Momentum => {
                // The actual at the last point must exist for a residual
                series.momentum[i - 1]?;
                (0..w)
                    .filter_map(|p| series.momentum[start + p].map(|m| (p, m)))
                    .collect()
            }
        };
        Some(points)
    }

    /// Regression terms for every index of `series`
    ///
    /// Degenerate windows become `None`; a single warning summarises them.
    pub fn compute(&self, series: &DerivedSeries) -> Vec<Option<RegressionTerm>> {
        let mut singular = 0usize;

        let out = (0..series.len())
            .map(|i| {
                let points = self.window_points(series, i)?;
                match self.decompose(&points) {
                    Ok(term) => Some(term),
                    Err(FitError::InsufficientPoints(_)) => None,
                    Err(FitError::Singular) => {
                        singular += 1;
                        log::debug!(
                            "Singular fit: {} {} at ts={}",
                            series.instrument,
                            self.spec,
                            series.timestamps[i]
                        );
                        None
                    }
                }
            })
            .collect();

        if singular > 0 {
            log::warn!(
                "⚠️  {} singular regression windows nulled ({} {})",
                singular,
                series.instrument,
                self.spec
            );
        }

        out
    }
}
