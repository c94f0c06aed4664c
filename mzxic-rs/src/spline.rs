//! Uniform-grid resampling of chromatograms
//!
//! [`XicLinearSpline`] and [`XicCubicSpline`] fit a curve through the
//! `(x, intensity)` points of an XIC and evaluate it every `spline_step`
//! along the x axis. The x axis is either the retention time or, in cycle
//! mode, the zero-based scan index.
//!
//! # Example
//!
//! ```
//! use mzxic::spline::{XicCubicSpline, XicSpline};
//!
//! let x = [1.0, 1.1, 1.2, 1.3, 1.4, 1.5];
//! let y = [1.0, 4.0, 9.0, 9.0, 4.0, 1.0];
//!
//! let spline = XicCubicSpline::new(0.05).unwrap();
//! let curve = spline.get_xic_spline_data(&x, &y, 1.0, 1.5).unwrap();
//! assert_eq!(curve.len(), 11);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MIN_SPLINE_POINTS, XicError, XicResult};
use crate::xic::ExtractedIonChromatogram;

/// Slack on the grid point count so that `(end - start) / step` landing a
/// hair under an integer still includes `end`
const GRID_EPSILON: f64 = 1e-9;
const ROOT_EPSILON: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display)]
pub enum SplineKind {
    #[default]
    #[strum(serialize = "linear")]
    Linear,
    #[strum(serialize = "cubic")]
    Cubic,
}

/// A curve that can be evaluated anywhere inside its knot domain
pub trait Interpolator {
    fn domain(&self) -> (f64, f64);

    fn evaluate(&self, x: f64) -> f64;
}

// ============================================================================
// Interpolators
// ============================================================================

fn check_knots(x: &[f64], y: &[f64], min_points: usize) -> XicResult<()> {
    if x.len() != y.len() {
        return Err(XicError::LengthMismatch);
    }
    if x.len() < min_points {
        return Err(XicError::InsufficientData);
    }
    if let Some(w) = x.windows(2).find(|w| !(w[1] > w[0])) {
        return Err(XicError::invalid(format!(
            "x values must be strictly increasing ({} followed by {})",
            w[0], w[1]
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(XicError::invalid("y values must be finite"));
    }
    Ok(())
}

/// Collapse runs of equal x values into one knot holding the largest y.
/// Scans acquired at the same retention time otherwise break the strictly
/// increasing knot order.
pub fn merge_equal_knots(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut merged_x: Vec<f64> = Vec::with_capacity(x.len());
    let mut merged_y: Vec<f64> = Vec::with_capacity(y.len());

    for (&xi, &yi) in x.iter().zip(y) {
        match (merged_x.last(), merged_y.last_mut()) {
            (Some(&last), Some(last_y)) if last == xi => *last_y = last_y.max(yi),
            _ => {
                merged_x.push(xi);
                merged_y.push(yi);
            }
        }
    }

    (merged_x, merged_y)
}

/// Index `i` of the knot interval `[x[i], x[i+1]]` holding `value`
fn knot_interval(x: &[f64], value: f64) -> usize {
    x.partition_point(|&k| k <= value)
        .saturating_sub(1)
        .min(x.len() - 2)
}

/// Piecewise linear interpolation through the knots
#[derive(Clone, Debug)]
pub struct LinearInterpolator {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearInterpolator {
    pub fn new(x: &[f64], y: &[f64]) -> XicResult<Self> {
        check_knots(x, y, 2)?;
        Ok(LinearInterpolator {
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }
}

impl Interpolator for LinearInterpolator {
    fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    fn evaluate(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = x.clamp(lo, hi);
        let i = knot_interval(&self.x, x);

        let t = (x - self.x[i]) / (self.x[i + 1] - self.x[i]);
        self.y[i] * (1.0 - t) + self.y[i + 1] * t
    }
}

/// Natural cubic spline: C2 continuous, zero second derivative at both ends
#[derive(Clone, Debug)]
pub struct NaturalCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl NaturalCubicSpline {
    pub fn new(x: &[f64], y: &[f64]) -> XicResult<Self> {
        check_knots(x, y, 2)?;

        let n = x.len();
        let mut second_derivatives = vec![0.0; n];

        if n > 2 {
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let m = n - 2;

            // tridiagonal system over the interior knots, solved with the Thomas algorithm
            let mut c_prime = vec![0.0; m];
            let mut d_prime = vec![0.0; m];
            for k in 0..m {
                let i = k + 1;
                let sub = h[i - 1];
                let diag = 2.0 * (h[i - 1] + h[i]);
                let sup = h[i];
                let rhs = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);

                if k == 0 {
                    c_prime[k] = sup / diag;
                    d_prime[k] = rhs / diag;
                } else {
                    let denom = diag - sub * c_prime[k - 1];
                    c_prime[k] = sup / denom;
                    d_prime[k] = (rhs - sub * d_prime[k - 1]) / denom;
                }
            }

            second_derivatives[m] = d_prime[m - 1];
            for k in (0..m - 1).rev() {
                second_derivatives[k + 1] = d_prime[k] - c_prime[k] * second_derivatives[k + 2];
            }
        }

        Ok(NaturalCubicSpline {
            x: x.to_vec(),
            y: y.to_vec(),
            second_derivatives,
        })
    }

    /// Second derivative at `x` (clamped to the domain), linear between knots
    pub fn second_derivative(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = x.clamp(lo, hi);
        let i = knot_interval(&self.x, x);

        let h = self.x[i + 1] - self.x[i];
        (self.second_derivatives[i] * (self.x[i + 1] - x) + self.second_derivatives[i + 1] * (x - self.x[i])) / h
    }

    /// Positions where the first derivative vanishes, ascending.
    ///
    /// On `[x_i, x_i + h)` the derivative is the quadratic
    /// `a t^2 + b t + c` of `t = x - x_i`; constant stretches have no
    /// isolated root and yield nothing.
    pub fn stationary_points(&self) -> Vec<f64> {
        let mut points = Vec::new();

        for i in 0..self.x.len() - 1 {
            let h = self.x[i + 1] - self.x[i];
            let (m0, m1) = (self.second_derivatives[i], self.second_derivatives[i + 1]);

            let a = (m1 - m0) / (2.0 * h);
            let b = m0;
            let c = (self.y[i + 1] - self.y[i]) / h - (m1 - m0) * h / 6.0 - m0 * h / 2.0;

            let roots: Vec<f64> = if a == 0.0 {
                if b == 0.0 { Vec::new() } else { vec![-c / b] }
            } else {
                let discriminant = b * b - 4.0 * a * c;
                if discriminant < 0.0 {
                    Vec::new()
                } else {
                    let q = -0.5 * (b + b.signum() * discriminant.sqrt());
                    if q == 0.0 { vec![0.0] } else { vec![q / a, c / q] }
                }
            };

            // roots on a shared knot may land just outside either interval
            let slack = ROOT_EPSILON * h;
            points.extend(
                roots
                    .into_iter()
                    .filter(|t| t.is_finite() && *t >= -slack && *t <= h + slack)
                    .map(|t| self.x[i] + t.clamp(0.0, h)),
            );
        }

        points.sort_by(f64::total_cmp);
        points.dedup_by(|a, b| (*a - *b).abs() <= ROOT_EPSILON * (1.0 + b.abs()));
        points
    }
}

impl Interpolator for NaturalCubicSpline {
    fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    fn evaluate(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = x.clamp(lo, hi);
        let i = knot_interval(&self.x, x);

        let h = self.x[i + 1] - self.x[i];
        let left = self.x[i + 1] - x;
        let right = x - self.x[i];
        let m0 = self.second_derivatives[i];
        let m1 = self.second_derivatives[i + 1];

        m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (self.y[i] / h - m0 * h / 6.0) * left
            + (self.y[i + 1] / h - m1 * h / 6.0) * right
    }
}

// ============================================================================
// XIC splines
// ============================================================================

fn check_step(name: &str, value: f64) -> XicResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(XicError::invalid(format!(
            "{} must be a positive finite value, got {}",
            name, value
        )));
    }
    Ok(())
}

pub trait XicSpline {
    type Curve: Interpolator;

    /// Spacing of the output grid
    fn spline_step(&self) -> f64;

    /// Number of zero-intensity points added on each side, and their spacing
    fn padding(&self) -> (usize, f64);

    fn fit(&self, x: &[f64], y: &[f64]) -> XicResult<Self::Curve>;

    /// Evaluate the fitted curve at `start + i * step` for every grid point up to `end`
    fn get_xic_spline_data(
        &self,
        x: &[f64],
        y: &[f64],
        start: f64,
        end: f64,
    ) -> XicResult<Vec<(f64, f64)>> {
        check_knots(x, y, MIN_SPLINE_POINTS)?;
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(XicError::invalid(format!(
                "invalid resampling range [{}, {}]",
                start, end
            )));
        }

        let curve = self.fit(x, y)?;
        let step = self.spline_step();
        let point_count = ((end - start) / step + GRID_EPSILON).floor() as usize + 1;

        Ok((0..point_count)
            .map(|i| {
                let xi = start + i as f64 * step;
                (xi, curve.evaluate(xi))
            })
            .collect())
    }

    /// Resample `xic` over its padded domain and store the curve in its xy data.
    ///
    /// With `cycle` the x axis is the zero-based scan index instead of the
    /// retention time.
    fn set_xic_spline_xy_data(&self, xic: &mut ExtractedIonChromatogram, cycle: bool) -> XicResult<()> {
        let peaks = xic.peaks();
        let x: Vec<f64> = if cycle {
            peaks.iter().map(|p| p.zero_based_scan_index as f64).collect()
        } else {
            peaks.iter().map(|p| p.retention_time).collect()
        };
        let y: Vec<f64> = peaks.iter().map(|p| p.intensity).collect();
        let (x, y) = merge_equal_knots(&x, &y);

        let (x, y) = pad_with_zeros(&x, &y, self.padding());
        let (start, end) = match (x.first(), x.last()) {
            (Some(&start), Some(&end)) => (start, end),
            _ => return Err(XicError::InsufficientData),
        };

        let xy_data = self.get_xic_spline_data(&x, &y, start, end)?;
        xic.set_xy_data(xy_data);
        Ok(())
    }
}

/// Add `count` zero-intensity points every `step` before the first and after
/// the last point. Points falling below zero are skipped.
fn pad_with_zeros(x: &[f64], y: &[f64], (count, step): (usize, f64)) -> (Vec<f64>, Vec<f64>) {
    let (Some(&first), Some(&last)) = (x.first(), x.last()) else {
        return (x.to_vec(), y.to_vec());
    };

    let leading: Vec<f64> = (1..=count)
        .rev()
        .map(|i| first - i as f64 * step)
        .filter(|&v| v >= 0.0)
        .collect();
    let trailing = (1..=count).map(|i| last + i as f64 * step);

    let mut padded_x = leading.clone();
    padded_x.extend_from_slice(x);
    padded_x.extend(trailing);

    let mut padded_y = vec![0.0; leading.len()];
    padded_y.extend_from_slice(y);
    padded_y.resize(padded_x.len(), 0.0);

    (padded_x, padded_y)
}

macro_rules! xic_spline {
    ($(#[$meta:meta])* $name:ident, $curve:ty) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            spline_step: f64,
            padding_points: usize,
            padding_step: f64,
        }

        impl $name {
            pub fn new(spline_step: f64) -> XicResult<Self> {
                Self::with_padding(spline_step, 0, spline_step)
            }

            pub fn with_padding(spline_step: f64, padding_points: usize, padding_step: f64) -> XicResult<Self> {
                check_step("spline step", spline_step)?;
                check_step("padding step", padding_step)?;
                Ok($name {
                    spline_step,
                    padding_points,
                    padding_step,
                })
            }
        }

        impl XicSpline for $name {
            type Curve = $curve;

            fn spline_step(&self) -> f64 {
                self.spline_step
            }

            fn padding(&self) -> (usize, f64) {
                (self.padding_points, self.padding_step)
            }

            fn fit(&self, x: &[f64], y: &[f64]) -> XicResult<Self::Curve> {
                <$curve>::new(x, y)
            }
        }
    };
}

xic_spline!(
    /// Piecewise linear resampling
    XicLinearSpline,
    LinearInterpolator
);

xic_spline!(
    /// Natural cubic spline resampling
    XicCubicSpline,
    NaturalCubicSpline
);
