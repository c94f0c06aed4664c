//! Mass tolerance windows
//!
//! A [`Tolerance`] turns a center mass into an inclusive `[min, max]` window,
//! either with a fixed width in Daltons or with a width proportional to the
//! center (parts per million).
//!
//! # Example
//!
//! ```
//! use mzxic::tolerance::Tolerance;
//!
//! let tol: Tolerance = "10 ppm".parse().unwrap();
//! let (min, max) = tol.get_range(500.0);
//! assert!((max - min - 0.01).abs() < 1e-9);
//! assert!(tol.within(500.004, 500.0));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{XicError, XicResult};

/// Convert ppm tolerance to absolute m/z tolerance
pub fn ppm_to_mz_tolerance(mz: f64, ppm: f64) -> f64 {
    mz * ppm / 1_000_000.0
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum ToleranceUnit {
    #[strum(serialize = "ppm")]
    Ppm,
    #[strum(serialize = "Da")]
    Absolute,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    Ppm(f64),
    Absolute(f64),
}

impl Tolerance {
    pub fn value(&self) -> f64 {
        match self {
            Tolerance::Ppm(v) | Tolerance::Absolute(v) => *v,
        }
    }

    pub fn unit(&self) -> ToleranceUnit {
        match self {
            Tolerance::Ppm(_) => ToleranceUnit::Ppm,
            Tolerance::Absolute(_) => ToleranceUnit::Absolute,
        }
    }

    /// Half width of the window around `center`, in mass units
    pub fn half_width(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => ppm_to_mz_tolerance(center, *ppm).abs(),
            Tolerance::Absolute(da) => *da,
        }
    }

    /// Inclusive `(min, max)` window around `center`
    pub fn get_range(&self, center: f64) -> (f64, f64) {
        let w = self.half_width(center);
        (center - w, center + w)
    }

    pub fn get_minimum_value(&self, center: f64) -> f64 {
        self.get_range(center).0
    }

    pub fn get_maximum_value(&self, center: f64) -> f64 {
        self.get_range(center).1
    }

    /// Check whether `experimental` falls inside the window centered on `theoretical`
    pub fn within(&self, experimental: f64, theoretical: f64) -> bool {
        experimental >= self.get_minimum_value(theoretical) && experimental <= self.get_maximum_value(theoretical)
    }

    /// Reject windows that cannot match anything
    pub fn validate(&self) -> XicResult<()> {
        let v = self.value();
        if !v.is_finite() || v <= 0.0 {
            return Err(XicError::invalid(format!(
                "tolerance must be a positive finite value, got {}",
                self
            )));
        }
        Ok(())
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Ppm(20.0)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value(), self.unit())
    }
}

impl FromStr for Tolerance {
    type Err = XicError;

    /// Parse strings such as `"20 ppm"`, `"0.01 Da"` or `"0.01da"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split_at = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| XicError::invalid(format!("missing tolerance unit in '{}'", s)))?;
        let (value, unit) = s.split_at(split_at);

        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| XicError::invalid(format!("invalid tolerance value in '{}'", s)))?;

        let tolerance = match unit.trim().to_ascii_lowercase().as_str() {
            "ppm" => Tolerance::Ppm(value),
            "da" | "absolute" => Tolerance::Absolute(value),
            other => {
                return Err(XicError::invalid(format!("unknown tolerance unit '{}'", other)));
            }
        };

        Ok(tolerance)
    }
}
