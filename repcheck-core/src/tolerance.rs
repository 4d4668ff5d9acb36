//! Numeric tolerance for floating-point comparison.

use crate::error::VerifyError;
use serde::{Deserialize, Serialize};

/// Combined absolute/relative tolerance.
///
/// Two values `a`, `b` agree when `a == b`, when both are NaN and
/// `equal_nan` is set, or when `|a - b| <= absolute + relative * max(|a|, |b|)`.
/// The check is symmetric in `a` and `b`. The default is bit-exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
    pub equal_nan: bool,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            absolute: 0.0,
            relative: 0.0,
            equal_nan: true,
        }
    }
}

impl Tolerance {
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn absolute(absolute: f64) -> Self {
        Self {
            absolute,
            ..Self::default()
        }
    }

    pub fn is_exact(&self) -> bool {
        self.absolute == 0.0 && self.relative == 0.0
    }

    pub fn validate(&self) -> Result<(), VerifyError> {
        for (name, value) in [("absolute", self.absolute), ("relative", self.relative)] {
            if !value.is_finite() || value < 0.0 {
                return Err(VerifyError::config(format!(
                    "tolerance.{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }

    /// Whether `a` and `b` agree under this tolerance.
    pub fn within(&self, a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        if a.is_nan() || b.is_nan() {
            return self.equal_nan && a.is_nan() && b.is_nan();
        }
        // Infinities that aren't equal never agree.
        if a.is_infinite() || b.is_infinite() {
            return false;
        }
        let bound = self.absolute + self.relative * a.abs().max(b.abs());
        (a - b).abs() <= bound
    }

    /// Magnitude of the difference between `a` and `b`.
    ///
    /// Zero for equal values and for NaN pairs when `equal_nan` is set;
    /// infinite whenever exactly one side is NaN.
    pub fn distance(&self, a: f64, b: f64) -> f64 {
        if a == b {
            return 0.0;
        }
        match (a.is_nan(), b.is_nan()) {
            (true, true) if self.equal_nan => 0.0,
            (false, false) => (a - b).abs(),
            _ => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_exact() {
        let tol = Tolerance::default();
        assert!(tol.is_exact());
        assert!(tol.within(1.0, 1.0));
        assert!(!tol.within(1.0, f64::from_bits(1.0f64.to_bits() + 1)));
    }

    #[test]
    fn test_absolute_bound() {
        let tol = Tolerance::absolute(1e-3);
        assert!(tol.within(2.0, 2.0001));
        assert!(!Tolerance::absolute(1e-6).within(2.0, 2.0001));
    }

    #[test]
    fn test_relative_bound_is_symmetric() {
        let tol = Tolerance {
            absolute: 0.0,
            relative: 0.01,
            equal_nan: true,
        };
        // 1% of max(|a|, |b|) = 1.01 covers the gap from either side.
        assert!(tol.within(100.0, 101.0));
        assert!(tol.within(101.0, 100.0));
        assert!(!tol.within(100.0, 102.0));
        assert!(!tol.within(102.0, 100.0));
    }

    #[test]
    fn test_signed_zero_equal() {
        assert!(Tolerance::exact().within(0.0, -0.0));
        assert_eq!(Tolerance::exact().distance(0.0, -0.0), 0.0);
    }

    #[test]
    fn test_nan_handling() {
        let tol = Tolerance::exact();
        assert!(tol.within(f64::NAN, f64::NAN));
        assert_eq!(tol.distance(f64::NAN, f64::NAN), 0.0);
        assert!(!tol.within(f64::NAN, 1.0));
        assert_eq!(tol.distance(1.0, f64::NAN), f64::INFINITY);

        let strict = Tolerance {
            equal_nan: false,
            ..Tolerance::exact()
        };
        assert!(!strict.within(f64::NAN, f64::NAN));
        assert_eq!(strict.distance(f64::NAN, f64::NAN), f64::INFINITY);
    }

    #[test]
    fn test_infinities() {
        let loose = Tolerance::absolute(1e9);
        assert!(loose.within(f64::INFINITY, f64::INFINITY));
        assert!(!loose.within(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!loose.within(f64::INFINITY, 1.0));
        assert_eq!(loose.distance(f64::INFINITY, 1.0), f64::INFINITY);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Tolerance::absolute(-1.0).validate().is_err());
        assert!(Tolerance::absolute(f64::NAN).validate().is_err());
        assert!(
            Tolerance {
                relative: f64::INFINITY,
                ..Tolerance::default()
            }
            .validate()
            .is_err()
        );
        assert!(Tolerance::absolute(1e-6).validate().is_ok());
    }
}
