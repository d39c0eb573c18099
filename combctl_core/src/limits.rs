//! Range checks for every setpoint path.
//!
//! `validate` rejects direct operator input; `clamp` saturates computed values
//! such as cumulative adjusts and filtered outputs.

use crate::error::{BuildError, CombError};

/// `validate` as a `Result` carrying the rejected value and bounds.
pub fn check(value: f64, min: f64, max: f64) -> Result<f64, CombError> {
    if validate(value, min, max) {
        Ok(value)
    } else {
        Err(CombError::ValidationRejected { value, min, max })
    }
}

/// `true` iff `min <= value <= max`. NaN is never valid.
#[inline]
pub fn validate(value: f64, min: f64, max: f64) -> bool {
    value >= min && value <= max
}

/// Saturate `value` to the nearer bound. NaN passes through unchanged.
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// A checked `[min, max]` pair. `min == max` is allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    min: f64,
    max: f64,
}

impl Limits {
    pub fn new(min: f64, max: f64) -> Result<Self, BuildError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(BuildError::InvalidLimits { min, max });
        }
        Ok(Self { min, max })
    }

    /// Symmetric limits `[-bound, bound]`.
    pub fn symmetric(bound: f64) -> Result<Self, BuildError> {
        Self::new(-bound, bound)
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        validate(value, self.min, self.max)
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        clamp(value, self.min, self.max)
    }

    /// Accept `value` or report it as rejected.
    pub fn check(&self, value: f64) -> Result<f64, CombError> {
        check(value, self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(5.0, 0.0, 10.0, true)]
    #[case(0.0, 0.0, 10.0, true)]
    #[case(10.0, 0.0, 10.0, true)]
    #[case(10.000_001, 0.0, 10.0, false)]
    #[case(-1.0, 0.0, 10.0, false)]
    #[case(3.0, 3.0, 3.0, true)]
    #[case(f64::NAN, 0.0, 10.0, false)]
    fn validate_cases(#[case] v: f64, #[case] lo: f64, #[case] hi: f64, #[case] ok: bool) {
        assert_eq!(validate(v, lo, hi), ok);
    }

    #[rstest]
    #[case(12.0, 10.0)]
    #[case(-4.0, 0.0)]
    #[case(7.5, 7.5)]
    fn clamp_saturates(#[case] v: f64, #[case] expected: f64) {
        assert_eq!(clamp(v, 0.0, 10.0), expected);
    }

    #[test]
    fn inverted_limits_fail_at_construction() {
        let err = Limits::new(2.0, 1.0).unwrap_err();
        assert_eq!(err, BuildError::InvalidLimits { min: 2.0, max: 1.0 });
    }

    #[test]
    fn degenerate_limits_are_legal() {
        let l = Limits::new(4.0, 4.0).unwrap();
        assert!(l.contains(4.0));
        assert_eq!(l.clamp(9.0), 4.0);
    }

    #[test]
    fn check_reports_bounds() {
        let l = Limits::new(9e6, 11e6).unwrap();
        match l.check(12e6) {
            Err(CombError::ValidationRejected { value, min, max }) => {
                assert_eq!((value, min, max), (12e6, 9e6, 11e6));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(l.check(10e6), Ok(10e6));
    }
}
