use crate::CoreError;
use nalgebra::DVector;

/// Floating point type used throughout system
pub type Real = f64;

/// Absolute/relative pair for comparing two scalars.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Check every entry of a vector for finiteness.
pub fn ensure_finite_vec(v: &DVector<Real>, what: &'static str) -> Result<(), CoreError> {
    for x in v.iter() {
        ensure_finite(*x, what)?;
    }
    Ok(())
}

/// Absolute tolerance, either shared by all components or given per component.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AbsTol {
    Scalar(Real),
    PerComponent(Vec<Real>),
}

impl AbsTol {
    /// Absolute tolerance for component `i`.
    pub fn get(&self, i: usize) -> Real {
        match self {
            AbsTol::Scalar(a) => *a,
            AbsTol::PerComponent(v) => v[i],
        }
    }

    /// Expand into a dense vector of length `dim`.
    pub fn expand(&self, dim: usize) -> Result<DVector<Real>, CoreError> {
        match self {
            AbsTol::Scalar(a) => Ok(DVector::from_element(dim, *a)),
            AbsTol::PerComponent(v) => {
                if v.len() != dim {
                    return Err(CoreError::LengthMismatch {
                        what: "atol",
                        expected: dim,
                        got: v.len(),
                    });
                }
                Ok(DVector::from_column_slice(v))
            }
        }
    }

    fn values(&self) -> &[Real] {
        match self {
            AbsTol::Scalar(a) => std::slice::from_ref(a),
            AbsTol::PerComponent(v) => v,
        }
    }
}

/// Integration error tolerances (relative scalar + absolute per component).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorTolerances {
    pub rtol: Real,
    pub atol: AbsTol,
}

impl Default for ErrorTolerances {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: AbsTol::Scalar(1e-6),
        }
    }
}

impl ErrorTolerances {
    /// Validate against a state dimension.
    ///
    /// Both tolerances must be finite and non-negative, and at least one of
    /// `rtol` and every `atol` entry must be positive so the weights stay bounded.
    pub fn validate(&self, dim: usize) -> Result<(), CoreError> {
        ensure_finite(self.rtol, "rtol")?;
        if self.rtol < 0.0 {
            return Err(CoreError::InvalidArg {
                what: "rtol must be non-negative",
            });
        }
        for a in self.atol.values() {
            ensure_finite(*a, "atol")?;
            if *a < 0.0 {
                return Err(CoreError::InvalidArg {
                    what: "atol must be non-negative",
                });
            }
            if *a == 0.0 && self.rtol == 0.0 {
                return Err(CoreError::InvalidArg {
                    what: "rtol and atol cannot both be zero",
                });
            }
        }
        if let AbsTol::PerComponent(v) = &self.atol
            && v.len() != dim
        {
            return Err(CoreError::LengthMismatch {
                what: "atol",
                expected: dim,
                got: v.len(),
            });
        }
        Ok(())
    }

    /// Error weights `1 / (rtol*|y_i| + atol_i)`.
    pub fn weights(&self, y: &DVector<Real>) -> DVector<Real> {
        DVector::from_fn(y.len(), |i, _| {
            1.0 / (self.rtol * y[i].abs() + self.atol.get(i))
        })
    }
}

/// Weighted root-mean-square norm: `sqrt(mean((v_i * w_i)^2))`.
pub fn wrms_norm(v: &DVector<Real>, w: &DVector<Real>) -> Real {
    if v.is_empty() {
        return 0.0;
    }
    let sum: Real = v.iter().zip(w.iter()).map(|(a, b)| (a * b).powi(2)).sum();
    (sum / v.len() as Real).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        };
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn weights_follow_state_magnitude() {
        let tol = ErrorTolerances {
            rtol: 1e-3,
            atol: AbsTol::PerComponent(vec![1e-6, 1.0]),
        };
        let w = tol.weights(&DVector::from_vec(vec![1000.0, 0.0]));
        assert!((w[0] - 1.0 / (1.0 + 1e-6)).abs() < 1e-12);
        assert!((w[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_bad_atol_length() {
        let tol = ErrorTolerances {
            rtol: 1e-6,
            atol: AbsTol::PerComponent(vec![1e-6]),
        };
        assert!(tol.validate(1).is_ok());
        assert!(matches!(
            tol.validate(2),
            Err(CoreError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_negative_and_zero_pair() {
        let neg = ErrorTolerances {
            rtol: -1.0,
            atol: AbsTol::Scalar(1e-6),
        };
        assert!(neg.validate(1).is_err());

        let zero = ErrorTolerances {
            rtol: 0.0,
            atol: AbsTol::Scalar(0.0),
        };
        assert!(zero.validate(1).is_err());
    }

    #[test]
    fn wrms_of_empty_is_zero() {
        let v = DVector::<Real>::zeros(0);
        assert_eq!(wrms_norm(&v, &v), 0.0);
    }
}
