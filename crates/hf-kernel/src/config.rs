//! Kernel configuration handed over on every (re)initialization.

use crate::error::{KernelError, KernelResult};
use hf_core::ErrorTolerances;
use nalgebra::DVector;

/// Solver settings and mode configuration read by the kernel each step.
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Relative/absolute error tolerances
    pub tolerances: ErrorTolerances,
    /// Maximum BDF order requested by the caller
    pub maxord: usize,
    /// First step size after (re)initialization (None = heuristic)
    pub initstep: Option<f64>,
    /// Maximum step size
    pub maxh: f64,
    /// Use the system's analytic Jacobian when it provides one
    pub usejac: bool,
    /// Exclude algebraic components from the local error test
    pub suppress_alg: bool,
    /// 1.0 = differential, 0.0 = algebraic, one entry per state
    pub algvar: DVector<f64>,
    /// Disable the line search in the consistent initialization solve
    pub lsoff: bool,
    /// Residual norm below which an initialization solve has converged
    pub ic_tol: f64,
}

impl KernelConfig {
    /// Default configuration for a problem of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            tolerances: ErrorTolerances::default(),
            maxord: 5,
            initstep: None,
            maxh: f64::INFINITY,
            usejac: true,
            suppress_alg: false,
            algvar: DVector::from_element(dim, 1.0),
            lsoff: false,
            ic_tol: 1e-10,
        }
    }

    /// Check that the configuration fits a state of dimension `dim`.
    pub fn validate(&self, dim: usize) -> KernelResult<()> {
        self.tolerances.validate(dim)?;
        if self.algvar.len() != dim {
            return Err(KernelError::InvalidInput {
                what: format!("algvar length {} != dimension {}", self.algvar.len(), dim),
            });
        }
        if self.maxord == 0 {
            return Err(KernelError::InvalidInput {
                what: "maxord must be at least 1".to_string(),
            });
        }
        if let Some(h) = self.initstep
            && !(h.is_finite() && h > 0.0)
        {
            return Err(KernelError::InvalidInput {
                what: format!("initstep must be positive, got {h}"),
            });
        }
        if !(self.maxh > 0.0) {
            return Err(KernelError::InvalidInput {
                what: format!("maxh must be positive, got {}", self.maxh),
            });
        }
        Ok(())
    }

    /// Whether component `i` is algebraic.
    pub fn is_algebraic(&self, i: usize) -> bool {
        self.algvar[i] == 0.0
    }

    /// Error weights for the local error test (algebraic entries zeroed when suppressed).
    pub fn error_test_weights(&self, y: &DVector<f64>) -> DVector<f64> {
        let mut w = self.tolerances.weights(y);
        if self.suppress_alg {
            for i in 0..w.len() {
                if self.is_algebraic(i) {
                    w[i] = 0.0;
                }
            }
        }
        w
    }
}
