//! The view of a bound problem that the kernel integrates.

use crate::error::{KernelError, KernelResult, SystemError};
use nalgebra::{DMatrix, DVector};

/// Implicit DAE system `F(t, y, y') = 0` with optional indicator functions.
///
/// The kernel only ever sees the problem through this trait. Any mode
/// selection (switches) is already applied by whoever implements it.
pub trait DaeSystem {
    /// Number of state variables.
    fn dim(&self) -> usize;

    /// Residual `F(t, y, y')`, one entry per state variable.
    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError>;

    /// Iteration matrix `dF/dy + c * dF/dy'`.
    ///
    /// `Ok(None)` means no analytic Jacobian is available and the kernel
    /// falls back to finite differences.
    fn jacobian(
        &self,
        _c: f64,
        _t: f64,
        _y: &DVector<f64>,
        _yd: &DVector<f64>,
    ) -> Result<Option<DMatrix<f64>>, SystemError> {
        Ok(None)
    }

    /// Number of indicator (root) functions.
    fn num_indicators(&self) -> usize {
        0
    }

    /// Indicator values; a sign change between accepted steps is a root.
    fn indicators(
        &self,
        _t: f64,
        _y: &DVector<f64>,
        _yd: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        Ok(DVector::zeros(0))
    }
}

/// Evaluate the residual and check its length.
pub fn eval_residual(
    sys: &dyn DaeSystem,
    t: f64,
    y: &DVector<f64>,
    yd: &DVector<f64>,
) -> KernelResult<DVector<f64>> {
    let r = sys.residual(t, y, yd).map_err(KernelError::system)?;
    if r.len() != sys.dim() {
        return Err(KernelError::InvalidInput {
            what: format!("residual has length {}, expected {}", r.len(), sys.dim()),
        });
    }
    Ok(r)
}

/// Evaluate the indicators and check their length.
pub fn eval_indicators(
    sys: &dyn DaeSystem,
    t: f64,
    y: &DVector<f64>,
    yd: &DVector<f64>,
) -> KernelResult<DVector<f64>> {
    let g = sys.indicators(t, y, yd).map_err(KernelError::system)?;
    if g.len() != sys.num_indicators() {
        return Err(KernelError::InvalidInput {
            what: format!(
                "indicator vector has length {}, expected {}",
                g.len(),
                sys.num_indicators()
            ),
        });
    }
    Ok(g)
}
