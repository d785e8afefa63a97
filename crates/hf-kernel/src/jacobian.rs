//! Finite difference Jacobian computation.

use crate::error::{KernelError, KernelResult};
use nalgebra::{DMatrix, DVector};

/// Default relative perturbation for forward differences.
pub const FD_EPSILON: f64 = 1.490_116_119_384_765_6e-8; // sqrt(f64::EPSILON)

/// Compute Jacobian using forward finite differences.
///
/// For each column j, perturbs x[j] by `epsilon * max(|x[j]|, 1)` and computes
/// (f(x+e) - f(x))/dx. `f_x` is the already known value of `f(x)`.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f_x: &DVector<f64>,
    mut f: F,
    epsilon: f64,
) -> KernelResult<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> KernelResult<DVector<f64>>,
{
    let n = x.len();
    let m = f_x.len();

    let mut jac = DMatrix::zeros(m, n);

    for j in 0..n {
        let mut x_perturbed = x.clone();
        let dx = epsilon * x[j].abs().max(1.0);
        x_perturbed[j] += dx;
        // Actual increment after rounding
        let dx = x_perturbed[j] - x[j];

        let f_perturbed = f(&x_perturbed)?;
        let df = (f_perturbed - f_x) / dx;

        jac.set_column(j, &df);
    }

    Ok(jac)
}

/// Check that a Jacobian is `n x n`.
pub fn check_square(j: &DMatrix<f64>, n: usize) -> KernelResult<()> {
    if j.nrows() != n || j.ncols() != n {
        return Err(KernelError::InvalidInput {
            what: format!(
                "Jacobian is {}x{}, expected {}x{}",
                j.nrows(),
                j.ncols(),
                n,
                n
            ),
        });
    }
    Ok(())
}
