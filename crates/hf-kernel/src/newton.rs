//! Newton solver with optional backtracking line search.

use crate::error::{KernelError, KernelResult};
use nalgebra::{DMatrix, DVector};

/// Newton solver configuration.
#[derive(Clone, Debug)]
pub struct NewtonConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Absolute tolerance for residual norm
    pub abs_tol: f64,
    /// Relative tolerance for residual norm (against the initial residual)
    pub rel_tol: f64,
    /// Apply backtracking line search
    pub line_search: bool,
    /// Line search backtracking factor
    pub line_search_beta: f64,
    /// Maximum line search iterations
    pub max_line_search_iters: usize,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-10,
            rel_tol: 1e-12,
            line_search: true,
            line_search_beta: 0.5,
            max_line_search_iters: 20,
        }
    }
}

/// Newton iteration result.
#[derive(Debug)]
pub struct NewtonResult {
    /// Solution vector
    pub x: DVector<f64>,
    /// Final residual norm
    pub residual_norm: f64,
    /// Number of iterations
    pub iterations: usize,
}

/// Solve `residual_fn(x) = 0` starting from `x0`.
pub fn newton_solve<F, J>(
    x0: DVector<f64>,
    mut residual_fn: F,
    mut jacobian_fn: J,
    config: &NewtonConfig,
) -> KernelResult<NewtonResult>
where
    F: FnMut(&DVector<f64>) -> KernelResult<DVector<f64>>,
    J: FnMut(&DVector<f64>) -> KernelResult<DMatrix<f64>>,
{
    let mut x = x0;
    let mut r = residual_fn(&x)?;
    let mut r_norm = r.norm();
    let r0_norm = r_norm;

    for iter in 0..config.max_iterations {
        if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
            return Ok(NewtonResult {
                x,
                residual_norm: r_norm,
                iterations: iter,
            });
        }

        let jac = jacobian_fn(&x)?;

        // Solve J * dx = -r
        let dx = jac
            .lu()
            .solve(&(-&r))
            .ok_or_else(|| KernelError::Numeric {
                what: "Jacobian solve failed (singular matrix)".to_string(),
            })?;

        let mut alpha = 1.0;
        let mut x_new = &x + &dx;
        let mut r_new = residual_fn(&x_new)?;
        let mut r_new_norm = r_new.norm();

        if config.line_search {
            for _ in 0..config.max_line_search_iters {
                if r_new_norm.is_finite() && r_new_norm < r_norm {
                    break;
                }
                alpha *= config.line_search_beta;
                x_new = &x + alpha * &dx;
                r_new = residual_fn(&x_new)?;
                r_new_norm = r_new.norm();
            }
        }

        x = x_new;
        r = r_new;
        r_norm = r_new_norm;

        if !r_norm.is_finite() {
            return Err(KernelError::ConvergenceFailed {
                what: format!("Non-finite residual at iteration {}", iter),
            });
        }
        if alpha < 1e-10 {
            return Err(KernelError::ConvergenceFailed {
                what: format!("Line search stagnated at iteration {}", iter),
            });
        }
    }

    if r_norm < config.abs_tol || r_norm < config.rel_tol * r0_norm {
        return Ok(NewtonResult {
            x,
            residual_norm: r_norm,
            iterations: config.max_iterations,
        });
    }

    Err(KernelError::ConvergenceFailed {
        what: format!(
            "Maximum iterations {} reached, residual = {}",
            config.max_iterations, r_norm
        ),
    })
}
