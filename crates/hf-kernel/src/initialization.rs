//! Consistent initialization policies and the solve behind them.
//!
//! After a mode change the stored point generally no longer satisfies the
//! active residual. The policies differ in which unknowns are held:
//! - `StateConsistent`: hold `yd`, solve `F(t, y, yd) = 0` for `y`
//! - `DerivativeConsistent`: hold the differential `y`, solve for their `yd`
//!   together with the algebraic `y`

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::jacobian::{FD_EPSILON, check_square, finite_difference_jacobian};
use crate::kernel::KernelCounters;
use crate::newton::{NewtonConfig, newton_solve};
use crate::system::{DaeSystem, eval_residual};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tracing::debug;

/// Which half of `(y, yd)` a consistency solve may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Hold `yd` fixed and solve for `y`.
    StateConsistent,
    /// Hold the differential `y` fixed and solve for `yd` (and algebraic `y`).
    #[default]
    DerivativeConsistent,
}

impl InitPolicy {
    /// Name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            InitPolicy::StateConsistent => "state-consistent",
            InitPolicy::DerivativeConsistent => "derivative-consistent",
        }
    }

    /// Whether unknown `i` is a state entry (as opposed to a derivative entry).
    fn solves_state(&self, config: &KernelConfig, i: usize) -> bool {
        match self {
            InitPolicy::StateConsistent => true,
            InitPolicy::DerivativeConsistent => config.is_algebraic(i),
        }
    }

    /// Newton settings for the consistency solve.
    pub fn to_newton_config(&self, config: &KernelConfig) -> NewtonConfig {
        NewtonConfig {
            abs_tol: config.ic_tol,
            line_search: !config.lsoff,
            ..NewtonConfig::default()
        }
    }
}

/// Split the unknown vector `z` back into `(y, yd)`.
fn assemble(
    policy: InitPolicy,
    config: &KernelConfig,
    z: &DVector<f64>,
    y: &DVector<f64>,
    yd: &DVector<f64>,
) -> (DVector<f64>, DVector<f64>) {
    let mut y = y.clone();
    let mut yd = yd.clone();
    for i in 0..z.len() {
        if policy.solves_state(config, i) {
            y[i] = z[i];
        } else {
            yd[i] = z[i];
        }
    }
    (y, yd)
}

/// Compute a consistent `(y, yd)` at `t`.
///
/// With `usejac` and an analytic Jacobian the partials are recovered from
/// `J(0) = dF/dy` and `J(1) - J(0) = dF/dy'`. Otherwise the Jacobian with
/// respect to the unknowns is built by forward differences.
pub fn calc_consistent(
    sys: &dyn DaeSystem,
    t: f64,
    y: &DVector<f64>,
    yd: &DVector<f64>,
    policy: InitPolicy,
    config: &KernelConfig,
    counters: &mut KernelCounters,
) -> KernelResult<(DVector<f64>, DVector<f64>)> {
    let n = sys.dim();
    if y.len() != n || yd.len() != n {
        return Err(KernelError::InvalidInput {
            what: format!(
                "state lengths ({}, {}) do not match dimension {}",
                y.len(),
                yd.len(),
                n
            ),
        });
    }
    config.validate(n)?;

    let z0 = DVector::from_fn(n, |i, _| {
        if policy.solves_state(config, i) {
            y[i]
        } else {
            yd[i]
        }
    });

    let residual_evals = Cell::new(0usize);
    let jacobian_evals = Cell::new(0usize);

    let residual = |z: &DVector<f64>| -> KernelResult<DVector<f64>> {
        let (yy, yyd) = assemble(policy, config, z, y, yd);
        residual_evals.set(residual_evals.get() + 1);
        eval_residual(sys, t, &yy, &yyd)
    };

    let jacobian = |z: &DVector<f64>| -> KernelResult<DMatrix<f64>> {
        jacobian_evals.set(jacobian_evals.get() + 1);
        let (yy, yyd) = assemble(policy, config, z, y, yd);
        if config.usejac
            && let Some(j0) = sys.jacobian(0.0, t, &yy, &yyd).map_err(KernelError::system)?
        {
            let j1 = sys
                .jacobian(1.0, t, &yy, &yyd)
                .map_err(KernelError::system)?
                .ok_or_else(|| KernelError::InvalidInput {
                    what: "Jacobian availability changed between calls".to_string(),
                })?;
            check_square(&j0, n)?;
            check_square(&j1, n)?;
            let dfdyd = &j1 - &j0;
            let mut jac = DMatrix::zeros(n, n);
            for i in 0..n {
                if policy.solves_state(config, i) {
                    jac.set_column(i, &j0.column(i));
                } else {
                    jac.set_column(i, &dfdyd.column(i));
                }
            }
            return Ok(jac);
        }
        let (yy, yyd) = assemble(policy, config, z, y, yd);
        let fz = eval_residual(sys, t, &yy, &yyd)?;
        residual_evals.set(residual_evals.get() + 1 + n);
        finite_difference_jacobian(
            z,
            &fz,
            |zp| {
                let (yp, ydp) = assemble(policy, config, zp, y, yd);
                eval_residual(sys, t, &yp, &ydp)
            },
            FD_EPSILON,
        )
    };

    let result = newton_solve(z0, residual, jacobian, &policy.to_newton_config(config));

    counters.residual_evals += residual_evals.get();
    counters.jacobian_evals += jacobian_evals.get();

    let sol = match result {
        Ok(sol) => sol,
        Err(e) => {
            counters.nonlinear_conv_failures += 1;
            return Err(e);
        }
    };
    counters.nonlinear_iterations += sol.iterations;
    debug!(
        policy = policy.as_str(),
        t,
        iterations = sol.iterations,
        residual_norm = sol.residual_norm,
        "consistent point computed"
    );

    Ok(assemble(policy, config, &sol.x, y, yd))
}
