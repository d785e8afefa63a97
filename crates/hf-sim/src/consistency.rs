//! Consistency initializer: repair `(y, yd)` so the active residual vanishes.

use crate::binding::Bound;
use crate::error::{SimError, SimResult};
use crate::options::SolverOptions;
use crate::problem::{Capabilities, ImplicitProblem};
use crate::state::SimState;
use hf_kernel::{InitPolicy, IntegrationKernel, KernelConfig};
use tracing::debug;

/// Residual norm below which a point counts as consistent.
pub const CONSISTENCY_TOL: f64 = 1e-10;

/// Kernel configuration for a state under the given options.
pub fn kernel_config(options: &SolverOptions, state: &SimState) -> KernelConfig {
    let mut config = KernelConfig::new(state.dim());
    config.tolerances = options.tolerances();
    config.maxord = options.maxord;
    config.initstep = options.initstep;
    config.maxh = options.maxh.unwrap_or(f64::INFINITY);
    config.usejac = options.usejac;
    config.lsoff = options.lsoff;
    config.suppress_alg = state.mode.suppress_alg;
    config.algvar = state.mode.algvar().clone();
    config.ic_tol = CONSISTENCY_TOL;
    config
}

/// Max-norm of the active residual at `state`.
pub fn residual_norm<P: ImplicitProblem>(problem: &P, state: &SimState) -> SimResult<f64> {
    let r = problem.residual(state.t(), &state.y, &state.yd, state.switches())?;
    if r.len() != state.dim() {
        return Err(SimError::config(format!(
            "residual has length {}, expected {}",
            r.len(),
            state.dim()
        )));
    }
    Ok(r.amax())
}

/// Replace `state.y`/`state.yd` with a consistent point under `policy`.
///
/// On failure `state` is left as it was.
pub fn make_consistent<P, K>(
    problem: &P,
    kernel: &mut K,
    state: &mut SimState,
    caps: Capabilities,
    options: &SolverOptions,
    policy: InitPolicy,
) -> SimResult<()>
where
    P: ImplicitProblem,
    K: IntegrationKernel,
{
    let config = kernel_config(options, state);
    let sys = Bound::new(problem, state.switches(), caps, state.dim());
    let (y, yd) = kernel
        .compute_consistent(&sys, state.t(), &state.y, &state.yd, policy, &config)
        .map_err(|e| SimError::initialization(state.t(), e))?;
    debug!(t = state.t(), policy = policy.as_str(), "state made consistent");
    state.y = y;
    state.yd = yd;
    Ok(())
}

/// Repair `state` only if its residual exceeds [`CONSISTENCY_TOL`].
///
/// Returns whether a solve was run.
pub fn ensure_consistent<P, K>(
    problem: &P,
    kernel: &mut K,
    state: &mut SimState,
    caps: Capabilities,
    options: &SolverOptions,
    policy: InitPolicy,
) -> SimResult<bool>
where
    P: ImplicitProblem,
    K: IntegrationKernel,
{
    let norm = residual_norm(problem, state)?;
    if norm <= CONSISTENCY_TOL {
        return Ok(false);
    }
    debug!(t = state.t(), residual = norm, "inconsistent point");
    make_consistent(problem, kernel, state, caps, options, policy)?;
    Ok(true)
}
