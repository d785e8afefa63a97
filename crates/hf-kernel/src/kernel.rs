//! Integration kernel contract.

use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::initialization::InitPolicy;
use crate::system::DaeSystem;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Result of one internal step.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Step accepted, the kernel now sits at `t`.
    Accepted { t: f64 },
    /// An indicator crossed zero; the kernel state was truncated to `t`.
    Root { t: f64, mask: Vec<bool> },
}

impl StepOutcome {
    /// Time the kernel reached.
    pub fn t(&self) -> f64 {
        match self {
            StepOutcome::Accepted { t } | StepOutcome::Root { t, .. } => *t,
        }
    }
}

/// Work counters accumulated by a kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelCounters {
    pub steps: usize,
    pub residual_evals: usize,
    pub jacobian_evals: usize,
    pub error_test_failures: usize,
    pub nonlinear_iterations: usize,
    pub nonlinear_conv_failures: usize,
}

/// Numerical integrator driven by the simulation loop.
///
/// The kernel owns its step history. Anything the driver changes about the
/// system (switches, state, tolerances) only reaches the kernel through
/// [`IntegrationKernel::reinitialize`], which discards that history.
pub trait IntegrationKernel {
    /// Restart from `(t, y, yd)` with the given configuration.
    fn reinitialize(
        &mut self,
        sys: &dyn DaeSystem,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        config: &KernelConfig,
    ) -> KernelResult<()>;

    /// Take one internal step toward `tstop` without passing it.
    fn step_to(&mut self, sys: &dyn DaeSystem, tstop: f64) -> KernelResult<StepOutcome>;

    /// Solve for a consistent `(y, yd)` at `t` under `policy`.
    fn compute_consistent(
        &mut self,
        sys: &dyn DaeSystem,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        policy: InitPolicy,
        config: &KernelConfig,
    ) -> KernelResult<(DVector<f64>, DVector<f64>)>;

    /// State (`k = 0`) or derivative (`k = 1`) inside the last accepted step.
    fn dense_output(&self, t: f64, k: usize) -> KernelResult<DVector<f64>>;

    /// Span `[t_start, t_end]` of the last accepted step, if any.
    fn last_step_span(&self) -> Option<(f64, f64)>;

    fn is_initialized(&self) -> bool;

    fn t(&self) -> f64;

    fn y(&self) -> &DVector<f64>;

    fn yd(&self) -> &DVector<f64>;

    fn counters(&self) -> KernelCounters;

    fn reset_counters(&mut self);
}
