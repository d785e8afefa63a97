//! Problem abstraction: mandatory residual/RHS, optional functions and hooks.

use crate::state::{InitialConditions, SimState};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::debug;

/// Error returned by a problem function or hook.
#[derive(Error, Debug)]
pub enum ProblemError {
    #[error("{what} is not specified")]
    NotSpecified { what: &'static str },

    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl ProblemError {
    /// Wrap any error raised inside a callback.
    pub fn callback(e: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        ProblemError::Callback(e.into())
    }
}

pub type CallbackResult<T> = Result<T, ProblemError>;

/// Optional functions a problem supplies, resolved once when it is bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Number of state event indicators (0 = none)
    pub state_events: usize,
    /// Problem schedules time events
    pub time_events: bool,
    /// Problem provides an analytic Jacobian
    pub jacobian: bool,
}

/// What triggered a resolution pass, handed to [`Problem::handle_event`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventInfo {
    /// One entry per indicator: `true` if it crossed zero
    pub state_events: Vec<bool>,
    /// A scheduled time event is due
    pub time_event: bool,
    /// `completed_step` asked for a resolution pass
    pub step_event: bool,
}

impl EventInfo {
    /// Whether any indicator crossed.
    pub fn has_state_event(&self) -> bool {
        self.state_events.iter().any(|&c| c)
    }
}

/// Hooks shared by implicit and explicit problems.
///
/// Every hook has a default. The defaults are no-ops that only log.
pub trait Problem {
    /// Name used in logs and run manifests.
    fn name(&self) -> &str {
        "---"
    }

    /// Which optional functions this problem supplies.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Next scheduled time event, or `None` when no further event is scheduled.
    fn time_event(&self, _state: &SimState) -> CallbackResult<Option<f64>> {
        Ok(None)
    }

    /// Called once before the first step and again after every reset.
    fn initiate(&mut self, _state: &mut SimState) -> CallbackResult<()> {
        debug!(problem = self.name(), "no initiate hook defined");
        Ok(())
    }

    /// May rewrite the initial conditions a reset restores.
    fn reset(&mut self, _initial: &mut InitialConditions) -> CallbackResult<()> {
        Ok(())
    }

    /// Resolve an event. May change switches, algvar, `y` and `yd`.
    fn handle_event(&mut self, state: &mut SimState, info: &EventInfo) -> CallbackResult<()> {
        debug!(
            problem = self.name(),
            t = state.t(),
            ?info,
            "no handle_event hook defined"
        );
        Ok(())
    }

    /// Called after every accepted kernel step. Returning `true` requests a
    /// resolution pass at the current time.
    fn completed_step(&mut self, _state: &SimState) -> CallbackResult<bool> {
        Ok(false)
    }

    /// Called for every recorded sample when post-processing is enabled.
    fn post_process(&mut self, _state: &SimState) -> CallbackResult<()> {
        Ok(())
    }

    /// Observes every sample before it is stored.
    fn handle_result(&mut self, _sample: &SimState) -> CallbackResult<()> {
        Ok(())
    }
}

/// Implicit problem `F(t, y, yd, switches) = 0`.
pub trait ImplicitProblem: Problem {
    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>>;

    /// Indicator functions; only called when `capabilities().state_events > 0`.
    fn state_events(
        &self,
        _t: f64,
        _y: &DVector<f64>,
        _yd: &DVector<f64>,
        _switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        Err(ProblemError::NotSpecified {
            what: "state_events",
        })
    }

    /// Combined Jacobian `dF/dy + c * dF/dyd`; only called when
    /// `capabilities().jacobian` is set.
    fn jacobian(
        &self,
        _c: f64,
        _t: f64,
        _y: &DVector<f64>,
        _yd: &DVector<f64>,
        _switches: &[bool],
    ) -> CallbackResult<DMatrix<f64>> {
        Err(ProblemError::NotSpecified { what: "jacobian" })
    }

    /// Derivative implied by `(t, y)` alone, for problems that have one.
    fn explicit_derivative(
        &self,
        _t: f64,
        _y: &DVector<f64>,
        _switches: &[bool],
    ) -> Option<CallbackResult<DVector<f64>>> {
        None
    }
}

/// Explicit problem `yd = f(t, y, switches)`.
pub trait ExplicitProblem: Problem {
    fn rhs(&self, t: f64, y: &DVector<f64>, switches: &[bool]) -> CallbackResult<DVector<f64>>;

    /// Indicator functions; only called when `capabilities().state_events > 0`.
    fn state_events(
        &self,
        _t: f64,
        _y: &DVector<f64>,
        _switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        Err(ProblemError::NotSpecified {
            what: "state_events",
        })
    }

    /// `df/dy`; only called when `capabilities().jacobian` is set.
    fn jacobian(
        &self,
        _t: f64,
        _y: &DVector<f64>,
        _switches: &[bool],
    ) -> CallbackResult<DMatrix<f64>> {
        Err(ProblemError::NotSpecified { what: "jacobian" })
    }
}
