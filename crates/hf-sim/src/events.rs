//! Event resolution: classify a detection, run the handler and certify the
//! resulting point before the kernel restarts.

use crate::consistency::ensure_consistent;
use crate::error::{SimError, SimResult};
use crate::options::SolverOptions;
use crate::problem::{Capabilities, EventInfo, ImplicitProblem};
use crate::schedule::same_instant;
use crate::state::SimState;
use hf_core::ensure_finite_vec;
use hf_kernel::IntegrationKernel;
use tracing::{debug, warn};

/// Consecutive resolutions allowed at one instant before giving up.
pub const MAX_EVENT_ITERATIONS: usize = 10;

/// Classification of a resolution pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    State,
    Time,
    StateAndTime,
    Step,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::State => "state",
            EventKind::Time => "time",
            EventKind::StateAndTime => "state+time",
            EventKind::Step => "step",
        }
    }
}

/// One detection, alive for a single resolution pass.
#[derive(Clone, Debug, PartialEq)]
pub struct EventReport {
    pub t: f64,
    pub info: EventInfo,
}

impl EventReport {
    /// Combine what was observed at `t`. `None` if nothing triggered.
    pub fn new(
        t: f64,
        root_mask: Option<Vec<bool>>,
        num_state_events: usize,
        time_event: bool,
        step_event: bool,
    ) -> Option<Self> {
        let state_events = root_mask.unwrap_or_else(|| vec![false; num_state_events]);
        let info = EventInfo {
            state_events,
            time_event,
            step_event,
        };
        if !(info.has_state_event() || info.time_event || info.step_event) {
            return None;
        }
        Some(Self { t, info })
    }

    pub fn kind(&self) -> EventKind {
        match (self.info.has_state_event(), self.info.time_event) {
            (true, true) => EventKind::StateAndTime,
            (true, false) => EventKind::State,
            (false, true) => EventKind::Time,
            (false, false) => EventKind::Step,
        }
    }
}

/// Counts consecutive resolutions at the same instant.
#[derive(Clone, Debug, Default)]
pub struct LoopGuard {
    last: Option<f64>,
    count: usize,
}

impl LoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolution at `t`; fails once the limit is exceeded.
    pub fn register(&mut self, t: f64) -> SimResult<()> {
        match self.last {
            Some(last) if same_instant(last, t) => self.count += 1,
            _ => self.count = 1,
        }
        self.last = Some(t);
        if self.count > MAX_EVENT_ITERATIONS {
            warn!(t, limit = MAX_EVENT_ITERATIONS, "discontinuity loop");
            return Err(SimError::DiscontinuityLoop {
                t,
                limit: MAX_EVENT_ITERATIONS,
            });
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Result of running the handler on a working copy.
#[derive(Debug)]
pub struct Resolved {
    pub state: SimState,
    /// A consistency solve was needed after the handler.
    pub repaired: bool,
}

/// Run `handle_event` on a copy of `state`, validate the copy and make it
/// consistent under the (possibly new) mode. `state` itself is untouched.
///
/// The residual is always re-checked: the handler may have changed problem
/// data without touching the state.
pub fn resolve<P, K>(
    problem: &mut P,
    kernel: &mut K,
    state: &SimState,
    report: &EventReport,
    caps: Capabilities,
    options: &SolverOptions,
) -> SimResult<Resolved>
where
    P: ImplicitProblem,
    K: IntegrationKernel,
{
    debug!(t = report.t, kind = report.kind().as_str(), info = ?report.info, "resolving event");

    let mut work = state.clone();
    problem.handle_event(&mut work, &report.info)?;
    validate_handler_output(state, &work)?;

    let repaired = ensure_consistent(
        problem,
        kernel,
        &mut work,
        caps,
        options,
        options.event_init_policy,
    )?;
    Ok(Resolved {
        state: work,
        repaired,
    })
}

fn validate_handler_output(before: &SimState, after: &SimState) -> SimResult<()> {
    let dim = before.dim();
    if after.y.len() != dim || after.yd.len() != dim {
        return Err(SimError::config(format!(
            "event handler changed the state dimension from {dim} to ({}, {})",
            after.y.len(),
            after.yd.len()
        )));
    }
    if after.mode.switches.len() != before.mode.switches.len() {
        return Err(SimError::config(format!(
            "event handler resized switches from {} to {}",
            before.mode.switches.len(),
            after.mode.switches.len()
        )));
    }
    ensure_finite_vec(&after.y, "y")?;
    ensure_finite_vec(&after.yd, "yd")?;
    Ok(())
}
