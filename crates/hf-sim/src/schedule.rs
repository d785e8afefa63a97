//! Time-event scheduling.

use crate::error::{SimError, SimResult};
use crate::problem::{Capabilities, Problem};
use crate::state::SimState;
use tracing::warn;

/// Relative tolerance under which two event times are the same instant.
pub const SAME_INSTANT_RTOL: f64 = 1e-12;

/// Whether `a` and `b` denote the same instant.
pub fn same_instant(a: f64, b: f64) -> bool {
    (a - b).abs() <= SAME_INSTANT_RTOL * a.abs().max(b.abs()).max(1.0)
}

/// Outcome of polling the problem's time-event function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scheduled {
    /// No upcoming time event.
    Nothing,
    /// Event at the current instant, to be resolved before stepping.
    Due(f64),
    /// Event strictly ahead of the current time.
    Ahead(f64),
}

/// Poll the problem for its next time event relative to `state.t()`.
pub fn poll<P: Problem>(problem: &P, state: &SimState, caps: Capabilities) -> SimResult<Scheduled> {
    if !caps.time_events {
        return Ok(Scheduled::Nothing);
    }
    let Some(tau) = problem.time_event(state)? else {
        return Ok(Scheduled::Nothing);
    };
    if !tau.is_finite() {
        return Err(SimError::config(format!("time event {tau} is not finite")));
    }
    let t = state.t();
    if same_instant(tau, t) {
        Ok(Scheduled::Due(tau))
    } else if tau < t {
        warn!(t, tau, "time event lies in the past; ignored");
        Ok(Scheduled::Nothing)
    } else {
        Ok(Scheduled::Ahead(tau))
    }
}

/// Kernel target for the next segment and the time event it ends on, if any.
pub fn segment_target(t_end: f64, scheduled: Scheduled) -> (f64, Option<f64>) {
    match scheduled {
        Scheduled::Ahead(tau) if tau <= t_end => (tau, Some(tau)),
        _ => (t_end, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ModeState;
    use crate::problem::CallbackResult;
    use nalgebra::DVector;

    struct At(Option<f64>);

    impl Problem for At {
        fn time_event(&self, _state: &SimState) -> CallbackResult<Option<f64>> {
            Ok(self.0)
        }
    }

    fn state_at(t: f64) -> SimState {
        SimState::new(
            t,
            DVector::zeros(1),
            DVector::zeros(1),
            ModeState::new(1, Vec::new()),
        )
    }

    fn caps() -> Capabilities {
        Capabilities {
            time_events: true,
            ..Capabilities::default()
        }
    }

    #[test]
    fn classification() {
        let s = state_at(2.0);
        assert_eq!(poll(&At(None), &s, caps()).unwrap(), Scheduled::Nothing);
        assert_eq!(poll(&At(Some(3.0)), &s, caps()).unwrap(), Scheduled::Ahead(3.0));
        assert_eq!(poll(&At(Some(2.0)), &s, caps()).unwrap(), Scheduled::Due(2.0));
        assert_eq!(poll(&At(Some(1.0)), &s, caps()).unwrap(), Scheduled::Nothing);
    }

    #[test]
    fn without_capability_nothing_is_polled() {
        let s = state_at(0.0);
        let none = Capabilities::default();
        assert_eq!(poll(&At(Some(1.0)), &s, none).unwrap(), Scheduled::Nothing);
    }

    #[test]
    fn non_finite_time_is_rejected() {
        let s = state_at(0.0);
        assert!(poll(&At(Some(f64::NAN)), &s, caps()).is_err());
    }

    #[test]
    fn target_is_clamped_to_event() {
        assert_eq!(segment_target(5.0, Scheduled::Ahead(1.0)), (1.0, Some(1.0)));
        assert_eq!(segment_target(5.0, Scheduled::Ahead(7.0)), (5.0, None));
        assert_eq!(segment_target(5.0, Scheduled::Nothing), (5.0, None));
    }

    #[test]
    fn same_instant_scales_with_time() {
        assert!(same_instant(1e6, 1e6 + 1e-7));
        assert!(!same_instant(1.0, 1.0 + 1e-9));
    }
}
