//! A problem bound to the current switches, as seen by the kernel.

use crate::problem::{Capabilities, ImplicitProblem};
use hf_kernel::{DaeSystem, SystemError};
use nalgebra::{DMatrix, DVector};

/// Problem plus the switch vector in force for one kernel call.
///
/// Built fresh for every call so that the kernel always sees the switches as
/// they are after the latest event handler returned.
pub(crate) struct Bound<'a, P> {
    problem: &'a P,
    switches: &'a [bool],
    caps: Capabilities,
    dim: usize,
}

impl<'a, P: ImplicitProblem> Bound<'a, P> {
    pub(crate) fn new(problem: &'a P, switches: &'a [bool], caps: Capabilities, dim: usize) -> Self {
        Self {
            problem,
            switches,
            caps,
            dim,
        }
    }
}

impl<P: ImplicitProblem> DaeSystem for Bound<'_, P> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        Ok(self.problem.residual(t, y, yd, self.switches)?)
    }

    fn jacobian(
        &self,
        c: f64,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
    ) -> Result<Option<DMatrix<f64>>, SystemError> {
        if !self.caps.jacobian {
            return Ok(None);
        }
        Ok(Some(self.problem.jacobian(c, t, y, yd, self.switches)?))
    }

    fn num_indicators(&self) -> usize {
        self.caps.state_events
    }

    fn indicators(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
    ) -> Result<DVector<f64>, SystemError> {
        if self.caps.state_events == 0 {
            return Ok(DVector::zeros(0));
        }
        Ok(self.problem.state_events(t, y, yd, self.switches)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{CallbackResult, Problem, ProblemError};

    struct Switched;

    impl Problem for Switched {
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                state_events: 1,
                ..Capabilities::default()
            }
        }
    }

    impl ImplicitProblem for Switched {
        fn residual(
            &self,
            _t: f64,
            y: &DVector<f64>,
            yd: &DVector<f64>,
            sw: &[bool],
        ) -> CallbackResult<DVector<f64>> {
            let rate = if sw[0] { 1.0 } else { -1.0 };
            Ok(DVector::from_element(1, yd[0] - rate * y[0]))
        }

        fn state_events(
            &self,
            _t: f64,
            y: &DVector<f64>,
            _yd: &DVector<f64>,
            _sw: &[bool],
        ) -> CallbackResult<DVector<f64>> {
            Ok(DVector::from_element(1, y[0] - 2.0))
        }
    }

    #[test]
    fn switches_select_branch() {
        let y = DVector::from_element(1, 1.0);
        let yd = DVector::zeros(1);
        let on = [true];
        let off = [false];
        let caps = Switched.capabilities();
        assert_eq!(Bound::new(&Switched, &on, caps, 1).residual(0.0, &y, &yd).unwrap()[0], -1.0);
        assert_eq!(Bound::new(&Switched, &off, caps, 1).residual(0.0, &y, &yd).unwrap()[0], 1.0);
        assert_eq!(Bound::new(&Switched, &on, caps, 1).num_indicators(), 1);
    }

    #[test]
    fn absent_jacobian_falls_back() {
        let caps = Switched.capabilities();
        let y = DVector::zeros(1);
        let jac = Bound::new(&Switched, &[true], caps, 1)
            .jacobian(1.0, 0.0, &y, &y)
            .unwrap();
        assert!(jac.is_none());
    }

    #[test]
    fn problem_errors_are_boxed() {
        let caps = Capabilities {
            jacobian: true,
            ..Capabilities::default()
        };
        let y = DVector::zeros(1);
        let err = Bound::new(&Switched, &[true], caps, 1)
            .jacobian(1.0, 0.0, &y, &y)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProblemError>(),
            Some(ProblemError::NotSpecified { what: "jacobian" })
        ));
    }
}
