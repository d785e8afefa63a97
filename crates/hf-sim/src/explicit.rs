//! Adapter presenting an explicit problem `yd = f(t, y)` as the implicit
//! residual `F = yd - f(t, y)`.

use crate::problem::{
    Capabilities, CallbackResult, EventInfo, ExplicitProblem, ImplicitProblem, Problem,
};
use crate::state::{InitialConditions, SimState};
use nalgebra::{DMatrix, DVector};

/// Explicit problem wrapped for the implicit driver.
#[derive(Clone, Debug)]
pub struct Explicit<P>(pub P);

impl<P> Explicit<P> {
    pub fn inner(&self) -> &P {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.0
    }

    pub fn into_inner(self) -> P {
        self.0
    }
}

impl<P: ExplicitProblem> Problem for Explicit<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.0.capabilities()
    }

    fn time_event(&self, state: &SimState) -> CallbackResult<Option<f64>> {
        self.0.time_event(state)
    }

    fn initiate(&mut self, state: &mut SimState) -> CallbackResult<()> {
        self.0.initiate(state)
    }

    fn reset(&mut self, initial: &mut InitialConditions) -> CallbackResult<()> {
        self.0.reset(initial)
    }

    fn handle_event(&mut self, state: &mut SimState, info: &EventInfo) -> CallbackResult<()> {
        self.0.handle_event(state, info)
    }

    fn completed_step(&mut self, state: &SimState) -> CallbackResult<bool> {
        self.0.completed_step(state)
    }

    fn post_process(&mut self, state: &SimState) -> CallbackResult<()> {
        self.0.post_process(state)
    }

    fn handle_result(&mut self, sample: &SimState) -> CallbackResult<()> {
        self.0.handle_result(sample)
    }
}

impl<P: ExplicitProblem> ImplicitProblem for Explicit<P> {
    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        Ok(yd - self.0.rhs(t, y, switches)?)
    }

    fn state_events(
        &self,
        t: f64,
        y: &DVector<f64>,
        _yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        ExplicitProblem::state_events(&self.0, t, y, switches)
    }

    /// `c * I - df/dy`
    fn jacobian(
        &self,
        c: f64,
        t: f64,
        y: &DVector<f64>,
        _yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DMatrix<f64>> {
        let dfdy = ExplicitProblem::jacobian(&self.0, t, y, switches)?;
        Ok(DMatrix::identity(y.len(), y.len()) * c - dfdy)
    }

    fn explicit_derivative(
        &self,
        t: f64,
        y: &DVector<f64>,
        switches: &[bool],
    ) -> Option<CallbackResult<DVector<f64>>> {
        Some(self.0.rhs(t, y, switches))
    }
}
