//! Simulation state and the initial conditions a reset restores.

use crate::mode::ModeState;
use nalgebra::DVector;

/// Current point of the simulation together with its mode.
///
/// Time is read-only for callbacks. `y`, `yd` and `mode` may be changed by
/// `handle_event`; the driver validates and repairs them before committing.
#[derive(Clone, Debug, PartialEq)]
pub struct SimState {
    t: f64,
    pub y: DVector<f64>,
    pub yd: DVector<f64>,
    pub mode: ModeState,
}

impl SimState {
    pub fn new(t: f64, y: DVector<f64>, yd: DVector<f64>, mode: ModeState) -> Self {
        Self { t, y, yd, mode }
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn dim(&self) -> usize {
        self.y.len()
    }

    /// Shorthand for `mode.switches`.
    pub fn switches(&self) -> &[bool] {
        &self.mode.switches
    }

    pub(crate) fn advance(&mut self, t: f64, y: DVector<f64>, yd: DVector<f64>) {
        self.t = t;
        self.y = y;
        self.yd = yd;
    }

    /// Same `(t, y, yd)` as a stored sample.
    pub(crate) fn matches_sample(&self, t: f64, y: &DVector<f64>, yd: &DVector<f64>) -> bool {
        self.t == t && &self.y == y && &self.yd == yd
    }
}

/// Starting point restored by `reset`.
#[derive(Clone, Debug, PartialEq)]
pub struct InitialConditions {
    pub t0: f64,
    pub y0: DVector<f64>,
    pub yd0: DVector<f64>,
    pub switches0: Vec<bool>,
}
