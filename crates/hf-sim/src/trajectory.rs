//! Recorded samples and run statistics.

use hf_kernel::KernelCounters;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Append-only sequence of `(t, y, yd)` samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trajectory {
    t: Vec<f64>,
    y: Vec<DVector<f64>>,
    yd: Vec<DVector<f64>>,
}

impl Trajectory {
    /// Empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Times must be non-decreasing.
    pub(crate) fn push(&mut self, t: f64, y: DVector<f64>, yd: DVector<f64>) {
        debug_assert!(self.t.last().is_none_or(|&last| t >= last));
        self.t.push(t);
        self.y.push(y);
        self.yd.push(yd);
    }

    /// Drop everything after the first sample.
    pub(crate) fn truncate_to_initial(&mut self) {
        self.t.truncate(1);
        self.y.truncate(1);
        self.yd.truncate(1);
    }

    /// Overwrite the last sample in place.
    pub(crate) fn replace_last(&mut self, t: f64, y: DVector<f64>, yd: DVector<f64>) {
        match self.t.len().checked_sub(1) {
            Some(i) => {
                self.t[i] = t;
                self.y[i] = y;
                self.yd[i] = yd;
            }
            None => self.push(t, y, yd),
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// No samples recorded yet.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Sample times.
    pub fn t(&self) -> &[f64] {
        &self.t
    }

    /// Sample states.
    pub fn y(&self) -> &[DVector<f64>] {
        &self.y
    }

    /// Sample derivatives.
    pub fn yd(&self) -> &[DVector<f64>] {
        &self.yd
    }

    /// Last stored sample.
    pub fn last(&self) -> Option<(f64, &DVector<f64>, &DVector<f64>)> {
        let i = self.t.len().checked_sub(1)?;
        Some((self.t[i], &self.y[i], &self.yd[i]))
    }

    /// Iterate over `(t, y, yd)`.
    pub fn samples(&self) -> impl Iterator<Item = (f64, &DVector<f64>, &DVector<f64>)> {
        self.t
            .iter()
            .zip(self.y.iter())
            .zip(self.yd.iter())
            .map(|((&t, y), yd)| (t, y, yd))
    }
}

/// Run statistics.
///
/// The first four counters are the ones reported by [`Stats::ordered`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub steps: usize,
    pub residual_evals: usize,
    pub jacobian_evals: usize,
    pub discontinuities: usize,
    pub state_events: usize,
    pub time_events: usize,
    pub step_events: usize,
    pub error_test_failures: usize,
    pub nonlinear_iterations: usize,
    pub nonlinear_conv_failures: usize,
}

impl Stats {
    /// Steps, residual evaluations, Jacobian evaluations, discontinuities.
    pub fn ordered(&self) -> [usize; 4] {
        [
            self.steps,
            self.residual_evals,
            self.jacobian_evals,
            self.discontinuities,
        ]
    }

    /// Combine driver-side event counts with the kernel's work counters.
    pub(crate) fn with_kernel(mut self, counters: KernelCounters) -> Self {
        self.steps = counters.steps;
        self.residual_evals = counters.residual_evals;
        self.jacobian_evals = counters.jacobian_evals;
        self.error_test_failures = counters.error_test_failures;
        self.nonlinear_iterations = counters.nonlinear_iterations;
        self.nonlinear_conv_failures = counters.nonlinear_conv_failures;
        self
    }
}
