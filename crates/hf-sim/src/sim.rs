//! Simulation driver: the hybrid integration loop.

use crate::binding::Bound;
use crate::consistency::{ensure_consistent, kernel_config, make_consistent};
use crate::error::{SimError, SimResult};
use crate::events::{EventReport, LoopGuard, resolve};
use crate::explicit::Explicit;
use crate::mode::{ModeState, validate_algvar};
use crate::options::{SolverOptions, check_step, clamp_maxord};
use crate::problem::{Capabilities, ExplicitProblem, ImplicitProblem};
use crate::schedule::{Scheduled, poll, segment_target};
use crate::state::{InitialConditions, SimState};
use crate::trajectory::{Stats, Trajectory};
use hf_core::{AbsTol, ensure_finite, ensure_finite_vec};
use hf_kernel::{BdfKernel, InitPolicy, IntegrationKernel, StepOutcome};
use nalgebra::DVector;
use tracing::{debug, info, warn};

/// Builder for a [`Simulator`].
pub struct SimulatorBuilder<P, K = BdfKernel> {
    problem: P,
    kernel: K,
    t0: f64,
    y0: Option<DVector<f64>>,
    yd0: Option<DVector<f64>>,
    switches: Vec<bool>,
    algvar: Option<DVector<f64>>,
    suppress_alg: bool,
    options: SolverOptions,
}

impl<P: ImplicitProblem, K: IntegrationKernel> SimulatorBuilder<P, K> {
    /// Initial time (default 0).
    pub fn t0(mut self, t0: f64) -> Self {
        self.t0 = t0;
        self
    }

    /// Initial state (required).
    pub fn y0(mut self, y0: impl Into<Vec<f64>>) -> Self {
        self.y0 = Some(DVector::from_vec(y0.into()));
        self
    }

    /// Initial derivative. Defaults to the explicit derivative for explicit
    /// problems and to zero otherwise.
    pub fn yd0(mut self, yd0: impl Into<Vec<f64>>) -> Self {
        self.yd0 = Some(DVector::from_vec(yd0.into()));
        self
    }

    /// Initial switches. Their count is fixed from here on.
    pub fn switches(mut self, switches: impl Into<Vec<bool>>) -> Self {
        self.switches = switches.into();
        self
    }

    /// Mark components as differential (`1.0`) or algebraic (`0.0`).
    pub fn algvar(mut self, algvar: impl Into<Vec<f64>>) -> Self {
        self.algvar = Some(DVector::from_vec(algvar.into()));
        self
    }

    /// Exclude algebraic components from the error test.
    pub fn suppress_alg(mut self, suppress_alg: bool) -> Self {
        self.suppress_alg = suppress_alg;
        self
    }

    /// Solver options; defaults otherwise.
    pub fn options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a different integration kernel.
    pub fn kernel<K2: IntegrationKernel>(self, kernel: K2) -> SimulatorBuilder<P, K2> {
        SimulatorBuilder {
            problem: self.problem,
            kernel,
            t0: self.t0,
            y0: self.y0,
            yd0: self.yd0,
            switches: self.switches,
            algvar: self.algvar,
            suppress_alg: self.suppress_alg,
            options: self.options,
        }
    }

    /// Validate the configuration, run `initiate` and seed the trajectory.
    pub fn build(self) -> SimResult<Simulator<P, K>> {
        let SimulatorBuilder {
            mut problem,
            kernel,
            t0,
            y0,
            yd0,
            switches,
            algvar,
            suppress_alg,
            mut options,
        } = self;

        let y0 = y0.ok_or_else(|| SimError::config("y0 is required"))?;
        let dim = y0.len();
        if dim == 0 {
            return Err(SimError::config("y0 must not be empty"));
        }
        ensure_finite(t0, "t0")?;
        ensure_finite_vec(&y0, "y0")?;

        let yd0 = match yd0 {
            Some(yd0) => yd0,
            None => match problem.explicit_derivative(t0, &y0, &switches) {
                Some(result) => result?,
                None => DVector::zeros(dim),
            },
        };
        if yd0.len() != dim {
            return Err(SimError::config(format!(
                "yd0 has length {}, expected {}",
                yd0.len(),
                dim
            )));
        }
        ensure_finite_vec(&yd0, "yd0")?;

        options.maxord = clamp_maxord(options.maxord);
        options.validate(dim)?;

        let mut mode = ModeState::new(dim, switches.clone());
        if let Some(algvar) = algvar {
            validate_algvar(&algvar, dim)?;
            mode.set_algvar(algvar)?;
        }
        mode.suppress_alg = suppress_alg;

        let caps = problem.capabilities();
        let initial = InitialConditions {
            t0,
            y0: y0.clone(),
            yd0: yd0.clone(),
            switches0: switches,
        };
        let mut state = SimState::new(t0, y0, yd0, mode);
        problem.initiate(&mut state)?;

        let mut trajectory = Trajectory::new();
        trajectory.push(state.t(), state.y.clone(), state.yd.clone());

        info!(problem = problem.name(), dim, ?caps, "simulator built");
        Ok(Simulator {
            problem,
            kernel,
            caps,
            dim,
            initial,
            state,
            options,
            trajectory,
            stats: Stats::default(),
            initial_checked: false,
            has_step: false,
        })
    }
}

/// Hybrid simulation driver.
///
/// Owns the problem, the kernel, the current state and the trajectory. The
/// kernel only ever sees the problem bound to the switches in force at the
/// time of the call.
pub struct Simulator<P, K = BdfKernel> {
    problem: P,
    kernel: K,
    caps: Capabilities,
    dim: usize,
    initial: InitialConditions,
    state: SimState,
    options: SolverOptions,
    trajectory: Trajectory,
    stats: Stats,
    initial_checked: bool,
    has_step: bool,
}

impl<P: ImplicitProblem> Simulator<P, BdfKernel> {
    /// Start building a simulator for an implicit problem.
    pub fn implicit(problem: P) -> SimulatorBuilder<P, BdfKernel> {
        SimulatorBuilder {
            problem,
            kernel: BdfKernel::new(),
            t0: 0.0,
            y0: None,
            yd0: None,
            switches: Vec::new(),
            algvar: None,
            suppress_alg: false,
            options: SolverOptions::default(),
        }
    }
}

impl<E: ExplicitProblem> Simulator<Explicit<E>, BdfKernel> {
    /// Start building a simulator for an explicit problem.
    pub fn explicit(problem: E) -> SimulatorBuilder<Explicit<E>, BdfKernel> {
        Simulator::implicit(Explicit(problem))
    }
}

impl<P: ImplicitProblem, K: IntegrationKernel> Simulator<P, K> {
    /// Integrate from the current time to `t_end`.
    ///
    /// With `ncp == 0` every accepted kernel step is recorded. Otherwise the
    /// interval is split into `ncp` equal parts and the boundaries are
    /// recorded by interpolation. Events are resolved at kernel granularity
    /// either way. On error the driver keeps everything recorded so far.
    pub fn simulate(&mut self, t_end: f64, ncp: usize) -> SimResult<()> {
        let t_start = self.state.t();
        if !t_end.is_finite() || !(t_end > t_start) {
            return Err(SimError::TimeOrdering {
                t_cur: t_start,
                t_end,
            });
        }

        self.bind()?;
        self.record_start()?;

        let grid = communication_points(t_start, t_end, ncp);
        let mut next_cp = 0;
        let mut steps = 0;
        let mut guard = LoopGuard::new();

        while self.state.t() < t_end {
            let scheduled = poll(&self.problem, &self.state, self.caps)?;
            if let Scheduled::Due(_) = scheduled {
                let t = self.state.t();
                let report = EventReport::new(t, None, self.caps.state_events, true, false);
                if let Some(report) = report {
                    self.resolve_event(report, &mut guard)?;
                }
                continue;
            }
            let (target, time_event_at) = segment_target(t_end, scheduled);

            if steps >= self.options.maxsteps {
                warn!(
                    t = self.state.t(),
                    maxsteps = self.options.maxsteps,
                    "step budget exhausted"
                );
                return Err(SimError::TooManySteps {
                    t: self.state.t(),
                    maxsteps: self.options.maxsteps,
                });
            }

            let outcome = {
                let sys = Bound::new(&self.problem, self.state.switches(), self.caps, self.dim);
                self.kernel.step_to(&sys, target)?
            };
            steps += 1;
            self.has_step = true;
            let t_new = outcome.t();
            self.state
                .advance(t_new, self.kernel.y().clone(), self.kernel.yd().clone());

            let step_event = self.problem.completed_step(&self.state)?;
            if grid.is_empty() {
                self.record_current()?;
            } else {
                while next_cp < grid.len() && grid[next_cp] <= t_new {
                    self.record_interpolated(grid[next_cp])?;
                    next_cp += 1;
                }
            }

            let root_mask = match outcome {
                StepOutcome::Root { mask, .. } => Some(mask),
                StepOutcome::Accepted { .. } => None,
            };
            let time_event = time_event_at.is_some_and(|tau| t_new >= tau);
            if let Some(report) = EventReport::new(
                t_new,
                root_mask,
                self.caps.state_events,
                time_event,
                step_event,
            ) {
                self.resolve_event(report, &mut guard)?;
            }
        }
        debug!(t = self.state.t(), steps, "simulate finished");
        Ok(())
    }

    /// Restore the initial conditions, re-run `initiate` and truncate the
    /// trajectory. Options, algvar and suppress_alg are kept.
    pub fn reset(&mut self) -> SimResult<()> {
        let mut initial = self.initial.clone();
        self.problem.reset(&mut initial)?;
        if initial.y0.len() != self.dim || initial.yd0.len() != self.dim {
            return Err(SimError::config("reset changed the state dimension"));
        }
        if initial.switches0.len() != self.initial.switches0.len() {
            return Err(SimError::config("reset changed the number of switches"));
        }
        ensure_finite(initial.t0, "t0")?;
        ensure_finite_vec(&initial.y0, "y0")?;
        ensure_finite_vec(&initial.yd0, "yd0")?;

        let mut mode = self.state.mode.clone();
        mode.switches = initial.switches0.clone();
        let mut state = SimState::new(initial.t0, initial.y0.clone(), initial.yd0.clone(), mode);
        self.problem.initiate(&mut state)?;

        self.initial = initial;
        self.state = state;
        self.trajectory.truncate_to_initial();
        if self.differs_from_last_sample() {
            self.trajectory
                .replace_last(self.state.t(), self.state.y.clone(), self.state.yd.clone());
        }
        self.stats = Stats::default();
        self.kernel.reset_counters();
        self.initial_checked = false;
        self.has_step = false;
        info!(problem = self.problem.name(), t0 = self.state.t(), "simulator reset");
        Ok(())
    }

    /// Make the current point consistent under `policy` and return it.
    pub fn make_consistent(
        &mut self,
        policy: InitPolicy,
    ) -> SimResult<(DVector<f64>, DVector<f64>)> {
        make_consistent(
            &self.problem,
            &mut self.kernel,
            &mut self.state,
            self.caps,
            &self.options,
            policy,
        )?;
        self.initial_checked = true;
        self.has_step = false;
        self.refresh_initial_sample();
        Ok((self.state.y.clone(), self.state.yd.clone()))
    }

    /// State (`k = 0`) or derivative (`k = 1`) at `t` inside the last step.
    pub fn interpolate(&self, t: f64, k: usize) -> SimResult<DVector<f64>> {
        if k > 1 {
            return Err(SimError::config(format!(
                "derivative order must be 0 or 1, got {k}"
            )));
        }
        if !self.has_step || self.kernel.last_step_span().is_none() {
            let t_cur = self.state.t();
            if t != t_cur {
                return Err(SimError::OutOfRange {
                    t,
                    lo: t_cur,
                    hi: t_cur,
                });
            }
            return Ok(if k == 0 {
                self.state.y.clone()
            } else {
                self.state.yd.clone()
            });
        }
        Ok(self.kernel.dense_output(t, k)?)
    }

    /// Initial consistency (once) and kernel restart at the current point.
    fn bind(&mut self) -> SimResult<()> {
        if !self.initial_checked {
            let repaired = ensure_consistent(
                &self.problem,
                &mut self.kernel,
                &mut self.state,
                self.caps,
                &self.options,
                InitPolicy::DerivativeConsistent,
            )?;
            if repaired {
                info!(t = self.state.t(), "initial point made consistent");
                self.refresh_initial_sample();
            }
            self.initial_checked = true;
        }
        self.reinitialize_kernel()
    }

    fn reinitialize_kernel(&mut self) -> SimResult<()> {
        let config = kernel_config(&self.options, &self.state);
        let sys = Bound::new(&self.problem, self.state.switches(), self.caps, self.dim);
        self.kernel.reinitialize(
            &sys,
            self.state.t(),
            &self.state.y,
            &self.state.yd,
            &config,
        )?;
        Ok(())
    }

    /// While only the starting sample is stored and the state still sits at
    /// its time, keep that sample in sync with the state.
    fn refresh_initial_sample(&mut self) {
        if self.trajectory.len() == 1
            && self.trajectory.t()[0] == self.state.t()
            && self.differs_from_last_sample()
        {
            self.trajectory
                .replace_last(self.state.t(), self.state.y.clone(), self.state.yd.clone());
        }
    }

    fn differs_from_last_sample(&self) -> bool {
        match self.trajectory.last() {
            Some((t, y, yd)) => !self.state.matches_sample(t, y, yd),
            None => true,
        }
    }

    /// The start of every `simulate` call is shown to `handle_result`; it is
    /// stored only if it differs from the last stored sample.
    fn record_start(&mut self) -> SimResult<()> {
        self.problem.handle_result(&self.state)?;
        if self.differs_from_last_sample() {
            self.store(None)?;
        }
        Ok(())
    }

    fn record_current(&mut self) -> SimResult<()> {
        self.problem.handle_result(&self.state)?;
        self.store(None)
    }

    fn record_interpolated(&mut self, t: f64) -> SimResult<()> {
        if t == self.state.t() {
            return self.record_current();
        }
        let y = self.kernel.dense_output(t, 0)?;
        let yd = self.kernel.dense_output(t, 1)?;
        let sample = SimState::new(t, y, yd, self.state.mode.clone());
        self.problem.handle_result(&sample)?;
        self.store(Some(sample))
    }

    /// Append a sample (the current state when `None`) and post-process it.
    fn store(&mut self, sample: Option<SimState>) -> SimResult<()> {
        let sample = sample.as_ref().unwrap_or(&self.state);
        self.trajectory
            .push(sample.t(), sample.y.clone(), sample.yd.clone());
        if self.options.post_process {
            self.problem.post_process(sample)?;
        }
        Ok(())
    }

    /// Record the current point unless it is the last stored sample.
    fn record_event_point(&mut self) -> SimResult<bool> {
        if !self.differs_from_last_sample() {
            return Ok(false);
        }
        self.record_current()?;
        Ok(true)
    }

    fn resolve_event(
        &mut self,
        report: EventReport,
        guard: &mut LoopGuard,
    ) -> SimResult<()> {
        guard.register(report.t)?;
        if self.options.store_event_points {
            self.record_event_point()?;
        }

        let resolved = resolve(
            &mut self.problem,
            &mut self.kernel,
            &self.state,
            &report,
            self.caps,
            &self.options,
        )?;

        self.stats.discontinuities += 1;
        if report.info.has_state_event() {
            self.stats.state_events += 1;
        }
        if report.info.time_event {
            self.stats.time_events += 1;
        }
        if report.info.step_event {
            self.stats.step_events += 1;
        }

        self.state = resolved.state;
        self.reinitialize_kernel()?;
        self.has_step = false;
        info!(
            t = report.t,
            kind = report.kind().as_str(),
            repaired = resolved.repaired,
            "event resolved"
        );

        let stored = self.options.store_event_points && self.record_event_point()?;
        if self.options.post_process && !stored {
            self.problem.post_process(&self.state)?;
        }
        Ok(())
    }

    /// Recorded times.
    pub fn t(&self) -> &[f64] {
        self.trajectory.t()
    }

    /// Recorded states.
    pub fn y(&self) -> &[DVector<f64>] {
        self.trajectory.y()
    }

    /// Recorded derivatives.
    pub fn yd(&self) -> &[DVector<f64>] {
        self.trajectory.yd()
    }

    /// All recorded samples.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Current simulation time.
    pub fn t_cur(&self) -> f64 {
        self.state.t()
    }

    /// Current state.
    pub fn y_cur(&self) -> &DVector<f64> {
        &self.state.y
    }

    /// Current state derivative.
    pub fn yd_cur(&self) -> &DVector<f64> {
        &self.state.yd
    }

    /// Current state, derivative and mode.
    pub fn state(&self) -> &SimState {
        &self.state
    }

    /// Initial conditions restored by [`Simulator::reset`].
    pub fn initial_conditions(&self) -> &InitialConditions {
        &self.initial
    }

    /// Statistics since construction or the last reset.
    pub fn stats(&self) -> Stats {
        self.stats.with_kernel(self.kernel.counters())
    }

    /// The bound problem.
    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Mutable access to the bound problem.
    pub fn problem_mut(&mut self) -> &mut P {
        &mut self.problem
    }

    /// The integration kernel.
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Capabilities resolved when the problem was bound.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Current solver options.
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Replace all options at once.
    pub fn set_options(&mut self, mut options: SolverOptions) -> SimResult<()> {
        options.maxord = clamp_maxord(options.maxord);
        options.validate(self.dim)?;
        self.options = options;
        Ok(())
    }

    /// Active switches.
    pub fn switches(&self) -> &[bool] {
        self.state.switches()
    }

    /// Overwrite the switches. The count may not change.
    pub fn set_switches(&mut self, switches: impl Into<Vec<bool>>) -> SimResult<()> {
        let switches = switches.into();
        if switches.len() != self.state.mode.switches.len() {
            return Err(SimError::config(format!(
                "expected {} switches, got {}",
                self.state.mode.switches.len(),
                switches.len()
            )));
        }
        self.state.mode.switches = switches;
        Ok(())
    }

    /// Differential/algebraic marker per component.
    pub fn algvar(&self) -> &DVector<f64> {
        self.state.mode.algvar()
    }

    /// Replace the differential/algebraic markers. Length must match the state.
    pub fn set_algvar(&mut self, algvar: impl Into<Vec<f64>>) -> SimResult<()> {
        self.state.mode.set_algvar(DVector::from_vec(algvar.into()))
    }

    /// Whether algebraic components are left out of the error test.
    pub fn suppress_alg(&self) -> bool {
        self.state.mode.suppress_alg
    }

    /// Include or exclude algebraic components from the error test.
    pub fn set_suppress_alg(&mut self, suppress_alg: bool) {
        self.state.mode.suppress_alg = suppress_alg;
    }

    /// Step budget per [`Simulator::simulate`] call.
    pub fn maxsteps(&self) -> usize {
        self.options.maxsteps
    }

    /// Set the step budget. Must be positive.
    pub fn set_maxsteps(&mut self, maxsteps: usize) -> SimResult<()> {
        if maxsteps == 0 {
            return Err(SimError::config("maxsteps must be positive"));
        }
        self.options.maxsteps = maxsteps;
        Ok(())
    }

    /// Maximum kernel order.
    pub fn maxord(&self) -> usize {
        self.options.maxord
    }

    /// Set the maximum order, clamped into `1..=5`.
    pub fn set_maxord(&mut self, maxord: usize) {
        self.options.maxord = clamp_maxord(maxord);
    }

    /// Relative tolerance.
    pub fn rtol(&self) -> f64 {
        self.options.rtol
    }

    /// Absolute tolerance, scalar or per component.
    pub fn atol(&self) -> &AbsTol {
        &self.options.atol
    }

    /// Set both tolerances; validated together against the dimension.
    pub fn set_tolerances(&mut self, rtol: f64, atol: AbsTol) -> SimResult<()> {
        let mut options = self.options.clone();
        options.rtol = rtol;
        options.atol = atol;
        options.tolerances().validate(self.dim)?;
        self.options = options;
        Ok(())
    }

    /// Set the relative tolerance. Must be positive.
    pub fn set_rtol(&mut self, rtol: f64) -> SimResult<()> {
        let atol = self.options.atol.clone();
        self.set_tolerances(rtol, atol)
    }

    /// Set the absolute tolerance. Must be positive and match the state length.
    pub fn set_atol(&mut self, atol: AbsTol) -> SimResult<()> {
        self.set_tolerances(self.options.rtol, atol)
    }

    /// First step size, if fixed.
    pub fn initstep(&self) -> Option<f64> {
        self.options.initstep
    }

    /// Fix the first step size, or `None` for the kernel's estimate.
    pub fn set_initstep(&mut self, initstep: Option<f64>) -> SimResult<()> {
        check_step("initstep", initstep)?;
        self.options.initstep = initstep;
        Ok(())
    }

    /// Largest allowed step, if bounded.
    pub fn maxh(&self) -> Option<f64> {
        self.options.maxh
    }

    /// Bound the step size, or `None` for no bound.
    pub fn set_maxh(&mut self, maxh: Option<f64>) -> SimResult<()> {
        check_step("maxh", maxh)?;
        self.options.maxh = maxh;
        Ok(())
    }

    /// Whether the problem's Jacobian is used.
    pub fn usejac(&self) -> bool {
        self.options.usejac
    }

    /// Use the problem's Jacobian instead of finite differences.
    pub fn set_usejac(&mut self, usejac: bool) {
        self.options.usejac = usejac;
    }

    /// Whether Newton line search is disabled.
    pub fn lsoff(&self) -> bool {
        self.options.lsoff
    }

    /// Disable or enable Newton line search.
    pub fn set_lsoff(&mut self, lsoff: bool) {
        self.options.lsoff = lsoff;
    }

    /// Whether `post_process` runs for stored samples.
    pub fn post_process(&self) -> bool {
        self.options.post_process
    }

    /// Enable or disable `post_process`.
    pub fn set_post_process(&mut self, post_process: bool) {
        self.options.post_process = post_process;
    }
}

/// Equally spaced output times in `(t_start, t_end]`; the last one is `t_end`.
fn communication_points(t_start: f64, t_end: f64, ncp: usize) -> Vec<f64> {
    if ncp == 0 {
        return Vec::new();
    }
    let dt = (t_end - t_start) / ncp as f64;
    (1..=ncp)
        .map(|i| if i == ncp { t_end } else { t_start + dt * i as f64 })
        .collect()
}
