//! Problems assembled from closures.
//!
//! The mandatory function is attached after construction. Until it is, every
//! call fails with [`ProblemError::NotSpecified`]. Capabilities follow from
//! which optional closures are present.

use crate::problem::{
    Capabilities, CallbackResult, EventInfo, ExplicitProblem, ImplicitProblem, Problem,
    ProblemError,
};
use crate::state::{InitialConditions, SimState};
use nalgebra::{DMatrix, DVector};

type ResidualFn =
    Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>>>;
type ImplicitJacFn =
    Box<dyn Fn(f64, f64, &DVector<f64>, &DVector<f64>, &[bool]) -> CallbackResult<DMatrix<f64>>>;
type RhsFn = Box<dyn Fn(f64, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>>>;
type ExplicitJacFn = Box<dyn Fn(f64, &DVector<f64>, &[bool]) -> CallbackResult<DMatrix<f64>>>;
type TimeEventFn = Box<dyn Fn(&SimState) -> CallbackResult<Option<f64>>>;
type InitiateFn = Box<dyn FnMut(&mut SimState) -> CallbackResult<()>>;
type ResetFn = Box<dyn FnMut(&mut InitialConditions) -> CallbackResult<()>>;
type HandleEventFn = Box<dyn FnMut(&mut SimState, &EventInfo) -> CallbackResult<()>>;
type CompletedStepFn = Box<dyn FnMut(&SimState) -> CallbackResult<bool>>;
type ObserveFn = Box<dyn FnMut(&SimState) -> CallbackResult<()>>;

/// Lifecycle hooks shared by both closure problems.
#[derive(Default)]
struct Hooks {
    time_events: Option<TimeEventFn>,
    initiate: Option<InitiateFn>,
    reset: Option<ResetFn>,
    handle_event: Option<HandleEventFn>,
    completed_step: Option<CompletedStepFn>,
    post_process: Option<ObserveFn>,
    handle_result: Option<ObserveFn>,
}

impl Hooks {
    fn time_event(&self, state: &SimState) -> CallbackResult<Option<f64>> {
        match &self.time_events {
            Some(f) => f(state),
            None => Ok(None),
        }
    }

    fn initiate(&mut self, state: &mut SimState) -> CallbackResult<()> {
        self.initiate.as_mut().map_or(Ok(()), |f| f(state))
    }

    fn reset(&mut self, initial: &mut InitialConditions) -> CallbackResult<()> {
        self.reset.as_mut().map_or(Ok(()), |f| f(initial))
    }

    fn handle_event(&mut self, state: &mut SimState, info: &EventInfo) -> Option<CallbackResult<()>> {
        self.handle_event.as_mut().map(|f| f(state, info))
    }

    fn completed_step(&mut self, state: &SimState) -> CallbackResult<bool> {
        self.completed_step.as_mut().map_or(Ok(false), |f| f(state))
    }

    fn post_process(&mut self, state: &SimState) -> CallbackResult<()> {
        self.post_process.as_mut().map_or(Ok(()), |f| f(state))
    }

    fn handle_result(&mut self, state: &SimState) -> CallbackResult<()> {
        self.handle_result.as_mut().map_or(Ok(()), |f| f(state))
    }
}

macro_rules! hook_setters {
    () => {
        /// Set the problem name.
        pub fn with_name(mut self, name: impl Into<String>) -> Self {
            self.name = name.into();
            self
        }

        /// Schedule time events.
        pub fn with_time_events(
            mut self,
            f: impl Fn(&SimState) -> CallbackResult<Option<f64>> + 'static,
        ) -> Self {
            self.hooks.time_events = Some(Box::new(f));
            self
        }

        pub fn on_initiate(
            mut self,
            f: impl FnMut(&mut SimState) -> CallbackResult<()> + 'static,
        ) -> Self {
            self.hooks.initiate = Some(Box::new(f));
            self
        }

        pub fn on_reset(
            mut self,
            f: impl FnMut(&mut InitialConditions) -> CallbackResult<()> + 'static,
        ) -> Self {
            self.hooks.reset = Some(Box::new(f));
            self
        }

        pub fn on_event(
            mut self,
            f: impl FnMut(&mut SimState, &EventInfo) -> CallbackResult<()> + 'static,
        ) -> Self {
            self.hooks.handle_event = Some(Box::new(f));
            self
        }

        pub fn on_completed_step(
            mut self,
            f: impl FnMut(&SimState) -> CallbackResult<bool> + 'static,
        ) -> Self {
            self.hooks.completed_step = Some(Box::new(f));
            self
        }

        pub fn on_post_process(
            mut self,
            f: impl FnMut(&SimState) -> CallbackResult<()> + 'static,
        ) -> Self {
            self.hooks.post_process = Some(Box::new(f));
            self
        }

        pub fn on_result(mut self, f: impl FnMut(&SimState) -> CallbackResult<()> + 'static) -> Self {
            self.hooks.handle_result = Some(Box::new(f));
            self
        }
    };
}

macro_rules! forward_hooks {
    () => {
        fn name(&self) -> &str {
            &self.name
        }

        fn time_event(&self, state: &SimState) -> CallbackResult<Option<f64>> {
            self.hooks.time_event(state)
        }

        fn initiate(&mut self, state: &mut SimState) -> CallbackResult<()> {
            self.hooks.initiate(state)
        }

        fn reset(&mut self, initial: &mut InitialConditions) -> CallbackResult<()> {
            self.hooks.reset(initial)
        }

        fn handle_event(&mut self, state: &mut SimState, info: &EventInfo) -> CallbackResult<()> {
            match self.hooks.handle_event(state, info) {
                Some(result) => result,
                None => {
                    tracing::debug!(problem = %self.name, t = state.t(), "no handle_event hook defined");
                    Ok(())
                }
            }
        }

        fn completed_step(&mut self, state: &SimState) -> CallbackResult<bool> {
            self.hooks.completed_step(state)
        }

        fn post_process(&mut self, state: &SimState) -> CallbackResult<()> {
            self.hooks.post_process(state)
        }

        fn handle_result(&mut self, sample: &SimState) -> CallbackResult<()> {
            self.hooks.handle_result(sample)
        }
    };
}

/// Implicit problem built from closures.
pub struct FnImplicitProblem {
    name: String,
    residual: Option<ResidualFn>,
    state_events: Option<(usize, ResidualFn)>,
    jacobian: Option<ImplicitJacFn>,
    hooks: Hooks,
}

impl Default for FnImplicitProblem {
    fn default() -> Self {
        Self::new()
    }
}

impl FnImplicitProblem {
    /// Problem with no functions attached yet.
    pub fn new() -> Self {
        Self {
            name: "---".to_string(),
            residual: None,
            state_events: None,
            jacobian: None,
            hooks: Hooks::default(),
        }
    }

    /// Attach the residual `F(t, y, yd, switches)`.
    pub fn with_residual(
        mut self,
        f: impl Fn(f64, &DVector<f64>, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>>
        + 'static,
    ) -> Self {
        self.residual = Some(Box::new(f));
        self
    }

    /// Attach `count` indicator functions.
    pub fn with_state_events(
        mut self,
        count: usize,
        g: impl Fn(f64, &DVector<f64>, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>>
        + 'static,
    ) -> Self {
        self.state_events = Some((count, Box::new(g)));
        self
    }

    /// Attach the combined Jacobian `dF/dy + c * dF/dyd`.
    pub fn with_jacobian(
        mut self,
        j: impl Fn(f64, f64, &DVector<f64>, &DVector<f64>, &[bool]) -> CallbackResult<DMatrix<f64>>
        + 'static,
    ) -> Self {
        self.jacobian = Some(Box::new(j));
        self
    }

    hook_setters!();
}

impl Problem for FnImplicitProblem {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            state_events: self.state_events.as_ref().map_or(0, |(n, _)| *n),
            time_events: self.hooks.time_events.is_some(),
            jacobian: self.jacobian.is_some(),
        }
    }

    forward_hooks!();
}

impl ImplicitProblem for FnImplicitProblem {
    fn residual(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        match &self.residual {
            Some(f) => f(t, y, yd, switches),
            None => Err(ProblemError::NotSpecified { what: "residual" }),
        }
    }

    fn state_events(
        &self,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        match &self.state_events {
            Some((_, g)) => g(t, y, yd, switches),
            None => Err(ProblemError::NotSpecified {
                what: "state_events",
            }),
        }
    }

    fn jacobian(
        &self,
        c: f64,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DMatrix<f64>> {
        match &self.jacobian {
            Some(j) => j(c, t, y, yd, switches),
            None => Err(ProblemError::NotSpecified { what: "jacobian" }),
        }
    }
}

/// Explicit problem built from closures.
pub struct FnExplicitProblem {
    name: String,
    rhs: Option<RhsFn>,
    state_events: Option<(usize, RhsFn)>,
    jacobian: Option<ExplicitJacFn>,
    hooks: Hooks,
}

impl Default for FnExplicitProblem {
    fn default() -> Self {
        Self::new()
    }
}

impl FnExplicitProblem {
    /// Problem with no functions attached yet.
    pub fn new() -> Self {
        Self {
            name: "---".to_string(),
            rhs: None,
            state_events: None,
            jacobian: None,
            hooks: Hooks::default(),
        }
    }

    /// Attach the right-hand side `f(t, y, switches)`.
    pub fn with_rhs(
        mut self,
        f: impl Fn(f64, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>> + 'static,
    ) -> Self {
        self.rhs = Some(Box::new(f));
        self
    }

    /// Attach `count` indicator functions.
    pub fn with_state_events(
        mut self,
        count: usize,
        g: impl Fn(f64, &DVector<f64>, &[bool]) -> CallbackResult<DVector<f64>> + 'static,
    ) -> Self {
        self.state_events = Some((count, Box::new(g)));
        self
    }

    /// Attach `df/dy`.
    pub fn with_jacobian(
        mut self,
        j: impl Fn(f64, &DVector<f64>, &[bool]) -> CallbackResult<DMatrix<f64>> + 'static,
    ) -> Self {
        self.jacobian = Some(Box::new(j));
        self
    }

    hook_setters!();
}

impl Problem for FnExplicitProblem {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            state_events: self.state_events.as_ref().map_or(0, |(n, _)| *n),
            time_events: self.hooks.time_events.is_some(),
            jacobian: self.jacobian.is_some(),
        }
    }

    forward_hooks!();
}

impl ExplicitProblem for FnExplicitProblem {
    fn rhs(&self, t: f64, y: &DVector<f64>, switches: &[bool]) -> CallbackResult<DVector<f64>> {
        match &self.rhs {
            Some(f) => f(t, y, switches),
            None => Err(ProblemError::NotSpecified { what: "rhs" }),
        }
    }

    fn state_events(
        &self,
        t: f64,
        y: &DVector<f64>,
        switches: &[bool],
    ) -> CallbackResult<DVector<f64>> {
        match &self.state_events {
            Some((_, g)) => g(t, y, switches),
            None => Err(ProblemError::NotSpecified {
                what: "state_events",
            }),
        }
    }

    fn jacobian(&self, t: f64, y: &DVector<f64>, switches: &[bool]) -> CallbackResult<DMatrix<f64>> {
        match &self.jacobian {
            Some(j) => j(t, y, switches),
            None => Err(ProblemError::NotSpecified { what: "jacobian" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_residual_is_not_specified() {
        let p = FnImplicitProblem::new();
        let y = DVector::zeros(1);
        let err = p.residual(0.0, &y, &y, &[]).unwrap_err();
        assert!(matches!(err, ProblemError::NotSpecified { what: "residual" }));
    }

    #[test]
    fn capabilities_follow_closures() {
        let p = FnImplicitProblem::new()
            .with_residual(|_t, y, yd, _sw| Ok(yd - y))
            .with_state_events(2, |_t, y, _yd, _sw| Ok(DVector::from_vec(vec![y[0], -y[0]])))
            .with_time_events(|_s| Ok(None));
        let caps = p.capabilities();
        assert_eq!(caps.state_events, 2);
        assert!(caps.time_events);
        assert!(!caps.jacobian);
    }

    #[test]
    fn explicit_closures_and_name() {
        let p = FnExplicitProblem::new()
            .with_name("decay")
            .with_rhs(|_t, y, _sw| Ok(-y));
        assert_eq!(p.name(), "decay");
        let yd = p.rhs(0.0, &DVector::from_element(1, 2.0), &[]).unwrap();
        assert_eq!(yd[0], -2.0);
        assert!(FnExplicitProblem::new().rhs(0.0, &yd, &[]).is_err());
    }

    #[test]
    fn default_name() {
        assert_eq!(FnImplicitProblem::new().name(), "---");
    }
}
