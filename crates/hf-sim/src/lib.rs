//! Hybrid DAE/ODE simulation driver.
//!
//! Provides:
//! - Problem traits for implicit (`F(t, y, yd, sw) = 0`) and explicit
//!   (`yd = f(t, y, sw)`) systems, plus closure-built problems
//! - State, time and step event detection and resolution
//! - Consistent initialization after construction and after every event
//! - Trajectory recording at kernel steps or communication points

pub mod consistency;
pub mod error;
pub mod events;
pub mod explicit;
pub mod functional;
pub mod mode;
pub mod options;
pub mod problem;
pub mod schedule;
pub mod sim;
pub mod state;
pub mod trajectory;

// Internal modules
mod binding;

// Re-exports for public API
pub use error::{SimError, SimResult};
pub use events::{EventKind, EventReport, MAX_EVENT_ITERATIONS};
pub use explicit::Explicit;
pub use functional::{FnExplicitProblem, FnImplicitProblem};
pub use hf_kernel::{BdfKernel, InitPolicy, IntegrationKernel};
pub use mode::ModeState;
pub use options::SolverOptions;
pub use problem::{
    CallbackResult, Capabilities, EventInfo, ExplicitProblem, ImplicitProblem, Problem,
    ProblemError,
};
pub use sim::{Simulator, SimulatorBuilder};
pub use state::{InitialConditions, SimState};
pub use trajectory::{Stats, Trajectory};
