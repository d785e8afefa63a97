//! Error types for simulation operations.

use crate::problem::ProblemError;
use hf_core::CoreError;
use hf_kernel::KernelError;
use thiserror::Error;

/// Errors raised by the simulation driver.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Problem function not specified: {what}")]
    ProblemNotSpecified { what: &'static str },

    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Time ordering error: t_end = {t_end} is not greater than t = {t_cur}")]
    TimeOrdering { t_cur: f64, t_end: f64 },

    #[error("Initialization failed at t = {t}: {what}")]
    Initialization { t: f64, what: String },

    #[error("Discontinuity loop at t = {t}: more than {limit} consecutive event resolutions")]
    DiscontinuityLoop { t: f64, limit: usize },

    #[error("Too many steps: limit of {maxsteps} reached at t = {t}")]
    TooManySteps { t: f64, maxsteps: usize },

    #[error("Kernel failure: {0}")]
    Kernel(KernelError),

    #[error("Time {t} outside the last step span [{lo}, {hi}]")]
    OutOfRange { t: f64, lo: f64, hi: f64 },

    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        SimError::Configuration { what: what.into() }
    }

    /// Map a failed consistency solve. Callback errors keep their identity.
    pub(crate) fn initialization(t: f64, e: KernelError) -> Self {
        match e {
            KernelError::System(_) => SimError::from(e),
            other => SimError::Initialization {
                t,
                what: other.to_string(),
            },
        }
    }
}

impl From<ProblemError> for SimError {
    fn from(e: ProblemError) -> Self {
        match e {
            ProblemError::NotSpecified { what } => SimError::ProblemNotSpecified { what },
            ProblemError::Callback(inner) => SimError::Callback(inner),
        }
    }
}

impl From<KernelError> for SimError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::System(boxed) => match boxed.downcast::<ProblemError>() {
                Ok(problem) => SimError::from(*problem),
                Err(other) => SimError::Callback(other),
            },
            KernelError::OutOfRange { t, lo, hi } => SimError::OutOfRange { t, lo, hi },
            other => SimError::Kernel(other),
        }
    }
}

impl From<CoreError> for SimError {
    fn from(e: CoreError) -> Self {
        SimError::Configuration {
            what: e.to_string(),
        }
    }
}
