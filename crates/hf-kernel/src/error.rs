//! Error types for kernel operations.

use hf_core::CoreError;
use thiserror::Error;

/// Error raised by a [`crate::DaeSystem`] callback, boxed so the kernel can
/// carry it back to the caller untouched.
pub type SystemError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur inside the integration kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Kernel not initialized: {what}")]
    NotInitialized { what: &'static str },

    #[error("Invalid input: {what}")]
    InvalidInput { what: String },

    #[error("Convergence failed: {what}")]
    ConvergenceFailed { what: String },

    #[error("Step size too small at t = {t}: h = {h}")]
    StepTooSmall { t: f64, h: f64 },

    #[error("Too many failed step attempts at t = {t} ({attempts} attempts)")]
    StepFailures { t: f64, attempts: usize },

    #[error("Numeric error: {what}")]
    Numeric { what: String },

    #[error("Time {t} outside the last step span [{lo}, {hi}]")]
    OutOfRange { t: f64, lo: f64, hi: f64 },

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error(transparent)]
    System(SystemError),
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Wrap an error raised by a system callback.
    pub fn system(e: SystemError) -> Self {
        KernelError::System(e)
    }
}
