//! Integration kernel contract and a reference BDF implementation.
//!
//! The simulation driver talks to a numerical integrator only through
//! [`IntegrationKernel`], and the integrator sees the problem only through
//! [`DaeSystem`]. This crate provides:
//! - the two traits and the step outcome/counter types
//! - consistent initialization ([`InitPolicy`], [`calc_consistent`])
//! - a Newton solver and finite-difference Jacobians
//! - Hermite dense output and bisection root location
//! - [`BdfKernel`], a variable-step BDF(1,2) kernel

pub mod bdf;
pub mod config;
pub mod dense;
pub mod error;
pub mod initialization;
pub mod jacobian;
pub mod kernel;
pub mod newton;
pub mod roots;
pub mod system;

pub use bdf::BdfKernel;
pub use config::KernelConfig;
pub use dense::HermiteSegment;
pub use error::{KernelError, KernelResult, SystemError};
pub use initialization::{InitPolicy, calc_consistent};
pub use kernel::{IntegrationKernel, KernelCounters, StepOutcome};
pub use newton::{NewtonConfig, NewtonResult, newton_solve};
pub use roots::{RootLocation, crossings, locate_root};
pub use system::{DaeSystem, eval_indicators, eval_residual};
