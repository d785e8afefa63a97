//! hf-core: stable foundation for hybridflow.
//!
//! Contains:
//! - numeric (Real, tolerances, weighted norms, float helpers)
//! - error (shared error types)

pub mod error;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use numeric::*;
