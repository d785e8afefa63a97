//! Solver options with validation and YAML loading.

use crate::error::{SimError, SimResult};
use hf_core::{AbsTol, ErrorTolerances};
use hf_kernel::InitPolicy;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Highest BDF order accepted by the `maxord` option.
pub const MAX_ORD_LIMIT: usize = 5;

/// Options read by the driver and handed to the kernel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance, scalar or one entry per state
    pub atol: AbsTol,
    /// Maximum number of kernel steps per `simulate` call
    pub maxsteps: usize,
    /// Maximum integration order (clamped into 1..=5)
    pub maxord: usize,
    /// First step size after every (re)initialization
    pub initstep: Option<f64>,
    /// Maximum step size
    pub maxh: Option<f64>,
    /// Use the problem's Jacobian when it provides one
    pub usejac: bool,
    /// Disable the line search of consistency solves
    pub lsoff: bool,
    /// Call `post_process` for recorded samples and after events
    pub post_process: bool,
    /// Record the samples just before and after every event
    pub store_event_points: bool,
    /// Policy used to repair the state after an event handler changed it
    pub event_init_policy: InitPolicy,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: AbsTol::Scalar(1e-6),
            maxsteps: 10_000,
            maxord: MAX_ORD_LIMIT,
            initstep: None,
            maxh: None,
            usejac: true,
            lsoff: false,
            post_process: false,
            store_event_points: true,
            event_init_policy: InitPolicy::default(),
        }
    }
}

impl SolverOptions {
    /// Parse options from YAML. Missing keys take their defaults and
    /// `maxord` is clamped.
    pub fn from_yaml_str(s: &str) -> SimResult<Self> {
        let mut options: SolverOptions = serde_yaml::from_str(s)
            .map_err(|e| SimError::config(format!("invalid options: {e}")))?;
        options.maxord = clamp_maxord(options.maxord);
        Ok(options)
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> SimResult<String> {
        serde_yaml::to_string(self).map_err(|e| SimError::config(format!("cannot serialize options: {e}")))
    }

    pub fn tolerances(&self) -> ErrorTolerances {
        ErrorTolerances {
            rtol: self.rtol,
            atol: self.atol.clone(),
        }
    }

    /// Check every option against a state dimension.
    pub fn validate(&self, dim: usize) -> SimResult<()> {
        self.tolerances().validate(dim)?;
        if self.maxsteps == 0 {
            return Err(SimError::config("maxsteps must be positive"));
        }
        if !(1..=MAX_ORD_LIMIT).contains(&self.maxord) {
            return Err(SimError::config(format!(
                "maxord must lie in 1..={MAX_ORD_LIMIT}, got {}",
                self.maxord
            )));
        }
        check_step("initstep", self.initstep)?;
        check_step("maxh", self.maxh)?;
        Ok(())
    }
}

/// Clamp a requested order into `1..=MAX_ORD_LIMIT`.
pub fn clamp_maxord(maxord: usize) -> usize {
    let clamped = maxord.clamp(1, MAX_ORD_LIMIT);
    if clamped != maxord {
        warn!(requested = maxord, used = clamped, "maxord clamped");
    }
    clamped
}

pub(crate) fn check_step(what: &str, h: Option<f64>) -> SimResult<()> {
    if let Some(h) = h
        && !(h.is_finite() && h > 0.0)
    {
        return Err(SimError::config(format!(
            "{what} must be positive and finite, got {h}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = SolverOptions::default();
        assert_eq!(o.rtol, 1e-6);
        assert_eq!(o.atol, AbsTol::Scalar(1e-6));
        assert_eq!(o.maxsteps, 10_000);
        assert_eq!(o.maxord, 5);
        assert!(o.usejac);
        assert!(!o.lsoff);
        assert!(o.store_event_points);
        assert_eq!(o.event_init_policy, InitPolicy::DerivativeConsistent);
        assert!(o.validate(3).is_ok());
    }

    #[test]
    fn yaml_overrides_and_clamps() {
        let yaml = "rtol: 1.0e-4\natol: [1.0e-3, 1.0e-5]\nmaxord: 9\ninitstep: 1.0e-10\nevent_init_policy: state_consistent\n";
        let o = SolverOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(o.rtol, 1e-4);
        assert_eq!(o.atol, AbsTol::PerComponent(vec![1e-3, 1e-5]));
        assert_eq!(o.maxord, 5);
        assert_eq!(o.initstep, Some(1e-10));
        assert_eq!(o.event_init_policy, InitPolicy::StateConsistent);
        assert_eq!(o.maxsteps, 10_000);
        assert!(o.validate(2).is_ok());
        assert!(o.validate(3).is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let mut o = SolverOptions::default();
        o.maxh = Some(0.5);
        let back = SolverOptions::from_yaml_str(&o.to_yaml_string().unwrap()).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn invalid_values_rejected() {
        let mut o = SolverOptions::default();
        o.maxsteps = 0;
        assert!(matches!(o.validate(1), Err(SimError::Configuration { .. })));

        let mut o = SolverOptions::default();
        o.initstep = Some(-1.0);
        assert!(o.validate(1).is_err());

        let mut o = SolverOptions::default();
        o.rtol = 0.0;
        o.atol = AbsTol::Scalar(0.0);
        assert!(o.validate(1).is_err());

        let mut o = SolverOptions::default();
        o.maxh = Some(f64::INFINITY);
        assert!(o.validate(1).is_err());
    }

    #[test]
    fn maxord_clamping() {
        assert_eq!(clamp_maxord(0), 1);
        assert_eq!(clamp_maxord(2), 2);
        assert_eq!(clamp_maxord(6), 5);
    }
}
