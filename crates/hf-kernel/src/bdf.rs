//! Reference variable-step BDF kernel of orders 1 and 2.
//!
//! Each step solves `F(t, y, (a0*y + beta)/h) = 0` with modified Newton,
//! estimates the local error from the predictor difference and adapts the
//! step size. Dense output is a cubic Hermite over the last accepted step,
//! and indicator roots are located by bisection on it.

use crate::config::KernelConfig;
use crate::dense::HermiteSegment;
use crate::error::{KernelError, KernelResult};
use crate::initialization::{InitPolicy, calc_consistent};
use crate::jacobian::{FD_EPSILON, check_square, finite_difference_jacobian};
use crate::kernel::{IntegrationKernel, KernelCounters, StepOutcome};
use crate::roots::{any_crossing, locate_root};
use crate::system::{DaeSystem, eval_indicators, eval_residual};
use hf_core::{ensure_finite_vec, wrms_norm};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Highest order this kernel implements.
pub const MAX_ORDER: usize = 2;

const MAX_ATTEMPTS: usize = 10;
const MAX_NEWTON_ITERS: usize = 4;
const NEWTON_TOL: f64 = 0.1;
const SAFETY: f64 = 0.9;
const MAX_GROWTH: f64 = 2.0;
const MIN_SHRINK: f64 = 0.2;
const NEWTON_FAIL_FACTOR: f64 = 0.25;
/// Largest step ratio `h / h_prev` for which order 2 is used.
const MAX_RATIO: f64 = 4.0;

/// Previous accepted point, needed for order 2.
#[derive(Clone, Debug)]
struct History {
    h: f64,
    y: DVector<f64>,
    yd: DVector<f64>,
}

/// BDF coefficients and predictor for one step attempt.
struct StepForm {
    order: usize,
    alpha0: f64,
    beta: DVector<f64>,
    y_pred: DVector<f64>,
}

impl StepForm {
    fn derivative(&self, y: &DVector<f64>, h: f64) -> DVector<f64> {
        (y * self.alpha0 + &self.beta) / h
    }

    fn error_constant(&self) -> f64 {
        match self.order {
            1 => 0.5,
            _ => 1.0 / 3.0,
        }
    }
}

/// Variable-step BDF(1,2) integration kernel.
#[derive(Clone, Debug)]
pub struct BdfKernel {
    config: Option<KernelConfig>,
    t: f64,
    y: DVector<f64>,
    yd: DVector<f64>,
    prev: Option<History>,
    h_next: Option<f64>,
    order: usize,
    g: DVector<f64>,
    segment: Option<HermiteSegment>,
    counters: KernelCounters,
}

impl BdfKernel {
    /// Create a new, uninitialized kernel.
    pub fn new() -> Self {
        Self {
            config: None,
            t: 0.0,
            y: DVector::zeros(0),
            yd: DVector::zeros(0),
            prev: None,
            h_next: None,
            order: 1,
            g: DVector::zeros(0),
            segment: None,
            counters: KernelCounters::default(),
        }
    }

    /// Order that will be attempted on the next step.
    pub fn current_order(&self) -> usize {
        if self.prev.is_some() { self.order } else { 1 }
    }

    fn initial_step(&self, config: &KernelConfig, tstop: f64) -> f64 {
        if let Some(h) = config.initstep {
            return h;
        }
        let w = config.tolerances.weights(&self.y);
        let yd_norm = wrms_norm(&self.yd, &w);
        let h = 0.001 * (tstop - self.t);
        if yd_norm > 0.0 { h.min(0.5 / yd_norm) } else { h }
    }

    fn step_form(&self, h: f64) -> StepForm {
        let max_order = MAX_ORDER.min(self.order);
        match &self.prev {
            Some(prev) if max_order >= 2 && h / prev.h <= MAX_RATIO => {
                let w = h / prev.h;
                let alpha0 = (1.0 + 2.0 * w) / (1.0 + w);
                let alpha1 = -(1.0 + w);
                let alpha2 = w * w / (1.0 + w);
                StepForm {
                    order: 2,
                    alpha0,
                    beta: &self.y * alpha1 + &prev.y * alpha2,
                    y_pred: &self.y
                        + &self.yd * h
                        + (&self.yd - &prev.yd) * (0.5 * h * h / prev.h),
                }
            }
            _ => StepForm {
                order: 1,
                alpha0: 1.0,
                beta: -&self.y,
                y_pred: &self.y + &self.yd * h,
            },
        }
    }

    /// Iteration matrix `dF/dy + c dF/dy'` at the predicted point.
    fn iteration_matrix(
        &mut self,
        sys: &dyn DaeSystem,
        config: &KernelConfig,
        form: &StepForm,
        t: f64,
        h: f64,
    ) -> KernelResult<DMatrix<f64>> {
        let n = sys.dim();
        let c = form.alpha0 / h;
        let yd_pred = form.derivative(&form.y_pred, h);
        self.counters.jacobian_evals += 1;
        if config.usejac
            && let Some(jac) = sys
                .jacobian(c, t, &form.y_pred, &yd_pred)
                .map_err(KernelError::system)?
        {
            check_square(&jac, n)?;
            return Ok(jac);
        }
        let f0 = eval_residual(sys, t, &form.y_pred, &yd_pred)?;
        self.counters.residual_evals += 1 + n;
        finite_difference_jacobian(
            &form.y_pred,
            &f0,
            |y| eval_residual(sys, t, y, &form.derivative(y, h)),
            FD_EPSILON,
        )
    }

    /// Modified Newton corrector. `Ok(None)` means the iteration failed to converge.
    fn correct(
        &mut self,
        sys: &dyn DaeSystem,
        config: &KernelConfig,
        form: &StepForm,
        t: f64,
        h: f64,
    ) -> KernelResult<Option<DVector<f64>>> {
        let lu = self.iteration_matrix(sys, config, form, t, h)?.lu();
        let w = config.tolerances.weights(&self.y);
        let mut y = form.y_pred.clone();
        for _ in 0..MAX_NEWTON_ITERS {
            let yd = form.derivative(&y, h);
            let r = eval_residual(sys, t, &y, &yd)?;
            self.counters.residual_evals += 1;
            self.counters.nonlinear_iterations += 1;
            if r.iter().any(|v| !v.is_finite()) {
                return Ok(None);
            }
            let Some(dx) = lu.solve(&(-r)) else {
                return Ok(None);
            };
            y += &dx;
            if wrms_norm(&dx, &w) < NEWTON_TOL {
                return Ok(Some(y));
            }
        }
        Ok(None)
    }
}

impl Default for BdfKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationKernel for BdfKernel {
    fn reinitialize(
        &mut self,
        sys: &dyn DaeSystem,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        config: &KernelConfig,
    ) -> KernelResult<()> {
        let n = sys.dim();
        if y.len() != n || yd.len() != n {
            return Err(KernelError::InvalidInput {
                what: format!(
                    "state lengths ({}, {}) do not match dimension {}",
                    y.len(),
                    yd.len(),
                    n
                ),
            });
        }
        config.validate(n)?;
        hf_core::ensure_finite(t, "t")?;
        ensure_finite_vec(y, "y")?;
        ensure_finite_vec(yd, "yd")?;

        self.g = if sys.num_indicators() > 0 {
            eval_indicators(sys, t, y, yd)?
        } else {
            DVector::zeros(0)
        };
        self.t = t;
        self.y = y.clone();
        self.yd = yd.clone();
        self.prev = None;
        self.h_next = None;
        self.order = MAX_ORDER.min(config.maxord);
        self.segment = None;
        self.config = Some(config.clone());
        debug!(t, dim = n, order = self.order, "kernel reinitialized");
        Ok(())
    }

    fn step_to(&mut self, sys: &dyn DaeSystem, tstop: f64) -> KernelResult<StepOutcome> {
        let config = self.config.clone().ok_or(KernelError::NotInitialized {
            what: "step_to called before reinitialize",
        })?;
        if !(tstop > self.t) {
            return Err(KernelError::InvalidInput {
                what: format!("tstop {} is not ahead of t = {}", tstop, self.t),
            });
        }

        let mut h = self
            .h_next
            .unwrap_or_else(|| self.initial_step(&config, tstop))
            .min(config.maxh);
        let mut attempts = 0;

        let (t_new, h, form, y_new, err) = loop {
            if attempts >= MAX_ATTEMPTS {
                return Err(KernelError::StepFailures {
                    t: self.t,
                    attempts,
                });
            }
            attempts += 1;

            let hmin = 100.0 * f64::EPSILON * self.t.abs();
            if !(h > hmin) {
                return Err(KernelError::StepTooSmall { t: self.t, h });
            }
            let (t_new, h_step) = if self.t + h >= tstop
                || tstop - (self.t + h) <= 100.0 * f64::EPSILON * tstop.abs()
            {
                (tstop, tstop - self.t)
            } else {
                (self.t + h, h)
            };

            let form = self.step_form(h_step);
            let Some(y_new) = self.correct(sys, &config, &form, t_new, h_step)? else {
                self.counters.nonlinear_conv_failures += 1;
                h = h_step * NEWTON_FAIL_FACTOR;
                continue;
            };

            let w = config.error_test_weights(&self.y);
            let err = form.error_constant() * wrms_norm(&(&y_new - &form.y_pred), &w);
            if !(err <= 1.0) {
                self.counters.error_test_failures += 1;
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-1.0 / (form.order as f64 + 1.0))).clamp(MIN_SHRINK, SAFETY)
                } else {
                    MIN_SHRINK
                };
                h = h_step * factor;
                continue;
            }
            break (t_new, h_step, form, y_new, err);
        };

        let growth = if err > 0.0 {
            (SAFETY * err.powf(-1.0 / (form.order as f64 + 1.0))).clamp(MIN_SHRINK, MAX_GROWTH)
        } else {
            MAX_GROWTH
        };
        let yd_new = form.derivative(&y_new, h);
        let t_old = self.t;
        let y_old = std::mem::replace(&mut self.y, y_new);
        let yd_old = std::mem::replace(&mut self.yd, yd_new);
        let mut segment = HermiteSegment::new(
            t_old,
            y_old.clone(),
            yd_old.clone(),
            t_new,
            self.y.clone(),
            self.yd.clone(),
        );
        self.prev = Some(History {
            h,
            y: y_old,
            yd: yd_old,
        });
        self.t = t_new;
        self.order = MAX_ORDER.min(config.maxord);
        self.h_next = Some((h * growth).min(config.maxh));
        self.counters.steps += 1;

        if sys.num_indicators() > 0 {
            let g_new = eval_indicators(sys, t_new, &self.y, &self.yd)?;
            if any_crossing(&self.g, &g_new) {
                let root = locate_root(&segment, &self.g, g_new, |t, y, yd| {
                    eval_indicators(sys, t, y, yd)
                })?;
                segment.truncate(root.t)?;
                self.t = root.t;
                self.y = segment.y1.clone();
                self.yd = segment.yd1.clone();
                self.g = root.g;
                // The truncated step is not a valid BDF history point.
                self.prev = None;
                self.h_next = Some(h.min(config.maxh));
                self.segment = Some(segment);
                debug!(t = root.t, mask = ?root.mask, "indicator root located");
                return Ok(StepOutcome::Root {
                    t: root.t,
                    mask: root.mask,
                });
            }
            self.g = g_new;
        }

        self.segment = Some(segment);
        Ok(StepOutcome::Accepted { t: t_new })
    }

    fn compute_consistent(
        &mut self,
        sys: &dyn DaeSystem,
        t: f64,
        y: &DVector<f64>,
        yd: &DVector<f64>,
        policy: InitPolicy,
        config: &KernelConfig,
    ) -> KernelResult<(DVector<f64>, DVector<f64>)> {
        calc_consistent(sys, t, y, yd, policy, config, &mut self.counters)
    }

    fn dense_output(&self, t: f64, k: usize) -> KernelResult<DVector<f64>> {
        match &self.segment {
            Some(seg) if seg.contains(t) => seg.eval(t, k),
            Some(seg) => Err(KernelError::OutOfRange {
                t,
                lo: seg.t0,
                hi: seg.t1,
            }),
            None if self.config.is_some() && t == self.t => match k {
                0 => Ok(self.y.clone()),
                1 => Ok(self.yd.clone()),
                _ => Err(KernelError::InvalidInput {
                    what: format!("derivative order {k} not supported"),
                }),
            },
            None => Err(KernelError::OutOfRange {
                t,
                lo: self.t,
                hi: self.t,
            }),
        }
    }

    fn last_step_span(&self) -> Option<(f64, f64)> {
        self.segment.as_ref().map(|s| (s.t0, s.t1))
    }

    fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    fn t(&self) -> f64 {
        self.t
    }

    fn y(&self) -> &DVector<f64> {
        &self.y
    }

    fn yd(&self) -> &DVector<f64> {
        &self.yd
    }

    fn counters(&self) -> KernelCounters {
        self.counters
    }

    fn reset_counters(&mut self) {
        self.counters = KernelCounters::default();
    }
}
