//! Dense output over the last accepted step.

use crate::error::{KernelError, KernelResult};
use nalgebra::DVector;

/// Cubic Hermite interpolant through both ends of one step.
#[derive(Clone, Debug)]
pub struct HermiteSegment {
    pub t0: f64,
    pub t1: f64,
    pub y0: DVector<f64>,
    pub y1: DVector<f64>,
    pub yd0: DVector<f64>,
    pub yd1: DVector<f64>,
}

impl HermiteSegment {
    pub fn new(
        t0: f64,
        y0: DVector<f64>,
        yd0: DVector<f64>,
        t1: f64,
        y1: DVector<f64>,
        yd1: DVector<f64>,
    ) -> Self {
        Self {
            t0,
            t1,
            y0,
            y1,
            yd0,
            yd1,
        }
    }

    /// Step length.
    pub fn h(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Whether `t` lies in `[t0, t1]` up to rounding.
    pub fn contains(&self, t: f64) -> bool {
        let tol = 100.0 * f64::EPSILON * (self.t0.abs() + self.t1.abs()).max(1.0);
        t >= self.t0 - tol && t <= self.t1 + tol
    }

    /// Evaluate the interpolant (`k = 0`) or its derivative (`k = 1`) at `t`.
    pub fn eval(&self, t: f64, k: usize) -> KernelResult<DVector<f64>> {
        let h = self.h();
        if h == 0.0 {
            return match k {
                0 => Ok(self.y1.clone()),
                1 => Ok(self.yd1.clone()),
                _ => Err(KernelError::InvalidInput {
                    what: format!("derivative order {k} not supported"),
                }),
            };
        }
        let s = (t - self.t0) / h;
        match k {
            0 => {
                let h00 = 2.0 * s.powi(3) - 3.0 * s.powi(2) + 1.0;
                let h10 = s.powi(3) - 2.0 * s.powi(2) + s;
                let h01 = -2.0 * s.powi(3) + 3.0 * s.powi(2);
                let h11 = s.powi(3) - s.powi(2);
                Ok(&self.y0 * h00
                    + &self.yd0 * (h10 * h)
                    + &self.y1 * h01
                    + &self.yd1 * (h11 * h))
            }
            1 => {
                // d/dt of the basis above, with ds/dt = 1/h
                let d00 = (6.0 * s.powi(2) - 6.0 * s) / h;
                let d10 = 3.0 * s.powi(2) - 4.0 * s + 1.0;
                let d11 = 3.0 * s.powi(2) - 2.0 * s;
                Ok((&self.y0 - &self.y1) * d00 + &self.yd0 * d10 + &self.yd1 * d11)
            }
            _ => Err(KernelError::InvalidInput {
                what: format!("derivative order {k} not supported"),
            }),
        }
    }

    /// Shorten the segment so that it ends at `t` (used after a root).
    pub fn truncate(&mut self, t: f64) -> KernelResult<()> {
        let y = self.eval(t, 0)?;
        let yd = self.eval(t, 1)?;
        self.t1 = t;
        self.y1 = y;
        self.yd1 = yd;
        Ok(())
    }
}
