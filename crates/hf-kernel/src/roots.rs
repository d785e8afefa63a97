//! Sign-change detection and root location for indicator functions.

use crate::dense::HermiteSegment;
use crate::error::KernelResult;
use nalgebra::DVector;

/// Components that changed sign between two indicator evaluations.
///
/// A component whose previous value is exactly zero is inactive: it cannot
/// report a crossing until it has left zero.
pub fn crossings(g0: &DVector<f64>, g1: &DVector<f64>) -> Vec<bool> {
    g0.iter()
        .zip(g1.iter())
        .map(|(&a, &b)| a != 0.0 && (b == 0.0 || (a < 0.0) != (b < 0.0)))
        .collect()
}

/// Whether any component crossed.
pub fn any_crossing(g0: &DVector<f64>, g1: &DVector<f64>) -> bool {
    crossings(g0, g1).into_iter().any(|c| c)
}

/// Located root: time, crossing mask and the indicator values there.
#[derive(Clone, Debug)]
pub struct RootLocation {
    pub t: f64,
    pub mask: Vec<bool>,
    pub g: DVector<f64>,
}

/// Find the earliest crossing inside `seg` by bisection on the dense output.
///
/// `g0` holds the indicators at `seg.t0` and `g1` those at `seg.t1`, where at
/// least one component is known to have crossed. `indicators` evaluates the
/// indicator vector at an interpolated point.
pub fn locate_root<G>(
    seg: &HermiteSegment,
    g0: &DVector<f64>,
    g1: DVector<f64>,
    mut indicators: G,
) -> KernelResult<RootLocation>
where
    G: FnMut(f64, &DVector<f64>, &DVector<f64>) -> KernelResult<DVector<f64>>,
{
    let tol = 100.0 * f64::EPSILON * (seg.t1.abs() + seg.h().abs());
    let mut lo = seg.t0;
    let mut hi = seg.t1;
    let mut g_hi = g1;

    while hi - lo > tol {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let y = seg.eval(mid, 0)?;
        let yd = seg.eval(mid, 1)?;
        let g_mid = indicators(mid, &y, &yd)?;
        if any_crossing(g0, &g_mid) {
            hi = mid;
            g_hi = g_mid;
        } else {
            lo = mid;
        }
    }

    Ok(RootLocation {
        t: hi,
        mask: crossings(g0, &g_hi),
        g: g_hi,
    })
}
