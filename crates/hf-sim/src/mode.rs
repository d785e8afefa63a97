//! Mode state: switches plus the algebraic/differential classification.

use crate::error::{SimError, SimResult};
use nalgebra::DVector;

/// `algvar` value of a differential component.
pub const DIFFERENTIAL: f64 = 1.0;
/// `algvar` value of an algebraic component.
pub const ALGEBRAIC: f64 = 0.0;

/// Active branch selection and error-control classification.
#[derive(Clone, Debug, PartialEq)]
pub struct ModeState {
    /// Boolean switches handed to every problem function
    pub switches: Vec<bool>,
    algvar: DVector<f64>,
    /// Leave algebraic components out of the local error test
    pub suppress_alg: bool,
}

impl ModeState {
    /// All components differential, no suppression.
    pub fn new(dim: usize, switches: Vec<bool>) -> Self {
        Self {
            switches,
            algvar: DVector::from_element(dim, DIFFERENTIAL),
            suppress_alg: false,
        }
    }

    pub fn algvar(&self) -> &DVector<f64> {
        &self.algvar
    }

    /// Replace the classification. Length is fixed by the state dimension and
    /// every entry must be [`DIFFERENTIAL`] or [`ALGEBRAIC`].
    pub fn set_algvar(&mut self, algvar: DVector<f64>) -> SimResult<()> {
        validate_algvar(&algvar, self.algvar.len())?;
        self.algvar = algvar;
        Ok(())
    }

    /// Mark component `i` algebraic (`true`) or differential (`false`).
    pub fn set_algebraic(&mut self, i: usize, algebraic: bool) -> SimResult<()> {
        if i >= self.algvar.len() {
            return Err(SimError::config(format!(
                "algvar index {} out of range for dimension {}",
                i,
                self.algvar.len()
            )));
        }
        self.algvar[i] = if algebraic { ALGEBRAIC } else { DIFFERENTIAL };
        Ok(())
    }

    pub fn is_algebraic(&self, i: usize) -> bool {
        self.algvar[i] == ALGEBRAIC
    }
}

/// Check an `algvar` vector against a dimension.
pub fn validate_algvar(algvar: &DVector<f64>, dim: usize) -> SimResult<()> {
    if algvar.len() != dim {
        return Err(SimError::config(format!(
            "algvar has length {}, expected {}",
            algvar.len(),
            dim
        )));
    }
    if let Some(bad) = algvar
        .iter()
        .find(|&&v| v != DIFFERENTIAL && v != ALGEBRAIC)
    {
        return Err(SimError::config(format!(
            "algvar entries must be 0.0 or 1.0, got {bad}"
        )));
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn only_zero_and_one_accepted(values in prop::collection::vec(-2.0_f64..2.0, 1..6)) {
            let v = DVector::from_vec(values.clone());
            let ok = values.iter().all(|&x| x == 0.0 || x == 1.0);
            prop_assert_eq!(validate_algvar(&v, values.len()).is_ok(), ok);
        }

        #[test]
        fn flags_always_validate(flags in prop::collection::vec(any::<bool>(), 1..6)) {
            let v = DVector::from_iterator(flags.len(), flags.iter().map(|&a| if a { 0.0 } else { 1.0 }));
            prop_assert!(validate_algvar(&v, flags.len()).is_ok());
        }
    }
}
