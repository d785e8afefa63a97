//! Content-based hashing for run IDs.

use crate::ResultsResult;
use hf_sim::{InitialConditions, SolverOptions};
use sha2::{Digest, Sha256};

/// Hash of everything that determines a run's output.
pub fn compute_run_id(
    problem_name: &str,
    options: &SolverOptions,
    initial: &InitialConditions,
    t_end: f64,
) -> ResultsResult<String> {
    let mut hasher = Sha256::new();

    hasher.update(problem_name.as_bytes());

    let options_json = serde_json::to_string(options)?;
    hasher.update(options_json.as_bytes());

    hasher.update(initial.t0.to_le_bytes());
    for v in initial.y0.iter().chain(initial.yd0.iter()) {
        hasher.update(v.to_le_bytes());
    }
    for &sw in &initial.switches0 {
        hasher.update([u8::from(sw)]);
    }

    hasher.update(t_end.to_le_bytes());

    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn initial(y0: f64) -> InitialConditions {
        InitialConditions {
            t0: 0.0,
            y0: DVector::from_element(1, y0),
            yd0: DVector::from_element(1, -y0),
            switches0: vec![true],
        }
    }

    #[test]
    fn hash_stability() {
        let options = SolverOptions::default();
        let hash1 = compute_run_id("decay", &options, &initial(1.0), 2.0).unwrap();
        let hash2 = compute_run_id("decay", &options, &initial(1.0), 2.0).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let options = SolverOptions::default();
        let base = compute_run_id("decay", &options, &initial(1.0), 2.0).unwrap();

        assert_ne!(base, compute_run_id("growth", &options, &initial(1.0), 2.0).unwrap());
        assert_ne!(base, compute_run_id("decay", &options, &initial(2.0), 2.0).unwrap());
        assert_ne!(base, compute_run_id("decay", &options, &initial(1.0), 3.0).unwrap());

        let tight = SolverOptions {
            rtol: 1e-9,
            ..SolverOptions::default()
        };
        assert_ne!(base, compute_run_id("decay", &tight, &initial(1.0), 2.0).unwrap());

        let mut flipped = initial(1.0);
        flipped.switches0 = vec![false];
        assert_ne!(base, compute_run_id("decay", &options, &flipped, 2.0).unwrap());
    }
}
