//! Result data types.

use hf_sim::{Stats, Trajectory};
use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub problem_name: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub t_end: f64,
    pub samples: usize,
    pub stats: Stats,
}

impl RunManifest {
    /// Manifest stamped with the current time.
    pub fn new(
        run_id: RunId,
        problem_name: impl Into<String>,
        t_end: f64,
        samples: usize,
        stats: Stats,
    ) -> Self {
        Self {
            run_id,
            problem_name: problem_name.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            t_end,
            samples,
            stats,
        }
    }
}

/// One stored sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub t: f64,
    pub y: Vec<f64>,
    pub yd: Vec<f64>,
}

impl TrajectoryRecord {
    pub fn from_trajectory(trajectory: &Trajectory) -> Vec<Self> {
        trajectory
            .samples()
            .map(|(t, y, yd)| Self {
                t,
                y: y.iter().copied().collect(),
                yd: yd.iter().copied().collect(),
            })
            .collect()
    }
}
