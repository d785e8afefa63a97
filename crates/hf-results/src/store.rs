//! Run storage API.

use crate::hash::compute_run_id;
use crate::types::{RunManifest, TrajectoryRecord};
use crate::{ResultsError, ResultsResult};
use hf_sim::{ImplicitProblem, IntegrationKernel, Problem, Simulator};
use std::fs;
use std::path::PathBuf;

const MANIFEST_FILE: &str = "manifest.json";
const TRAJECTORY_FILE: &str = "trajectory.jsonl";

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    fn run_dir(&self, run_id: &str) -> ResultsResult<PathBuf> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ResultsError::InvalidRunId {
                run_id: run_id.to_string(),
            });
        }
        Ok(self.root_dir.join(run_id))
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id)
            .map(|dir| dir.join(MANIFEST_FILE).exists())
            .unwrap_or(false)
    }

    pub fn save_run(
        &self,
        manifest: &RunManifest,
        records: &[TrajectoryRecord],
    ) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id)?;
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join(MANIFEST_FILE), manifest_json)?;

        let mut trajectory_content = String::new();
        for record in records {
            let line = serde_json::to_string(record)?;
            trajectory_content.push_str(&line);
            trajectory_content.push('\n');
        }
        fs::write(run_dir.join(TRAJECTORY_FILE), trajectory_content)?;

        Ok(())
    }

    /// Store the simulator's trajectory up to its current time.
    ///
    /// The run id is derived from the problem name, the options, the initial
    /// conditions and the end time, so saving the same run twice overwrites.
    pub fn save_simulation<P, K>(&self, sim: &Simulator<P, K>) -> ResultsResult<RunManifest>
    where
        P: ImplicitProblem,
        K: IntegrationKernel,
    {
        let name = sim.problem().name();
        let run_id = compute_run_id(name, sim.options(), sim.initial_conditions(), sim.t_cur())?;
        let records = TrajectoryRecord::from_trajectory(sim.trajectory());
        let manifest = RunManifest::new(run_id, name, sim.t_cur(), records.len(), sim.stats());
        self.save_run(&manifest, &records)?;
        Ok(manifest)
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id)?.join(MANIFEST_FILE);

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        let manifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    pub fn load_trajectory(&self, run_id: &str) -> ResultsResult<Vec<TrajectoryRecord>> {
        let trajectory_path = self.run_dir(run_id)?.join(TRAJECTORY_FILE);

        if !trajectory_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(trajectory_path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let record: TrajectoryRecord = serde_json::from_str(line)?;
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Manifests of every stored run of `problem_name`, oldest first.
    pub fn list_runs(&self, problem_name: &str) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(&run_id)
                    && manifest.problem_name == problem_name
                {
                    runs.push(manifest);
                }
            }
        }

        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id)?;
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
