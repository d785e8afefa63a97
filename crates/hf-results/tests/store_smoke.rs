use hf_results::*;
use hf_sim::Stats;

fn manifest(run_id: &str, problem_name: &str, timestamp: &str) -> RunManifest {
    RunManifest {
        run_id: run_id.to_string(),
        problem_name: problem_name.to_string(),
        timestamp: timestamp.to_string(),
        t_end: 1.0,
        samples: 0,
        stats: Stats::default(),
    }
}

#[test]
fn save_and_load_run() {
    let temp_dir = std::env::temp_dir().join("hf_results_test");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let store = RunStore::new(temp_dir.clone()).unwrap();

    let mut manifest = manifest("test_run_123", "decay", "2026-02-25T12:00:00+00:00");
    manifest.samples = 2;
    manifest.stats.steps = 7;

    let records = vec![
        TrajectoryRecord {
            t: 0.0,
            y: vec![1.0, 2.0],
            yd: vec![-1.0, 0.0],
        },
        TrajectoryRecord {
            t: 1.0,
            y: vec![0.5, 2.0],
            yd: vec![-0.5, 0.0],
        },
    ];

    store.save_run(&manifest, &records).unwrap();
    assert!(store.has_run("test_run_123"));

    let loaded_manifest = store.load_manifest("test_run_123").unwrap();
    assert_eq!(loaded_manifest, manifest);

    let loaded_records = store.load_trajectory("test_run_123").unwrap();
    assert_eq!(loaded_records, records);
}

#[test]
fn list_runs_by_problem() {
    let temp_dir = std::env::temp_dir().join("hf_results_test_list");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let store = RunStore::new(temp_dir.clone()).unwrap();

    store
        .save_run(&manifest("run2", "decay", "2026-02-25T13:00:00+00:00"), &[])
        .unwrap();
    store
        .save_run(&manifest("run1", "decay", "2026-02-25T12:00:00+00:00"), &[])
        .unwrap();
    store
        .save_run(&manifest("run3", "bounce", "2026-02-25T14:00:00+00:00"), &[])
        .unwrap();

    let decay_runs = store.list_runs("decay").unwrap();
    assert_eq!(decay_runs.len(), 2);
    assert_eq!(decay_runs[0].run_id, "run1");
    assert_eq!(decay_runs[1].run_id, "run2");

    let bounce_runs = store.list_runs("bounce").unwrap();
    assert_eq!(bounce_runs.len(), 1);

    store.delete_run("run3").unwrap();
    assert!(store.list_runs("bounce").unwrap().is_empty());
    assert!(matches!(
        store.load_manifest("run3"),
        Err(ResultsError::RunNotFound { .. })
    ));
}
