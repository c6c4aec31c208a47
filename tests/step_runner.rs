// tests/step_runner.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sequencer::errors::SequencerError;
use sequencer::exec::StepRunner;
use sequencer::fs::FileSystem;
use sequencer::fs::mock::MockFileSystem;
use sequencer::history::HistoryStore;
use sequencer::pipeline::{FallbackPolicy, Run, RunContext, StepDefinition};
use sequencer_test_utils::{init_tracing, with_timeout};
use sequencer_test_utils::scripted_launcher::{Scripted, ScriptedLauncher};

const ANALYSIS_DIR: &str = "/data/ana";
const HISTORY: &str = "/data/ana/sequence_LST1_1808.history";
const DEFAULT_ARTIFACT: &str =
    "/data/calib/20260101/v0.10/time_calibration.Run01625.0000.h5";

fn context() -> RunContext {
    let run = Run::new(1808, "LST1", "v0.10").with_input("raw", "/data/R0/LST-1.1.Run01808.fits.fz");
    let mut vars = BTreeMap::new();
    vars.insert(
        "time_file".to_string(),
        "{directory}/time_calibration.Run{run_id_padded}.0000.h5".to_string(),
    );
    RunContext::build(run, Path::new(ANALYSIS_DIR), &vars).unwrap()
}

fn runner(fs: &MockFileSystem, launcher: &ScriptedLauncher) -> StepRunner {
    let fs: Arc<dyn FileSystem> = Arc::new(fs.clone());
    StepRunner::new(
        Arc::new(launcher.clone()),
        HistoryStore::new(fs.clone()),
        fs,
    )
}

fn time_step() -> StepDefinition {
    let mut step = StepDefinition::new("time_calibration", "lstchain_data_create_time_calibration_file");
    step.command.args = vec![
        "--input-file={input.raw}".to_string(),
        "--output-file={time_file}".to_string(),
    ];
    step.outputs = vec!["{time_file}".to_string()];
    step.config_ref = Some("/cfg/calibration_config.json".to_string());
    step
}

fn with_fallback(mut step: StepDefinition) -> StepDefinition {
    step.fallback = Some(FallbackPolicy {
        trigger_code: 1,
        default_run: 1625,
        search_dir: "/data/calib".to_string(),
        pattern: "*/{prod_id}/time_calibration.Run{default_run_padded}*".to_string(),
        link: None,
    });
    step
}

fn history_codes(fs: &MockFileSystem) -> Vec<i32> {
    fs.contents(HISTORY)
        .unwrap_or_default()
        .lines()
        .map(|l| l.split_whitespace().last().unwrap().parse().unwrap())
        .collect()
}

#[tokio::test]
async fn test_success_records_one_line_with_basenames() {
    init_tracing();
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();

    let success = runner(&fs, &launcher)
        .execute(&time_step(), &context())
        .await
        .unwrap();

    assert!(!success.fallback_used);
    assert_eq!(
        success.artifacts,
        vec![PathBuf::from("/data/ana/time_calibration.Run01808.0000.h5")]
    );

    let invocations = launcher.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations[0].args,
        vec![
            "--input-file=/data/R0/LST-1.1.Run01808.fits.fz".to_string(),
            "--output-file=/data/ana/time_calibration.Run01808.0000.h5".to_string(),
        ]
    );

    let history = fs.contents(HISTORY).unwrap();
    let tokens: Vec<&str> = history.split_whitespace().collect();
    assert_eq!(tokens.len(), 11);
    assert_eq!(tokens[0], "1808");
    assert_eq!(tokens[1], "time_calibration");
    assert_eq!(tokens[2], "v0.10");
    assert_eq!(tokens[8], "time_calibration.Run01808.0000.h5");
    assert_eq!(tokens[9], "calibration_config.json");
    assert_eq!(tokens[10], "0");
}

#[tokio::test]
async fn test_nonzero_exit_without_fallback_is_external_process_error() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(2)]);

    let result = runner(&fs, &launcher).execute(&time_step(), &context()).await;

    match result {
        Err(SequencerError::ExternalProcess { step, code }) => {
            assert_eq!(step, "time_calibration");
            assert_eq!(code, 2);
        }
        other => panic!("Expected ExternalProcess error, got: {:?}", other),
    }
    assert_eq!(history_codes(&fs), vec![2]);
}

#[tokio::test]
async fn test_fallback_links_default_artifact() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(DEFAULT_ARTIFACT, "reference");
    fs.add_file("/data/calib/20260101/v0.10/time_calibration.Run01626.0000.h5", "other");
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(1)]);

    let success = runner(&fs, &launcher)
        .execute(&with_fallback(time_step()), &context())
        .await
        .unwrap();

    assert!(success.fallback_used);
    assert_eq!(
        fs.link_target("/data/ana/time_calibration.Run01808.0000.h5"),
        Some(PathBuf::from(DEFAULT_ARTIFACT))
    );
    assert_eq!(history_codes(&fs), vec![1, 0]);
    // Only the program itself ran; linking launches nothing.
    assert_eq!(launcher.invocations().len(), 1);
}

#[tokio::test]
async fn test_fallback_uses_explicit_link_location() {
    let fs = MockFileSystem::new();
    fs.add_file(DEFAULT_ARTIFACT, "reference");
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(1)]);

    let mut step = with_fallback(time_step());
    if let Some(policy) = step.fallback.as_mut() {
        policy.link = Some("calibration/time_calibration.Run{run_id}.h5".to_string());
    }

    runner(&fs, &launcher).execute(&step, &context()).await.unwrap();

    assert_eq!(
        fs.link_target("/data/ana/calibration/time_calibration.Run1808.h5"),
        Some(PathBuf::from(DEFAULT_ARTIFACT))
    );
}

#[tokio::test]
async fn test_fallback_without_default_artifact_fails() {
    let fs = MockFileSystem::new();
    fs.add_dir("/data/calib/20260101/v0.10");
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(1)]);

    let result = runner(&fs, &launcher)
        .execute(&with_fallback(time_step()), &context())
        .await;

    match result {
        Err(err @ SequencerError::FallbackUnavailable { .. }) => {
            assert!(err.to_string().contains("time_calibration"));
            assert!(err.to_string().contains("1625"));
            assert_eq!(err.return_code(), Some(1));
        }
        other => panic!("Expected FallbackUnavailable error, got: {:?}", other),
    }
    assert_eq!(history_codes(&fs), vec![1]);
    assert!(!fs.exists(Path::new("/data/ana/time_calibration.Run01808.0000.h5")));
}

#[tokio::test]
async fn test_fallback_link_failure_keeps_failing_code() {
    let fs = MockFileSystem::new();
    fs.add_file(DEFAULT_ARTIFACT, "reference");
    // A stale product already sits where the link would go.
    fs.add_file("/data/ana/time_calibration.Run01808.0000.h5", "stale");
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(1)]);

    let err = runner(&fs, &launcher)
        .execute(&with_fallback(time_step()), &context())
        .await
        .unwrap_err();

    assert!(matches!(err, SequencerError::FallbackFailed { code: 1, .. }));
    assert_eq!(err.return_code(), Some(1));
    assert_eq!(history_codes(&fs), vec![1]);
}

#[tokio::test]
async fn test_fallback_search_skips_looping_directory_links() {
    let fs = MockFileSystem::new();
    fs.add_file(DEFAULT_ARTIFACT, "reference");
    fs.symlink(
        Path::new("/data/calib"),
        Path::new("/data/calib/20260101/loop"),
    )
    .unwrap();
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(1)]);

    let success = with_timeout(
        runner(&fs, &launcher).execute(&with_fallback(time_step()), &context()),
    )
    .await
    .unwrap();

    assert!(success.fallback_used);
    assert_eq!(
        fs.link_target("/data/ana/time_calibration.Run01808.0000.h5"),
        Some(PathBuf::from(DEFAULT_ARTIFACT))
    );
}

#[tokio::test]
async fn test_other_exit_codes_do_not_trigger_fallback() {
    let fs = MockFileSystem::new();
    fs.add_file(DEFAULT_ARTIFACT, "reference");
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::Exit(3)]);

    let result = runner(&fs, &launcher)
        .execute(&with_fallback(time_step()), &context())
        .await;

    assert!(matches!(
        result,
        Err(SequencerError::ExternalProcess { code: 3, .. })
    ));
    assert_eq!(history_codes(&fs), vec![3]);
    assert_eq!(fs.link_target("/data/ana/time_calibration.Run01808.0000.h5"), None);
}

#[tokio::test]
async fn test_launch_failure_is_recorded() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_data_create_time_calibration_file", &[Scripted::LaunchError]);

    let err = runner(&fs, &launcher)
        .execute(&time_step(), &context())
        .await
        .unwrap_err();

    assert!(matches!(err, SequencerError::Launch { .. }));
    assert_eq!(err.return_code(), Some(-1));
    assert_eq!(history_codes(&fs), vec![-1]);
}

#[tokio::test]
async fn test_missing_requirement_launches_nothing() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    let mut step = time_step();
    step.requires = vec!["drs4_pedestal.Run{run_id_padded}.0000.h5".to_string()];

    let result = runner(&fs, &launcher).execute(&step, &context()).await;

    match result {
        Err(SequencerError::DataUnavailable { path, code, .. }) => {
            assert_eq!(path, PathBuf::from("/data/ana/drs4_pedestal.Run01808.0000.h5"));
            assert_eq!(code, None);
        }
        other => panic!("Expected DataUnavailable error, got: {:?}", other),
    }
    assert!(launcher.invocations().is_empty());
    assert!(fs.contents(HISTORY).is_none());
}

#[tokio::test]
async fn test_verified_outputs_must_exist() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    let mut step = time_step();
    step.verify_outputs = true;

    let err = runner(&fs, &launcher)
        .execute(&step, &context())
        .await
        .unwrap_err();
    assert!(matches!(err, SequencerError::DataUnavailable { .. }));
    assert_eq!(err.return_code(), Some(1));
    assert_eq!(history_codes(&fs), vec![1]);

    // Once the program actually writes its output the step succeeds.
    let writer = fs.clone();
    launcher.on_success("lstchain_data_create_time_calibration_file", move |_| {
        writer.add_file("/data/ana/time_calibration.Run01808.0000.h5", "calib");
    });

    runner(&fs, &launcher).execute(&step, &context()).await.unwrap();
    assert_eq!(history_codes(&fs), vec![1, 0]);
}

#[tokio::test]
async fn test_plot_failure_does_not_fail_the_step() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    launcher.script("lstchain_check_time_calibration", &[Scripted::Exit(4)]);

    let mut step = time_step();
    step.plot = Some(sequencer::pipeline::CommandTemplate {
        program: "lstchain_check_time_calibration".to_string(),
        args: vec!["--input-file={time_file}".to_string()],
    });

    let success = runner(&fs, &launcher).execute(&step, &context()).await.unwrap();

    assert!(!success.fallback_used);
    assert_eq!(
        launcher.programs(),
        vec![
            "lstchain_data_create_time_calibration_file".to_string(),
            "lstchain_check_time_calibration".to_string(),
        ]
    );
    // Plots are not pipeline steps and leave no history.
    assert_eq!(history_codes(&fs), vec![0]);
}

#[tokio::test]
async fn test_unwritable_history_is_a_storage_error() {
    let fs = MockFileSystem::new();
    fs.set_read_only(true);
    let launcher = ScriptedLauncher::new();

    let result = runner(&fs, &launcher).execute(&time_step(), &context()).await;

    assert!(matches!(result, Err(SequencerError::Storage { .. })));
}
