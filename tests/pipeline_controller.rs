// tests/pipeline_controller.rs

use std::path::PathBuf;
use std::sync::Arc;

use sequencer::config::ConfigFile;
use sequencer::errors::SequencerError;
use sequencer::exec::StepSuccess;
use sequencer::fs::mock::MockFileSystem;
use sequencer::pipeline::{Abort, PipelineState, Run, RunStatus};
use sequencer::schedule::PipelineFactory;
use sequencer_test_utils::builders::{ConfigFileBuilder, RunConfigBuilder, StepConfigBuilder};
use sequencer_test_utils::init_tracing;
use sequencer_test_utils::scripted_launcher::{Scripted, ScriptedLauncher};

const PED: &str = "lstchain_data_create_drs4_pedestal_file";
const CHARGE: &str = "lstchain_create_calibration_file";
const TIME: &str = "lstchain_data_create_time_calibration_file";

fn calibration_config() -> ConfigFile {
    ConfigFileBuilder::new("/data/ana")
        .var("pedestal_file", "drs4_pedestal.Run{run_id_padded}.0000.h5")
        .var("time_file", "time_calibration.Run{run_id_padded}.0000.h5")
        .with_step(
            StepConfigBuilder::new("drs4_pedestal", PED)
                .arg("--input-file={input.raw}")
                .arg("--output-file={pedestal_file}")
                .output("{pedestal_file}")
                .build(),
        )
        .with_step(
            StepConfigBuilder::new("charge_calibration", CHARGE)
                .arg("--input_file={input.raw}")
                .arg("--pedestal_file={pedestal_file}")
                .output("calibration.Run{run_id_padded}.0000.h5")
                .build(),
        )
        .with_step(
            StepConfigBuilder::new("time_calibration", TIME)
                .arg("--input-file={input.raw}")
                .arg("--output-file={time_file}")
                .output("{time_file}")
                .fallback(
                    1625,
                    "/data/calib",
                    "*/{prod_id}/time_calibration.Run{default_run_padded}*",
                )
                .build(),
        )
        .with_run(RunConfigBuilder::new(1808).input("raw", "/data/R0/Run01808.fits.fz").build())
        .with_run(RunConfigBuilder::new(1900).input("raw", "/data/R0/Run01900.fits.fz").build())
        .build()
}

fn factory(fs: &MockFileSystem, launcher: &ScriptedLauncher) -> PipelineFactory {
    PipelineFactory::new(
        &calibration_config(),
        Arc::new(fs.clone()),
        Arc::new(launcher.clone()),
    )
}

fn run(id: u32) -> Run {
    Run::new(id, "LST1", "v0.10").with_input("raw", format!("/data/R0/Run0{id}.fits.fz"))
}

fn history_line(run_id: u32, step: &str, rc: i32) -> String {
    format!("{run_id} {step} v0.10 Sat Oct 17 12:00:00 UTC 2026 out.h5 None {rc}\n")
}

fn history_of(fs: &MockFileSystem, run_id: u32) -> Vec<(String, i32)> {
    fs.contents(format!("/data/ana/sequence_LST1_{run_id}.history"))
        .unwrap_or_default()
        .lines()
        .map(|l| {
            let tokens: Vec<&str> = l.split_whitespace().collect();
            (tokens[1].to_string(), tokens[10].parse().unwrap())
        })
        .collect()
}

#[test]
fn test_advance_lowers_level_on_success() {
    let ok = Ok(StepSuccess {
        step: "drs4_pedestal".to_string(),
        artifacts: vec![],
        fallback_used: false,
    });

    assert_eq!(
        PipelineState::Level(3).advance("drs4_pedestal", &ok),
        PipelineState::Level(2)
    );
    assert_eq!(
        PipelineState::Level(1).advance("time_calibration", &ok),
        PipelineState::Done
    );
    assert_eq!(PipelineState::Level(0).settle(), PipelineState::Done);
    assert_eq!(
        PipelineState::Done.advance("time_calibration", &ok),
        PipelineState::Done
    );
}

#[test]
fn test_advance_aborts_on_failure() {
    let failed = Err(SequencerError::ExternalProcess {
        step: "charge_calibration".to_string(),
        code: 2,
    });

    match PipelineState::Level(2).advance("charge_calibration", &failed) {
        PipelineState::Aborted(Abort {
            step, return_code, ..
        }) => {
            assert_eq!(step.as_deref(), Some("charge_calibration"));
            assert_eq!(return_code, Some(2));
        }
        other => panic!("Expected Aborted, got: {:?}", other),
    }

    let aborted = PipelineState::Aborted(Abort::cancelled("stop"));
    assert!(aborted.is_terminal());
    assert_eq!(
        aborted.clone().advance("charge_calibration", &failed),
        aborted
    );
}

#[tokio::test]
async fn test_fresh_run_with_time_calibration_fallback_completes() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(
        "/data/calib/20260101/v0.10/time_calibration.Run01625.0000.h5",
        "reference",
    );
    let launcher = ScriptedLauncher::new();
    launcher.script(TIME, &[Scripted::Exit(1)]);

    let controller = factory(&fs, &launcher).controller_for(run(1808)).unwrap();
    assert_eq!(controller.initial_state().unwrap(), PipelineState::Level(3));

    let outcome = controller.run().await;

    assert_eq!(outcome.status, RunStatus::Done);
    assert_eq!(outcome.start_level, Some(3));
    assert_eq!(
        outcome.executed,
        vec!["drs4_pedestal", "charge_calibration", "time_calibration"]
    );
    assert_eq!(
        history_of(&fs, 1808),
        vec![
            ("drs4_pedestal".to_string(), 0),
            ("charge_calibration".to_string(), 0),
            ("time_calibration".to_string(), 1),
            ("time_calibration".to_string(), 0),
        ]
    );
    assert_eq!(
        fs.link_target("/data/ana/time_calibration.Run01808.0000.h5"),
        Some(PathBuf::from(
            "/data/calib/20260101/v0.10/time_calibration.Run01625.0000.h5"
        ))
    );
}

#[tokio::test]
async fn test_completed_run_is_not_executed_again() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    let factory = factory(&fs, &launcher);

    let first = factory.controller_for(run(1808)).unwrap().run().await;
    assert!(first.is_done());
    let launches = launcher.invocations().len();
    let history = history_of(&fs, 1808);

    let second = factory.controller_for(run(1808)).unwrap().run().await;

    assert!(second.is_done());
    assert_eq!(second.start_level, Some(0));
    assert!(second.executed.is_empty());
    assert_eq!(launcher.invocations().len(), launches);
    assert_eq!(history_of(&fs, 1808), history);
}

#[tokio::test]
async fn test_run_resumes_after_recorded_pedestal() {
    let fs = MockFileSystem::new();
    fs.add_file(
        "/data/ana/sequence_LST1_1900.history",
        history_line(1900, "drs4_pedestal", 0),
    );
    let launcher = ScriptedLauncher::new();

    let outcome = factory(&fs, &launcher)
        .controller_for(run(1900))
        .unwrap()
        .run()
        .await;

    assert!(outcome.is_done());
    assert_eq!(outcome.start_level, Some(2));
    assert_eq!(launcher.programs(), vec![CHARGE.to_string(), TIME.to_string()]);
}

#[tokio::test]
async fn test_failed_step_aborts_and_next_pass_resumes_there() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    launcher.script(CHARGE, &[Scripted::Exit(2)]);
    let factory = factory(&fs, &launcher);

    let outcome = factory.controller_for(run(1808)).unwrap().run().await;

    let abort = outcome.abort().expect("run should abort");
    assert_eq!(abort.step.as_deref(), Some("charge_calibration"));
    assert_eq!(abort.return_code, Some(2));
    assert_eq!(launcher.programs(), vec![PED.to_string(), CHARGE.to_string()]);

    let controller = factory.controller_for(run(1808)).unwrap();
    assert_eq!(controller.initial_state().unwrap(), PipelineState::Level(2));

    let retry = controller.run().await;
    assert!(retry.is_done());
    assert_eq!(retry.executed, vec!["charge_calibration", "time_calibration"]);
}

#[tokio::test]
async fn test_corrupt_history_aborts_without_launching() {
    let fs = MockFileSystem::new();
    fs.add_file("/data/ana/sequence_LST1_1808.history", "garbage\n");
    let launcher = ScriptedLauncher::new();

    let outcome = factory(&fs, &launcher)
        .controller_for(run(1808))
        .unwrap()
        .run()
        .await;

    assert!(!outcome.is_done());
    assert_eq!(outcome.start_level, None);
    assert!(launcher.invocations().is_empty());
    assert!(outcome.abort().unwrap().reason.contains("sequence_LST1_1808.history"));
}

#[tokio::test]
async fn test_missing_default_artifact_aborts_at_time_calibration() {
    let fs = MockFileSystem::new();
    let launcher = ScriptedLauncher::new();
    launcher.script(TIME, &[Scripted::Exit(1)]);

    let outcome = factory(&fs, &launcher)
        .controller_for(run(1808))
        .unwrap()
        .run()
        .await;

    let abort = outcome.abort().expect("run should abort");
    assert_eq!(abort.step.as_deref(), Some("time_calibration"));
    assert_eq!(abort.return_code, Some(1));
    assert!(abort.reason.contains("1625"));
    assert_eq!(
        history_of(&fs, 1808),
        vec![
            ("drs4_pedestal".to_string(), 0),
            ("charge_calibration".to_string(), 0),
            ("time_calibration".to_string(), 1),
        ]
    );
}
