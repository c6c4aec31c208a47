// tests/resume_property.rs

use chrono::Utc;
use proptest::prelude::*;
use sequencer::history::{HistoryLog, HistoryRecord};
use sequencer::pipeline::{PipelineTemplate, StepDefinition};

fn template(n: usize) -> PipelineTemplate {
    PipelineTemplate::new(
        (0..n)
            .map(|i| StepDefinition::new(format!("step_{i}"), "true"))
            .collect(),
    )
}

fn record(step: usize, rc: i32) -> HistoryRecord {
    HistoryRecord {
        run_id: 1808,
        program: format!("step_{step}"),
        prod_id: "v0.10".to_string(),
        timestamp: Utc::now(),
        input_artifact: "out.h5".to_string(),
        config_reference: None,
        return_code: rc,
    }
}

proptest! {
    // Each pass resumes at the computed level and runs until the first
    // failure, the way the controller does.
    #[test]
    fn resume_level_tracks_passes_and_never_increases(
        n in 1..6usize,
        passes in proptest::collection::vec(proptest::option::of(0..6usize), 1..8),
        codes in proptest::collection::vec(1..255i32, 8),
    ) {
        let tpl = template(n);
        let mut records = Vec::new();
        let mut level = n;

        for (pass, fail_at) in passes.into_iter().enumerate() {
            let log = HistoryLog::new("/h", records.clone());
            prop_assert_eq!(log.resume_level(&tpl).unwrap(), level);
            if level == 0 {
                break;
            }

            let start = n - level;
            let new_level = match fail_at {
                Some(f) if f >= start && f < n => {
                    for s in start..f {
                        records.push(record(s, 0));
                    }
                    records.push(record(f, codes[pass % codes.len()]));
                    n - f
                }
                _ => {
                    for s in start..n {
                        records.push(record(s, 0));
                    }
                    0
                }
            };

            prop_assert!(new_level <= level);
            level = new_level;
        }

        let log = HistoryLog::new("/h", records);
        prop_assert_eq!(log.resume_level(&tpl).unwrap(), level);
    }

    #[test]
    fn resume_level_is_bounded_by_step_count(
        n in 1..6usize,
        raw in proptest::collection::vec((0..6usize, any::<bool>()), 0..12),
    ) {
        let tpl = template(n);
        let records: Vec<HistoryRecord> = raw
            .into_iter()
            .map(|(s, ok)| record(s % n, if ok { 0 } else { 1 }))
            .collect();
        let log = HistoryLog::new("/h", records);

        // Arbitrary logs may be rejected as out of order, never mis-levelled.
        if let Ok(level) = log.resume_level(&tpl) {
            prop_assert!(level <= n);
        }
    }
}
