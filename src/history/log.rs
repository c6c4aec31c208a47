// src/history/log.rs

//! In-memory view of a run's history log and the resume-level computation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{Result, SequencerError};
use crate::history::record::HistoryRecord;
use crate::pipeline::PipelineTemplate;

/// Ordered sequence of history records for one run.
///
/// Records are kept in file order, which is also wall-clock order since the
/// file is append-only.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    path: PathBuf,
    records: Vec<HistoryRecord>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>, records: Vec<HistoryRecord>) -> Self {
        Self {
            path: path.into(),
            records,
        }
    }

    /// Empty log for a run that has never been attempted.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Vec::new())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records for `step`, in log order.
    pub fn records_for<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a HistoryRecord> {
        self.records.iter().filter(move |r| r.program == step)
    }

    /// The most recent record for `step`. Later records (e.g. a successful
    /// fallback after a failed primary attempt) supersede earlier ones.
    pub fn latest_for(&self, step: &str) -> Option<&HistoryRecord> {
        self.records.iter().rev().find(|r| r.program == step)
    }

    /// Number of steps of `template` that still have to run.
    ///
    /// This is `template.len()` minus the length of the leading run of steps
    /// whose most recent record is a success. A success recorded for a step
    /// whose predecessor is not satisfied does not count.
    ///
    /// Fails with [`SequencerError::Storage`] when an earlier step's most
    /// recent record is a failure written *after* a success of a later step:
    /// such a log can only come from manual out-of-order retries and there is
    /// no safe level to resume from.
    pub fn resume_level(&self, template: &PipelineTemplate) -> Result<usize> {
        // Position of the most recent record for each known step.
        let mut latest: HashMap<&str, usize> = HashMap::new();
        // Position of the first success record for each known step.
        let mut first_success: HashMap<&str, usize> = HashMap::new();

        for (pos, record) in self.records.iter().enumerate() {
            let Some(step) = template.position_of(&record.program) else {
                debug!(
                    program = %record.program,
                    path = ?self.path,
                    "ignoring history record for a step outside the pipeline"
                );
                continue;
            };
            let name = template.steps()[step].name.as_str();
            latest.insert(name, pos);
            if record.is_success() {
                first_success.entry(name).or_insert(pos);
            }
        }

        let names: Vec<&str> = template.steps().iter().map(|s| s.name.as_str()).collect();

        for (i, earlier) in names.iter().enumerate() {
            let Some(&fail_pos) = latest.get(earlier) else {
                continue;
            };
            if self.records[fail_pos].is_success() {
                continue;
            }
            for later in &names[i + 1..] {
                if let Some(&ok_pos) = first_success.get(later) {
                    if ok_pos < fail_pos {
                        return Err(SequencerError::Storage {
                            path: self.path.clone(),
                            reason: format!(
                                "step '{earlier}' failed after later step '{later}' had succeeded; \
                                 out-of-order history needs operator intervention"
                            ),
                        });
                    }
                }
            }
        }

        let satisfied = names
            .iter()
            .take_while(|name| {
                latest
                    .get(*name)
                    .is_some_and(|&pos| self.records[pos].is_success())
            })
            .count();

        let stray: Vec<&str> = names[satisfied..]
            .iter()
            .copied()
            .filter(|name| {
                latest
                    .get(name)
                    .is_some_and(|&pos| self.records[pos].is_success())
            })
            .collect();
        if !stray.is_empty() {
            warn!(
                path = ?self.path,
                ?stray,
                "success records found for steps whose predecessors are not satisfied; they will be re-run"
            );
        }

        Ok(names.len() - satisfied)
    }
}
