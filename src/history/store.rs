// src/history/store.rs

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, SequencerError};
use crate::fs::FileSystem;
use crate::history::log::HistoryLog;
use crate::history::record::HistoryRecord;

/// Reads and appends per-run history logs through a [`FileSystem`].
///
/// The store holds no per-run state: each run's log is addressed by its path,
/// and the single controller working on a run is the only writer.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    fs: Arc<dyn FileSystem>,
}

impl HistoryStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Load the log at `path`.
    ///
    /// A missing file is a fresh run and yields an empty log. A file that
    /// exists but cannot be read, or that contains a malformed line, is a
    /// storage error: guessing would risk skipping or repeating steps.
    pub fn load(&self, path: &Path) -> Result<HistoryLog> {
        let present = self
            .fs
            .try_exists(path)
            .map_err(|e| SequencerError::Storage {
                path: path.to_path_buf(),
                reason: format!("unreadable: {e:#}"),
            })?;
        if !present {
            debug!(path = ?path, "no history log yet; starting fresh");
            return Ok(HistoryLog::empty(path));
        }

        let contents = self
            .fs
            .read_to_string(path)
            .map_err(|e| SequencerError::Storage {
                path: path.to_path_buf(),
                reason: format!("unreadable: {e:#}"),
            })?;

        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record =
                HistoryRecord::parse_line(line).map_err(|reason| SequencerError::Storage {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {reason}", idx + 1),
                })?;
            records.push(record);
        }

        debug!(path = ?path, records = records.len(), "loaded history log");
        Ok(HistoryLog::new(path, records))
    }

    /// Durably append one record to the log at `path`.
    pub fn append(&self, path: &Path, record: &HistoryRecord) -> Result<()> {
        self.fs
            .append_line(path, &record.to_string())
            .map_err(|e| SequencerError::Storage {
                path: path.to_path_buf(),
                reason: format!("append failed: {e:#}"),
            })?;

        debug!(
            path = ?path,
            step = %record.program,
            return_code = record.return_code,
            "appended history record"
        );
        Ok(())
    }
}
