// src/history/record.rs

//! One line of a run's history log.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::types::RunId;

/// `Sat Oct 17 21:04:11 UTC 2026`: close to `%c` but with an explicit zone.
pub const TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S UTC %Y";

const TIMESTAMP_TOKENS: usize = 5;
/// run, program, prod id, <timestamp>, input, config, return code.
const LINE_TOKENS: usize = 6 + TIMESTAMP_TOKENS;

/// Placeholder written for an absent field, so every line keeps the same
/// number of tokens.
const NONE_FIELD: &str = "None";

/// Outcome of a single step attempt, as persisted in the history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub run_id: RunId,
    /// Step name (the "program" column).
    pub program: String,
    pub prod_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_artifact: String,
    pub config_reference: Option<String>,
    pub return_code: i32,
}

impl HistoryRecord {
    /// Build a record stamped with the current time (second resolution, like
    /// the on-disk format).
    pub fn new(
        run_id: RunId,
        program: impl Into<String>,
        prod_id: impl Into<String>,
        input_artifact: impl Into<String>,
        config_reference: Option<String>,
        return_code: i32,
    ) -> Self {
        let now = Utc::now();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        Self {
            run_id,
            program: program.into(),
            prod_id: prod_id.into(),
            timestamp,
            input_artifact: input_artifact.into(),
            config_reference,
            return_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// Parse one history line.
    ///
    /// The error string describes what was wrong with the line; callers wrap
    /// it into a storage error together with the file path.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != LINE_TOKENS {
            return Err(format!(
                "expected {LINE_TOKENS} fields, found {}",
                tokens.len()
            ));
        }

        let run_id = tokens[0]
            .parse::<RunId>()
            .map_err(|e| format!("invalid run id '{}': {e}", tokens[0]))?;

        let ts_str = tokens[3..3 + TIMESTAMP_TOKENS].join(" ");
        let timestamp = NaiveDateTime::parse_from_str(&ts_str, TIMESTAMP_FORMAT)
            .map_err(|e| format!("invalid timestamp '{ts_str}': {e}"))?
            .and_utc();

        let rest = &tokens[3 + TIMESTAMP_TOKENS..];
        let return_code = rest[2]
            .parse::<i32>()
            .map_err(|e| format!("invalid return code '{}': {e}", rest[2]))?;

        let config_reference = match rest[1] {
            NONE_FIELD => None,
            other => Some(other.to_string()),
        };

        Ok(Self {
            run_id,
            program: tokens[1].to_string(),
            prod_id: tokens[2].to_string(),
            timestamp,
            input_artifact: rest[0].to_string(),
            config_reference,
            return_code,
        })
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.run_id,
            field(&self.program),
            field(&self.prod_id),
            self.timestamp.format(TIMESTAMP_FORMAT),
            field(&self.input_artifact),
            field(self.config_reference.as_deref().unwrap_or("")),
            self.return_code,
        )
    }
}

/// Keep each field a single whitespace-free token.
fn field(value: &str) -> String {
    if value.is_empty() {
        return NONE_FIELD.to_string();
    }
    value
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
