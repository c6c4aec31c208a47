// src/pipeline/placeholder.rs

//! `{name}` placeholder expansion for command, path and pattern templates.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{Result, SequencerError};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("placeholder pattern is a valid regex")
});

/// Builtin placeholders every run context provides.
pub const BUILTINS: &[&str] = &[
    "run_id",
    "run_id_padded",
    "tel_id",
    "prod_id",
    "directory",
    "history_file",
];

/// Prefix for per-run input artifacts, e.g. `{input.raw}`.
pub const INPUT_PREFIX: &str = "input.";

/// Names of all placeholders used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// Replace every placeholder using `lookup`.
///
/// Text outside placeholders is copied verbatim, so glob syntax such as
/// `{a,b}` (which the placeholder grammar cannot match) passes through.
pub fn render<F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(name.as_str()).ok_or_else(|| {
            SequencerError::ConfigError(format!(
                "unknown placeholder '{{{}}}' in template '{}'",
                name.as_str(),
                template
            ))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}
