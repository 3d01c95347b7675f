//! Append-only per-code report log

use crate::codes::Code;
use crate::crawler::{CodeOutcome, ScanDirection};
use crate::output::OutputResult;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Human-readable log with one line per finished engine invocation
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the line for one invocation; write failures are logged and swallowed
    pub fn append(&self, code: &Code, worker: ScanDirection, outcome: &CodeOutcome) {
        let line = format_report_line(&Local::now(), code, worker, outcome);
        if let Err(e) = self.write_line(&line) {
            tracing::error!(
                "Failed to append to report log {}: {}",
                self.path.display(),
                e
            );
        }
    }

    fn write_line(&self, line: &str) -> OutputResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Formats one report line
///
/// `YYYY-MM-DD HH:MM:SS - <code> - <worker> - <outcome> - total=<n> downloaded=<n> success=<n> failed=<n>`,
/// followed by ` - <message>` for errored invocations.
pub fn format_report_line(
    at: &DateTime<Local>,
    code: &Code,
    worker: ScanDirection,
    outcome: &CodeOutcome,
) -> String {
    let mut line = format!(
        "{} - {} - {} - {} - {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        code,
        worker,
        outcome.label(),
        outcome.counts()
    );
    if let CodeOutcome::Errored { message, .. } = outcome {
        line.push_str(" - ");
        line.push_str(message);
    }
    line
}
