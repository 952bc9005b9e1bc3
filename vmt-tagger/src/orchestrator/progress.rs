//! User-facing progress output
//!
//! The orchestrator reports through [`ProgressReporter`] instead of printing,
//! so runs can be observed in tests. Diagnostics go through `tracing`.

use super::outcome::{FileOutcome, RunSummary};
use crate::artifacts::RecordStatus;
use std::path::Path;

pub trait ProgressReporter: Send + Sync {
    /// Free-form line (mode banners, guesses, tag previews)
    fn note(&self, line: &str);

    fn file_started(&self, index: usize, total: usize, path: &Path);

    fn file_matched(&self, title: &str, year: Option<&str>, tmdb_id: Option<u64>);

    fn file_finished(&self, path: &Path, outcome: &FileOutcome);

    fn file_deferred(&self, path: &Path, message: &str);

    fn run_finished(&self, summary: &RunSummary);
}

/// Progress printed to stdout
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    /// Appended to the tally, e.g. `(dry_run=true - no files were modified)`
    footer: Option<String>,
}

impl ConsoleProgress {
    pub fn new(footer: Option<String>) -> Self {
        Self { footer }
    }
}

/// Final status line of a file, e.g. `SKIPPED no_match`
pub fn status_line(outcome: &FileOutcome) -> String {
    let label = match outcome.status {
        RecordStatus::Ok => "OK",
        RecordStatus::Skipped => "SKIPPED",
        RecordStatus::Failed => "FAILED",
    };
    format!("{} {}", label, outcome.reason)
}

/// End-of-run tally lines
pub fn tally_lines(summary: &RunSummary) -> Vec<String> {
    vec![
        format!("  Updated/Processed: {}", summary.ok),
        format!("  Skipped:           {}", summary.skipped),
        format!("  Failed:            {}", summary.failed),
    ]
}

impl ProgressReporter for ConsoleProgress {
    fn note(&self, line: &str) {
        println!("{}", line);
    }

    fn file_started(&self, index: usize, total: usize, path: &Path) {
        println!("\n[{}/{}] {}", index, total, path.display());
    }

    fn file_matched(&self, title: &str, year: Option<&str>, tmdb_id: Option<u64>) {
        match (year, tmdb_id) {
            (Some(year), Some(id)) => println!("  Matched: {} ({}) id={}", title, year, id),
            (None, Some(id)) => println!("  Matched: {} id={}", title, id),
            (Some(year), None) => println!("  Title: {} ({})", title, year),
            (None, None) => println!("  Title: {}", title),
        }
    }

    fn file_finished(&self, _path: &Path, outcome: &FileOutcome) {
        println!("  {}", status_line(outcome));
    }

    fn file_deferred(&self, _path: &Path, message: &str) {
        println!("  DEFERRED {} (will retry at end of run)", message);
    }

    fn run_finished(&self, summary: &RunSummary) {
        println!("\nDone.");
        for line in tally_lines(summary) {
            println!("{}", line);
        }
        if let Some(footer) = &self.footer {
            println!("  {}", footer);
        }
    }
}
