use crate::error::{ExtractError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Some inputs failed, others succeeded or were skipped. Kept clear of 2,
/// which clap uses for usage errors.
pub const PARTIAL_FAILURE_EXIT_CODE: i32 = 8;

/// Same status the signal handler uses for a forced exit.
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Why one input produced no table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub input: PathBuf,
    pub kind: String,
    pub message: String,
}

impl FailureRecord {
    pub fn new(input: &Path, error: &ExtractError) -> Self {
        Self {
            input: input.to_path_buf(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Succeeded {
        input: PathBuf,
        output: PathBuf,
        regions: usize,
        timepoints: usize,
    },
    Skipped {
        input: PathBuf,
        output: PathBuf,
    },
    Failed(FailureRecord),
}

impl FileOutcome {
    pub fn input(&self) -> &Path {
        match self {
            FileOutcome::Succeeded { input, .. } | FileOutcome::Skipped { input, .. } => input,
            FileOutcome::Failed(record) => &record.input,
        }
    }
}

/// Result of a batch run, one outcome per discovered input in discovery
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub root: PathBuf,
    pub atlas: PathBuf,
    pub mask: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Set when Ctrl+C stopped the run; `outcomes` then covers only the
    /// inputs handled before the stop.
    #[serde(default)]
    pub cancelled: bool,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Succeeded { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileOutcome::Skipped { .. }))
            .count()
    }

    pub fn failures(&self) -> Vec<&FailureRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Failed(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.failures().len()
    }

    /// 130 for an interrupted run, otherwise 0 when nothing failed, 1 when
    /// nothing succeeded or was skipped, 8 for a partial failure.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            CANCELLED_EXIT_CODE
        } else if self.failed() == 0 {
            0
        } else if self.succeeded() + self.skipped() == 0 {
            1
        } else {
            PARTIAL_FAILURE_EXIT_CODE
        }
    }

    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Batch Results:\n  Processed: {}\n  Succeeded: {}\n  Skipped: {}\n  Failed: {}\n",
            self.outcomes.len(),
            self.succeeded(),
            self.skipped(),
            self.failed()
        );
        if self.cancelled {
            summary.push_str("  Cancelled: remaining inputs were not processed\n");
        }

        let failures = self.failures();
        if !failures.is_empty() {
            summary.push_str("  Failures:\n");
            for record in failures {
                summary.push_str(&format!(
                    "    {} [{}]: {}\n",
                    record.input.display(),
                    record.kind,
                    record.message
                ));
            }
        }

        summary
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ExtractError::write(path, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        fs::write(path, json).map_err(|e| ExtractError::write(path, e))
    }
}
