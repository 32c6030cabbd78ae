use crate::batch::{FailureRecord, PARTIAL_FAILURE_EXIT_CODE};
use crate::config::DEFAULT_OUTPUT_SUFFIX;
use crate::error::{ExtractError, Result};
use crate::ui::GracefulShutdown;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_CONCAT_DIR: &str = "timeseries_concatenated";
const CONCAT_SUFFIX: &str = "_concatenated_timeseries.csv";
const MISSING_CELL: &str = "NaN";

#[derive(Debug, Clone, Serialize)]
pub struct SubjectConcat {
    pub subject: String,
    pub output: PathBuf,
    pub files: Vec<PathBuf>,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConcatReport {
    pub subjects: Vec<SubjectConcat>,
    pub excluded: Vec<PathBuf>,
    pub unmatched: Vec<PathBuf>,
    pub failures: Vec<FailureRecord>,
}

impl ConcatReport {
    /// Same policy as a batch run: 0 clean, 8 partial, 1 nothing written.
    pub fn exit_code(&self) -> i32 {
        if self.failures.is_empty() {
            0
        } else if self.subjects.is_empty() {
            1
        } else {
            PARTIAL_FAILURE_EXIT_CODE
        }
    }

    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Concatenation Results:\n  Subjects written: {}\n  Files excluded: {}\n  Files without subject id: {}\n  Unreadable files: {}\n",
            self.subjects.len(),
            self.excluded.len(),
            self.unmatched.len(),
            self.failures.len()
        );

        for subject in &self.subjects {
            summary.push_str(&format!(
                "    {}: {} files, {} rows x {} columns -> {}\n",
                subject.subject,
                subject.files.len(),
                subject.rows,
                subject.columns,
                subject.output.display()
            ));
        }

        for record in &self.failures {
            summary.push_str(&format!(
                "    {} [{}]: {}\n",
                record.input.display(),
                record.kind,
                record.message
            ));
        }

        summary
    }
}

/// Stitches per-run time-series tables into one table per subject.
pub struct Concatenator {
    subject_pattern: Regex,
    exclusions: Vec<(String, Regex)>,
    delimiter: u8,
}

impl Concatenator {
    pub fn new(exclude_runs: &[String]) -> Result<Self> {
        let subject_pattern = Regex::new(r"sub-[a-zA-Z0-9]+").map_err(|e| ExtractError::Config {
            message: format!("Invalid subject pattern: {}", e),
        })?;

        let exclusions = exclude_runs
            .iter()
            .map(|run| run.trim())
            .filter(|run| !run.is_empty())
            .map(|run| {
                // "run-1" must not also exclude "run-10".
                let pattern = format!(r"{}(?:[^a-zA-Z0-9]|$)", regex::escape(run));
                Regex::new(&pattern)
                    .map(|re| (run.to_string(), re))
                    .map_err(|e| ExtractError::Config {
                        message: format!("Invalid run identifier '{}': {}", run, e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            subject_pattern,
            exclusions,
            delimiter: b',',
        })
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn subject_id(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        self.subject_pattern.find(name).map(|m| m.as_str().to_string())
    }

    pub fn excluded_run(&self, path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_str()?;
        self.exclusions
            .iter()
            .find(|(_, pattern)| pattern.is_match(name))
            .map(|(run, _)| run.as_str())
    }

    /// Every `*_timeseries.csv` under `data_dir`, sorted, leaving out
    /// previously concatenated tables.
    pub fn discover(&self, data_dir: &Path) -> Result<Vec<PathBuf>> {
        if !data_dir.is_dir() {
            return Err(ExtractError::InvalidPath {
                path: data_dir.display().to_string(),
            });
        }

        let mut files: Vec<PathBuf> = WalkDir::new(data_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| {
                        name.ends_with(DEFAULT_OUTPUT_SUFFIX) && !name.ends_with(CONCAT_SUFFIX)
                    })
            })
            .collect();

        files.sort();

        if files.is_empty() {
            return Err(ExtractError::NoInputsFound {
                root: data_dir.display().to_string(),
                suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            });
        }

        Ok(files)
    }

    pub fn run(
        &self,
        data_dir: &Path,
        output_dir: &Path,
        shutdown: &GracefulShutdown,
    ) -> Result<ConcatReport> {
        shutdown.check_shutdown()?;

        let files = self.discover(data_dir)?;
        fs::create_dir_all(output_dir).map_err(|e| ExtractError::write(output_dir, e))?;

        let mut report = ConcatReport::default();
        let mut by_subject: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for file in files {
            let Some(subject) = self.subject_id(&file) else {
                log::warn!("No subject id in {}, skipping", file.display());
                report.unmatched.push(file);
                continue;
            };

            if let Some(run) = self.excluded_run(&file) {
                log::info!("Excluding {} (run {})", file.display(), run);
                report.excluded.push(file);
                continue;
            }

            by_subject.entry(subject).or_default().push(file);
        }

        log::info!("Found {} subject(s)", by_subject.len());

        for (subject, files) in by_subject {
            shutdown.check_shutdown()?;

            let mut table = MergedTable::default();
            let mut used = Vec::new();

            for file in files {
                match self.read_table(&file) {
                    Ok((header, rows)) => {
                        table.append(header, rows);
                        used.push(file);
                    }
                    Err(e) => {
                        log::error!("Error reading {}: {}", file.display(), e);
                        report.failures.push(FailureRecord::new(&file, &e));
                    }
                }
            }

            if used.is_empty() {
                log::warn!("{}: no readable tables left to concatenate", subject);
                continue;
            }

            let output = output_dir.join(format!("{}{}", subject, CONCAT_SUFFIX));
            table.write(&output, self.delimiter)?;
            log::info!(
                "Saved {} ({} rows x {} columns)",
                output.display(),
                table.rows.len(),
                table.columns.len()
            );

            report.subjects.push(SubjectConcat {
                subject,
                output,
                files: used,
                rows: table.rows.len(),
                columns: table.columns.len(),
            });
        }

        Ok(report)
    }

    fn read_table(&self, path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)?;

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;

        Ok((header, rows))
    }
}

/// Row-wise union of tables; columns keep their order of first appearance.
#[derive(Debug, Default)]
struct MergedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MergedTable {
    fn append(&mut self, header: Vec<String>, rows: Vec<Vec<String>>) {
        let positions: Vec<usize> = header
            .iter()
            .map(|name| match self.columns.iter().position(|c| c == name) {
                Some(index) => index,
                None => {
                    self.columns.push(name.clone());
                    for row in &mut self.rows {
                        row.push(MISSING_CELL.to_string());
                    }
                    self.columns.len() - 1
                }
            })
            .collect();

        for row in rows {
            let mut merged = vec![MISSING_CELL.to_string(); self.columns.len()];
            for (value, &index) in row.into_iter().zip(&positions) {
                merged[index] = value;
            }
            self.rows.push(merged);
        }
    }

    fn write(&self, path: &Path, delimiter: u8) -> Result<()> {
        let to_write_error = |e: csv::Error| {
            ExtractError::write(path, std::io::Error::new(std::io::ErrorKind::Other, e))
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .map_err(to_write_error)?;

        writer.write_record(&self.columns).map_err(to_write_error)?;
        for row in &self.rows {
            writer.write_record(row).map_err(to_write_error)?;
        }
        writer.flush().map_err(|e| ExtractError::write(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_subject_id_extraction() {
        let concat = Concatenator::new(&[]).unwrap();
        assert_eq!(
            concat.subject_id(Path::new("/d/sub-01_task-rest_run-1_cleaned_timeseries.csv")),
            Some("sub-01".to_string())
        );
        assert_eq!(
            concat.subject_id(Path::new("sub-ABC12_timeseries.csv")),
            Some("sub-ABC12".to_string())
        );
        assert_eq!(concat.subject_id(Path::new("group_timeseries.csv")), None);
    }

    #[test]
    fn test_run_exclusion_is_exact() {
        let concat = Concatenator::new(&["run-1".to_string(), " run-03 ".to_string()]).unwrap();

        assert_eq!(
            concat.excluded_run(Path::new("sub-01_run-1_cleaned_timeseries.csv")),
            Some("run-1")
        );
        assert_eq!(concat.excluded_run(Path::new("sub-01_run-10_cleaned_timeseries.csv")), None);
        assert_eq!(
            concat.excluded_run(Path::new("sub-01_run-03_timeseries.csv")),
            Some("run-03")
        );
        assert_eq!(concat.excluded_run(Path::new("sub-01_run-2_timeseries.csv")), None);
    }

    #[test]
    fn test_merged_table_union_of_columns() {
        let mut table = MergedTable::default();
        table.append(
            vec!["1".into(), "2".into()],
            vec![vec!["0.1".into(), "0.2".into()]],
        );
        table.append(
            vec!["2".into(), "3".into()],
            vec![vec!["1.2".into(), "1.3".into()]],
        );

        assert_eq!(table.columns, vec!["1", "2", "3"]);
        assert_eq!(table.rows[0], vec!["0.1", "0.2", "NaN"]);
        assert_eq!(table.rows[1], vec!["NaN", "1.2", "1.3"]);
    }

    #[test]
    fn test_run_groups_by_subject() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let out = temp_dir.path().join("out");

        write(&data.join("sub-01/sub-01_run-2_cleaned_timeseries.csv"), "1,2\n3,4\n");
        write(&data.join("sub-01/sub-01_run-1_cleaned_timeseries.csv"), "1,2\n1,2\n");
        write(&data.join("sub-01/sub-01_run-3_cleaned_timeseries.csv"), "1,2\n9,9\n");
        write(&data.join("sub-02/sub-02_run-1_cleaned_timeseries.csv"), "1,2\n5,6\n");
        write(&data.join("notes_timeseries.csv"), "1\n0\n");
        write(&data.join("old/sub-01_concatenated_timeseries.csv"), "1,2\n0,0\n");

        let concat = Concatenator::new(&["run-3".to_string()]).unwrap();
        let report = concat
            .run(&data, &out, &GracefulShutdown::new_for_test())
            .unwrap();

        assert_eq!(report.subjects.len(), 2);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.exit_code(), 0);

        let sub01 = fs::read_to_string(out.join("sub-01_concatenated_timeseries.csv")).unwrap();
        assert_eq!(sub01, "1,2\n1,2\n3,4\n");
        let sub02 = fs::read_to_string(out.join("sub-02_concatenated_timeseries.csv")).unwrap();
        assert_eq!(sub02, "1,2\n5,6\n");
    }

    #[test]
    fn test_partial_failure_exit_code() {
        let failure = FailureRecord::new(
            Path::new("sub-02_run-01_timeseries.csv"),
            &ExtractError::file_format("sub-02_run-01_timeseries.csv", "ragged rows"),
        );
        let mut report = ConcatReport {
            failures: vec![failure],
            ..ConcatReport::default()
        };
        assert_eq!(report.exit_code(), 1);

        report.subjects.push(SubjectConcat {
            subject: "sub-01".to_string(),
            output: PathBuf::from("sub-01_concatenated_timeseries.csv"),
            files: vec![PathBuf::from("sub-01_run-01_timeseries.csv")],
            rows: 5,
            columns: 2,
        });
        assert_eq!(report.exit_code(), 8);
    }

    #[test]
    fn test_no_tables_found() {
        let temp_dir = TempDir::new().unwrap();
        let concat = Concatenator::new(&[]).unwrap();
        let result = concat.run(
            temp_dir.path(),
            &temp_dir.path().join("out"),
            &GracefulShutdown::new_for_test(),
        );
        assert!(matches!(result, Err(ExtractError::NoInputsFound { .. })));
    }
}
