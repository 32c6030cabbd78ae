use crate::batch::report::{BatchReport, FailureRecord, FileOutcome};
use crate::config::Config;
use crate::error::{ExtractError, Result};
use crate::extractor::{SignalExtractor, TableWriter};
use crate::scanner::{DiscoveredInput, InputScanner};
use crate::ui::GracefulShutdown;
use crate::volume::{LabelVolume, MaskVolume};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Running counters handed to the progress callback after every file.
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub files_processed: usize,
    pub total_files: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub current_file: Option<String>,
    pub start_time: Instant,
}

impl BatchProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            files_processed: 0,
            total_files,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            current_file: None,
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &FileOutcome) {
        self.files_processed += 1;
        match outcome {
            FileOutcome::Succeeded { .. } => self.succeeded += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
        self.current_file = outcome
            .input()
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
    }

    pub fn percentage(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.files_processed as f64 / self.total_files as f64) * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn estimated_remaining(&self) -> Duration {
        if self.files_processed == 0 {
            return Duration::from_secs(0);
        }

        let rate = self.files_processed as f64 / self.elapsed().as_secs_f64();
        let remaining_files = self.total_files.saturating_sub(self.files_processed);

        if rate > 0.0 && rate.is_finite() {
            Duration::from_secs_f64(remaining_files as f64 / rate)
        } else {
            Duration::from_secs(0)
        }
    }
}

pub type ProgressCallback<'a> = &'a (dyn Fn(&BatchProgress) + Sync);

/// Output name for an input scan: the file name without `.nii.gz`/`.nii`,
/// plus `suffix`, placed in `output_dir` or next to the input.
pub fn derive_output_path(input: &Path, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let stem = filename
        .strip_suffix(".nii.gz")
        .or_else(|| filename.strip_suffix(".nii"))
        .unwrap_or(&filename);

    let name = format!("{}{}", stem, suffix);
    match output_dir {
        Some(dir) => dir.join(name),
        None => input
            .parent()
            .map(|parent| parent.join(&name))
            .unwrap_or_else(|| PathBuf::from(&name)),
    }
}

#[derive(Debug)]
struct Job<'a> {
    input: &'a DiscoveredInput,
    output: PathBuf,
    duplicate: bool,
}

/// Walks a directory tree and extracts every matching scan against one
/// shared atlas and optional mask.
pub struct BatchRunner {
    scanner: InputScanner,
    extractor: SignalExtractor,
    writer: TableWriter,
    output_dir: Option<PathBuf>,
    output_suffix: String,
    skip_existing: bool,
}

impl BatchRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            scanner: InputScanner::new(&config.discovery),
            extractor: SignalExtractor::from_config(&config.extraction),
            writer: TableWriter::from_config(&config.output),
            output_dir: None,
            output_suffix: config.output.file_suffix.clone(),
            skip_existing: config.output.skip_existing,
        }
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, output_dir: Option<P>) -> Self {
        self.output_dir = output_dir.map(Into::into);
        self
    }

    pub fn discover<P: AsRef<Path>>(&self, root: P) -> Result<Vec<DiscoveredInput>> {
        self.scanner.scan_directory(root)
    }

    /// Runs the whole batch. Atlas, mask and output directory problems are
    /// fatal; anything that goes wrong with a single input is recorded in
    /// the report and the run moves on.
    pub fn run(
        &self,
        root: &Path,
        atlas_path: &Path,
        mask_path: Option<&Path>,
        shutdown: &GracefulShutdown,
        progress_callback: Option<ProgressCallback<'_>>,
    ) -> Result<BatchReport> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        shutdown.check_shutdown()?;

        self.extractor.check_transform()?;
        let atlas = self.extractor.load_atlas(atlas_path)?;
        let mask = mask_path.map(|p| self.extractor.load_mask(p)).transpose()?;

        let inputs = self.discover(root)?;
        log::info!("Found {} input(s) under {}", inputs.len(), root.display());
        log::debug!("{}", self.scanner.get_statistics(&inputs));

        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir).map_err(|e| ExtractError::write(dir, e))?;
        }

        let jobs = self.plan(&inputs);
        let (outcomes, cancelled) = self.process_jobs(
            &jobs,
            atlas_path,
            &atlas,
            mask.as_ref(),
            shutdown,
            progress_callback,
        );
        if cancelled {
            log::warn!(
                "Batch cancelled after {} of {} files",
                outcomes.len(),
                jobs.len()
            );
        }

        Ok(BatchReport {
            root: root.to_path_buf(),
            atlas: atlas_path.to_path_buf(),
            mask: mask_path.map(Path::to_path_buf),
            output_dir: self.output_dir.clone(),
            started_at,
            duration_secs: start_time.elapsed().as_secs_f64(),
            cancelled,
            outcomes,
        })
    }

    fn plan<'a>(&self, inputs: &'a [DiscoveredInput]) -> Vec<Job<'a>> {
        let mut claimed = HashSet::new();

        inputs
            .iter()
            .map(|input| {
                let output = derive_output_path(
                    &input.source_path,
                    self.output_dir.as_deref(),
                    &self.output_suffix,
                );
                let duplicate = !claimed.insert(output.clone());
                Job {
                    input,
                    output,
                    duplicate,
                }
            })
            .collect()
    }

    /// Outcomes in discovery order, and whether a stop request cut the run
    /// short.
    #[cfg(not(feature = "parallel"))]
    fn process_jobs(
        &self,
        jobs: &[Job<'_>],
        atlas_path: &Path,
        atlas: &LabelVolume,
        mask: Option<&MaskVolume>,
        shutdown: &GracefulShutdown,
        progress_callback: Option<ProgressCallback<'_>>,
    ) -> (Vec<FileOutcome>, bool) {
        let mut progress = BatchProgress::new(jobs.len());
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            if !shutdown.is_running() {
                return (outcomes, true);
            }

            let outcome = self.process_one(job, atlas_path, atlas, mask);
            progress.record(&outcome);
            if let Some(callback) = progress_callback {
                callback(&progress);
            }
            outcomes.push(outcome);
        }

        (outcomes, false)
    }

    #[cfg(feature = "parallel")]
    fn process_jobs(
        &self,
        jobs: &[Job<'_>],
        atlas_path: &Path,
        atlas: &LabelVolume,
        mask: Option<&MaskVolume>,
        shutdown: &GracefulShutdown,
        progress_callback: Option<ProgressCallback<'_>>,
    ) -> (Vec<FileOutcome>, bool) {
        use rayon::prelude::*;
        use std::sync::Mutex;

        let progress = Mutex::new(BatchProgress::new(jobs.len()));

        // Collecting an indexed parallel iterator keeps discovery order.
        let outcomes: Vec<Option<FileOutcome>> = jobs
            .par_iter()
            .map(|job| {
                if !shutdown.is_running() {
                    return None;
                }
                let outcome = self.process_one(job, atlas_path, atlas, mask);
                if let Ok(mut progress) = progress.lock() {
                    progress.record(&outcome);
                    if let Some(callback) = progress_callback {
                        callback(&progress);
                    }
                }
                Some(outcome)
            })
            .collect();

        let cancelled = outcomes.iter().any(Option::is_none);
        (outcomes.into_iter().flatten().collect(), cancelled)
    }

    fn process_one(
        &self,
        job: &Job<'_>,
        atlas_path: &Path,
        atlas: &LabelVolume,
        mask: Option<&MaskVolume>,
    ) -> FileOutcome {
        let input = &job.input.source_path;

        if job.duplicate {
            let error = ExtractError::DuplicateOutput {
                path: job.output.display().to_string(),
            };
            log::error!("{}: {}", input.display(), error);
            return FileOutcome::Failed(FailureRecord::new(input, &error));
        }

        if self.skip_existing && job.output.exists() {
            log::info!("Skipping {} ({} exists)", input.display(), job.output.display());
            return FileOutcome::Skipped {
                input: input.clone(),
                output: job.output.clone(),
            };
        }

        let result = self
            .extractor
            .extract_with_atlas(input, atlas_path, atlas, mask)
            .and_then(|series| {
                self.writer.write(&job.output, &series)?;
                Ok(series)
            });

        match result {
            Ok(series) => {
                log::info!(
                    "Wrote {} ({} time points x {} regions)",
                    job.output.display(),
                    series.n_timepoints(),
                    series.n_regions()
                );
                FileOutcome::Succeeded {
                    input: input.clone(),
                    output: job.output.clone(),
                    regions: series.n_regions(),
                    timepoints: series.n_timepoints(),
                }
            }
            Err(e) => {
                log::error!("Failed to process {}: {} ({})", input.display(), e, e.kind());
                FileOutcome::Failed(FailureRecord::new(input, &e))
            }
        }
    }
}
