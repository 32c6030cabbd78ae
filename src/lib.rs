pub mod batch;
pub mod cli;
pub mod concat;
pub mod config;
pub mod error;
pub mod extractor;
pub mod scanner;
pub mod ui;
pub mod volume;

pub use cli::{BatchCli, CommonArgs, ConcatCli, ExtractCli, OutputFormat};
pub use config::{CliOverrides, Config, EmptyRegionPolicy};
pub use error::{ExtractError, Result, UserFriendlyError};

pub use batch::{derive_output_path, BatchReport, BatchRunner, FailureRecord, FileOutcome};
pub use concat::{ConcatReport, Concatenator};
pub use extractor::{extract_region_means, RegionTimeSeries, SignalExtractor, TableWriter};
pub use scanner::{DiscoveredInput, InputScanner};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};
pub use volume::{load_atlas, load_mask, load_time_series, LabelVolume, MaskVolume, TimeSeriesVolume};

use std::path::Path;
use std::time::Instant;

/// Front-end facade shared by the three binaries: configuration, user
/// output, progress bars and Ctrl+C handling around the library calls.
pub struct RoiTimeseries {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl RoiTimeseries {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        // Progress bars would corrupt JSON on stdout.
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        })
    }

    /// Create an instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
        }
    }

    pub fn from_common(common: &CommonArgs, config: Config) -> Result<Self> {
        Self::new(
            config,
            common.output_mode(),
            common.verbosity_level(),
            common.quiet,
        )
    }

    /// Extracts one volume and writes its table to `output`.
    pub fn run_single(
        &self,
        input: &Path,
        atlas: &Path,
        output: &Path,
        mask: Option<&Path>,
    ) -> Result<RegionTimeSeries> {
        self.output_formatter
            .start_operation(&format!("Extracting {}", input.display()));

        let extractor = SignalExtractor::from_config(&self.config.extraction);
        let writer = TableWriter::from_config(&self.config.output);

        let spinner = self.progress_manager.create_spinner("Loading volumes");
        let start = Instant::now();

        let result = self.shutdown.with_shutdown_check(|| {
            let series = extractor.extract_paths(input, atlas, mask)?;
            spinner.set_message("Writing table");
            writer.write(output, &series)?;
            Ok(series)
        });

        match &result {
            Ok(_) => ui::finish_progress_with_summary(&spinner, "Done", start.elapsed()),
            Err(_) => spinner.finish_and_clear(),
        }

        let series = result?;
        self.output_formatter.print_extraction_result(&series, output);
        Ok(series)
    }

    /// Runs a batch and prints its summary, then writes the JSON report when
    /// `report_path` is given.
    pub fn run_batch(
        &self,
        root: &Path,
        atlas: &Path,
        mask: Option<&Path>,
        output_dir: Option<&Path>,
        report_path: Option<&Path>,
    ) -> Result<BatchReport> {
        self.output_formatter
            .start_operation(&format!("Batch extraction under {}", root.display()));

        let runner = BatchRunner::new(&self.config).with_output_dir(output_dir);

        let file_progress = self.progress_manager.create_file_progress(0);
        let progress_callback = {
            let pb = file_progress.clone();
            move |progress: &batch::BatchProgress| {
                pb.set_length(progress.total_files as u64);
                ui::update_file_progress(&pb, progress);
            }
        };

        let result = runner.run(root, atlas, mask, &self.shutdown, Some(&progress_callback));

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                file_progress.abandon();
                return Err(e);
            }
        };

        ui::finish_progress_with_summary(
            &file_progress,
            &format!("Processed {} scans", report.outcomes.len()),
            std::time::Duration::from_secs_f64(report.duration_secs.max(0.0)),
        );

        self.output_formatter.print_batch_summary(&report);

        // The scans are done; a report that cannot be written does not
        // change the batch outcome.
        if let Some(path) = report_path {
            match report.save_json(path) {
                Ok(()) => self
                    .output_formatter
                    .info(&format!("Report written to {}", path.display())),
                Err(e) => self
                    .output_formatter
                    .warning(&format!("Could not write report: {}", e.user_message())),
            }
        }

        Ok(report)
    }

    pub fn run_concat(
        &self,
        data_dir: &Path,
        output_dir: &Path,
        exclude_runs: &[String],
    ) -> Result<ConcatReport> {
        self.output_formatter
            .start_operation(&format!("Concatenating tables under {}", data_dir.display()));

        let concatenator =
            Concatenator::new(exclude_runs)?.with_delimiter(self.config.delimiter_byte());
        let report = concatenator.run(data_dir, output_dir, &self.shutdown)?;

        self.output_formatter.print_concat_summary(&report);
        Ok(report)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        Config::default().save_to_file(output_path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &ExtractError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// `--generate-config`: writes the sample TOML and explains how to use it.
pub fn handle_generate_config(common: &CommonArgs, usage: &str) -> i32 {
    let config_path = common.config_target();

    match RoiTimeseries::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path.display());
            println!("Pass it back with: {} --config {}", usage, config_path.display());
            0
        }
        Err(e) => {
            eprintln!("Could not write {}: {}", config_path.display(), e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

/// Reports an error raised before the facade exists (bad config, signal
/// handler setup) and returns the exit code for it.
pub fn print_startup_error(common: &CommonArgs, error: &ExtractError) -> i32 {
    let formatter = OutputFormatter::new(common.output_mode(), 0, false);
    formatter.print_user_friendly_error(error);
    error.exit_code()
}

/// Initialises `env_logger` on stderr. `-v` raises the level, `RUST_LOG`
/// takes precedence when set.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Off,
        (false, 0) => log::LevelFilter::Error,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}
