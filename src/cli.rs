use crate::concat::DEFAULT_CONCAT_DIR;
use crate::config::{CliOverrides, Config, EmptyRegionPolicy};
use crate::error::{ExtractError, Result};
use crate::ui::OutputMode;
use clap::{Args, Parser, ValueEnum};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "roi-timeseries.toml";

/// Flags shared by every front end.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors and the failure list are printed)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Generate sample configuration file
    #[arg(long, help = "Write a sample configuration file and exit")]
    pub generate_config: bool,
}

impl CommonArgs {
    pub fn output_mode(&self) -> OutputMode {
        match self.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Where `--generate-config` writes to.
    pub fn config_target(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load_config(&self, overrides: &CliOverrides) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;
        config.merge_with_cli_args(overrides);
        config.validate()?;
        Ok(config)
    }
}

/// Extraction knobs shared by `extract` and `batch_extract`.
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractionArgs {
    /// Binary brain mask; voxels outside it are ignored
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Resample the atlas onto the data grid (nearest neighbour) when their geometry differs
    #[arg(long)]
    pub resample_atlas: bool,

    /// ANTs transform (affine .mat or warp) applied to the atlas with antsApplyTransforms
    #[arg(long, value_name = "FILE")]
    pub transform: Option<PathBuf>,

    /// Value written for regions with no voxels left after masking
    #[arg(long, value_enum)]
    pub empty_region: Option<EmptyRegion>,

    /// Significant digits written per value
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=17))]
    pub precision: Option<u16>,
}

impl ExtractionArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_resample_atlas(self.resample_atlas)
            .with_empty_region(self.empty_region.map(EmptyRegion::policy))
            .with_precision(self.precision.map(usize::from))
            .with_transform(self.transform.clone())
    }
}

#[derive(Parser, Debug)]
#[command(name = "extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract mean ROI time series from a 4D NIfTI volume")]
#[command(
    long_about = "Averages the signal of every atlas region at every time point of a 4D \
                  NIfTI volume and writes a CSV with one row per time point and one \
                  column per region label (ascending)."
)]
#[command(after_help = "EXAMPLES:\n  \
    extract sub-01_cleaned.nii.gz atlas.nii.gz sub-01_timeseries.csv\n  \
    extract sub-01_cleaned.nii.gz atlas.nii.gz out.csv --mask brain_mask.nii.gz\n  \
    extract bold.nii atlas_2mm.nii.gz out.csv --resample-atlas -v\n  \
    extract bold.nii.gz atlas_mni.nii.gz out.csv --transform mni_to_bold0GenericAffine.mat")]
#[command(arg_required_else_help = true)]
pub struct ExtractCli {
    /// 4D time series (.nii or .nii.gz)
    #[arg(required_unless_present = "generate_config")]
    pub input: Option<PathBuf>,

    /// 3D integer label atlas
    #[arg(required_unless_present = "generate_config")]
    pub atlas: Option<PathBuf>,

    /// Destination CSV; its directory must exist
    #[arg(required_unless_present = "generate_config")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub extraction: ExtractionArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ExtractCli {
    pub fn create_cli_overrides(&self) -> CliOverrides {
        self.extraction.overrides()
    }

    pub fn load_config(&self) -> Result<Config> {
        self.common.load_config(&self.create_cli_overrides())
    }

    pub fn paths(&self) -> Result<(&Path, &Path, &Path)> {
        Ok((
            required(&self.input, "input")?,
            required(&self.atlas, "atlas")?,
            required(&self.output, "output")?,
        ))
    }
}

#[derive(Parser, Debug)]
#[command(name = "batch_extract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract ROI time series for every matching scan under a directory")]
#[command(
    long_about = "Recursively finds files ending in the configured suffix (default \
                  'cleaned.nii.gz'), extracts region means for each against one shared \
                  atlas and writes '<name>_timeseries.csv' next to each input or into \
                  --output_dir. A failing scan is reported and the batch continues.\n\n\
                  Exit status: 0 all succeeded or skipped, 8 some failed, 1 all failed, \
                  130 interrupted."
)]
#[command(after_help = "EXAMPLES:\n  \
    batch_extract /data/derivatives atlas.nii.gz\n  \
    batch_extract /data/derivatives atlas.nii.gz --output_dir results --mask mask.nii.gz\n  \
    batch_extract /data atlas.nii.gz --suffix _bold.nii.gz --force --report report.json")]
#[command(arg_required_else_help = true)]
pub struct BatchCli {
    /// Root directory searched recursively
    #[arg(required_unless_present = "generate_config")]
    pub root_data_dir: Option<PathBuf>,

    /// 3D integer label atlas used for every scan
    #[arg(required_unless_present = "generate_config")]
    pub atlas_path: Option<PathBuf>,

    /// Common destination folder (created if missing)
    #[arg(long = "output_dir", visible_alias = "output-dir", short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Input filename suffix to match (case-sensitive)
    #[arg(long)]
    pub suffix: Option<String>,

    /// Recompute outputs that already exist
    #[arg(short, long)]
    pub force: bool,

    /// Also write the batch report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub extraction: ExtractionArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl BatchCli {
    pub fn create_cli_overrides(&self) -> CliOverrides {
        self.extraction
            .overrides()
            .with_suffix(self.suffix.clone())
            .with_force(self.force)
    }

    pub fn load_config(&self) -> Result<Config> {
        self.common.load_config(&self.create_cli_overrides())
    }

    pub fn paths(&self) -> Result<(&Path, &Path)> {
        Ok((
            required(&self.root_data_dir, "root_data_dir")?,
            required(&self.atlas_path, "atlas_path")?,
        ))
    }
}

#[derive(Parser, Debug)]
#[command(name = "concat_timeseries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concatenate per-run time-series CSVs into one table per subject")]
#[command(after_help = "EXAMPLES:\n  \
    concat_timeseries /data/derivatives\n  \
    concat_timeseries /data/derivatives --output_dir concat --exclude-runs run-01,run-03")]
#[command(arg_required_else_help = true)]
pub struct ConcatCli {
    /// Root directory containing *_timeseries.csv files
    #[arg(required_unless_present = "generate_config")]
    pub data_dir: Option<PathBuf>,

    /// Directory for <sub>_concatenated_timeseries.csv files
    #[arg(long = "output_dir", visible_alias = "output-dir", short = 'o', default_value = DEFAULT_CONCAT_DIR)]
    pub output_dir: PathBuf,

    /// Comma-separated run identifiers to leave out (e.g. run-01,run-03)
    #[arg(long, value_delimiter = ',')]
    pub exclude_runs: Vec<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ConcatCli {
    pub fn load_config(&self) -> Result<Config> {
        self.common.load_config(&CliOverrides::new())
    }

    pub fn data_dir(&self) -> Result<&Path> {
        required(&self.data_dir, "data_dir")
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum EmptyRegion {
    /// Write NaN
    Nan,
    /// Write 0
    Zero,
}

impl EmptyRegion {
    pub fn policy(self) -> EmptyRegionPolicy {
        match self {
            EmptyRegion::Nan => EmptyRegionPolicy::Nan,
            EmptyRegion::Zero => EmptyRegionPolicy::Zero,
        }
    }
}

fn required<'a>(value: &'a Option<PathBuf>, name: &str) -> Result<&'a Path> {
    value.as_deref().ok_or_else(|| ExtractError::Config {
        message: format!("Missing required argument <{}>", name),
    })
}
