use crate::error::{ExtractError, Result};
use crate::volume::transform::DEFAULT_ANTS_PROGRAM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_SUFFIX: &str = "cleaned.nii.gz";
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_timeseries.csv";
pub const DEFAULT_PRECISION: usize = 6;

/// Looked up in the working directory when no `--config` is given.
pub static CONFIG_SEARCH_PATHS: [&str; 2] = ["roi-timeseries.toml", ".roi-timeseries.toml"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub suffix: String,
    pub exclude_dirs: Vec<String>,
    pub max_depth: usize,
    pub follow_links: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub file_suffix: String,
    pub precision: usize,
    pub delimiter: char,
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub empty_region: EmptyRegionPolicy,
    pub resample_atlas: bool,
    /// ANTs transform taking the atlas into data space.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<PathBuf>,
    pub ants_program: String,
}

/// Value reported for a region with no contributing voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRegionPolicy {
    Nan,
    Zero,
}

impl EmptyRegionPolicy {
    pub fn fill_value(self) -> f64 {
        match self {
            EmptyRegionPolicy::Nan => f64::NAN,
            EmptyRegionPolicy::Zero => 0.0,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_INPUT_SUFFIX.to_string(),
            exclude_dirs: vec![],
            max_depth: 32,
            follow_links: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            precision: DEFAULT_PRECISION,
            delimiter: ',',
            skip_existing: true,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            empty_region: EmptyRegionPolicy::Nan,
            resample_atlas: false,
            transform: None,
            ants_program: DEFAULT_ANTS_PROGRAM.to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML file. Missing sections and keys fall back to defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(config_error(format!("no configuration file at {}", path.display())));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| config_error(format!("invalid TOML in {}: {}", path.display(), e)))
    }

    /// Uses `path` when given, otherwise the first of [`CONFIG_SEARCH_PATHS`]
    /// present in the working directory, otherwise built-in defaults.
    pub fn load_with_defaults<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match CONFIG_SEARCH_PATHS.iter().map(Path::new).find(|p| p.is_file()) {
            Some(found) => {
                log::debug!("Using configuration file {}", found.display());
                Self::load_from_file(found)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref suffix) = cli_args.suffix {
            self.discovery.suffix = suffix.clone();
        }

        if cli_args.force {
            self.output.skip_existing = false;
        }

        if cli_args.resample_atlas {
            self.extraction.resample_atlas = true;
        }

        if let Some(precision) = cli_args.precision {
            self.output.precision = precision;
        }

        if let Some(policy) = cli_args.empty_region {
            self.extraction.empty_region = policy;
        }

        if let Some(ref transform) = cli_args.transform {
            self.extraction.transform = Some(transform.clone());
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)
            .map_err(|e| config_error(format!("cannot serialize settings: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| config_error(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery.suffix.is_empty() {
            return Err(config_error("input filename suffix must not be empty".into()));
        }
        if self.discovery.max_depth == 0 {
            return Err(config_error("discovery.max_depth must be at least 1".into()));
        }
        if self.extraction.ants_program.trim().is_empty() {
            return Err(config_error("extraction.ants_program must not be empty".into()));
        }

        if self.output.file_suffix.is_empty()
            || self.output.file_suffix.contains(['/', '\\'])
        {
            return Err(ExtractError::Config {
                message: format!(
                    "Output file suffix must be a non-empty file name fragment: '{}'",
                    self.output.file_suffix
                ),
            });
        }

        if !(1..=17).contains(&self.output.precision) {
            return Err(ExtractError::Config {
                message: format!(
                    "Precision must be between 1 and 17 significant digits, got {}",
                    self.output.precision
                ),
            });
        }

        if !self.output.delimiter.is_ascii() || self.output.delimiter.is_ascii_alphanumeric() {
            return Err(ExtractError::Config {
                message: format!(
                    "Delimiter must be a single ASCII punctuation or whitespace character, got '{}'",
                    self.output.delimiter
                ),
            });
        }

        Ok(())
    }

    /// Delimiter as the single byte the CSV writer expects.
    pub fn delimiter_byte(&self) -> u8 {
        self.output.delimiter as u8
    }

    // The defaults rendered as TOML, for `--generate-config`.
}

fn config_error(message: String) -> ExtractError {
    ExtractError::Config { message }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub suffix: Option<String>,
    pub force: bool,
    pub resample_atlas: bool,
    pub precision: Option<usize>,
    pub empty_region: Option<EmptyRegionPolicy>,
    pub transform: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suffix(mut self, suffix: Option<String>) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_resample_atlas(mut self, resample: bool) -> Self {
        self.resample_atlas = resample;
        self
    }

    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_empty_region(mut self, policy: Option<EmptyRegionPolicy>) -> Self {
        self.empty_region = policy;
        self
    }

    pub fn with_transform(mut self, transform: Option<PathBuf>) -> Self {
        self.transform = transform;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.discovery.suffix, "cleaned.nii.gz");
        assert_eq!(config.output.file_suffix, "_timeseries.csv");
        assert_eq!(config.output.precision, 6);
        assert_eq!(config.extraction.empty_region, EmptyRegionPolicy::Nan);
        assert!(!config.extraction.resample_atlas);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.output.precision = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discovery.suffix.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.file_suffix = "../escape.csv".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.delimiter = 'x';
        assert!(config.validate().is_err());

        config.output.delimiter = '\t';
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.extraction.empty_region = EmptyRegionPolicy::Zero;
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.extraction.empty_region, EmptyRegionPolicy::Zero);
        assert_eq!(loaded_config.output.precision, config.output.precision);
    }

    #[test]
    fn test_missing_config_file() {
        let result = Config::load_from_file("/nonexistent/roi-timeseries.toml");
        assert!(matches!(result, Err(ExtractError::Config { .. })));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_force(true)
            .with_resample_atlas(true)
            .with_suffix(Some("bold.nii".to_string()))
            .with_precision(Some(8));

        config.merge_with_cli_args(&overrides);

        assert!(!config.output.skip_existing);
        assert!(config.extraction.resample_atlas);
        assert_eq!(config.discovery.suffix, "bold.nii");
        assert_eq!(config.output.precision, 8);
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_file = NamedTempFile::new().unwrap();
        Config::default().save_to_file(temp_file.path()).unwrap();

        let sample = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(sample.contains("[discovery]"));
        assert!(sample.contains("[output]"));
        assert!(sample.contains("[extraction]"));
        assert!(sample.contains("empty_region = \"nan\""));
        assert!(sample.contains("ants_program = \"antsApplyTransforms\""));
        assert!(!sample.contains("transform ="));
    }

    #[test]
    fn test_transform_override() {
        let mut config = Config::default();
        assert!(config.extraction.transform.is_none());

        let overrides =
            CliOverrides::new().with_transform(Some(PathBuf::from("atlas_to_bold.mat")));
        config.merge_with_cli_args(&overrides);
        assert_eq!(
            config.extraction.transform.as_deref(),
            Some(Path::new("atlas_to_bold.mat"))
        );

        config.extraction.ants_program = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
