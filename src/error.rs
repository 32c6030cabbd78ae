use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Cannot parse {path} as NIfTI: {message}")]
    FileFormat { path: String, message: String },

    #[error("Input file not found: {path}")]
    MissingInput { path: String },

    #[error("Shape mismatch: {message}")]
    InputShape { message: String },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Atlas contains no non-background labels: {path}")]
    NoRegionsFound { path: String },

    #[error("No files ending in '{suffix}' found under {root}")]
    NoInputsFound { root: String, suffix: String },

    #[error("Atlas registration failed: {message}")]
    Registration { message: String },

    #[error("Output path already claimed by another input: {path}")]
    DuplicateOutput { path: String },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

impl ExtractError {
    pub fn file_format<P: AsRef<Path>>(path: P, message: impl Into<String>) -> Self {
        ExtractError::FileFormat {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn write<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        ExtractError::Write {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Stable name of the error kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::FileFormat { .. } => "FileFormatError",
            ExtractError::MissingInput { .. } => "MissingInputError",
            ExtractError::InputShape { .. } => "InputShapeError",
            ExtractError::Write { .. } => "WriteError",
            ExtractError::NoRegionsFound { .. } => "NoRegionsFoundError",
            ExtractError::NoInputsFound { .. } => "NoInputsFoundError",
            ExtractError::Registration { .. } => "RegistrationError",
            ExtractError::DuplicateOutput { .. } => "DuplicateOutputError",
            ExtractError::Io(_) => "IoError",
            ExtractError::Csv(_) => "CsvError",
            ExtractError::Config { .. } => "ConfigError",
            ExtractError::InvalidPath { .. } => "InvalidPathError",
            ExtractError::Cancelled => "Cancelled",
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::Cancelled => 130, // Interrupted (SIGINT)
            ExtractError::FileFormat { .. } | ExtractError::MissingInput { .. } => 3,
            ExtractError::InputShape { .. } => 4,
            ExtractError::Write { .. } => 5,
            ExtractError::NoRegionsFound { .. } => 6,
            ExtractError::NoInputsFound { .. } => 7,
            ExtractError::Registration { .. } => 9,
            _ => 1,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ExtractError {
    fn user_message(&self) -> String {
        match self {
            ExtractError::FileFormat { path, message } => {
                format!("Could not read {} as a NIfTI image: {}", path, message)
            }
            ExtractError::MissingInput { path } => {
                format!("Input file not found: {}", path)
            }
            ExtractError::InputShape { message } => {
                format!("Input geometry mismatch: {}", message)
            }
            ExtractError::Write { path, source } => {
                format!("Failed to write {}: {}", path, source)
            }
            ExtractError::NoRegionsFound { path } => {
                format!("Atlas {} has no labelled regions (only background)", path)
            }
            ExtractError::NoInputsFound { root, suffix } => {
                format!("No files ending in '{}' found under {}", suffix, root)
            }
            ExtractError::DuplicateOutput { path } => {
                format!("Another input already writes to {}", path)
            }
            ExtractError::Registration { message } => {
                format!("Could not align the atlas to the data: {}", message)
            }
            ExtractError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            ExtractError::InvalidPath { path } => {
                format!("Invalid path: {}", path)
            }
            ExtractError::Cancelled => "Operation was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ExtractError::FileFormat { .. } => Some(
                "Check that the file is a valid, uncorrupted NIfTI-1 image (.nii or .nii.gz).".to_string()
            ),
            ExtractError::MissingInput { .. } => Some(
                "Verify the path is spelled correctly and the file is readable.".to_string()
            ),
            ExtractError::InputShape { .. } => Some(
                "Make sure the atlas and mask are in the same space as the 4D data, or pass --resample-atlas to resample the atlas onto the data grid.".to_string()
            ),
            ExtractError::Write { .. } => Some(
                "Ensure the destination directory exists and you have write permission.".to_string()
            ),
            ExtractError::NoRegionsFound { .. } => Some(
                "The atlas must contain at least one voxel with a positive integer label.".to_string()
            ),
            ExtractError::NoInputsFound { .. } => Some(
                "Check the root directory, or change the filename suffix with --suffix.".to_string()
            ),
            ExtractError::Registration { .. } => Some(
                "Install ANTs so that antsApplyTransforms is on PATH (or set extraction.ants_program), and check that --transform maps atlas space to the data.".to_string()
            ),
            ExtractError::DuplicateOutput { .. } => Some(
                "Inputs with identical file names cannot share one --output_dir. Omit --output_dir to write next to each input.".to_string()
            ),
            ExtractError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all values are in range.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ExtractError {
    fn from(error: toml::de::Error) -> Self {
        ExtractError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
