pub mod report;
pub mod runner;

pub use report::{
    BatchReport, FailureRecord, FileOutcome, CANCELLED_EXIT_CODE, PARTIAL_FAILURE_EXIT_CODE,
};
pub use runner::{derive_output_path, BatchProgress, BatchRunner, ProgressCallback};
