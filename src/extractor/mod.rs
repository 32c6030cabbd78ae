pub mod signal_extractor;
pub mod table_writer;

pub use signal_extractor::{extract_region_means, extract_region_means_for, RegionTimeSeries, SignalExtractor};
pub use table_writer::{format_significant, TableWriter};
