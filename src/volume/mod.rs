pub mod geometry;
pub mod loader;
pub mod resample;
pub mod transform;
pub mod writer;

pub use geometry::{Affine, Geometry};
pub use loader::{load_atlas, load_mask, load_time_series, LabelVolume, MaskVolume, TimeSeriesVolume};
pub use resample::{resample_labels, resample_mask};
pub use transform::AtlasTransform;
