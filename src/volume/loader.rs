use crate::error::{ExtractError, Result};
use crate::volume::geometry::Geometry;
use ndarray::{Array3, Array4, ArrayD, Axis, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::collections::BTreeSet;
use std::path::Path;

/// A 4D scan, indexed `[x, y, z, t]`, with intensity scaling applied.
#[derive(Debug, Clone)]
pub struct TimeSeriesVolume {
    pub data: Array4<f64>,
    pub geometry: Geometry,
}

impl TimeSeriesVolume {
    pub fn new(data: Array4<f64>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    pub fn n_timepoints(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn spatial_dims(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2]]
    }
}

/// Integer region labels on a 3D grid. Non-positive labels are background.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    pub labels: Array3<i64>,
    pub geometry: Geometry,
}

impl LabelVolume {
    pub fn new(labels: Array3<i64>, geometry: Geometry) -> Self {
        Self { labels, geometry }
    }

    /// Distinct positive labels in ascending order.
    pub fn region_labels(&self) -> Vec<i64> {
        self.labels
            .iter()
            .copied()
            .filter(|&label| label > 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn spatial_dims(&self) -> [usize; 3] {
        let (x, y, z) = self.labels.dim();
        [x, y, z]
    }
}

#[derive(Debug, Clone)]
pub struct MaskVolume {
    pub mask: Array3<bool>,
    pub geometry: Geometry,
}

impl MaskVolume {
    pub fn new(mask: Array3<bool>, geometry: Geometry) -> Self {
        Self { mask, geometry }
    }

    pub fn included_voxels(&self) -> usize {
        self.mask.iter().filter(|&&inside| inside).count()
    }

    pub fn spatial_dims(&self) -> [usize; 3] {
        let (x, y, z) = self.mask.dim();
        [x, y, z]
    }
}

pub fn load_time_series<P: AsRef<Path>>(path: P) -> Result<TimeSeriesVolume> {
    let path = path.as_ref();
    let (header, array) = read_nifti(path)?;

    let array = squeeze_trailing(array, 4);
    if array.ndim() != 4 {
        return Err(ExtractError::InputShape {
            message: format!(
                "{} must be a 4D time series, found {}D data with shape {:?}",
                path.display(),
                array.ndim(),
                array.shape()
            ),
        });
    }

    let data = array
        .into_dimensionality::<Ix4>()
        .map_err(|e| ExtractError::file_format(path, e.to_string()))?;

    let (x, y, z, t) = data.dim();
    log::debug!("Loaded {} ({}x{}x{}, {} time points)", path.display(), x, y, z, t);

    Ok(TimeSeriesVolume {
        geometry: Geometry::from_header(&header, [x, y, z]),
        data,
    })
}

pub fn load_atlas<P: AsRef<Path>>(path: P) -> Result<LabelVolume> {
    let path = path.as_ref();
    let (header, array) = read_nifti(path)?;
    let values = into_spatial(path, array, "atlas")?;

    // Labels stored as floats are snapped to the nearest integer.
    let labels = values.mapv(|v| if v.is_finite() { v.round() as i64 } else { 0 });
    let (x, y, z) = labels.dim();

    Ok(LabelVolume {
        geometry: Geometry::from_header(&header, [x, y, z]),
        labels,
    })
}

pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<MaskVolume> {
    let path = path.as_ref();
    let (header, array) = read_nifti(path)?;
    let values = into_spatial(path, array, "mask")?;

    let mask = values.mapv(|v| v.is_finite() && v != 0.0);
    let (x, y, z) = mask.dim();

    Ok(MaskVolume {
        geometry: Geometry::from_header(&header, [x, y, z]),
        mask,
    })
}

fn read_nifti(path: &Path) -> Result<(NiftiHeader, ArrayD<f64>)> {
    if !path.is_file() {
        return Err(ExtractError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| ExtractError::file_format(path, e.to_string()))?;

    let header = object.header().clone();
    let array = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| ExtractError::file_format(path, e.to_string()))?;

    Ok((header, array))
}

/// Drops trailing singleton axes beyond `ndim` (e.g. a 3D atlas stored as
/// x*y*z*1).
fn squeeze_trailing(mut array: ArrayD<f64>, ndim: usize) -> ArrayD<f64> {
    while array.ndim() > ndim && array.shape()[array.ndim() - 1] == 1 {
        let last = Axis(array.ndim() - 1);
        array = array.index_axis_move(last, 0);
    }
    array
}

fn into_spatial(path: &Path, array: ArrayD<f64>, what: &str) -> Result<Array3<f64>> {
    let array = squeeze_trailing(array, 3);
    if array.ndim() != 3 {
        return Err(ExtractError::InputShape {
            message: format!(
                "{} {} must be a 3D volume, found {}D data with shape {:?}",
                what,
                path.display(),
                array.ndim(),
                array.shape()
            ),
        });
    }

    array
        .into_dimensionality::<Ix3>()
        .map_err(|e| ExtractError::file_format(path, e.to_string()))
}
