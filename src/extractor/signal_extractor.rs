use crate::config::{EmptyRegionPolicy, ExtractionConfig};
use crate::error::{ExtractError, Result};
use crate::volume::{self, AtlasTransform, LabelVolume, MaskVolume, TimeSeriesVolume};
use ndarray::{s, Array2, ArrayView1};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

/// Mean signal per region per time point.
///
/// `values` has one row per time point (temporal order) and one column per
/// entry of `labels` (ascending).
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTimeSeries {
    pub labels: Vec<i64>,
    pub values: Array2<f64>,
    pub voxel_counts: Vec<usize>,
}

impl RegionTimeSeries {
    pub fn n_timepoints(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_regions(&self) -> usize {
        self.labels.len()
    }

    pub fn column(&self, label: i64) -> Option<ArrayView1<'_, f64>> {
        let index = self.labels.iter().position(|&l| l == label)?;
        Some(self.values.column(index))
    }

    /// Labels of regions that had no voxels left to average.
    pub fn empty_regions(&self) -> Vec<i64> {
        self.labels
            .iter()
            .zip(&self.voxel_counts)
            .filter(|(_, count)| **count == 0)
            .map(|(&label, _)| label)
            .collect()
    }
}

/// Region means over every positive label present in `atlas`.
pub fn extract_region_means(
    volume: &TimeSeriesVolume,
    atlas: &LabelVolume,
    mask: Option<&MaskVolume>,
    policy: EmptyRegionPolicy,
) -> Result<RegionTimeSeries> {
    let labels = atlas.region_labels();
    extract_region_means_for(volume, atlas, mask, &labels, policy)
}

/// Region means for an explicit, ascending list of labels. Labels that have
/// no voxels in `atlas` (after masking) are filled according to `policy`.
pub fn extract_region_means_for(
    volume: &TimeSeriesVolume,
    atlas: &LabelVolume,
    mask: Option<&MaskVolume>,
    labels: &[i64],
    policy: EmptyRegionPolicy,
) -> Result<RegionTimeSeries> {
    check_shapes(volume, atlas, mask)?;

    if labels.is_empty() {
        return Err(ExtractError::NoRegionsFound {
            path: "atlas".to_string(),
        });
    }

    let columns: HashMap<i64, usize> = labels
        .iter()
        .enumerate()
        .map(|(index, &label)| (label, index))
        .collect();

    let n_timepoints = volume.n_timepoints();
    let mut sums = Array2::<f64>::zeros((n_timepoints, labels.len()));
    let mut voxel_counts = vec![0usize; labels.len()];

    for ((x, y, z), &label) in atlas.labels.indexed_iter() {
        if label <= 0 {
            continue;
        }
        if let Some(mask) = mask {
            if !mask.mask[[x, y, z]] {
                continue;
            }
        }
        let Some(&column) = columns.get(&label) else {
            continue;
        };

        voxel_counts[column] += 1;
        let series = volume.data.slice(s![x, y, z, ..]);
        let mut target = sums.column_mut(column);
        target += &series;
    }

    let fill = policy.fill_value();
    for (column, &count) in voxel_counts.iter().enumerate() {
        let mut values = sums.column_mut(column);
        if count == 0 {
            values.fill(fill);
        } else {
            values /= count as f64;
        }
    }

    Ok(RegionTimeSeries {
        labels: labels.to_vec(),
        values: sums,
        voxel_counts,
    })
}

fn check_shapes(
    volume: &TimeSeriesVolume,
    atlas: &LabelVolume,
    mask: Option<&MaskVolume>,
) -> Result<()> {
    let volume_dims = volume.spatial_dims();
    let atlas_dims = atlas.spatial_dims();

    if volume_dims != atlas_dims {
        return Err(ExtractError::InputShape {
            message: format!(
                "atlas is {:?} but the 4D volume is {:?} spatially",
                atlas_dims, volume_dims
            ),
        });
    }

    if let Some(mask) = mask {
        let mask_dims = mask.spatial_dims();
        if mask_dims != atlas_dims {
            return Err(ExtractError::InputShape {
                message: format!("mask is {:?} but the atlas is {:?}", mask_dims, atlas_dims),
            });
        }
    }

    Ok(())
}

/// Loads inputs from disk and runs the extraction with a fixed policy.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    policy: EmptyRegionPolicy,
    resample_atlas: bool,
    transform: Option<AtlasTransform>,
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self {
            policy: EmptyRegionPolicy::Nan,
            resample_atlas: false,
            transform: None,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        let transform = config
            .transform
            .as_ref()
            .map(|path| AtlasTransform::new(path).with_program(&config.ants_program));

        Self {
            policy: config.empty_region,
            resample_atlas: config.resample_atlas,
            transform,
        }
    }

    pub fn with_policy(mut self, policy: EmptyRegionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_resample_atlas(mut self, resample: bool) -> Self {
        self.resample_atlas = resample;
        self
    }

    pub fn with_transform(mut self, transform: Option<AtlasTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Fails early when a configured transform file does not exist.
    pub fn check_transform(&self) -> Result<()> {
        match &self.transform {
            Some(transform) => transform.check_transform(),
            None => Ok(()),
        }
    }

    /// Loads an atlas and rejects it if it holds no regions.
    pub fn load_atlas<P: AsRef<Path>>(&self, path: P) -> Result<LabelVolume> {
        let path = path.as_ref();
        let atlas = volume::load_atlas(path)?;

        let labels = atlas.region_labels();
        if labels.is_empty() {
            return Err(ExtractError::NoRegionsFound {
                path: path.display().to_string(),
            });
        }

        log::info!(
            "Atlas {} has {} regions on a {} grid",
            path.display(),
            labels.len(),
            atlas.geometry.describe_dims()
        );
        Ok(atlas)
    }

    pub fn load_mask<P: AsRef<Path>>(&self, path: P) -> Result<MaskVolume> {
        let path = path.as_ref();
        let mask = volume::load_mask(path)?;
        log::info!(
            "Mask {} keeps {} of {} voxels",
            path.display(),
            mask.included_voxels(),
            mask.geometry.voxel_count()
        );
        Ok(mask)
    }

    pub fn extract_paths(
        &self,
        volume_path: &Path,
        atlas_path: &Path,
        mask_path: Option<&Path>,
    ) -> Result<RegionTimeSeries> {
        self.check_transform()?;
        let atlas = self.load_atlas(atlas_path)?;
        let mask = mask_path.map(|p| self.load_mask(p)).transpose()?;
        self.extract_with_atlas(volume_path, atlas_path, &atlas, mask.as_ref())
    }

    /// Runs one extraction against an already loaded atlas and mask, as the
    /// batch runner does for every input. `atlas_path` is what the external
    /// transform reads when one is configured.
    pub fn extract_with_atlas(
        &self,
        volume_path: &Path,
        atlas_path: &Path,
        atlas: &LabelVolume,
        mask: Option<&MaskVolume>,
    ) -> Result<RegionTimeSeries> {
        let volume = volume::load_time_series(volume_path)?;
        // Columns always follow the atlas as given, so every output table
        // of a batch has the same header.
        let labels = atlas.region_labels();

        let (atlas, mask) = self.align_inputs(&volume, atlas_path, atlas, mask)?;
        let series =
            extract_region_means_for(&volume, &atlas, mask.as_deref(), &labels, self.policy)?;

        let empty = series.empty_regions();
        if !empty.is_empty() {
            log::warn!(
                "{}: {} region(s) had no voxels and were filled with {}: {:?}",
                volume_path.display(),
                empty.len(),
                match self.policy {
                    EmptyRegionPolicy::Nan => "NaN",
                    EmptyRegionPolicy::Zero => "0",
                },
                empty
            );
        }

        Ok(series)
    }

    /// Brings atlas and mask onto the grid of `volume`. An external
    /// transform wins over `resample_atlas` for the atlas; the mask is only
    /// ever resampled.
    fn align_inputs<'a>(
        &self,
        volume: &TimeSeriesVolume,
        atlas_path: &Path,
        atlas: &'a LabelVolume,
        mask: Option<&'a MaskVolume>,
    ) -> Result<(Cow<'a, LabelVolume>, Option<Cow<'a, MaskVolume>>)> {
        let atlas = match &self.transform {
            Some(transform) => Cow::Owned(transform.align(atlas_path, volume)?),
            None if self.resample_atlas && atlas.geometry != volume.geometry => {
                Cow::Owned(volume::resample_labels(atlas, &volume.geometry)?)
            }
            None => Cow::Borrowed(atlas),
        };

        let mask = match mask {
            Some(mask) if self.resample_atlas && mask.geometry != volume.geometry => {
                Some(Cow::Owned(volume::resample_mask(mask, &volume.geometry)?))
            }
            Some(mask) => Some(Cow::Borrowed(mask)),
            None => None,
        };

        Ok((atlas, mask))
    }
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}
