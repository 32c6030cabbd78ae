use crate::error::{ExtractError, Result};
use crate::volume::geometry::Geometry;
use crate::volume::loader::{LabelVolume, MaskVolume};
use nalgebra::Point3;
use ndarray::Array3;

/// Nearest-neighbour resampling of an atlas onto `target`. Target voxels
/// whose centre falls outside the atlas field of view get label 0.
pub fn resample_labels(atlas: &LabelVolume, target: &Geometry) -> Result<LabelVolume> {
    let labels = resample_nearest(&atlas.labels, &atlas.geometry, target, 0, "atlas")?;

    log::info!(
        "Resampled atlas from {} to {} (nearest neighbour)",
        atlas.geometry.describe_dims(),
        target.describe_dims()
    );
    Ok(LabelVolume::new(labels, target.clone()))
}

/// Same mapping as [`resample_labels`]; voxels outside the mask's field of
/// view are excluded.
pub fn resample_mask(mask: &MaskVolume, target: &Geometry) -> Result<MaskVolume> {
    let values = resample_nearest(&mask.mask, &mask.geometry, target, false, "mask")?;

    log::info!(
        "Resampled mask from {} to {} (nearest neighbour)",
        mask.geometry.describe_dims(),
        target.describe_dims()
    );
    Ok(MaskVolume::new(values, target.clone()))
}

/// Maps every target voxel centre through `inv(source) * target` and takes
/// the nearest source voxel, or `outside` when there is none.
fn resample_nearest<T: Copy>(
    values: &Array3<T>,
    source: &Geometry,
    target: &Geometry,
    outside: T,
    what: &str,
) -> Result<Array3<T>> {
    let world_to_source = source.affine.try_inverse().ok_or_else(|| ExtractError::InputShape {
        message: format!("{} affine is singular and cannot be inverted for resampling", what),
    })?;
    let target_to_source = world_to_source * target.affine;
    let (nx, ny, nz) = values.dim();

    let nearest = |coordinate: f64, len: usize| -> Option<usize> {
        let index = coordinate.round();
        (index >= 0.0 && index < len as f64).then_some(index as usize)
    };

    let dims = (target.dims[0], target.dims[1], target.dims[2]);
    Ok(Array3::from_shape_fn(dims, |(i, j, k)| {
        let p = target_to_source.transform_point(&Point3::new(i as f64, j as f64, k as f64));
        match (nearest(p.x, nx), nearest(p.y, ny), nearest(p.z, nz)) {
            (Some(x), Some(y), Some(z)) => values[[x, y, z]],
            _ => outside,
        }
    }))
}
