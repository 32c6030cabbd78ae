use crate::error::{ExtractError, Result};
use crate::volume::geometry::Geometry;
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use ndarray::ArrayView3;
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use std::path::Path;

/// Header carrying `geometry` as both sform and qform, so tools that read
/// either one agree on where the voxels are.
pub fn header_for(geometry: &Geometry) -> NiftiHeader {
    let affine = &geometry.affine;
    let row = |r: usize| [0, 1, 2, 3].map(|c| affine[(r, c)] as f32);

    let mut header = NiftiHeader {
        sform_code: 1,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        ..NiftiHeader::default()
    };

    let linear = Matrix3::from_fn(|r, c| affine[(r, c)]);
    let sizes = Vector3::from_fn(|c, _| linear.column(c).norm());
    if sizes.iter().any(|&size| size <= f64::EPSILON) {
        return header;
    }

    let mut rotation = linear * Matrix3::from_diagonal(&sizes.map(|size| 1.0 / size));
    let qfac = if rotation.determinant() < 0.0 {
        rotation.column_mut(2).neg_mut();
        -1.0
    } else {
        1.0
    };

    let quaternion =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    // NIfTI stores b, c, d only and assumes a >= 0.
    let sign = if quaternion.w < 0.0 { -1.0 } else { 1.0 };

    header.qform_code = 1;
    header.quatern_b = (sign * quaternion.i) as f32;
    header.quatern_c = (sign * quaternion.j) as f32;
    header.quatern_d = (sign * quaternion.k) as f32;
    header.quatern_x = affine[(0, 3)] as f32;
    header.quatern_y = affine[(1, 3)] as f32;
    header.quatern_z = affine[(2, 3)] as f32;
    header.pixdim[0] = qfac;
    header.pixdim[1] = sizes.x as f32;
    header.pixdim[2] = sizes.y as f32;
    header.pixdim[3] = sizes.z as f32;
    header
}

/// Writes a 3D volume with the given geometry.
pub fn write_volume(path: &Path, data: ArrayView3<'_, f64>, geometry: &Geometry) -> Result<()> {
    let header = header_for(geometry);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&data)
        .map_err(|e| {
            ExtractError::write(path, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })
}
