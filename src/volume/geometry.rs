use nalgebra::{Matrix3, Matrix4, Quaternion, UnitQuaternion, Vector3};
use nifti::NiftiHeader;

/// Homogeneous 4x4 voxel-to-world transform.
pub type Affine = Matrix4<f64>;

/// Spatial grid of a volume: voxel counts along x, y, z and where those
/// voxels sit in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub dims: [usize; 3],
    pub affine: Affine,
}

impl Geometry {
    pub fn new(dims: [usize; 3], affine: Affine) -> Self {
        Self { dims, affine }
    }

    pub fn with_dims(dims: [usize; 3]) -> Self {
        Self::new(dims, Affine::identity())
    }

    pub fn from_header(header: &NiftiHeader, dims: [usize; 3]) -> Self {
        Self::new(dims, affine_from_header(header))
    }

    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn describe_dims(&self) -> String {
        format!("{}x{}x{}", self.dims[0], self.dims[1], self.dims[2])
    }
}

/// Voxel-to-world affine following the NIfTI-1 precedence: sform, then
/// qform, then plain pixdim scaling.
pub fn affine_from_header(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let [x, y, z] = [header.srow_x, header.srow_y, header.srow_z].map(|row| row.map(f64::from));
        return Matrix4::new(
            x[0], x[1], x[2], x[3],
            y[0], y[1], y[2], y[3],
            z[0], z[1], z[2], z[3],
            0.0, 0.0, 0.0, 1.0,
        );
    }

    if header.qform_code > 0 {
        return quaternion_affine(header);
    }

    let scale = Vector3::from_fn(|axis, _| match f64::from(header.pixdim[axis + 1]) {
        size if size > 0.0 => size,
        _ => 1.0,
    });
    Matrix4::new_nonuniform_scaling(&scale)
}

fn quaternion_affine(header: &NiftiHeader) -> Affine {
    let (b, c, d) = (
        f64::from(header.quatern_b),
        f64::from(header.quatern_c),
        f64::from(header.quatern_d),
    );
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let rotation = UnitQuaternion::new_normalize(Quaternion::new(a, b, c, d)).to_rotation_matrix();

    // qfac lives in pixdim[0] and flips the slice axis.
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let scale = Matrix3::from_diagonal(&Vector3::new(
        f64::from(header.pixdim[1]),
        f64::from(header.pixdim[2]),
        f64::from(header.pixdim[3]) * qfac,
    ));

    let mut affine = (rotation.matrix() * scale).to_homogeneous();
    affine[(0, 3)] = f64::from(header.quatern_x);
    affine[(1, 3)] = f64::from(header.quatern_y);
    affine[(2, 3)] = f64::from(header.quatern_z);
    affine
}
