#![allow(dead_code)]

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Writes a single-file NIfTI-1 image with float32 voxels and an identity
/// sform. `data` is in x-fastest order. Paths ending in `.gz` are
/// gzip-compressed.
pub fn write_nifti(path: &Path, dims: &[usize], data: &[f32]) -> Result<()> {
    write_nifti_with_voxel_size(path, dims, data, 1.0)
}

pub fn write_nifti_with_voxel_size(
    path: &Path,
    dims: &[usize],
    data: &[f32],
    voxel_size: f32,
) -> Result<()> {
    anyhow::ensure!((1..=7).contains(&dims.len()), "unsupported rank {}", dims.len());
    anyhow::ensure!(
        dims.iter().product::<usize>() == data.len(),
        "{} values do not fill {:?}",
        data.len(),
        dims
    );

    let mut header = [0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    let mut dim = [1i16; 8];
    dim[0] = dims.len() as i16;
    for (i, &d) in dims.iter().enumerate() {
        dim[i + 1] = d as i16;
    }
    for (i, d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype FLOAT32, bitpix 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim = [1.0, voxel_size, voxel_size, voxel_size, 1.0, 1.0, 1.0, 1.0f32];
    for (i, p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    header[108..112].copy_from_slice(&352.0f32.to_le_bytes()); // vox_offset
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes()); // scl_slope
    header[254..256].copy_from_slice(&1i16.to_le_bytes()); // sform_code

    let rows = [
        [voxel_size, 0.0, 0.0, 0.0],
        [0.0, voxel_size, 0.0, 0.0],
        [0.0, 0.0, voxel_size, 0.0],
    ];
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let offset = 280 + r * 16 + c * 4;
            header[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut bytes = Vec::with_capacity(352 + data.len() * 4);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&[0u8; 4]);
    for value in data {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        bytes = encoder.finish()?;
    }

    fs::write(path, bytes)?;
    Ok(())
}

/// 4D volume where voxel (x, y, z) at time t holds `f(x, y, z, t)`.
pub fn volume_4d(dims: [usize; 4], f: impl Fn(usize, usize, usize, usize) -> f32) -> Vec<f32> {
    let [nx, ny, nz, nt] = dims;
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    for t in 0..nt {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    data.push(f(x, y, z, t));
                }
            }
        }
    }
    data
}

pub fn volume_3d(dims: [usize; 3], f: impl Fn(usize, usize, usize) -> f32) -> Vec<f32> {
    volume_4d([dims[0], dims[1], dims[2], 1], |x, y, z, _| f(x, y, z))
}

/// 2x2x1 grid with 5 time points; voxel value `10 * (x + 2y) + t`.
pub fn write_small_bold(path: &Path) -> Result<()> {
    let data = volume_4d([2, 2, 1, 5], |x, y, _, t| (10 * (x + 2 * y) + t) as f32);
    write_nifti(path, &[2, 2, 1, 5], &data)
}

/// Labels on the 2x2x1 grid: (0,0)=1, (1,0)=1, (0,1)=2, (1,1)=0.
pub fn write_small_atlas(path: &Path) -> Result<()> {
    let labels = [[1.0, 2.0], [1.0, 0.0]];
    let data = volume_3d([2, 2, 1], |x, y, _| labels[x][y]);
    write_nifti(path, &[2, 2, 1], &data)
}
