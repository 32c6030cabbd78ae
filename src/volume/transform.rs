use crate::error::{ExtractError, Result};
use crate::volume::loader::{self, LabelVolume, TimeSeriesVolume};
use crate::volume::writer;
use ndarray::Axis;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DEFAULT_ANTS_PROGRAM: &str = "antsApplyTransforms";

/// Lines of tool stderr kept in the error message.
const STDERR_TAIL: usize = 5;

/// Moves an atlas into the space of a 4D scan with ANTs, using a
/// precomputed transform (affine or warp) and label-preserving
/// interpolation.
#[derive(Debug, Clone)]
pub struct AtlasTransform {
    transform: PathBuf,
    program: PathBuf,
}

impl AtlasTransform {
    pub fn new<P: Into<PathBuf>>(transform: P) -> Self {
        Self {
            transform: transform.into(),
            program: PathBuf::from(DEFAULT_ANTS_PROGRAM),
        }
    }

    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    pub fn check_transform(&self) -> Result<()> {
        if self.transform.is_file() {
            Ok(())
        } else {
            Err(ExtractError::MissingInput {
                path: self.transform.display().to_string(),
            })
        }
    }

    /// Resamples `atlas_path` onto the grid of `reference`. The first time
    /// point of the scan is written out as the 3D reference image.
    pub fn align(&self, atlas_path: &Path, reference: &TimeSeriesVolume) -> Result<LabelVolume> {
        self.check_transform()?;

        let workdir = tempfile::Builder::new()
            .prefix("roi-timeseries-")
            .tempdir()
            .map_err(ExtractError::Io)?;
        let reference_path = workdir.path().join("reference.nii");
        let aligned_path = workdir.path().join("aligned_atlas.nii.gz");

        writer::write_volume(
            &reference_path,
            reference.data.index_axis(Axis(3), 0),
            &reference.geometry,
        )?;

        log::info!(
            "Aligning {} with {} ({})",
            atlas_path.display(),
            self.transform.display(),
            self.program.display()
        );

        let output = Command::new(&self.program)
            .args(["-d", "3", "-i"])
            .arg(atlas_path)
            .arg("-r")
            .arg(&reference_path)
            .arg("-t")
            .arg(&self.transform)
            .arg("-o")
            .arg(&aligned_path)
            .args(["-n", "GenericLabel"])
            .output()
            .map_err(|e| ExtractError::Registration {
                message: format!("cannot run {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
            return Err(ExtractError::Registration {
                message: format!("{} exited with {}: {}", self.program.display(), output.status, tail.trim()),
            });
        }

        if !aligned_path.is_file() {
            return Err(ExtractError::Registration {
                message: format!("{} wrote no aligned atlas", self.program.display()),
            });
        }

        let aligned = loader::load_atlas(&aligned_path)?;
        if aligned.spatial_dims() != reference.spatial_dims() {
            return Err(ExtractError::InputShape {
                message: format!(
                    "aligned atlas is {:?} but the 4D volume is {:?} spatially",
                    aligned.spatial_dims(),
                    reference.spatial_dims()
                ),
            });
        }
        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Geometry;
    use ndarray::Array4;
    use tempfile::TempDir;

    fn reference() -> TimeSeriesVolume {
        TimeSeriesVolume::new(Array4::zeros((2, 2, 1, 3)), Geometry::with_dims([2, 2, 1]))
    }

    fn transform_in(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("atlas_to_bold0GenericAffine.mat");
        std::fs::write(&path, b"affine").unwrap();
        path
    }

    #[test]
    fn test_missing_transform_file() {
        let transform = AtlasTransform::new("/nonexistent/warp.nii.gz");
        let result = transform.align(Path::new("atlas.nii.gz"), &reference());
        assert!(matches!(result, Err(ExtractError::MissingInput { .. })));
    }

    #[test]
    fn test_tool_not_installed() {
        let dir = TempDir::new().unwrap();
        let transform = AtlasTransform::new(transform_in(&dir))
            .with_program(dir.path().join("no-such-antsApplyTransforms"));

        let error = transform
            .align(Path::new("atlas.nii.gz"), &reference())
            .unwrap_err();
        assert!(matches!(error, ExtractError::Registration { .. }));
        assert!(error.to_string().contains("cannot run"));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let transform = AtlasTransform::new(transform_in(&dir)).with_program("false");

        let error = transform
            .align(Path::new("atlas.nii.gz"), &reference())
            .unwrap_err();
        assert!(matches!(error, ExtractError::Registration { .. }));
        assert!(error.to_string().contains("exited with"));
    }
}
