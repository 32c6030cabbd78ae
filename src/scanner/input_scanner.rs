use crate::config::DiscoveryConfig;
use crate::error::{ExtractError, Result};
use crate::scanner::file_filter::FileFilter;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A 4D scan found under the batch root.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredInput {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    pub filename: String,
    pub size: u64,
}

impl DiscoveredInput {
    pub fn new(source_path: PathBuf, relative_path: PathBuf, size: u64) -> Self {
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            source_path,
            relative_path,
            filename,
            size,
        }
    }

    pub fn display_path(&self) -> String {
        self.relative_path.display().to_string()
    }
}

pub struct InputScanner {
    filter: FileFilter,
    max_depth: usize,
    follow_links: bool,
}

impl InputScanner {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            filter: FileFilter::new(config),
            max_depth: config.max_depth,
            follow_links: config.follow_links,
        }
    }

    /// Recursively collects every file under `root` whose name ends with the
    /// configured suffix, sorted by relative path.
    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<Vec<DiscoveredInput>> {
        let root_path = root.as_ref();
        if !root_path.is_dir() {
            return Err(ExtractError::InvalidPath {
                path: format!("{} is not an existing directory", root_path.display()),
            });
        }

        let mut inputs = Vec::new();

        let walker = WalkDir::new(root_path)
            .max_depth(self.max_depth)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_traverse(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Unreadable subtrees are skipped, the rest of the walk goes on.
                    log::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.filter.is_input_file(entry.path()) {
                continue;
            }

            match self.process_file(&entry, root_path) {
                Ok(input) => {
                    log::debug!("Discovered {}", input.display_path());
                    inputs.push(input);
                }
                Err(err) => log::warn!("Error processing {}: {}", entry.path().display(), err),
            }
        }

        if inputs.is_empty() {
            return Err(ExtractError::NoInputsFound {
                root: root_path.display().to_string(),
                suffix: self.filter.suffix().to_string(),
            });
        }

        inputs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Ok(inputs)
    }

    fn should_traverse(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        self.filter.should_traverse_directory(entry.path())
    }

    fn process_file(&self, entry: &DirEntry, root_path: &Path) -> Result<DiscoveredInput> {
        let path = entry.path();
        let metadata = entry
            .metadata()
            .map_err(|e| ExtractError::Io(std::io::Error::from(e)))?;

        let relative = match path.strip_prefix(root_path) {
            Ok(rel) if !rel.components().any(|c| c == Component::ParentDir) => rel,
            _ => {
                return Err(ExtractError::InvalidPath {
                    path: format!("{} escapes {}", path.display(), root_path.display()),
                })
            }
        };

        Ok(DiscoveredInput::new(
            path.to_path_buf(),
            relative.to_path_buf(),
            metadata.len(),
        ))
    }

    pub fn get_statistics(&self, inputs: &[DiscoveredInput]) -> ScanStatistics {
        let mut stats = ScanStatistics {
            total_files: inputs.len(),
            ..ScanStatistics::default()
        };
        let mut dirs = BTreeSet::new();

        for input in inputs {
            stats.total_bytes += input.size;
            if let Some(parent) = input.relative_path.parent() {
                dirs.insert(parent);
            }
            if input.size > stats.largest.as_ref().map_or(0, |(size, _)| *size) {
                stats.largest = Some((input.size, input.relative_path.clone()));
            }
        }

        stats.directories = dirs.len();
        stats
    }
}

/// Totals over one discovery pass, logged at debug level before a batch.
#[derive(Debug, Default)]
pub struct ScanStatistics {
    pub total_files: usize,
    pub total_bytes: u64,
    pub directories: usize,
    pub largest: Option<(u64, PathBuf)>,
}

impl fmt::Display for ScanStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Discovered {} scan(s) in {} director{} ({})",
            self.total_files,
            self.directories,
            if self.directories == 1 { "y" } else { "ies" },
            human_size(self.total_bytes)
        )?;
        if let Some((size, path)) = &self.largest {
            write!(f, ", largest {} ({})", path.display(), human_size(*size))?;
        }
        Ok(())
    }
}

fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    match bytes {
        b if b >= GIB => format!("{:.1} GiB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{} B", b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_recursive_discovery_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(&root.join("sub-02/func/sub-02_cleaned.nii.gz"));
        touch(&root.join("sub-01/func/sub-01_cleaned.nii.gz"));
        touch(&root.join("sub-01/func/sub-01_bold.nii.gz"));
        touch(&root.join("sub-01/anat/sub-01_T1w.nii.gz"));
        touch(&root.join("top_cleaned.nii.gz"));

        let scanner = InputScanner::new(&DiscoveryConfig::default());
        let inputs = scanner.scan_directory(root).unwrap();

        let found: Vec<_> = inputs.iter().map(|i| i.display_path()).collect();
        assert_eq!(
            found,
            vec![
                Path::new("sub-01/func/sub-01_cleaned.nii.gz").display().to_string(),
                Path::new("sub-02/func/sub-02_cleaned.nii.gz").display().to_string(),
                "top_cleaned.nii.gz".to_string(),
            ]
        );
        assert_eq!(inputs[0].filename, "sub-01_cleaned.nii.gz");
    }

    #[test]
    fn test_hidden_directories_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(&root.join(".snapshot/sub-01_cleaned.nii.gz"));
        touch(&root.join("sub-01/sub-01_cleaned.nii.gz"));

        let scanner = InputScanner::new(&DiscoveryConfig::default());
        let inputs = scanner.scan_directory(root).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].filename, "sub-01_cleaned.nii.gz");
    }

    #[test]
    fn test_no_inputs_found() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("sub-01/notes.txt"));

        let scanner = InputScanner::new(&DiscoveryConfig::default());
        let result = scanner.scan_directory(temp_dir.path());
        assert!(matches!(result, Err(ExtractError::NoInputsFound { .. })));
    }

    #[test]
    fn test_missing_root() {
        let scanner = InputScanner::new(&DiscoveryConfig::default());
        let result = scanner.scan_directory("/nonexistent/data/root");
        assert!(matches!(result, Err(ExtractError::InvalidPath { .. })));
    }

    #[test]
    fn test_scan_statistics() {
        let inputs = vec![
            DiscoveredInput::new(
                PathBuf::from("/data/sub-01/a_cleaned.nii.gz"),
                PathBuf::from("sub-01/a_cleaned.nii.gz"),
                100,
            ),
            DiscoveredInput::new(
                PathBuf::from("/data/sub-01/b_cleaned.nii.gz"),
                PathBuf::from("sub-01/b_cleaned.nii.gz"),
                300,
            ),
            DiscoveredInput::new(
                PathBuf::from("/data/sub-02/c_cleaned.nii.gz"),
                PathBuf::from("sub-02/c_cleaned.nii.gz"),
                200,
            ),
        ];

        let scanner = InputScanner::new(&DiscoveryConfig::default());
        let stats = scanner.get_statistics(&inputs);

        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_bytes, 600);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.largest, Some((300, PathBuf::from("sub-01/b_cleaned.nii.gz"))));
        assert!(stats.to_string().starts_with("Discovered 3 scan(s) in 2 directories (600 B)"));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(500), "500 B");
        assert_eq!(human_size(1024), "1.0 KiB");
        assert_eq!(human_size(2 * 1024 * 1024), "2.0 MiB");
    }
}
