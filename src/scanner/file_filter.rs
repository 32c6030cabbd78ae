use crate::config::DiscoveryConfig;
use std::path::Path;

/// Decides which files count as batch inputs and which directories the
/// walker descends into.
#[derive(Debug, Clone)]
pub struct FileFilter {
    suffix: String,
    exclude_dirs: Vec<String>,
}

impl FileFilter {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            suffix: config.suffix.clone(),
            exclude_dirs: config.exclude_dirs.clone(),
        }
    }

    /// Case-sensitive match of the file name against the configured suffix.
    pub fn is_input_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&self.suffix))
    }

    pub fn should_traverse_directory(&self, path: &Path) -> bool {
        let Some(dir_name) = path.file_name().and_then(|s| s.to_str()) else {
            return true;
        };

        if self.exclude_dirs.iter().any(|exclude| exclude == dir_name) {
            return false;
        }

        // Hidden directories (.git, .cache, ...) never hold scans.
        !(dir_name.starts_with('.') && dir_name != "." && dir_name != "..")
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(&DiscoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_matching() {
        let filter = FileFilter::default();

        assert!(filter.is_input_file(Path::new("sub-01_task-rest_cleaned.nii.gz")));
        assert!(filter.is_input_file(Path::new("data/sub-02/func/sub-02_cleaned.nii.gz")));
        assert!(filter.is_input_file(Path::new("cleaned.nii.gz")));

        assert!(!filter.is_input_file(Path::new("sub-01_cleaned.nii")));
        assert!(!filter.is_input_file(Path::new("sub-01_bold.nii.gz")));
        assert!(!filter.is_input_file(Path::new("sub-01_cleaned.nii.gz.bak")));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let filter = FileFilter::default();
        assert!(!filter.is_input_file(Path::new("sub-01_CLEANED.nii.gz")));
        assert!(!filter.is_input_file(Path::new("sub-01_cleaned.NII.GZ")));
    }

    #[test]
    fn test_custom_suffix() {
        let config = DiscoveryConfig {
            suffix: "_bold.nii".to_string(),
            ..DiscoveryConfig::default()
        };
        let filter = FileFilter::new(&config);

        assert_eq!(filter.suffix(), "_bold.nii");
        assert!(filter.is_input_file(Path::new("sub-01_bold.nii")));
        assert!(!filter.is_input_file(Path::new("sub-01_cleaned.nii.gz")));
    }

    #[test]
    fn test_directory_traversal_rules() {
        let filter = FileFilter::new(&DiscoveryConfig {
            exclude_dirs: vec!["sourcedata".to_string()],
            ..DiscoveryConfig::default()
        });

        assert!(filter.should_traverse_directory(Path::new("sub-01")));
        assert!(filter.should_traverse_directory(Path::new("derivatives/func")));
        assert!(!filter.should_traverse_directory(Path::new(".git")));
        assert!(!filter.should_traverse_directory(Path::new("data/.cache")));

        assert!(!filter.should_traverse_directory(Path::new("sourcedata")));
        // Exclusions are exact, case-sensitive names.
        assert!(filter.should_traverse_directory(Path::new("SourceData")));
    }
}
