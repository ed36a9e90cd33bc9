//! Configuration for a reconciliation run.

use std::path::PathBuf;

/// The fixed set of database files the reconciler expects in each side
/// directory.
pub const DEFAULT_DATABASE_FILES: [&str; 3] = ["hierarchy.db", "surveys.db", "responses.db"];

/// Configuration for a reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root directory of side A.
    pub path_a: PathBuf,
    /// Root directory of side B.
    pub path_b: PathBuf,
    /// Database file names expected under each root.
    pub files: Vec<String>,
}

impl SyncConfig {
    /// Creates a configuration for the two side directories with the
    /// default file list.
    pub fn new(path_a: impl Into<PathBuf>, path_b: impl Into<PathBuf>) -> Self {
        Self {
            path_a: path_a.into(),
            path_b: path_b.into(),
            files: DEFAULT_DATABASE_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replaces the file list.
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_list() {
        let config = SyncConfig::new("/tmp/a", "/tmp/b");
        assert_eq!(config.files, vec!["hierarchy.db", "surveys.db", "responses.db"]);
        assert_eq!(config.path_a, PathBuf::from("/tmp/a"));
    }

    #[test]
    fn with_files_overrides() {
        let config = SyncConfig::new("/a", "/b").with_files(["only.db"]);
        assert_eq!(config.files, vec!["only.db"]);
    }
}
