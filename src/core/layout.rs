use std::path::{Path, PathBuf};

/// 被监控文件夹内的保留名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    versions_dir: String,
    stop_file: String,
}

impl FolderLayout {
    pub fn new(versions_dir: &str, stop_file: &str) -> Self {
        Self {
            versions_dir: versions_dir.to_string(),
            stop_file: stop_file.to_string(),
        }
    }

    pub fn versions_dir_name(&self) -> &str {
        &self.versions_dir
    }

    pub fn stop_file_name(&self) -> &str {
        &self.stop_file
    }

    pub fn versions_dir(&self, folder: &Path) -> PathBuf {
        folder.join(&self.versions_dir)
    }

    pub fn has_stop_marker(&self, folder: &Path) -> bool {
        folder.join(&self.stop_file).exists()
    }
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self::new("Versionen", "STOP")
    }
}
