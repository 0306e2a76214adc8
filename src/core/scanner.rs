use crate::core::classifier::FolderClassifier;
use crate::error::WatchError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 一次根目录扫描的结果
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// 发现的重要文件夹（先序）
    pub folders: Vec<PathBuf>,
    /// 无法访问的子树
    pub errors: Vec<WatchError>,
}

/// 有深度限制的重要文件夹扫描器
///
/// 根目录的直接子项深度为 0，`max_depth` 层的目录仍会被识别，
/// 但不再进入。匹配到的文件夹不会继续向下搜索。
/// 不跟随目录符号链接，所以不会陷入链接环。
#[derive(Debug, Clone)]
pub struct FolderScanner {
    classifier: FolderClassifier,
    max_depth: usize,
}

impl FolderScanner {
    pub fn new(classifier: FolderClassifier, max_depth: usize) -> Self {
        Self {
            classifier,
            max_depth,
        }
    }

    pub fn scan(&self, root: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.max_depth + 1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // 该子树放弃，继续扫描兄弟目录
                    let path = e.path().unwrap_or(root).to_path_buf();
                    warn!("扫描 {:?} 失败: {}", path, e);
                    outcome.errors.push(WatchError::ListDir {
                        path,
                        source: e.into(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            if self
                .classifier
                .is_important(&entry.file_name().to_string_lossy())
            {
                debug!("发现重要文件夹: {:?}", entry.path());
                walker.skip_current_dir();
                outcome.folders.push(entry.into_path());
            }
        }

        outcome
    }
}
