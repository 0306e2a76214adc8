//! 文件变更检测

use crate::core::archive::ArchiveWriter;
use crate::core::file_state::{FileStamp, FileStateStore};
use crate::core::layout::FolderLayout;
use crate::error::WatchError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 单个文件夹的检测结果
#[derive(Debug, Default)]
pub struct FolderOutcome {
    pub versioned: Vec<PathBuf>,
    /// 覆盖了另一个文件版本的归档
    pub overwritten: Vec<PathBuf>,
    pub unchanged: usize,
    pub errors: Vec<WatchError>,
}

/// 变更检测器
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    layout: FolderLayout,
    writer: ArchiveWriter,
}

impl ChangeDetector {
    pub fn new(layout: FolderLayout, writer: ArchiveWriter) -> Self {
        Self { layout, writer }
    }

    /// 为时间戳变化（或首次出现）的文件创建新版本
    ///
    /// 只检查文件夹的直接子文件，跳过停止标记、子目录和符号链接。
    /// 归档成功后才更新记录，失败的文件在下个周期重试。
    pub fn detect_and_version(
        &self,
        folder_path: &Path,
        folder: &str,
        states: &mut FileStateStore,
    ) -> FolderOutcome {
        let mut outcome = FolderOutcome::default();
        let versions_dir = self.layout.versions_dir(folder_path);

        let entries = match fs::read_dir(folder_path) {
            Ok(entries) => entries,
            Err(source) => {
                warn!("无法读取文件夹 {}: {}", folder, source);
                outcome.errors.push(WatchError::ListDir {
                    path: folder_path.to_path_buf(),
                    source,
                });
                return outcome;
            }
        };

        let mut present = HashSet::new();
        let mut listing_complete = true;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    listing_complete = false;
                    outcome.errors.push(WatchError::ListDir {
                        path: folder_path.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };

            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                outcome.errors.push(WatchError::NonUtf8Path(path));
                continue;
            };
            if name == self.layout.stop_file_name() || name == self.layout.versions_dir_name() {
                continue;
            }

            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(source) => {
                    warn!("无法读取文件类型 {:?}: {}", path, source);
                    outcome.errors.push(WatchError::Stat { path, source });
                    continue;
                }
            }
            present.insert(name.clone());

            let stamp = match entry.metadata().and_then(|m| FileStamp::from_metadata(&m)) {
                Ok(stamp) => stamp,
                Err(source) => {
                    warn!("无法读取文件信息 {:?}: {}", path, source);
                    outcome.errors.push(WatchError::Stat { path, source });
                    continue;
                }
            };

            if states.get(folder, &name) == Some(stamp) {
                outcome.unchanged += 1;
                continue;
            }

            match self.writer.write_version(&path, &versions_dir, &stamp) {
                Ok(archive) => {
                    states.record(folder, &name, stamp);
                    info!("变更已处理: {:?}", path);
                    if archive.replaced.is_some() {
                        outcome.overwritten.push(archive.path.clone());
                    }
                    outcome.versioned.push(archive.path);
                }
                Err(e) => {
                    warn!("{}", e);
                    outcome.errors.push(e);
                }
            }
        }

        if listing_complete {
            let pruned = states.retain_files(folder, &present);
            if pruned > 0 {
                debug!("清理了 {} 个已删除文件的状态记录", pruned);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        folder: PathBuf,
        key: String,
        detector: ChangeDetector,
        states: FileStateStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Wichtig");
        fs::create_dir_all(folder.join("Versionen")).unwrap();
        let key = folder.to_str().unwrap().to_string();
        Fixture {
            _dir: dir,
            folder,
            key,
            detector: ChangeDetector::new(FolderLayout::default(), ArchiveWriter::new(false)),
            states: FileStateStore::new(),
        }
    }

    fn archive_count(folder: &Path) -> usize {
        fs::read_dir(folder.join("Versionen")).unwrap().count()
    }

    #[test]
    fn test_first_observation_creates_version() {
        let mut f = fixture();
        fs::write(f.folder.join("notes.txt"), "v1").unwrap();

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert_eq!(outcome.versioned.len(), 1);
        assert!(outcome.errors.is_empty());
        assert!(f.states.get(&f.key, "notes.txt").is_some());
        assert_eq!(archive_count(&f.folder), 1);
    }

    #[test]
    fn test_unchanged_file_is_not_versioned_again() {
        let mut f = fixture();
        fs::write(f.folder.join("notes.txt"), "v1").unwrap();

        f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);

        assert!(outcome.versioned.is_empty());
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(archive_count(&f.folder), 1);
    }

    #[test]
    fn test_changed_timestamp_creates_new_version() {
        let mut f = fixture();
        let file = f.folder.join("notes.txt");
        fs::write(&file, "v1").unwrap();
        f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        let first = f.states.get(&f.key, "notes.txt").unwrap();

        // 文件系统时间戳粒度较粗，等待后再改写
        thread::sleep(Duration::from_millis(50));
        fs::write(&file, "v2").unwrap();

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert_eq!(outcome.versioned.len(), 1);
        assert_ne!(f.states.get(&f.key, "notes.txt").unwrap(), first);
    }

    #[test]
    fn test_skips_stop_marker_subdirs_and_versions() {
        let mut f = fixture();
        fs::write(f.folder.join("STOP"), "").unwrap();
        fs::create_dir(f.folder.join("Unterordner")).unwrap();
        fs::write(f.folder.join("Unterordner/deep.txt"), "x").unwrap();

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert!(outcome.versioned.is_empty());
        assert_eq!(outcome.unchanged, 0);
        assert_eq!(archive_count(&f.folder), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_skipped() {
        let mut f = fixture();
        let outside = f.folder.parent().unwrap().join("secret.txt");
        fs::write(&outside, "secret").unwrap();
        std::os::unix::fs::symlink(&outside, f.folder.join("link.txt")).unwrap();

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert!(outcome.versioned.is_empty());
        assert_eq!(archive_count(&f.folder), 0);
    }

    #[test]
    fn test_failed_archive_keeps_state_for_retry() {
        let mut f = fixture();
        fs::write(f.folder.join("notes.txt"), "v1").unwrap();
        // 版本目录被普通文件占用，归档必然失败
        fs::remove_dir(f.folder.join("Versionen")).unwrap();
        fs::write(f.folder.join("Versionen"), "blocker").unwrap();

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert!(outcome.versioned.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(f.states.get(&f.key, "notes.txt"), None);

        // 障碍消失后下个周期重试成功
        fs::remove_file(f.folder.join("Versionen")).unwrap();
        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert_eq!(outcome.versioned.len(), 1);
        assert!(f.states.get(&f.key, "notes.txt").is_some());
    }

    #[test]
    fn test_deleted_file_state_is_pruned() {
        let mut f = fixture();
        let file = f.folder.join("notes.txt");
        fs::write(&file, "v1").unwrap();
        f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);

        fs::remove_file(&file).unwrap();
        f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert_eq!(f.states.get(&f.key, "notes.txt"), None);
    }

    #[test]
    fn test_missing_folder_reports_error() {
        let mut f = fixture();
        let gone = f.folder.join("does-not-exist");
        let outcome = f.detector.detect_and_version(&gone, "x", &mut f.states);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_same_stem_in_same_second_is_flagged() {
        let mut f = fixture();
        let txt = f.folder.join("notes.txt");
        let md = f.folder.join("notes.md");

        // 两个文件的时间戳需落在同一秒内
        let mut attempts = 0;
        loop {
            fs::write(&txt, "text").unwrap();
            fs::write(&md, "markdown").unwrap();
            let secs = |p: &Path| {
                FileStamp::from_metadata(&fs::metadata(p).unwrap())
                    .unwrap()
                    .secs
            };
            if secs(&txt) == secs(&md) {
                break;
            }
            attempts += 1;
            assert!(attempts < 5);
        }

        let outcome = f.detector.detect_and_version(&f.folder, &f.key, &mut f.states);
        assert_eq!(outcome.versioned.len(), 2);
        assert_eq!(outcome.overwritten.len(), 1);
        assert_eq!(archive_count(&f.folder), 1);
    }
}
