//! 版本归档写入

use crate::core::file_state::FileStamp;
use crate::error::WatchError;
use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use scopeguard::ScopeGuard;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 归档扩展名
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// 生成归档名: `<stem>_<YYYYMMDD_HHMMSS>.tar.gz`
pub fn archive_name(file_name: &str, taken_at: &NaiveDateTime) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    format!(
        "{}_{}.{}",
        stem,
        taken_at.format("%Y%m%d_%H%M%S"),
        ARCHIVE_EXTENSION
    )
}

/// 确保版本目录存在且是真实目录（不接受符号链接）
pub fn ensure_versions_dir(versions_dir: &Path) -> Result<bool, WatchError> {
    match fs::symlink_metadata(versions_dir) {
        Ok(meta) if meta.is_dir() => Ok(false),
        Ok(_) => Err(WatchError::VersionsDirNotDirectory(versions_dir.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            create_versions_dir(versions_dir).map_err(|source| WatchError::VersionsDir {
                path: versions_dir.to_path_buf(),
                source,
            })?;
            info!("版本目录已创建: {:?}", versions_dir);
            Ok(true)
        }
        Err(source) => Err(WatchError::VersionsDir {
            path: versions_dir.to_path_buf(),
            source,
        }),
    }
}

fn create_versions_dir(versions_dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(versions_dir)
}

/// 读取归档中第一个条目的名称
pub fn stored_entry_name(archive_path: &Path) -> Option<String> {
    let file = File::open(archive_path).ok()?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = archive.entries().ok()?;
    let entry = entries.next()?.ok()?;
    let path = entry.path().ok()?;
    path.to_str().map(str::to_string)
}

/// 一次成功的版本写入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedVersion {
    pub path: PathBuf,
    /// 被覆盖的同名归档原本保存的文件名（与当前文件不同时）
    pub replaced: Option<String>,
}

/// 归档写入器
#[derive(Debug, Clone, Default)]
pub struct ArchiveWriter {
    dry_run: bool,
}

impl ArchiveWriter {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// 把单个文件打包为带时间戳的归档，不做内部重试
    pub fn write_version(
        &self,
        file_path: &Path,
        versions_dir: &Path,
        stamp: &FileStamp,
    ) -> Result<ArchivedVersion, WatchError> {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WatchError::NonUtf8Path(file_path.to_path_buf()))?;
        let archive_path = versions_dir.join(archive_name(file_name, &stamp.local_time()));

        if self.dry_run {
            info!("[dry-run] 将创建版本: {:?}", archive_path);
            return Ok(ArchivedVersion {
                path: archive_path,
                replaced: None,
            });
        }

        ensure_versions_dir(versions_dir)?;

        let mut replaced = None;
        if archive_path.exists() {
            match stored_entry_name(&archive_path) {
                Some(previous) if previous != file_name => {
                    warn!(
                        "归档名冲突: {:?} 原本保存 {}, 将被 {} 覆盖",
                        archive_path, previous, file_name
                    );
                    replaced = Some(previous);
                }
                _ => debug!("同一时间戳的版本已存在，覆盖: {:?}", archive_path),
            }
        }

        self.write_archive(file_path, file_name, &archive_path)
            .map_err(|source| WatchError::Archive {
                path: file_path.to_path_buf(),
                source,
            })?;

        info!("版本已创建: {:?}", archive_path);
        Ok(ArchivedVersion {
            path: archive_path,
            replaced,
        })
    }

    /// 先写入隐藏的临时文件再重命名，失败时不留下半成品
    fn write_archive(&self, file_path: &Path, entry_name: &str, archive_path: &Path) -> io::Result<()> {
        let partial_path = partial_path(archive_path);
        let cleanup = scopeguard::guard(partial_path.clone(), |path| {
            let _ = fs::remove_file(path);
        });

        let file = File::create(&partial_path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_path_with_name(file_path, entry_name)?;

        let file = builder.into_inner()?.finish()?;
        file.sync_all()?;
        fs::rename(&partial_path, archive_path)?;

        ScopeGuard::into_inner(cleanup);
        Ok(())
    }
}

fn partial_path(archive_path: &Path) -> PathBuf {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    archive_path.with_file_name(format!(".{}.partial", name))
}
