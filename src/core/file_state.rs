//! 文件状态管理 - 用于变更检测

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::Metadata;

/// 文件的创建时间戳（Unix 上为 inode 变更时间 ctime）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub secs: i64,
    pub nanos: u32,
}

impl FileStamp {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> std::io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        Ok(Self {
            secs: metadata.ctime(),
            nanos: metadata.ctime_nsec().clamp(0, 999_999_999) as u32,
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> std::io::Result<Self> {
        let time = metadata.created().or_else(|_| metadata.modified())?;
        let duration = time
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            secs: duration.as_secs() as i64,
            nanos: duration.subsec_nanos(),
        })
    }

    /// 本地时区下的时间，超出范围时为 Unix 纪元
    pub fn local_time(&self) -> NaiveDateTime {
        DateTime::from_timestamp(self.secs, self.nanos)
            .map(|dt| dt.with_timezone(&Local).naive_local())
            .unwrap_or_default()
    }
}

/// 文件夹 -> 文件名 -> 最近一次成功归档时的时间戳
pub type FileStateSnapshot = BTreeMap<String, BTreeMap<String, FileStamp>>;

/// 文件状态表
#[derive(Debug, Clone, Default)]
pub struct FileStateStore {
    folders: FileStateSnapshot,
}

impl FileStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(folders: FileStateSnapshot) -> Self {
        Self { folders }
    }

    pub fn snapshot(&self) -> &FileStateSnapshot {
        &self.folders
    }

    pub fn get(&self, folder: &str, file: &str) -> Option<FileStamp> {
        self.folders.get(folder)?.get(file).copied()
    }

    /// 仅在归档成功后调用
    pub fn record(&mut self, folder: &str, file: &str, stamp: FileStamp) {
        self.folders
            .entry(folder.to_string())
            .or_default()
            .insert(file.to_string(), stamp);
    }

    /// 文件夹停止监控后丢弃其状态
    pub fn forget_folder(&mut self, folder: &str) -> bool {
        self.folders.remove(folder).is_some()
    }

    /// 清理已不存在的文件，返回清理数量
    pub fn retain_files(&mut self, folder: &str, present: &HashSet<String>) -> usize {
        let Some(files) = self.folders.get_mut(folder) else {
            return 0;
        };

        let before = files.len();
        files.retain(|name, _| present.contains(name));
        let removed = before - files.len();

        if files.is_empty() {
            self.folders.remove(folder);
        }
        removed
    }

    pub fn file_count(&self) -> usize {
        self.folders.values().map(|files| files.len()).sum()
    }
}
