//! 监控注册表 - 用户 -> 被监控文件夹

use crate::core::archive::ensure_versions_dir;
use crate::core::layout::FolderLayout;
use crate::error::WatchError;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// 持久化的注册表快照
pub type RegistrySnapshot = BTreeMap<String, Vec<String>>;

/// 生命周期转换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 新发现的文件夹，已登记
    Started,
    /// 已在监控中
    AlreadyWatched,
    /// 存在停止标记；`deregistered` 为 false 表示本来就未登记
    Stopped { deregistered: bool },
}

impl Transition {
    /// 本周期是否需要检测文件变更
    pub fn is_active(&self) -> bool {
        matches!(self, Transition::Started | Transition::AlreadyWatched)
    }
}

/// 监控注册表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchRegistry {
    folders: RegistrySnapshot,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照恢复，去掉重复项和空用户
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new();
        for (user, folders) in snapshot {
            for folder in folders {
                registry.insert(&user, &folder);
            }
        }
        registry
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.folders
    }

    pub fn contains(&self, user: &str, folder: &str) -> bool {
        self.folders
            .get(user)
            .is_some_and(|folders| folders.iter().any(|f| f == folder))
    }

    /// 登记文件夹，已存在时返回 false
    pub fn insert(&mut self, user: &str, folder: &str) -> bool {
        if self.contains(user, folder) {
            return false;
        }
        self.folders
            .entry(user.to_string())
            .or_default()
            .push(folder.to_string());
        true
    }

    /// 移除文件夹，不存在时返回 false
    pub fn remove(&mut self, user: &str, folder: &str) -> bool {
        let Some(folders) = self.folders.get_mut(user) else {
            return false;
        };
        let before = folders.len();
        folders.retain(|f| f != folder);
        let removed = folders.len() != before;

        if folders.is_empty() {
            self.folders.remove(user);
        }
        removed
    }

    pub fn folders_of(&self, user: &str) -> &[String] {
        self.folders.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.folders.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// 对一个重要文件夹执行生命周期转换
    ///
    /// 1. 有停止标记: 已登记则移除，否则不做任何事
    /// 2. 已登记: 确保版本目录存在
    /// 3. 新文件夹: 创建版本目录成功后登记
    ///
    /// `dry_run` 时不创建目录，但注册表照常变化。
    pub fn transition(
        &mut self,
        folder_path: &Path,
        folder: &str,
        user: &str,
        layout: &FolderLayout,
        dry_run: bool,
    ) -> Result<Transition, WatchError> {
        if layout.has_stop_marker(folder_path) {
            let deregistered = self.remove(user, folder);
            if deregistered {
                info!("监控已停止: {}", folder);
            }
            return Ok(Transition::Stopped { deregistered });
        }

        let versions_dir = layout.versions_dir(folder_path);

        if self.contains(user, folder) {
            if !dry_run {
                // 版本目录被删除时自动恢复，失败交给归档时再试
                if let Err(e) = ensure_versions_dir(&versions_dir) {
                    warn!("{}", e);
                }
            }
            return Ok(Transition::AlreadyWatched);
        }

        if dry_run {
            info!("[dry-run] 将创建版本目录: {:?}", versions_dir);
        } else {
            ensure_versions_dir(&versions_dir)?;
        }

        self.insert(user, folder);
        info!("新的监控已开始: {}", folder);
        Ok(Transition::Started)
    }
}
