//! 守护进程配置模块

use crate::core::{FolderClassifier, FolderLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 配置文件名，位于状态目录下
pub const CONFIG_FILE: &str = "config.json";

/// 显式配置的扫描根目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootConfig {
    pub path: PathBuf,
    pub user: String,
}

/// 监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    /// 两次扫描之间的间隔（秒）
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// 最大递归深度
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// 重要文件夹关键字（不区分大小写）
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// 版本目录名
    #[serde(default = "default_versions_dir")]
    pub versions_dir: String,
    /// 停止标记文件名
    #[serde(default = "default_stop_file")]
    pub stop_file: String,
    /// 只记录日志，不创建目录和归档
    #[serde(default)]
    pub dry_run: bool,
    /// 是否发送桌面通知
    #[serde(default = "default_notify")]
    pub notify: bool,
    /// 为空时从系统用户数据库发现 home 目录
    #[serde(default)]
    pub roots: Vec<RootConfig>,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_depth() -> usize {
    5
}

fn default_keywords() -> Vec<String> {
    ["wichtig", "important", "backup", "archiv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_versions_dir() -> String {
    "Versionen".to_string()
}

fn default_stop_file() -> String {
    "STOP".to_string()
}

fn default_notify() -> bool {
    true
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_depth: default_max_depth(),
            keywords: default_keywords(),
            versions_dir: default_versions_dir(),
            stop_file: default_stop_file(),
            dry_run: false,
            notify: default_notify(),
            roots: Vec::new(),
        }
    }
}

impl WatcherConfig {
    /// 从配置文件加载，文件缺失或损坏时使用默认值
    pub fn load(config_dir: &Path) -> Self {
        read_document(config_dir)
            .and_then(|config| config.get("watcher").cloned())
            .and_then(|value| serde_json::from_value::<WatcherConfig>(value).ok())
            .unwrap_or_default()
    }

    /// 保存配置，保留文件中的其它字段
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let mut config = read_document(config_dir).unwrap_or_else(|| serde_json::json!({}));
        config["watcher"] = serde_json::to_value(self)?;

        let content = serde_json::to_string_pretty(&config)?;
        fs::write(config_dir.join(CONFIG_FILE), content)
    }

    pub fn classifier(&self) -> FolderClassifier {
        FolderClassifier::new(&self.keywords)
    }

    pub fn layout(&self) -> FolderLayout {
        FolderLayout::new(&self.versions_dir, &self.stop_file)
    }
}

/// 读取整个配置文档
pub(crate) fn read_document(config_dir: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}
