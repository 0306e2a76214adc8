//! 错误类型 - 按处理策略分类

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 错误分类，调用方据此决定告警策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 临时性文件系统错误，下个周期重试
    Transient,
    /// 状态文件读写错误
    Persistence,
    /// 通知发送失败
    Notification,
    /// 启动阶段错误，监控循环不能开始
    Setup,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("无法读取目录 {path:?}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无法读取文件信息 {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("创建版本目录失败 {path:?}: {source}")]
    VersionsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("版本目录不是普通目录: {0:?}")]
    VersionsDirNotDirectory(PathBuf),

    #[error("创建版本失败 {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("路径不是有效的 UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),

    #[error("加载状态文件失败 {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("保存状态文件失败 {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("序列化状态失败: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("通知 {user} 失败: {reason}")]
    Notify { user: String, reason: String },

    #[error("初始化状态目录失败 {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchError::ListDir { .. }
            | WatchError::Stat { .. }
            | WatchError::VersionsDir { .. }
            | WatchError::VersionsDirNotDirectory(_)
            | WatchError::Archive { .. }
            | WatchError::NonUtf8Path(_) => ErrorKind::Transient,
            WatchError::Load { .. } | WatchError::Save { .. } | WatchError::Serialize(_) => {
                ErrorKind::Persistence
            }
            WatchError::Notify { .. } => ErrorKind::Notification,
            WatchError::Setup { .. } => ErrorKind::Setup,
        }
    }
}
