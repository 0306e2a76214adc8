//! 重要文件夹监控
//!
//! 在根目录下查找名称匹配关键字的文件夹，为其中的文件在变化时
//! 创建带时间戳的压缩版本。注册表在进程重启后保持不变。

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod notify;
pub mod roots;
pub mod store;

pub use config::{RootConfig, WatcherConfig};
pub use crate::core::{CycleReport, Transition, WatchLoop, Watcher};
pub use error::{ErrorKind, WatchError};
pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use roots::{HomeDirRoots, RootSource, StaticRoots, SystemUsers, UserDatabase, WatchRoot};
pub use store::StateStore;

/// 默认状态目录
pub const DEFAULT_STATE_DIR: &str = "/var/lib/important_folder_watcher";
