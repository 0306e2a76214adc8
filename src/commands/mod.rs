pub mod run;
pub mod selftest;

use crate::config::WatcherConfig;
use crate::notify::{DesktopNotifier, LogNotifier, Notifier};
use crate::roots::{HomeDirRoots, RootSource, StaticRoots, WatchRoot};
use std::sync::Arc;

/// 根据配置选择通知器
pub fn build_notifier(config: &WatcherConfig) -> Arc<dyn Notifier> {
    if config.notify {
        Arc::new(DesktopNotifier::new())
    } else {
        Arc::new(LogNotifier)
    }
}

/// 配置了根目录时使用它们，否则扫描所有普通用户的 home
pub fn build_roots(config: &WatcherConfig) -> Arc<dyn RootSource> {
    if config.roots.is_empty() {
        Arc::new(HomeDirRoots::system())
    } else {
        Arc::new(StaticRoots::new(
            config.roots.iter().map(WatchRoot::from).collect(),
        ))
    }
}
