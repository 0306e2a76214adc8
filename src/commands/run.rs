//! 前台运行守护进程

use super::{build_notifier, build_roots};
use crate::config::{read_document, WatcherConfig, CONFIG_FILE};
use crate::core::{WatchLoop, Watcher};
use crate::store::StateStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 初始化后无限循环，直到收到 SIGINT/SIGTERM
pub async fn run(state_dir: &Path) -> Result<()> {
    let store = StateStore::prepare(state_dir).context("初始化失败，监控不会启动")?;
    let config = WatcherConfig::load(state_dir);
    if config.dry_run {
        warn!("dry-run 模式: 不会创建目录、归档或保存状态");
    }

    let watcher = Watcher::with_store(&config, store, build_notifier(&config));
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let watch_loop = WatchLoop::new(watcher, build_roots(&config), interval);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());
    watch_loop.run(cancel).await;

    info!("服务已结束");
    Ok(())
}

/// 写入默认配置（已存在时不覆盖）
pub fn init_config(state_dir: &Path) -> Result<()> {
    StateStore::prepare(state_dir)?;

    let exists = read_document(state_dir)
        .map(|doc| doc.get("watcher").is_some())
        .unwrap_or(false);
    if exists {
        info!("配置已存在: {:?}", state_dir.join(CONFIG_FILE));
        return Ok(());
    }

    WatcherConfig::default()
        .save(state_dir)
        .with_context(|| format!("写入配置失败: {:?}", state_dir.join(CONFIG_FILE)))?;
    info!("默认配置已写入: {:?}", state_dir.join(CONFIG_FILE));
    Ok(())
}

/// 收到终止信号后取消，正在执行的周期会先完成
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("收到终止信号，当前周期结束后退出");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("无法监听 SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        init_config(dir.path()).unwrap();
        assert_eq!(WatcherConfig::load(dir.path()).interval_secs, 60);

        let custom = WatcherConfig {
            interval_secs: 7,
            ..Default::default()
        };
        custom.save(dir.path()).unwrap();
        init_config(dir.path()).unwrap();
        assert_eq!(WatcherConfig::load(dir.path()).interval_secs, 7);
    }
}
