//! 一次性自检

use super::build_notifier;
use crate::config::WatcherConfig;
use crate::core::Watcher;
use crate::notify::LogNotifier;
use crate::roots::WatchRoot;
use crate::store::StateStore;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 自检用的临时目录名，位于状态目录下
const SCRATCH_DIR: &str = "selftest";

/// 初始化状态目录、发送测试通知，并在临时目录上跑一个完整周期
pub async fn run(state_dir: &Path) -> Result<()> {
    info!("=== 自检模式 ===");
    let store = StateStore::prepare(state_dir)?;
    let mut config = WatcherConfig::load(state_dir);
    // 自检只写临时目录，dry-run 没有意义
    config.dry_run = false;

    let user = std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "root".to_string());
    if let Err(e) = build_notifier(&config).notify(&user, "Testbenachrichtigung") {
        warn!("测试通知失败: {}", e);
    }

    let scratch = store.dir().join(SCRATCH_DIR);
    let versions = tokio::task::spawn_blocking(move || check_cycle(&config, &scratch, &user))
        .await
        .context("自检任务异常终止")??;

    if versions != 1 {
        bail!("自检失败: 预期 1 个版本，实际 {}", versions);
    }
    info!("自检通过");
    Ok(())
}

/// 在 `scratch` 下构造 Dokumente/Wichtig/probe.txt，返回产生的版本数
pub fn check_cycle(config: &WatcherConfig, scratch: &Path, user: &str) -> Result<usize> {
    if scratch.exists() {
        fs::remove_dir_all(scratch)?;
    }
    let _cleanup = scopeguard::guard(scratch.to_path_buf(), |path| {
        let _ = fs::remove_dir_all(path);
    });

    let folder = scratch.join("Dokumente").join("Wichtig");
    fs::create_dir_all(&folder).with_context(|| format!("无法创建 {:?}", folder))?;
    fs::write(folder.join("probe.txt"), "selftest").context("无法写入测试文件")?;

    let mut watcher = Watcher::new(config, Arc::new(LogNotifier));
    let report = watcher.run_cycle(&[WatchRoot::new(scratch, user)]);
    for e in &report.errors {
        warn!("自检周期错误: {}", e);
    }
    if report.started.len() != 1 {
        bail!("自检失败: 未识别到测试文件夹 {:?}", folder);
    }

    let versions_dir = config.layout().versions_dir(&folder);
    let count = fs::read_dir(&versions_dir)
        .with_context(|| format!("无法读取 {:?}", versions_dir))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(crate::core::ARCHIVE_EXTENSION))
        .count();
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cycle_produces_one_version_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(SCRATCH_DIR);

        let count = check_cycle(&WatcherConfig::default(), &scratch, "tester").unwrap();
        assert_eq!(count, 1);
        assert!(!scratch.exists());
    }

    #[test]
    fn test_check_cycle_fails_when_keyword_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatcherConfig {
            keywords: vec!["nichts".to_string()],
            ..Default::default()
        };

        assert!(check_cycle(&config, &dir.path().join(SCRATCH_DIR), "tester").is_err());
    }
}
