use crate::config::WatcherConfig;
use crate::core::archive::ArchiveWriter;
use crate::core::detector::ChangeDetector;
use crate::core::file_state::FileStateStore;
use crate::core::layout::FolderLayout;
use crate::core::registry::{Transition, WatchRegistry};
use crate::core::scanner::FolderScanner;
use crate::error::{ErrorKind, WatchError};
use crate::notify::{started_message, stopped_message, Notifier};
use crate::roots::{RootSource, WatchRoot};
use crate::store::StateStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 一个监控周期的报告
#[derive(Debug, Default)]
pub struct CycleReport {
    pub roots_scanned: usize,
    pub folders_found: usize,
    pub started: Vec<PathBuf>,
    pub stopped: Vec<PathBuf>,
    pub versions_created: Vec<PathBuf>,
    pub versions_overwritten: Vec<PathBuf>,
    pub files_unchanged: usize,
    pub persisted: bool,
    pub errors: Vec<WatchError>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &WatchError> {
        self.errors.iter().filter(move |e| e.kind() == kind)
    }
}

/// 监控状态：注册表、文件状态和各组件
///
/// 启动时从持久化快照构造，每个周期修改，周期结束时写回。
pub struct Watcher {
    scanner: FolderScanner,
    detector: ChangeDetector,
    layout: FolderLayout,
    dry_run: bool,
    registry: WatchRegistry,
    file_states: FileStateStore,
    notifier: Arc<dyn Notifier>,
    store: Option<StateStore>,
}

impl Watcher {
    /// 不持久化的监控器（自检和测试用）
    pub fn new(config: &WatcherConfig, notifier: Arc<dyn Notifier>) -> Self {
        let layout = config.layout();
        Self {
            scanner: FolderScanner::new(config.classifier(), config.max_depth),
            detector: ChangeDetector::new(layout.clone(), ArchiveWriter::new(config.dry_run)),
            layout,
            dry_run: config.dry_run,
            registry: WatchRegistry::new(),
            file_states: FileStateStore::new(),
            notifier,
            store: None,
        }
    }

    /// 从状态目录恢复，只在启动时调用一次
    pub fn with_store(
        config: &WatcherConfig,
        store: StateStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut watcher = Self::new(config, notifier);
        watcher.registry = WatchRegistry::from_snapshot(store.load_registry());
        watcher.file_states = FileStateStore::from_snapshot(store.load_file_states());
        info!(
            "已加载 {} 个被监控文件夹, {} 条文件状态",
            watcher.registry.len(),
            watcher.file_states.file_count()
        );
        watcher.store = Some(store);
        watcher
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn file_states(&self) -> &FileStateStore {
        &self.file_states
    }

    /// 扫描所有根目录，然后持久化
    pub fn run_cycle(&mut self, roots: &[WatchRoot]) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();

        for root in roots {
            self.scan_root(root, &mut report);
        }

        match self.persist() {
            Ok(persisted) => report.persisted = persisted,
            Err(e) => {
                // 内存中的状态保留，下个周期再写
                error!("{}", e);
                report.errors.push(e);
            }
        }

        report.duration = start.elapsed();
        report
    }

    /// 扫描一个根目录并处理找到的重要文件夹
    pub fn scan_root(&mut self, root: &WatchRoot, report: &mut CycleReport) {
        debug!("扫描根目录: {:?} ({})", root.path, root.user);
        let outcome = self.scanner.scan(&root.path);

        report.roots_scanned += 1;
        report.folders_found += outcome.folders.len();
        report.errors.extend(outcome.errors);

        for folder in outcome.folders {
            self.process_folder(&folder, &root.user, report);
        }
    }

    fn process_folder(&mut self, folder_path: &Path, user: &str, report: &mut CycleReport) {
        let Some(folder) = folder_path.to_str() else {
            warn!("跳过非 UTF-8 路径: {:?}", folder_path);
            report
                .errors
                .push(WatchError::NonUtf8Path(folder_path.to_path_buf()));
            return;
        };

        let transition =
            match self
                .registry
                .transition(folder_path, folder, user, &self.layout, self.dry_run)
            {
                Ok(transition) => transition,
                Err(e) => {
                    warn!("{}", e);
                    report.errors.push(e);
                    return;
                }
            };

        let display_name = folder_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.to_string());

        match transition {
            Transition::Started => {
                report.started.push(folder_path.to_path_buf());
                self.send_notification(user, &started_message(&display_name), report);
            }
            Transition::Stopped { deregistered: true } => {
                self.file_states.forget_folder(folder);
                report.stopped.push(folder_path.to_path_buf());
                self.send_notification(user, &stopped_message(&display_name), report);
            }
            Transition::Stopped { deregistered: false } | Transition::AlreadyWatched => {}
        }

        if !transition.is_active() {
            return;
        }

        let outcome = self
            .detector
            .detect_and_version(folder_path, folder, &mut self.file_states);
        report.versions_created.extend(outcome.versioned);
        report.versions_overwritten.extend(outcome.overwritten);
        report.files_unchanged += outcome.unchanged;
        report.errors.extend(outcome.errors);
    }

    fn send_notification(&self, user: &str, message: &str, report: &mut CycleReport) {
        if let Err(e) = self.notifier.notify(user, message) {
            warn!("{}", e);
            report.errors.push(e);
        }
    }

    /// 写回完整快照，dry-run 或无状态目录时跳过
    pub fn persist(&self) -> Result<bool, WatchError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        if self.dry_run {
            debug!("[dry-run] 跳过状态保存");
            return Ok(false);
        }

        store.save_registry(self.registry.snapshot())?;
        store.save_file_states(self.file_states.snapshot())?;
        debug!("状态已保存到 {:?}", store.dir());
        Ok(true)
    }
}

/// 外层调度：扫描、保存、休眠，直到收到终止请求
pub struct WatchLoop {
    watcher: Arc<Mutex<Watcher>>,
    roots: Arc<dyn RootSource>,
    interval: Duration,
}

impl WatchLoop {
    pub fn new(watcher: Watcher, roots: Arc<dyn RootSource>, interval: Duration) -> Self {
        Self {
            watcher: Arc::new(Mutex::new(watcher)),
            roots,
            interval,
        }
    }

    pub fn watcher(&self) -> Arc<Mutex<Watcher>> {
        self.watcher.clone()
    }

    /// 执行一个周期；周期内的 panic 只会被记录
    pub async fn run_once(&self) -> Option<CycleReport> {
        let watcher = self.watcher.clone();
        let roots = self.roots.clone();

        let result = tokio::task::spawn_blocking(move || {
            let roots = roots.roots();
            let mut watcher = watcher.lock().unwrap_or_else(PoisonError::into_inner);
            watcher.run_cycle(&roots)
        })
        .await;

        match result {
            Ok(report) => {
                log_report(&report);
                Some(report)
            }
            Err(e) => {
                error!("监控周期异常终止: {}", e);
                None
            }
        }
    }

    /// 正在执行的周期总会完成（包括保存）后才退出
    pub async fn run(self, cancel: CancellationToken) {
        info!("=== 文件夹监控已启动 ===");

        loop {
            self.run_once().await;

            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("文件夹监控已停止");
    }
}

fn log_report(report: &CycleReport) {
    info!(
        "周期完成: {} 个根目录, {} 个重要文件夹, 新监控 {}, 停止 {}, 新版本 {}, 覆盖 {}, 未变化 {}, 错误 {} ({:?})",
        report.roots_scanned,
        report.folders_found,
        report.started.len(),
        report.stopped.len(),
        report.versions_created.len(),
        report.versions_overwritten.len(),
        report.files_unchanged,
        report.errors.len(),
        report.duration
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::roots::StaticRoots;
    use std::fs;

    /// 记录所有通知，可选择让发送失败
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, user: &str, message: &str) -> Result<(), WatchError> {
            self.sent
                .lock()
                .unwrap()
                .push((user.to_string(), message.to_string()));
            if self.fail {
                return Err(WatchError::Notify {
                    user: user.to_string(),
                    reason: "no session bus".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_started_and_stopped_notify() {
        let home = tempfile::tempdir().unwrap();
        let folder = home.path().join("Wichtig");
        fs::create_dir(&folder).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut watcher = Watcher::new(&WatcherConfig::default(), notifier.clone());
        let roots = [WatchRoot::new(home.path(), "alice")];

        let report = watcher.run_cycle(&roots);
        assert_eq!(report.started, vec![folder.clone()]);

        fs::write(folder.join("STOP"), "").unwrap();
        let report = watcher.run_cycle(&roots);
        assert_eq!(report.stopped, vec![folder.clone()]);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                ("alice".to_string(), "Neue Überwachung für Wichtig".to_string()),
                ("alice".to_string(), "Überwachung gestoppt für Wichtig".to_string()),
            ]
        );
    }

    #[test]
    fn test_notification_failure_does_not_roll_back() {
        let home = tempfile::tempdir().unwrap();
        let folder = home.path().join("Backup");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.txt"), "x").unwrap();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let mut watcher = Watcher::new(&WatcherConfig::default(), notifier);

        let report = watcher.run_cycle(&[WatchRoot::new(home.path(), "bob")]);
        assert!(watcher
            .registry()
            .contains("bob", folder.to_str().unwrap()));
        assert_eq!(report.versions_created.len(), 1);
        assert_eq!(report.errors_of(ErrorKind::Notification).count(), 1);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let state = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let folder = home.path().join("Archiv");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.txt"), "x").unwrap();

        let config = WatcherConfig {
            dry_run: true,
            ..Default::default()
        };
        let store = StateStore::prepare(state.path()).unwrap();
        let mut watcher = Watcher::with_store(&config, store.clone(), Arc::new(LogNotifier));

        let report = watcher.run_cycle(&[WatchRoot::new(home.path(), "bob")]);
        assert_eq!(report.started.len(), 1);
        assert_eq!(report.versions_created.len(), 1);
        assert!(!report.persisted);
        assert!(!folder.join("Versionen").exists());
        assert!(!store.registry_path().exists());
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let state = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        fs::create_dir(home.path().join("Wichtig")).unwrap();

        let store = StateStore::prepare(&state.path().join("state")).unwrap();
        let mut watcher =
            Watcher::with_store(&WatcherConfig::default(), store.clone(), Arc::new(LogNotifier));
        // 状态目录消失，保存失败
        fs::remove_dir_all(store.dir()).unwrap();

        let report = watcher.run_cycle(&[WatchRoot::new(home.path(), "bob")]);
        assert!(!report.persisted);
        assert_eq!(report.errors_of(ErrorKind::Persistence).count(), 1);
        assert_eq!(watcher.registry().len(), 1);

        // 目录恢复后下个周期写入成功
        fs::create_dir_all(store.dir()).unwrap();
        let report = watcher.run_cycle(&[WatchRoot::new(home.path(), "bob")]);
        assert!(report.persisted);
        assert_eq!(store.load_registry().len(), 1);
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel_after_persisting() {
        let state = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        fs::create_dir(home.path().join("Backup")).unwrap();

        let store = StateStore::prepare(state.path()).unwrap();
        let watcher =
            Watcher::with_store(&WatcherConfig::default(), store.clone(), Arc::new(LogNotifier));
        let roots = Arc::new(StaticRoots::new(vec![WatchRoot::new(home.path(), "bob")]));
        let watch_loop = WatchLoop::new(watcher, roots, Duration::from_millis(20));
        let shared = watch_loop.watcher();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch_loop.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();

        let snapshot = store.load_registry();
        assert_eq!(snapshot.get("bob").map(Vec::len), Some(1));
        assert_eq!(shared.lock().unwrap().registry().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_survives_poisoned_state() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir(home.path().join("Wichtig")).unwrap();

        let watcher = Watcher::new(&WatcherConfig::default(), Arc::new(LogNotifier));
        let roots = Arc::new(StaticRoots::new(vec![WatchRoot::new(home.path(), "bob")]));
        let watch_loop = WatchLoop::new(watcher, roots, Duration::from_secs(60));

        let shared = watch_loop.watcher();
        let _ = std::thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let report = watch_loop.run_once().await.expect("cycle should run");
        assert_eq!(report.started.len(), 1);
    }
}
