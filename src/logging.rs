//! 日志模块 - 提供文件日志和大小管理功能

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "important_folder_watcher.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否写入日志文件
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志文件级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 日志目录
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "debug".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from("/var/log")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
            dir: default_dir(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        crate::config::read_document(config_dir)
            .and_then(|config| config.get("log").cloned())
            .and_then(|value| serde_json::from_value::<LogConfig>(value).ok())
            .unwrap_or_default()
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::DEBUG,
        }
    }

    fn max_size_bytes(&self) -> u64 {
        u64::from(self.max_size_mb.max(1)) * 1024 * 1024
    }
}

/// 带大小限制的日志写入器，超过上限时轮转为 `.old`
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    written: u64,
    writer: BufWriter<File>,
}

impl SizeRotatingWriter {
    pub fn new(file_path: PathBuf, max_size: u64) -> io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let existing = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);
        if existing > max_size {
            Self::rotate_file(&file_path)?;
        }

        let writer = Self::open_file(&file_path)?;
        let written = fs::metadata(&file_path).map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file_path,
            max_size,
            written,
            writer,
        })
    }

    fn open_file(file_path: &Path) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(BufWriter::new(file))
    }

    fn backup_path(file_path: &Path) -> PathBuf {
        let mut name = file_path.as_os_str().to_os_string();
        name.push(".old");
        PathBuf::from(name)
    }

    /// 当前日志重命名为备份，旧备份被覆盖
    fn rotate_file(file_path: &Path) -> io::Result<()> {
        let backup_path = Self::backup_path(file_path);
        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(file_path, &backup_path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        Self::rotate_file(&self.file_path)?;
        self.writer = Self::open_file(&self.file_path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for SizeRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let n = self.writer.write(buf)?;
        self.written += n as u64;
        // 每条记录立即落盘
        self.writer.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// 初始化日志系统，返回的 guard 必须持有到进程结束
pub fn init_logging(config: &LogConfig, verbose: bool) -> Option<WorkerGuard> {
    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level.into())
        .from_env_lossy();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let mut guard = None;
    let file_layer = if config.enabled {
        let file_path = config.dir.join(LOG_FILE_NAME);
        match SizeRotatingWriter::new(file_path, config.max_size_bytes()) {
            Ok(writer) => {
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(writer);
                guard = Some(worker_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(false)
                        .with_filter(LevelFilter::from_level(config.tracing_level())),
                )
            }
            Err(e) => {
                // 文件日志创建失败，回退到控制台
                eprintln!("无法打开日志文件 {:?}: {}", config.dir, e);
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    guard
}
