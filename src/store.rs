//! 状态持久化 - 注册表与文件状态

use crate::core::{FileStateSnapshot, RegistrySnapshot};
use crate::error::WatchError;
use scopeguard::ScopeGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 注册表文件名
pub const REGISTRY_FILE: &str = "version_lists.json";
/// 文件状态文件名
pub const FILE_STATES_FILE: &str = "file_states.json";

/// 状态目录
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// 创建状态目录，失败时守护进程不能启动
    pub fn prepare(dir: &Path) -> Result<Self, WatchError> {
        let setup_err = |source| WatchError::Setup {
            path: dir.to_path_buf(),
            source,
        };

        fs::create_dir_all(dir).map_err(setup_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).map_err(setup_err)?;
        }

        debug!("状态目录就绪: {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.join(REGISTRY_FILE)
    }

    pub fn file_states_path(&self) -> PathBuf {
        self.dir.join(FILE_STATES_FILE)
    }

    /// 加载注册表，缺失或损坏时返回空表
    pub fn load_registry(&self) -> RegistrySnapshot {
        self.load_or_default(&self.registry_path())
    }

    pub fn save_registry(&self, snapshot: &RegistrySnapshot) -> Result<(), WatchError> {
        save_json(&self.registry_path(), snapshot)
    }

    pub fn load_file_states(&self) -> FileStateSnapshot {
        self.load_or_default(&self.file_states_path())
    }

    pub fn save_file_states(&self, snapshot: &FileStateSnapshot) -> Result<(), WatchError> {
        save_json(&self.file_states_path(), snapshot)
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> T {
        match load_json(path) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("状态文件不存在，使用空状态: {:?}", path);
                T::default()
            }
            Err(e) => {
                warn!("{}，使用空状态", e);
                T::default()
            }
        }
    }
}

/// 读取 JSON 文档，文件不存在时返回 None
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, WatchError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(WatchError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| WatchError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// 原子写入 JSON 文档（临时文件 + rename），权限 0600
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), WatchError> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data).map_err(|source| WatchError::Save {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let cleanup = scopeguard::guard(tmp_path.clone(), |path| {
        let _ = fs::remove_file(path);
    });

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    #[cfg(unix)]
    {
        // 临时文件可能是上次遗留的，mode 不会生效
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    ScopeGuard::into_inner(cleanup);
    Ok(())
}
