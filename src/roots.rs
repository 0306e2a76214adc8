//! 扫描根目录来源

use crate::config::RootConfig;
use nix::unistd::User;
use std::collections::HashSet;
use std::ffi::{CStr, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// 一个扫描根目录及其所属用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    pub path: PathBuf,
    pub user: String,
}

impl WatchRoot {
    pub fn new(path: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            user: user.into(),
        }
    }
}

impl From<&RootConfig> for WatchRoot {
    fn from(config: &RootConfig) -> Self {
        Self::new(config.path.clone(), config.user.clone())
    }
}

/// 每个周期开始时提供根目录列表
pub trait RootSource: Send + Sync {
    fn roots(&self) -> Vec<WatchRoot>;
}

/// 固定的根目录列表
#[derive(Debug, Clone, Default)]
pub struct StaticRoots {
    roots: Vec<WatchRoot>,
}

impl StaticRoots {
    pub fn new(roots: Vec<WatchRoot>) -> Self {
        Self { roots }
    }
}

impl RootSource for StaticRoots {
    fn roots(&self) -> Vec<WatchRoot> {
        self.roots.clone()
    }
}

/// 低于此 uid 的是系统用户
pub const MIN_USER_UID: u32 = 1000;

/// 用户数据库中的一个账户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub name: String,
    pub uid: u32,
    pub home: PathBuf,
}

impl From<User> for UserAccount {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            home: user.dir,
        }
    }
}

/// 账户查询接口
pub trait UserDatabase: Send + Sync {
    /// 枚举所有账户
    fn accounts(&self) -> Vec<UserAccount>;

    /// 按用户名查找，`Ok(None)` 表示用户不存在
    fn lookup(&self, name: &str) -> io::Result<Option<UserAccount>>;
}

/// 系统用户数据库，经 NSS 查询（包括 LDAP、SSSD 等来源）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUsers;

/// getpwent 使用进程级游标，枚举必须串行
static PWENT_LOCK: Mutex<()> = Mutex::new(());

impl UserDatabase for SystemUsers {
    fn accounts(&self) -> Vec<UserAccount> {
        let _guard = PWENT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let mut accounts = Vec::new();

        // SAFETY: getpwent 返回的记录在下一次调用前有效，字段在循环内立即复制；
        // PWENT_LOCK 保证本进程内没有并发的枚举。
        unsafe {
            libc::setpwent();
            loop {
                let entry = libc::getpwent();
                if entry.is_null() {
                    break;
                }
                let entry = &*entry;
                if entry.pw_name.is_null() || entry.pw_dir.is_null() {
                    continue;
                }
                let Ok(name) = CStr::from_ptr(entry.pw_name).to_str() else {
                    continue;
                };
                let home = OsStr::from_bytes(CStr::from_ptr(entry.pw_dir).to_bytes());
                accounts.push(UserAccount {
                    name: name.to_string(),
                    uid: entry.pw_uid,
                    home: PathBuf::from(home),
                });
            }
            libc::endpwent();
        }

        accounts
    }

    fn lookup(&self, name: &str) -> io::Result<Option<UserAccount>> {
        Ok(User::from_name(name)?.map(UserAccount::from))
    }
}

/// 普通用户的 home 目录
#[derive(Clone)]
pub struct HomeDirRoots {
    users: Arc<dyn UserDatabase>,
    min_uid: u32,
}

impl HomeDirRoots {
    pub fn new(users: Arc<dyn UserDatabase>, min_uid: u32) -> Self {
        Self { users, min_uid }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemUsers), MIN_USER_UID)
    }
}

impl RootSource for HomeDirRoots {
    fn roots(&self) -> Vec<WatchRoot> {
        let accounts = self.users.accounts();
        if accounts.is_empty() {
            error!("用户数据库中没有账户");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        accounts
            .into_iter()
            .filter(|account| account.uid >= self.min_uid && account.home.is_dir())
            // 多个 NSS 来源可能返回同一账户
            .filter(|account| seen.insert(account.name.clone()))
            .inspect(|account| debug!("home 目录: {:?} ({})", account.home, account.name))
            .map(|account| WatchRoot::new(account.home, account.name))
            .collect()
    }
}

/// 固定账户列表
#[cfg(test)]
pub(crate) struct FixedUsers(pub Vec<UserAccount>);

#[cfg(test)]
impl UserDatabase for FixedUsers {
    fn accounts(&self) -> Vec<UserAccount> {
        self.0.clone()
    }

    fn lookup(&self, name: &str) -> io::Result<Option<UserAccount>> {
        Ok(self.0.iter().find(|a| a.name == name).cloned())
    }
}
