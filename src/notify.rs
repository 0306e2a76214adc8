//! 用户通知

use crate::error::WatchError;
use crate::roots::{SystemUsers, UserDatabase};
use std::process::Command;
use std::sync::Arc;
use tracing::info;

/// 通知标题
pub const NOTIFY_TITLE: &str = "Ordnerüberwachung";

/// 尽力而为的通知接口，失败只会被记录
pub trait Notifier: Send + Sync {
    fn notify(&self, user: &str, message: &str) -> Result<(), WatchError>;
}

/// 只写日志的通知器
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: &str, message: &str) -> Result<(), WatchError> {
        info!("通知 {}: {}", user, message);
        Ok(())
    }
}

/// 通过 notify-send 发送桌面通知
#[derive(Clone)]
pub struct DesktopNotifier {
    users: Arc<dyn UserDatabase>,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_users(Arc::new(SystemUsers))
    }

    pub fn with_users(users: Arc<dyn UserDatabase>) -> Self {
        Self { users }
    }

    fn command(&self, user: &str, uid: u32, message: &str) -> Command {
        let dbus_address = format!("unix:path=/run/user/{}/bus", uid);

        let mut cmd = Command::new("sudo");
        cmd.args(["-u", user])
            .arg(format!("DBUS_SESSION_BUS_ADDRESS={}", dbus_address))
            .args(["notify-send", NOTIFY_TITLE, message]);
        cmd
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, user: &str, message: &str) -> Result<(), WatchError> {
        let notify_err = |reason: String| WatchError::Notify {
            user: user.to_string(),
            reason,
        };

        let entry = self
            .users
            .lookup(user)
            .map_err(|e| notify_err(format!("查询用户失败: {}", e)))?
            .ok_or_else(|| notify_err("用户不存在".to_string()))?;

        let status = self
            .command(user, entry.uid, message)
            .status()
            .map_err(|e| notify_err(e.to_string()))?;
        if !status.success() {
            return Err(notify_err(format!("notify-send 退出: {}", status)));
        }

        info!("通知已发送给 {}", user);
        Ok(())
    }
}

/// 开始监控时的通知文本
pub fn started_message(folder_name: &str) -> String {
    format!("Neue Überwachung für {}", folder_name)
}

/// 停止监控时的通知文本
pub fn stopped_message(folder_name: &str) -> String {
    format!("Überwachung gestoppt für {}", folder_name)
}
