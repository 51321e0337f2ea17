//! 进程内会话注册表
//!
//! 宿主未接入真实会话系统时使用，同时作为集成测试的会话来源。
//! 权限变更通过 `tokio::sync::broadcast` 发布给订阅方。

use std::collections::{BTreeMap, VecDeque};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::{AdminFlags, ChannelId, PermissionChange, SessionInfo, SessionRegistry};

/// 权限变更广播缓冲区大小
const PERMISSION_CHANGE_CAPACITY: usize = 256;

/// 保留的最近断开记录条数
pub const DISCONNECT_LOG_CAPACITY: usize = 128;

/// 断开记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRecord {
    pub channel: ChannelId,
    pub username: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
struct LocalSession {
    info: SessionInfo,
    flags: Option<AdminFlags>,
}

/// 进程内会话注册表
pub struct LocalSessionRegistry {
    sessions: RwLock<BTreeMap<ChannelId, LocalSession>>,
    changes: broadcast::Sender<PermissionChange>,
    /// 最近的断开记录，超出容量时丢弃最早的一条
    disconnects: Mutex<VecDeque<DisconnectRecord>>,
    disconnect_capacity: usize,
}

impl Default for LocalSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSessionRegistry {
    pub fn new() -> Self {
        Self::with_disconnect_capacity(DISCONNECT_LOG_CAPACITY)
    }

    /// 指定断开记录保留条数，0 表示不保留
    pub fn with_disconnect_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(PERMISSION_CHANGE_CAPACITY);
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            changes,
            disconnects: Mutex::new(VecDeque::with_capacity(capacity)),
            disconnect_capacity: capacity,
        }
    }

    /// 登记一个已连接会话（无管理员身份）
    pub fn connect(&self, channel: ChannelId, username: impl Into<String>) -> SessionInfo {
        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            username: username.into(),
            channel,
        };
        self.sessions.write().insert(
            channel,
            LocalSession {
                info: info.clone(),
                flags: None,
            },
        );
        debug!(channel = %channel, username = %info.username, "会话已连接");
        info
    }

    /// 更新会话权限并发布变更事件
    ///
    /// 通道不存在时忽略
    pub fn set_flags(&self, channel: ChannelId, flags: Option<AdminFlags>) {
        let previous = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(&channel) else {
                return;
            };
            std::mem::replace(&mut session.flags, flags)
        };

        // 没有订阅者时发送失败是正常情况
        let _ = self.changes.send(PermissionChange {
            channel,
            previous,
            current: flags,
        });
    }

    /// 订阅权限变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<PermissionChange> {
        self.changes.subscribe()
    }

    pub fn is_connected(&self, channel: ChannelId) -> bool {
        self.sessions.read().contains_key(&channel)
    }

    /// 最近的断开记录（按发生顺序）
    pub fn disconnected(&self) -> Vec<DisconnectRecord> {
        self.disconnects.lock().iter().cloned().collect()
    }
}

impl SessionRegistry for LocalSessionRegistry {
    fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|session| session.info.clone())
            .collect()
    }

    fn flags(&self, channel: ChannelId) -> Option<AdminFlags> {
        self.sessions
            .read()
            .get(&channel)
            .and_then(|session| session.flags)
    }

    fn disconnect(&self, channel: ChannelId, reason: &str) {
        let Some(session) = self.sessions.write().remove(&channel) else {
            return;
        };

        info!(
            channel = %channel,
            username = %session.info.username,
            reason = %reason,
            "会话已断开"
        );
        if self.disconnect_capacity == 0 {
            return;
        }
        let mut log = self.disconnects.lock();
        if log.len() == self.disconnect_capacity {
            log.pop_front();
        }
        log.push_back(DisconnectRecord {
            channel,
            username: session.info.username,
            reason: reason.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_disconnect() {
        let registry = LocalSessionRegistry::new();
        registry.connect(ChannelId(1), "adminbot");
        registry.connect(ChannelId(2), "player1");

        assert_eq!(registry.sessions().len(), 2);

        registry.disconnect(ChannelId(1), "reserved");
        registry.disconnect(ChannelId(9), "unknown channel");

        assert!(!registry.is_connected(ChannelId(1)));
        assert!(registry.is_connected(ChannelId(2)));
        assert_eq!(
            registry.disconnected(),
            vec![DisconnectRecord {
                channel: ChannelId(1),
                username: "adminbot".to_string(),
                reason: "reserved".to_string(),
            }]
        );
    }

    #[test]
    fn test_disconnect_log_keeps_most_recent() {
        let registry = LocalSessionRegistry::with_disconnect_capacity(2);
        for (channel, name) in [(1, "first"), (2, "second"), (3, "third")] {
            registry.connect(ChannelId(channel), name);
            registry.disconnect(ChannelId(channel), "reserved");
        }

        let names: Vec<_> = registry
            .disconnected()
            .into_iter()
            .map(|record| record.username)
            .collect();
        assert_eq!(names, vec!["second", "third"]);
        assert!(registry.sessions().is_empty());
    }

    #[test]
    fn test_disconnect_log_disabled() {
        let registry = LocalSessionRegistry::with_disconnect_capacity(0);
        registry.connect(ChannelId(1), "player");
        registry.disconnect(ChannelId(1), "reserved");

        assert!(!registry.is_connected(ChannelId(1)));
        assert!(registry.disconnected().is_empty());
    }

    #[test]
    fn test_default_disconnect_log_is_bounded() {
        let registry = LocalSessionRegistry::new();
        for channel in 0..(DISCONNECT_LOG_CAPACITY as u64 + 10) {
            registry.connect(ChannelId(channel), format!("player{}", channel));
            registry.disconnect(ChannelId(channel), "reserved");
        }

        let log = registry.disconnected();
        assert_eq!(log.len(), DISCONNECT_LOG_CAPACITY);
        assert_eq!(log[0].channel, ChannelId(10));
    }

    #[tokio::test]
    async fn test_set_flags_publishes_change() {
        let registry = LocalSessionRegistry::new();
        let mut changes = registry.subscribe();
        registry.connect(ChannelId(3), "mod");

        registry.set_flags(ChannelId(3), Some(AdminFlags::BAN));
        registry.set_flags(ChannelId(3), None);
        registry.set_flags(ChannelId(4), Some(AdminFlags::BAN));

        let first = changes.recv().await.unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.current, Some(AdminFlags::BAN));

        let second = changes.recv().await.unwrap();
        assert_eq!(second.previous, Some(AdminFlags::BAN));
        assert_eq!(second.current, None);

        assert!(changes.try_recv().is_err());
        assert_eq!(registry.flags(ChannelId(3)), None);
    }
}
