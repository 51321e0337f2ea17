//! 权限变更监听
//!
//! 订阅会话注册表发布的 `PermissionChange` 事件，转交给 `SyncProtocol`。
//! 订阅方持有 `PermissionSubscription`，通过 `unsubscribe()` 显式注销。

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::SyncProtocol;
use crate::host::PermissionChange;

/// 权限变更监听器
pub struct PermissionWatcher;

impl PermissionWatcher {
    /// 启动监听任务
    pub fn spawn(
        sync: Arc<SyncProtocol>,
        mut changes: broadcast::Receiver<PermissionChange>,
    ) -> PermissionSubscription {
        let handle = tokio::spawn(async move {
            info!("权限变更监听已启动");
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        debug!(channel = %change.channel, "收到权限变更");
                        sync.on_permissions_changed(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "权限变更事件积压，部分事件已丢失");
                    }
                    Err(RecvError::Closed) => {
                        info!("权限变更来源已关闭，监听退出");
                        break;
                    }
                }
            }
        });

        PermissionSubscription { handle }
    }
}

/// 监听订阅句柄
pub struct PermissionSubscription {
    handle: JoinHandle<()>,
}

impl PermissionSubscription {
    /// 注销订阅并停止监听任务
    pub fn unsubscribe(self) {
        self.handle.abort();
        info!("权限变更监听已注销");
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::{CompiledRule, RuleCache};
    use crate::host::{AdminFlags, ChannelId, LocalSessionRegistry};
    use crate::models::RuleKind;
    use crate::store::MemoryRuleStore;
    use crate::sync::messages::OutboundMessage;
    use crate::sync::transport::LocalTransport;

    fn protocol(
        sessions: Arc<LocalSessionRegistry>,
        transport: Arc<LocalTransport>,
    ) -> Arc<SyncProtocol> {
        let cache = Arc::new(RuleCache::new());
        cache.put(CompiledRule::new(1, RuleKind::Literal, "bob", "bob", false).unwrap());
        Arc::new(SyncProtocol::new(
            cache,
            Arc::new(MemoryRuleStore::new()),
            sessions,
            transport,
        ))
    }

    #[tokio::test]
    async fn test_grant_triggers_reset() {
        let sessions = Arc::new(LocalSessionRegistry::new());
        let transport = Arc::new(LocalTransport::new());
        sessions.connect(ChannelId(1), "mod");
        let mut rx = transport.register(ChannelId(1));

        let subscription =
            PermissionWatcher::spawn(protocol(sessions.clone(), transport), sessions.subscribe());
        assert!(subscription.is_active());

        sessions.set_flags(ChannelId(1), Some(AdminFlags::ADMIN | AdminFlags::BAN));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            OutboundMessage::RuleDelta(delta) => assert!(delta.is_reset_marker()),
            other => panic!("unexpected message: {:?}", other),
        }
        let second = rx.recv().await.unwrap();
        match second {
            OutboundMessage::RuleDelta(delta) => assert_eq!(delta.id, 1),
            other => panic!("unexpected message: {:?}", other),
        }

        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn test_no_reset_after_unsubscribe() {
        let sessions = Arc::new(LocalSessionRegistry::new());
        let transport = Arc::new(LocalTransport::new());
        sessions.connect(ChannelId(1), "mod");
        let mut rx = transport.register(ChannelId(1));

        let subscription =
            PermissionWatcher::spawn(protocol(sessions.clone(), transport), sessions.subscribe());
        subscription.unsubscribe();
        tokio::task::yield_now().await;

        sessions.set_flags(ChannelId(1), Some(AdminFlags::BAN));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watcher_exits_when_source_closes() {
        let sessions = Arc::new(LocalSessionRegistry::new());
        let transport = Arc::new(LocalTransport::new());
        let (tx, rx) = broadcast::channel(4);

        let subscription = PermissionWatcher::spawn(protocol(sessions, transport), rx);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), async {
            while subscription.is_active() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
