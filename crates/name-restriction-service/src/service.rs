//! 用户名限制服务
//!
//! 组装缓存、匹配引擎、同步协议与生命周期控制器，对外暴露准入检查与规则管理操作。

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::cache::{RuleCache, RuleCacheStats};
use crate::error::Result;
use crate::host::{ChannelId, PermissionChange, RoundProvider, SessionRegistry};
use crate::lifecycle::RuleLifecycleController;
use crate::matcher::{MatchEngine, MatchOutcome};
use crate::models::CreateRuleRequest;
use crate::store::RuleStore;
use crate::sync::{InboundMessage, PermissionSubscription, PermissionWatcher, SyncProtocol, Transport};

/// 用户名限制服务
pub struct NameRestrictionService {
    cache: Arc<RuleCache>,
    engine: MatchEngine,
    sync: Arc<SyncProtocol>,
    lifecycle: RuleLifecycleController,
}

impl NameRestrictionService {
    /// 以空缓存创建服务，调用方随后应执行一次 `restart()` 载入规则
    pub fn new(
        store: Arc<dyn RuleStore>,
        sessions: Arc<dyn SessionRegistry>,
        transport: Arc<dyn Transport>,
        rounds: Arc<dyn RoundProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let cache = Arc::new(RuleCache::new());
        let engine = MatchEngine::new(cache.clone(), store.clone());
        let sync = Arc::new(SyncProtocol::new(
            cache.clone(),
            store.clone(),
            sessions.clone(),
            transport,
        ));
        let lifecycle = RuleLifecycleController::new(
            store,
            cache.clone(),
            sync.clone(),
            sessions,
            rounds,
            audit,
        );

        Self {
            cache,
            engine,
            sync,
            lifecycle,
        }
    }

    pub async fn evaluate(&self, username: &str) -> MatchOutcome {
        self.engine.evaluate(username).await
    }

    pub async fn create_rule(&self, request: CreateRuleRequest) -> Result<i64> {
        self.lifecycle.create_rule(request).await
    }

    pub async fn remove_rule(&self, id: i64, removing_admin: Option<Uuid>) -> Result<bool> {
        self.lifecycle.remove_rule(id, removing_admin).await
    }

    pub async fn restart(&self) -> Result<usize> {
        self.lifecycle.restart().await
    }

    pub async fn whitelist_add(&self, username: &str) -> Result<()> {
        self.lifecycle.whitelist_add(username).await
    }

    pub async fn whitelist_remove(&self, username: &str) -> Result<bool> {
        self.lifecycle.whitelist_remove(username).await
    }

    /// 处理来自管理端通道的请求
    pub async fn handle_message(&self, channel: ChannelId, message: InboundMessage) {
        self.sync.handle_message(channel, message).await;
    }

    /// 开始监听权限变更
    pub fn watch_permissions(
        &self,
        changes: broadcast::Receiver<PermissionChange>,
    ) -> PermissionSubscription {
        PermissionWatcher::spawn(self.sync.clone(), changes)
    }

    pub fn stats(&self) -> RuleCacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    pub fn sync(&self) -> &Arc<SyncProtocol> {
        &self.sync
    }
}
