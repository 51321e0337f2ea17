//! 规则同步协议
//!
//! 把缓存变更（新增/删除/重置）推送给持有封禁管理权限的通道，
//! 并响应单个通道的重同步与详情请求。

use std::sync::Arc;

use guard_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use super::messages::{
    InboundMessage, OutboundMessage, RuleDelta, RuleDetailResponse, reset_sequence,
};
use super::transport::Transport;
use crate::cache::{CachedRuleEntry, RuleCache};
use crate::error::{RestrictionError, Result};
use crate::host::{ChannelId, PermissionChange, SessionRegistry};
use crate::store::RuleStore;

/// 规则同步协议
pub struct SyncProtocol {
    cache: Arc<RuleCache>,
    store: Arc<dyn RuleStore>,
    sessions: Arc<dyn SessionRegistry>,
    transport: Arc<dyn Transport>,
}

impl SyncProtocol {
    pub fn new(
        cache: Arc<RuleCache>,
        store: Arc<dyn RuleStore>,
        sessions: Arc<dyn SessionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            cache,
            store,
            sessions,
            transport,
        }
    }

    /// 向所有管理通道广播新增
    pub fn broadcast_added(&self, entry: &CachedRuleEntry) {
        self.broadcast_delta(RuleDelta::added(entry));
    }

    /// 向所有管理通道广播删除
    pub fn broadcast_removed(&self, id: i64) {
        self.broadcast_delta(RuleDelta::removed(id));
    }

    fn broadcast_delta(&self, delta: RuleDelta) {
        let channels = self.sessions.privileged_channels();
        for channel in &channels {
            self.transport
                .send(*channel, OutboundMessage::RuleDelta(delta.clone()));
        }
        metrics::record_sync_messages("delta", channels.len() as u64);
        debug!(
            rule_id = delta.id,
            present = delta.present,
            channels = channels.len(),
            "规则增量已广播"
        );
    }

    /// 向所有管理通道广播全量重置
    pub fn broadcast_reset(&self) {
        let sequence = reset_sequence(&self.cache.snapshot());
        let channels = self.sessions.privileged_channels();
        for channel in &channels {
            self.send_sequence(*channel, &sequence);
        }
        info!(
            rules = sequence.len() - 1,
            channels = channels.len(),
            "全量重置已广播"
        );
    }

    /// 向单个通道推送全量重置
    pub fn send_reset(&self, channel: ChannelId) {
        let sequence = reset_sequence(&self.cache.snapshot());
        self.send_sequence(channel, &sequence);
        debug!(channel = %channel, rules = sequence.len() - 1, "全量重置已推送");
    }

    fn send_sequence(&self, channel: ChannelId, sequence: &[RuleDelta]) {
        for delta in sequence {
            self.transport
                .send(channel, OutboundMessage::RuleDelta(delta.clone()));
        }
        metrics::record_sync_messages("reset", sequence.len() as u64);
    }

    fn ensure_privileged(&self, channel: ChannelId) -> Result<()> {
        if self.sessions.has_ban_permission(channel) {
            Ok(())
        } else {
            Err(RestrictionError::PermissionDenied { channel })
        }
    }

    /// 处理客户端请求
    ///
    /// 所有失败都静默丢弃，不向客户端回复错误
    pub async fn handle_message(&self, channel: ChannelId, message: InboundMessage) {
        let result = match message {
            InboundMessage::RequestResync => self.handle_resync_request(channel),
            InboundMessage::RequestDetail { ban_id } => {
                self.handle_detail_request(channel, ban_id).await
            }
        };

        if let Err(e) = result {
            debug!(channel = %channel, error = %e, "同步请求已丢弃");
        }
    }

    /// 处理重同步请求：仅回复请求方
    pub fn handle_resync_request(&self, channel: ChannelId) -> Result<()> {
        self.ensure_privileged(channel)?;
        self.send_reset(channel);
        Ok(())
    }

    /// 处理详情请求
    ///
    /// 规则不存在时不回复
    #[instrument(skip(self), fields(channel = %channel))]
    pub async fn handle_detail_request(&self, channel: ChannelId, ban_id: i64) -> Result<()> {
        self.ensure_privileged(channel)?;

        let rule = match self.store.get_rule(ban_id).await {
            Ok(Some(rule)) => rule,
            Ok(None) => return Err(RestrictionError::RuleNotFound(ban_id)),
            Err(e) => {
                warn!(error = %e, "查询规则详情失败");
                return Err(e);
            }
        };

        self.transport.send(
            channel,
            OutboundMessage::RuleDetail(RuleDetailResponse::from(&rule)),
        );
        metrics::record_sync_messages("detail", 1);
        Ok(())
    }

    /// 处理会话权限变更
    ///
    /// 仅在新授予封禁管理权限时向该通道推送全量重置，返回是否推送
    pub fn on_permissions_changed(&self, change: &PermissionChange) -> bool {
        if !change.grants_ban_management() {
            return false;
        }

        info!(channel = %change.channel, "通道获得封禁管理权限，推送全量重置");
        self.send_reset(change.channel);
        true
    }
}
