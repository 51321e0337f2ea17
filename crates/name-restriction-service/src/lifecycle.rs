//! 规则生命周期控制
//!
//! 缓存的唯一写入方。每次变更的顺序固定为：
//!
//! 1. 提交到存储
//! 2. 更新缓存
//! 3. 广播同步消息
//! 4. 写审计记录 / 踢出已连接的违规会话
//!
//! 1~3 步在变更锁内完成，缓存的应用顺序与存储提交顺序一致。

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use guard_shared::observability::metrics;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditSink, SYSTEM_ACTOR};
use crate::cache::{CompiledRule, RuleCache};
use crate::error::{RestrictionError, Result};
use crate::host::{RoundProvider, SessionInfo, SessionRegistry};
use crate::models::{CreateRuleRequest, NewUsernameRule};
use crate::store::RuleStore;
use crate::sync::SyncProtocol;

/// 规则生命周期控制器
pub struct RuleLifecycleController {
    store: Arc<dyn RuleStore>,
    cache: Arc<RuleCache>,
    sync: Arc<SyncProtocol>,
    sessions: Arc<dyn SessionRegistry>,
    rounds: Arc<dyn RoundProvider>,
    audit: Arc<dyn AuditSink>,
    /// 串行化所有缓存变更
    mutation: Mutex<()>,
}

impl RuleLifecycleController {
    pub fn new(
        store: Arc<dyn RuleStore>,
        cache: Arc<RuleCache>,
        sync: Arc<SyncProtocol>,
        sessions: Arc<dyn SessionRegistry>,
        rounds: Arc<dyn RoundProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            cache,
            sync,
            sessions,
            rounds,
            audit,
            mutation: Mutex::new(()),
        }
    }

    /// 创建规则
    ///
    /// 表达式为空或正则无法编译时直接拒绝，不写存储。
    /// 成功后立即对已连接会话执行一次检查，返回存储分配的规则 ID。
    #[instrument(skip(self, request), fields(kind = ?request.kind, expression = %request.expression))]
    pub async fn create_rule(&self, request: CreateRuleRequest) -> Result<i64> {
        if request.expression.is_empty() {
            warn!("规则表达式为空，拒绝创建");
            return Err(RestrictionError::EmptyExpression);
        }

        let message = request.effective_message().to_string();
        let mut compiled = CompiledRule::new(
            0,
            request.kind,
            request.expression.clone(),
            message.clone(),
            request.extend_to_ban,
        )
        .inspect_err(|e| warn!(error = %e, "规则表达式无效，拒绝创建"))?;

        let round_id = self.rounds.current_round_id();
        let new_rule = NewUsernameRule {
            kind: request.kind,
            expression: request.expression.clone(),
            message,
            extend_to_ban: request.extend_to_ban,
            created_at: Utc::now(),
            round_id,
            restricting_admin: request.restricting_admin,
        };

        {
            let _guard = self.mutation.lock().await;

            let id = self
                .store
                .add_rule(new_rule)
                .await
                .inspect_err(|e| warn!(error = %e, "规则持久化失败，缓存未变更"))?;

            compiled.id = id;
            let entry = compiled.entry();
            self.cache.put(compiled.clone());
            self.sync.broadcast_added(&entry);
        }

        let id = compiled.id;
        metrics::record_rule_change("created");

        let actor = self.actor_name(request.restricting_admin).await;
        self.audit.record(
            AuditEntry::new(AuditAction::Created, id, actor)
                .with_rule(
                    compiled.expression.clone(),
                    compiled.kind.is_pattern(),
                    compiled.extend_to_ban,
                )
                .with_round(round_id),
        );

        let kicked = self.enforce(std::slice::from_ref(&compiled)).await;
        info!(rule_id = id, kicked, "规则已创建");

        Ok(id)
    }

    /// 退役规则
    ///
    /// 存储中不存在（或已退役）的 ID 不做任何变更，返回 false。
    /// 已被踢出的会话不会恢复。
    #[instrument(skip(self))]
    pub async fn remove_rule(&self, id: i64, removing_admin: Option<Uuid>) -> Result<bool> {
        let rule = {
            let _guard = self.mutation.lock().await;

            let rule = match self.store.get_rule(id).await {
                Ok(Some(rule)) if rule.is_live() => rule,
                Ok(_) => {
                    info!("规则不存在或已退役，忽略删除");
                    return Ok(false);
                }
                Err(e) => {
                    warn!(error = %e, "查询规则失败，缓存未变更");
                    return Err(e);
                }
            };

            let retired = self
                .store
                .retire_rule(id, removing_admin, Utc::now())
                .await
                .inspect_err(|e| warn!(error = %e, "规则退役持久化失败，缓存未变更"))?;
            if !retired {
                info!("规则已被并发退役，忽略删除");
                return Ok(false);
            }

            if let Err(e) = self.cache.remove(id) {
                warn!(error = %e, "已退役规则不在缓存中");
            }
            self.sync.broadcast_removed(id);
            rule
        };

        metrics::record_rule_change("removed");

        let actor = self.actor_name(removing_admin).await;
        self.audit.record(
            AuditEntry::new(AuditAction::Removed, id, actor)
                .with_rule(rule.expression, rule.kind.is_pattern(), rule.extend_to_ban)
                .with_round(rule.round_id),
        );

        info!("规则已退役");
        Ok(true)
    }

    /// 从存储全量重建缓存
    ///
    /// 读取存储失败时保留现有缓存（宁可旧，不可空）。
    /// 成功后对已连接会话重新检查，并向所有管理通道广播全量重置。
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<usize> {
        let rules = {
            let _guard = self.mutation.lock().await;

            let stored = match self.store.list_active_rules().await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(error = %e, "读取规则失败，保留现有缓存");
                    metrics::record_cache_restart("failed");
                    return Err(e);
                }
            };

            let rules: Vec<CompiledRule> = stored
                .iter()
                .filter_map(|rule| match CompiledRule::from_rule(rule) {
                    Ok(compiled) => Some(compiled),
                    Err(e) => {
                        warn!(rule_id = rule.id, error = %e, "存储中的规则无法编译，已跳过");
                        None
                    }
                })
                .collect();

            self.cache.replace_all(rules.iter().cloned());
            self.sync.broadcast_reset();
            rules
        };

        let kicked = self.enforce(&rules).await;
        metrics::record_cache_restart("ok");
        info!(rules = rules.len(), kicked, "规则缓存已重建");

        Ok(rules.len())
    }

    /// 加入白名单
    #[instrument(skip(self))]
    pub async fn whitelist_add(&self, username: &str) -> Result<()> {
        self.store
            .add_to_whitelist(username)
            .await
            .inspect_err(|e| warn!(error = %e, "加入白名单失败"))?;
        info!("用户名已加入白名单");
        Ok(())
    }

    /// 移出白名单，返回移除前是否存在
    #[instrument(skip(self))]
    pub async fn whitelist_remove(&self, username: &str) -> Result<bool> {
        let removed = self
            .store
            .remove_from_whitelist(username)
            .await
            .inspect_err(|e| warn!(error = %e, "移出白名单失败"))?;
        info!(removed, "白名单移除完成");
        Ok(removed)
    }

    /// 踢出命中给定规则的已连接会话，白名单用户除外
    ///
    /// 每个会话取第一条命中的规则，以其原因文本断开。返回断开的会话数。
    async fn enforce(&self, rules: &[CompiledRule]) -> usize {
        if rules.is_empty() {
            return 0;
        }

        let violators: Vec<(SessionInfo, &CompiledRule)> = self
            .sessions
            .sessions()
            .into_iter()
            .filter_map(|session| {
                rules
                    .iter()
                    .find(|rule| rule.matches(&session.username))
                    .map(|rule| (session, rule))
            })
            .collect();

        if violators.is_empty() {
            return 0;
        }

        let checks = violators
            .iter()
            .map(|(session, _)| self.store.is_whitelisted(&session.username));
        let whitelisted = join_all(checks).await;

        let mut kicked = 0;
        for ((session, rule), whitelisted) in violators.into_iter().zip(whitelisted) {
            match whitelisted {
                Ok(true) => {
                    debug!(username = %session.username, "白名单用户，跳过踢出");
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(username = %session.username, error = %e, "白名单查询失败，按未加白处理"),
            }

            info!(
                rule_id = rule.id,
                channel = %session.channel,
                username = %session.username,
                "踢出违规会话"
            );
            self.sessions.disconnect(session.channel, &rule.message);
            metrics::record_enforcement_kick();
            kicked += 1;
        }
        kicked
    }

    /// 解析操作人展示名
    async fn actor_name(&self, admin: Option<Uuid>) -> String {
        let Some(admin) = admin else {
            return SYSTEM_ACTOR.to_string();
        };

        match self.store.admin_display_name(admin).await {
            Ok(Some(name)) => name,
            Ok(None) => admin.to_string(),
            Err(e) => {
                warn!(admin = %admin, error = %e, "查询管理员名称失败");
                admin.to_string()
            }
        }
    }
}
