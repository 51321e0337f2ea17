//! 内存规则存储
//!
//! 使用 DashMap 实现的高并发内存存储，适用于测试和开发环境。
//! ID 由原子计数器单调分配，删除后不会复用。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use super::RuleStore;
use crate::error::{RestrictionError, Result};
use crate::models::{NewUsernameRule, UsernameRule};

/// 内存规则存储
///
/// 克隆后共享同一份数据
#[derive(Debug, Clone)]
pub struct MemoryRuleStore {
    rules: Arc<DashMap<i64, UsernameRule>>,
    whitelist: Arc<DashSet<String>>,
    admin_names: Arc<DashMap<Uuid, String>>,
    next_id: Arc<AtomicI64>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
            whitelist: Arc::new(DashSet::new()),
            admin_names: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 登记管理员展示名
    pub fn register_admin(&self, admin: Uuid, name: impl Into<String>) {
        self.admin_names.insert(admin, name.into());
    }

    /// 切换存储可用性；不可用时所有操作返回 StoreUnavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 规则总数（包括已退役）
    pub fn count(&self) -> usize {
        self.rules.len()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RestrictionError::StoreUnavailable(
                "内存存储已被标记为不可用".to_string(),
            ))
        }
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn add_rule(&self, rule: NewUsernameRule) -> Result<i64> {
        self.ensure_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rules.insert(id, rule.into_rule(id));
        Ok(id)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<UsernameRule>> {
        self.ensure_available()?;
        Ok(self.rules.get(&id).map(|rule| rule.clone()))
    }

    async fn list_active_rules(&self) -> Result<Vec<UsernameRule>> {
        self.ensure_available()?;
        let mut rules: Vec<UsernameRule> = self
            .rules
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| entry.value().clone())
            .collect();
        rules.sort_by_key(|rule| rule.id);
        Ok(rules)
    }

    async fn retire_rule(
        &self,
        id: i64,
        retiring_admin: Option<Uuid>,
        retired_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_available()?;
        let Some(mut rule) = self.rules.get_mut(&id) else {
            return Ok(false);
        };
        if rule.retired {
            return Ok(false);
        }

        rule.retired = true;
        rule.retired_at = Some(retired_at);
        rule.retiring_admin = retiring_admin;
        Ok(true)
    }

    async fn is_whitelisted(&self, username: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.whitelist.contains(username))
    }

    async fn add_to_whitelist(&self, username: &str) -> Result<()> {
        self.ensure_available()?;
        self.whitelist.insert(username.to_string());
        Ok(())
    }

    async fn remove_from_whitelist(&self, username: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.whitelist.remove(username).is_some())
    }

    async fn admin_display_name(&self, admin: Uuid) -> Result<Option<String>> {
        self.ensure_available()?;
        Ok(self.admin_names.get(&admin).map(|name| name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleKind;

    fn new_rule(expression: &str) -> NewUsernameRule {
        NewUsernameRule {
            kind: RuleKind::Literal,
            expression: expression.to_string(),
            message: expression.to_string(),
            extend_to_ban: false,
            created_at: Utc::now(),
            round_id: None,
            restricting_admin: None,
        }
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_and_never_reused() {
        let store = MemoryRuleStore::new();
        let first = store.add_rule(new_rule("a")).await.unwrap();
        let second = store.add_rule(new_rule("b")).await.unwrap();
        assert!(second > first);

        store.retire_rule(second, None, Utc::now()).await.unwrap();
        let third = store.add_rule(new_rule("b")).await.unwrap();
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_retire_rule() {
        let store = MemoryRuleStore::new();
        let admin = Uuid::new_v4();
        let id = store.add_rule(new_rule("a")).await.unwrap();

        assert!(store.retire_rule(id, Some(admin), Utc::now()).await.unwrap());
        assert!(!store.retire_rule(id, Some(admin), Utc::now()).await.unwrap());
        assert!(!store.retire_rule(404, None, Utc::now()).await.unwrap());

        let rule = store.get_rule(id).await.unwrap().unwrap();
        assert!(rule.retired);
        assert_eq!(rule.retiring_admin, Some(admin));
        assert!(rule.retired_at.is_some());

        assert!(store.list_active_rules().await.unwrap().is_empty());
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_whitelist() {
        let store = MemoryRuleStore::new();
        assert!(!store.is_whitelisted("bob").await.unwrap());

        store.add_to_whitelist("bob").await.unwrap();
        assert!(store.is_whitelisted("bob").await.unwrap());
        assert!(!store.is_whitelisted("Bob").await.unwrap());

        assert!(store.remove_from_whitelist("bob").await.unwrap());
        assert!(!store.remove_from_whitelist("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryRuleStore::new();
        store.set_available(false);

        let err = store.list_active_rules().await.unwrap_err();
        assert!(matches!(err, RestrictionError::StoreUnavailable(_)));
        assert!(store.add_rule(new_rule("a")).await.is_err());

        store.set_available(true);
        assert!(store.list_active_rules().await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_display_name() {
        let store = MemoryRuleStore::new();
        let admin = Uuid::new_v4();
        store.register_admin(admin, "Moderator");

        assert_eq!(
            store.admin_display_name(admin).await.unwrap(),
            Some("Moderator".to_string())
        );
        assert_eq!(store.admin_display_name(Uuid::new_v4()).await.unwrap(), None);
    }
}
