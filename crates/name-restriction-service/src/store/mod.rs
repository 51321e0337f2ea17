//! 规则存储层
//!
//! 定义规则存储接口，服务层依赖抽象而非具体实现，支持 mock 测试。
//! 存储自身保证单次调用的原子性，本服务不在应用层加锁。

mod memory;
mod postgres;

pub use memory::MemoryRuleStore;
pub use postgres::{MIGRATOR, PgRuleStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewUsernameRule, UsernameRule};

/// 规则存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// 持久化新规则，返回存储分配的 ID
    async fn add_rule(&self, rule: NewUsernameRule) -> Result<i64>;

    /// 按 ID 查询规则（包括已退役的规则）
    async fn get_rule(&self, id: i64) -> Result<Option<UsernameRule>>;

    /// 所有未退役规则
    async fn list_active_rules(&self) -> Result<Vec<UsernameRule>>;

    /// 标记规则退役，规则不存在或已退役时返回 false
    async fn retire_rule(
        &self,
        id: i64,
        retiring_admin: Option<Uuid>,
        retired_at: DateTime<Utc>,
    ) -> Result<bool>;

    // 白名单
    async fn is_whitelisted(&self, username: &str) -> Result<bool>;
    async fn add_to_whitelist(&self, username: &str) -> Result<()>;
    /// 返回移除前是否存在
    async fn remove_from_whitelist(&self, username: &str) -> Result<bool>;

    /// 管理员展示名
    async fn admin_display_name(&self, admin: Uuid) -> Result<Option<String>>;
}
