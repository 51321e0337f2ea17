//! PostgreSQL 规则存储
//!
//! 表结构见 `migrations/`，迁移集以 [`MIGRATOR`] 内嵌，由 `guard_shared::database::Database`
//! 在启动时执行。规则退役只做标记，不物理删除，ID 由 BIGSERIAL 分配。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use uuid::Uuid;

use super::RuleStore;
use crate::error::Result;
use crate::models::{NewUsernameRule, RuleKind, UsernameRule};

/// 规则表与白名单表的内嵌迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL 规则存储
#[derive(Clone)]
pub struct PgRuleStore {
    pool: PgPool,
}

impl PgRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 数据库查询结果行
#[derive(Debug, sqlx::FromRow)]
struct UsernameRuleRow {
    id: i64,
    is_pattern: bool,
    expression: String,
    message: String,
    extend_to_ban: bool,
    created_at: DateTime<Utc>,
    round_id: Option<i32>,
    restricting_admin: Option<Uuid>,
    retired: bool,
    retired_at: Option<DateTime<Utc>>,
    retiring_admin: Option<Uuid>,
}

impl From<UsernameRuleRow> for UsernameRule {
    fn from(row: UsernameRuleRow) -> Self {
        Self {
            id: row.id,
            kind: RuleKind::from_is_pattern(row.is_pattern),
            expression: row.expression,
            message: row.message,
            extend_to_ban: row.extend_to_ban,
            created_at: row.created_at,
            round_id: row.round_id,
            restricting_admin: row.restricting_admin,
            retired: row.retired,
            retired_at: row.retired_at,
            retiring_admin: row.retiring_admin,
        }
    }
}

const RULE_COLUMNS: &str = "id, is_pattern, expression, message, extend_to_ban, created_at, \
     round_id, restricting_admin, retired, retired_at, retiring_admin";

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn add_rule(&self, rule: NewUsernameRule) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO username_rules
                (is_pattern, expression, message, extend_to_ban, created_at, round_id, restricting_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(rule.kind.is_pattern())
        .bind(&rule.expression)
        .bind(&rule.message)
        .bind(rule.extend_to_ban)
        .bind(rule.created_at)
        .bind(rule.round_id)
        .bind(rule.restricting_admin)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<UsernameRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM username_rules WHERE id = $1");
        let row = sqlx::query_as::<_, UsernameRuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(UsernameRule::from))
    }

    async fn list_active_rules(&self) -> Result<Vec<UsernameRule>> {
        let sql =
            format!("SELECT {RULE_COLUMNS} FROM username_rules WHERE retired = FALSE ORDER BY id");
        let rows = sqlx::query_as::<_, UsernameRuleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(UsernameRule::from).collect())
    }

    async fn retire_rule(
        &self,
        id: i64,
        retiring_admin: Option<Uuid>,
        retired_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE username_rules
            SET retired = TRUE, retired_at = $2, retiring_admin = $3
            WHERE id = $1 AND retired = FALSE
            "#,
        )
        .bind(id)
        .bind(retired_at)
        .bind(retiring_admin)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_whitelisted(&self, username: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM username_whitelist WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn add_to_whitelist(&self, username: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO username_whitelist (username) VALUES ($1) ON CONFLICT (username) DO NOTHING",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_from_whitelist(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM username_whitelist WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn admin_display_name(&self, admin: Uuid) -> Result<Option<String>> {
        let name: Option<String> =
            sqlx::query_scalar("SELECT last_seen_user_name FROM players WHERE user_id = $1")
                .bind(admin)
                .fetch_optional(&self.pool)
                .await?;

        Ok(name)
    }
}
