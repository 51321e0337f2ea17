//! 领域模型定义
//!
//! 用户名限制规则的持久化记录、新建请求以及规则类型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// 正则表达式，在用户名任意位置匹配即命中
    Pattern,
    /// 精确用户名，区分大小写
    Literal,
}

impl RuleKind {
    pub fn from_is_pattern(is_pattern: bool) -> Self {
        if is_pattern {
            Self::Pattern
        } else {
            Self::Literal
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern)
    }
}

/// 用户名限制规则（存储中的完整记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameRule {
    /// 由存储分配，全局唯一且单调递增，不会复用
    pub id: i64,
    pub kind: RuleKind,
    pub expression: String,
    /// 展示给被拒绝/被踢出玩家的原因
    pub message: String,
    /// 命中后是否升级为账号封禁
    pub extend_to_ban: bool,
    pub created_at: DateTime<Utc>,
    /// 创建时所在的对局 ID
    pub round_id: Option<i32>,
    /// 创建规则的管理员，None 表示系统
    pub restricting_admin: Option<Uuid>,
    pub retired: bool,
    pub retired_at: Option<DateTime<Utc>>,
    pub retiring_admin: Option<Uuid>,
}

impl UsernameRule {
    /// 规则是否仍然生效
    pub fn is_live(&self) -> bool {
        !self.retired
    }
}

/// 待持久化的新规则
#[derive(Debug, Clone, PartialEq)]
pub struct NewUsernameRule {
    pub kind: RuleKind,
    pub expression: String,
    pub message: String,
    pub extend_to_ban: bool,
    pub created_at: DateTime<Utc>,
    pub round_id: Option<i32>,
    pub restricting_admin: Option<Uuid>,
}

impl NewUsernameRule {
    /// 存储分配 ID 后转换为完整记录
    pub fn into_rule(self, id: i64) -> UsernameRule {
        UsernameRule {
            id,
            kind: self.kind,
            expression: self.expression,
            message: self.message,
            extend_to_ban: self.extend_to_ban,
            created_at: self.created_at,
            round_id: self.round_id,
            restricting_admin: self.restricting_admin,
            retired: false,
            retired_at: None,
            retiring_admin: None,
        }
    }
}

/// 创建规则请求
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRuleRequest {
    pub kind: RuleKind,
    pub expression: String,
    /// 为空时使用表达式本身作为原因
    pub message: String,
    pub restricting_admin: Option<Uuid>,
    pub extend_to_ban: bool,
}

impl CreateRuleRequest {
    pub fn new(kind: RuleKind, expression: impl Into<String>) -> Self {
        Self {
            kind,
            expression: expression.into(),
            message: String::new(),
            restricting_admin: None,
            extend_to_ban: false,
        }
    }

    pub fn pattern(expression: impl Into<String>) -> Self {
        Self::new(RuleKind::Pattern, expression)
    }

    pub fn literal(expression: impl Into<String>) -> Self {
        Self::new(RuleKind::Literal, expression)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn by_admin(mut self, admin: Uuid) -> Self {
        self.restricting_admin = Some(admin);
        self
    }

    pub fn extend_to_ban(mut self, extend_to_ban: bool) -> Self {
        self.extend_to_ban = extend_to_ban;
        self
    }

    /// 实际生效的原因文本
    pub fn effective_message(&self) -> &str {
        if self.message.is_empty() {
            &self.expression
        } else {
            &self.message
        }
    }
}
