//! 同步协议消息
//!
//! 增量新增、删除墓碑与全量重置共用同一种记录结构 `RuleDelta`：
//! - 新增：`present = true`
//! - 删除：`present = false`，其余字段无意义
//! - 重置：以 `id = -1, present = false` 的标记记录开头，随后是每条生效规则的新增记录

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CachedRuleEntry;
use crate::error::Result;
use crate::models::UsernameRule;

/// 重置标记记录的 ID
pub const RESET_MARKER_ID: i64 = -1;

/// 墓碑记录的占位表达式
const TOMBSTONE_EXPRESSION: &str = "empty";

/// 规则增量记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDelta {
    pub id: i64,
    pub present: bool,
    pub is_pattern: bool,
    pub extend_to_ban: bool,
    pub expression: String,
}

impl RuleDelta {
    pub fn added(entry: &CachedRuleEntry) -> Self {
        Self {
            id: entry.id,
            present: true,
            is_pattern: entry.kind.is_pattern(),
            extend_to_ban: entry.extend_to_ban,
            expression: entry.expression.clone(),
        }
    }

    pub fn removed(id: i64) -> Self {
        Self {
            id,
            present: false,
            is_pattern: false,
            extend_to_ban: false,
            expression: TOMBSTONE_EXPRESSION.to_string(),
        }
    }

    /// 重置标记：接收方在此清空镜像
    pub fn reset_marker() -> Self {
        Self::removed(RESET_MARKER_ID)
    }

    pub fn is_reset_marker(&self) -> bool {
        self.id == RESET_MARKER_ID && !self.present
    }
}

/// 构造全量重置序列：标记记录 + 每条规则一条新增记录
pub fn reset_sequence(entries: &[CachedRuleEntry]) -> Vec<RuleDelta> {
    let mut sequence = Vec::with_capacity(entries.len() + 1);
    sequence.push(RuleDelta::reset_marker());
    sequence.extend(entries.iter().map(RuleDelta::added));
    sequence
}

/// 单条规则的完整详情（含审计字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDetailResponse {
    pub created_at: DateTime<Utc>,
    pub id: i64,
    pub is_pattern: bool,
    pub extend_to_ban: bool,
    pub retired: bool,
    pub round_id: Option<i32>,
    pub restricting_admin: Option<Uuid>,
    pub retiring_admin: Option<Uuid>,
    pub retired_at: Option<DateTime<Utc>>,
    pub expression: String,
    pub message: String,
}

impl From<&UsernameRule> for RuleDetailResponse {
    fn from(rule: &UsernameRule) -> Self {
        Self {
            created_at: rule.created_at,
            id: rule.id,
            is_pattern: rule.kind.is_pattern(),
            extend_to_ban: rule.extend_to_ban,
            retired: rule.retired,
            round_id: rule.round_id,
            restricting_admin: rule.restricting_admin,
            retiring_admin: rule.retiring_admin,
            retired_at: rule.retired_at,
            expression: rule.expression.clone(),
            message: rule.message.clone(),
        }
    }
}

/// 服务端下发给客户端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    RuleDelta(RuleDelta),
    RuleDetail(RuleDetailResponse),
}

/// 客户端发往服务端的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    /// 请求全量重置（无负载）
    RequestResync,
    /// 请求单条规则详情
    RequestDetail {
        #[serde(rename = "banId")]
        ban_id: i64,
    },
}

/// 编码为 JSON 帧
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// 从 JSON 帧解码
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(frame)?)
}
