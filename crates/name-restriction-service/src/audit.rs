//! 规则变更审计
//!
//! 规则的创建与退役各写一条审计记录。历史查询由存储负责，这里只负责写出。

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// 管理员为空时使用的操作人标签
pub const SYSTEM_ACTOR: &str = "system";

/// 审计动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Created,
    Removed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    pub rule_id: i64,
    /// 操作人展示名
    pub actor: String,
    pub expression: String,
    pub is_pattern: bool,
    pub extend_to_ban: bool,
    pub round_id: Option<i32>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, rule_id: i64, actor: impl Into<String>) -> Self {
        Self {
            action,
            rule_id,
            actor: actor.into(),
            expression: String::new(),
            is_pattern: false,
            extend_to_ban: false,
            round_id: None,
            at: Utc::now(),
        }
    }

    /// 设置规则内容
    pub fn with_rule(
        mut self,
        expression: impl Into<String>,
        is_pattern: bool,
        extend_to_ban: bool,
    ) -> Self {
        self.expression = expression.into();
        self.is_pattern = is_pattern;
        self.extend_to_ban = extend_to_ban;
        self
    }

    pub fn with_round(mut self, round_id: Option<i32>) -> Self {
        self.round_id = round_id;
        self
    }

    /// 人类可读的一行描述
    pub fn summary(&self) -> String {
        let kind = if self.is_pattern { "pattern" } else { "literal" };
        let ban = if self.extend_to_ban { " (ban)" } else { "" };
        format!(
            "{} {} username rule #{} {}{}",
            self.actor, self.action, self.rule_id, kind, ban
        )
    }
}

/// 审计输出
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// 写入 `audit` target 的 tracing 事件
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            action = %entry.action,
            rule_id = entry.rule_id,
            actor = %entry.actor,
            expression = %entry.expression,
            is_pattern = entry.is_pattern,
            extend_to_ban = entry.extend_to_ban,
            round_id = ?entry.round_id,
            "{}",
            entry.summary()
        );
    }
}

/// 内存审计记录，供宿主自行导出或测试断言
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let entry = AuditEntry::new(AuditAction::Created, 3, "Alice").with_rule("^x", true, true);
        assert_eq!(entry.summary(), "Alice created username rule #3 pattern (ban)");

        let entry = AuditEntry::new(AuditAction::Removed, 4, SYSTEM_ACTOR).with_rule("bob", false, false);
        assert_eq!(entry.summary(), "system removed username rule #4 literal");
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEntry::new(AuditAction::Created, 1, "a"));
        sink.record(AuditEntry::new(AuditAction::Removed, 1, "b"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::Created);
        assert_eq!(entries[1].actor, "b");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingAuditSink.record(AuditEntry::new(AuditAction::Created, 1, SYSTEM_ACTOR).with_round(Some(2)));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = AuditEntry::new(AuditAction::Removed, 9, "x");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "removed");
        assert_eq!(json["ruleId"], 9);
    }
}
