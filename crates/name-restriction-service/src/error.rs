//! 用户名限制服务错误类型
//!
//! 所有错误都不会导致宿主进程崩溃：调用方拿到 Err 时，缓存与存储均未发生变更。

use thiserror::Error;

use crate::host::ChannelId;

/// 用户名限制服务错误类型
#[derive(Debug, Error)]
pub enum RestrictionError {
    // === 规则相关错误 ===
    #[error("规则不存在: {0}")]
    RuleNotFound(i64),

    #[error("规则表达式为空")]
    EmptyExpression,

    #[error("无效的正则表达式: {expression} ({reason})")]
    InvalidPattern { expression: String, reason: String },

    // === 权限相关错误 ===
    #[error("通道无封禁管理权限: {channel}")]
    PermissionDenied { channel: ChannelId },

    // === 系统错误 ===
    #[error("规则存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 用户名限制服务 Result 类型别名
pub type Result<T> = std::result::Result<T, RestrictionError>;

impl RestrictionError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Database(_))
    }

    /// 检查是否为输入错误
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::EmptyExpression | Self::InvalidPattern { .. })
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::EmptyExpression => "EMPTY_EXPRESSION",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}
