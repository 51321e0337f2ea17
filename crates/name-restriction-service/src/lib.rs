//! 用户名限制服务
//!
//! 维护一组实时生效的用户名准入规则（正则或精确匹配，可升级为封禁），
//! 并把规则集的变化实时推送给所有持有封禁管理权限的管理端。
//!
//! ## 模块结构
//!
//! - `cache`: 规则缓存，判定"用户名是否受限"的唯一来源
//! - `matcher`: 白名单短路 + 规则匹配
//! - `sync`: 增量/重置广播、重同步与详情请求、权限变更监听
//! - `lifecycle`: 创建/退役/重建，缓存的唯一写入方
//! - `store`: 规则存储接口与内存、PostgreSQL 实现
//! - `host`: 会话注册表、对局信息等宿主协作方
//! - `audit`: 规则变更审计
//!
//! ## 数据流
//!
//! ```text
//! 管理操作 → RuleLifecycleController → RuleStore（先提交）
//!                                     → RuleCache（再应用）
//!                                     → SyncProtocol → Transport → 管理端镜像
//! 准入检查 → MatchEngine → RuleStore 白名单 / RuleCache
//! ```

pub mod audit;
pub mod cache;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod matcher;
pub mod models;
pub mod service;
pub mod store;
pub mod sync;

pub use error::{RestrictionError, Result};
pub use matcher::{MatchEngine, MatchOutcome};
pub use models::{CreateRuleRequest, RuleKind, UsernameRule};
pub use service::NameRestrictionService;
