//! 管理端规则同步
//!
//! - `messages`: 线上消息格式
//! - `transport`: 按通道有序的消息发送
//! - `protocol`: 增量/重置广播与请求处理
//! - `watcher`: 权限变更监听
//! - `mirror`: 接收端镜像语义

pub mod messages;
mod mirror;
mod protocol;
mod transport;
mod watcher;

pub use messages::{InboundMessage, OutboundMessage, RESET_MARKER_ID, RuleDelta, RuleDetailResponse};
pub use mirror::{MirroredRule, RuleMirror};
pub use protocol::SyncProtocol;
pub use transport::{LocalTransport, Transport};
pub use watcher::{PermissionSubscription, PermissionWatcher};

#[cfg(test)]
pub use transport::MockTransport;
