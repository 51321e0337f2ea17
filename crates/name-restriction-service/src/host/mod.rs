//! 宿主协作方接口
//!
//! 会话注册表、对局信息等由宿主提供的能力。本服务只读取会话列表、
//! 判断管理员权限，并通过注册表断开违规会话，从不修改会话状态。

mod local;

pub use local::{DISCONNECT_LOG_CAPACITY, DisconnectRecord, LocalSessionRegistry};

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 网络通道标识（每个已连接客户端一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 管理员权限标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AdminFlags(u32);

impl AdminFlags {
    pub const NONE: Self = Self(0);
    pub const ADMIN: Self = Self(1 << 0);
    /// 封禁管理权限：接收规则广播、发起重同步和详情请求
    pub const BAN: Self = Self(1 << 1);
    pub const DEBUG: Self = Self(1 << 2);
    pub const HOST: Self = Self(1 << 3);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AdminFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 已连接会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub username: String,
    pub channel: ChannelId,
}

/// 会话权限变更事件
///
/// None 表示该会话没有管理员身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange {
    pub channel: ChannelId,
    pub previous: Option<AdminFlags>,
    pub current: Option<AdminFlags>,
}

impl PermissionChange {
    /// 本次变更是否新授予了封禁管理权限
    pub fn grants_ban_management(&self) -> bool {
        let had = self
            .previous
            .is_some_and(|flags| flags.contains(AdminFlags::BAN));
        let has = self
            .current
            .is_some_and(|flags| flags.contains(AdminFlags::BAN));
        has && !had
    }
}

/// 会话注册表
pub trait SessionRegistry: Send + Sync {
    /// 当前所有已连接会话
    fn sessions(&self) -> Vec<SessionInfo>;

    /// 通道对应会话的管理员权限，非管理员返回 None
    fn flags(&self, channel: ChannelId) -> Option<AdminFlags>;

    /// 按原因断开通道
    fn disconnect(&self, channel: ChannelId, reason: &str);

    fn has_ban_permission(&self, channel: ChannelId) -> bool {
        self.flags(channel)
            .is_some_and(|flags| flags.contains(AdminFlags::BAN))
    }

    /// 持有封禁管理权限的全部通道
    fn privileged_channels(&self) -> Vec<ChannelId> {
        self.sessions()
            .into_iter()
            .map(|session| session.channel)
            .filter(|channel| self.has_ban_permission(*channel))
            .collect()
    }
}

/// 对局信息提供方
pub trait RoundProvider: Send + Sync {
    /// 当前对局 ID，不在对局中返回 None
    fn current_round_id(&self) -> Option<i32>;
}

/// 固定对局 ID，适用于没有对局概念的宿主和测试
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRound(pub Option<i32>);

impl RoundProvider for FixedRound {
    fn current_round_id(&self) -> Option<i32> {
        self.0
    }
}
