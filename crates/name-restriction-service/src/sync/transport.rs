//! 消息传输
//!
//! 传输层保证单通道内按发送顺序可靠送达；跨通道不保证顺序。
//! 发送是 fire-and-forget 的，不建模确认与重试。

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::OutboundMessage;
use crate::host::ChannelId;

/// 传输层接口
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    fn send(&self, channel: ChannelId, message: OutboundMessage);
}

/// 进程内传输
///
/// 每个通道一条无界 mpsc 队列，队列本身保证通道内顺序。
#[derive(Default)]
pub struct LocalTransport {
    channels: RwLock<HashMap<ChannelId, mpsc::UnboundedSender<OutboundMessage>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册通道，返回该通道的接收端；重复注册会替换旧的接收端
    pub fn register(&self, channel: ChannelId) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.write().insert(channel, tx);
        rx
    }

    pub fn unregister(&self, channel: ChannelId) {
        self.channels.write().remove(&channel);
    }
}

impl Transport for LocalTransport {
    fn send(&self, channel: ChannelId, message: OutboundMessage) {
        let sender = self.channels.read().get(&channel).cloned();
        match sender {
            Some(sender) => {
                if sender.send(message).is_err() {
                    debug!(channel = %channel, "通道接收端已关闭，丢弃消息");
                }
            }
            None => debug!(channel = %channel, "通道未注册，丢弃消息"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::messages::RuleDelta;

    #[tokio::test]
    async fn test_per_channel_order() {
        let transport = LocalTransport::new();
        let mut rx = transport.register(ChannelId(1));

        for id in 0..5 {
            transport.send(ChannelId(1), OutboundMessage::RuleDelta(RuleDelta::removed(id)));
        }

        for id in 0..5 {
            match rx.recv().await.unwrap() {
                OutboundMessage::RuleDelta(delta) => assert_eq!(delta.id, id),
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[test]
    fn test_send_to_unknown_channel_is_dropped() {
        let transport = LocalTransport::new();
        transport.send(ChannelId(9), OutboundMessage::RuleDelta(RuleDelta::removed(1)));

        let rx = transport.register(ChannelId(9));
        drop(rx);
        transport.send(ChannelId(9), OutboundMessage::RuleDelta(RuleDelta::removed(1)));
        transport.unregister(ChannelId(9));
    }
}
