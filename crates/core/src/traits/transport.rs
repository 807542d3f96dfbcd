use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

/// 消息投递回调：`(topic, payload)`
///
/// 回调在传输层的投递任务上同步执行，实现方不得在其中阻塞。
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// 遗嘱消息（dead-man's switch）
///
/// 在建立连接时注册，连接非正常断开时由broker代为发布。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl LastWill {
    /// 保留的空载荷遗嘱：断线后清除该主题上的保留消息
    pub fn clear_retained(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: Vec::new(),
            retain: true,
        }
    }
}

/// 发布/订阅传输抽象
///
/// 实现必须允许多个任务并发调用 `publish`（至少一次语义）。
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// 发布消息，`retain` 为真时broker保留该主题的最后一条消息
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;

    /// 订阅主题过滤器，匹配的消息（包括已保留的消息）交给 `handler`
    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<()>;

    /// 正常断开连接，broker不会发布遗嘱
    async fn disconnect(&self) -> Result<()>;

    /// 非正常丢弃连接，broker随后发布遗嘱
    async fn abort(&self);
}

/// 传输连接工厂
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        client_id: &str,
        last_will: Option<LastWill>,
    ) -> Result<Arc<dyn PubSubTransport>>;

    /// 用于日志的后端名称
    fn backend_name(&self) -> &'static str;
}
