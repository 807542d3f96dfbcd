use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use fleet_core::models::worker_topic;
use fleet_core::{
    CapabilityMessage, FleetError, FleetResult, LastWill, PubSubTransport, TransportConnector,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

type TransportSlot = Option<Arc<dyn PubSubTransport>>;

/// Worker能力广播器
///
/// 在 `<prefix>/<worker_id>` 上以保留消息发布当前能力快照，并在连接时注册空载荷
/// 遗嘱，Worker异常消失后由broker清除其广播。所有传输错误只记录日志，
/// 不影响任务执行；每次发送最多等待 `publish_timeout`。
pub struct CapabilityAdvertiser {
    worker_id: String,
    topic: String,
    task_types: BTreeSet<String>,
    idle: AtomicBool,
    last_timestamp: AtomicI64,
    connector: Arc<dyn TransportConnector>,
    publish_timeout: Duration,
    // 发布期间持有，保证状态切换和发送的顺序一致
    publish_order: Mutex<()>,
    // 只在取出/替换连接时短暂持有，不跨越await
    transport: std::sync::Mutex<TransportSlot>,
}

impl CapabilityAdvertiser {
    pub fn new(
        worker_id: impl Into<String>,
        topic_prefix: &str,
        task_types: BTreeSet<String>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let worker_id = worker_id.into();
        Self {
            topic: worker_topic(topic_prefix, &worker_id),
            worker_id,
            task_types,
            idle: AtomicBool::new(true),
            last_timestamp: AtomicI64::new(0),
            connector,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            publish_order: Mutex::new(()),
            transport: std::sync::Mutex::new(None),
        }
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn task_types(&self) -> &BTreeSet<String> {
        &self.task_types
    }

    /// 建立（或复用）连接并注册遗嘱；连接失败时降级为空操作
    pub async fn initialize(&self) -> bool {
        let _order = self.publish_order.lock().await;
        if self.current_transport().is_some() {
            return true;
        }

        let will = LastWill::clear_retained(self.topic.clone());
        match self.connector.connect(&self.worker_id, Some(will)).await {
            Ok(connection) => {
                info!(
                    "Capability advertiser for {} connected ({}), topic: {}",
                    self.worker_id,
                    self.connector.backend_name(),
                    self.topic
                );
                *self.slot() = Some(connection);
                true
            }
            Err(e) => {
                warn!(
                    "Capability broadcast unavailable for {}, continuing without discovery: {}",
                    self.worker_id, e
                );
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current_transport().is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    /// 发布当前状态的完整快照（保留消息）
    pub async fn publish(&self) {
        let _order = self.publish_order.lock().await;
        self.publish_snapshot().await;
    }

    /// 原子地切换空闲标志并发布，期间其他发布（如心跳）不会插入
    pub async fn publish_idle(&self, idle: bool) {
        let _order = self.publish_order.lock().await;
        self.set_idle(idle);
        self.publish_snapshot().await;
    }

    async fn publish_snapshot(&self) {
        let Some(transport) = self.current_transport() else {
            return;
        };

        let message = CapabilityMessage::new(
            self.worker_id.clone(),
            self.task_types.clone(),
            self.is_idle(),
            self.next_timestamp(),
        );
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize capability message: {}", e);
                return;
            }
        };

        match self.send(transport.as_ref(), &payload).await {
            Ok(()) => debug!(
                "Published capabilities for {}: idle={}, types={:?}",
                self.worker_id, message.idle, message.task_types
            ),
            Err(e) => error!(
                "Failed to publish capabilities for {}: {}",
                self.worker_id, e
            ),
        }
    }

    /// 发布空载荷清除保留的广播（正常退出时的遗嘱等价物）
    pub async fn clear(&self) {
        let _order = self.publish_order.lock().await;
        let Some(transport) = self.current_transport() else {
            return;
        };

        match self.send(transport.as_ref(), &[]).await {
            Ok(()) => info!("Cleared capability advertisement for {}", self.worker_id),
            Err(e) => error!(
                "Failed to clear capability advertisement for {}: {}",
                self.worker_id, e
            ),
        }
    }

    /// 正常断开连接（不会触发遗嘱）；broker无响应时退化为直接丢弃连接
    pub async fn shutdown(&self) {
        let Some(transport) = self.slot().take() else {
            return;
        };

        match tokio::time::timeout(self.publish_timeout, transport.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(
                "Error disconnecting capability advertiser for {}: {}",
                self.worker_id, e
            ),
            Err(_) => {
                warn!(
                    "Disconnect for {} timed out after {:?}, dropping connection",
                    self.worker_id, self.publish_timeout
                );
                transport.abort().await;
            }
        }
    }

    /// 直接丢弃连接，由broker发布遗嘱
    ///
    /// 不等待正在进行的发布，卡住的发布不会阻塞强制退出。
    pub async fn abandon(&self) {
        let Some(transport) = self.slot().take() else {
            return;
        };

        warn!(
            "Abandoning capability connection for {}, broker will publish last will",
            self.worker_id
        );
        transport.abort().await;
    }

    async fn send(&self, transport: &dyn PubSubTransport, payload: &[u8]) -> FleetResult<()> {
        match tokio::time::timeout(
            self.publish_timeout,
            transport.publish(&self.topic, payload, true),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FleetError::Transport(format!(
                "publish to {} timed out after {:?}",
                self.topic, self.publish_timeout
            ))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, TransportSlot> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_transport(&self) -> TransportSlot {
        self.slot().clone()
    }

    /// 毫秒时间戳，同一广播器内单调不减
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}
