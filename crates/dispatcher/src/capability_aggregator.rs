use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fleet_core::models::{wildcard_topic, worker_id_from_topic};
use fleet_core::{CapabilityMessage, MessageHandler, PubSubTransport, TransportConnector};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 一次消息投递对缓存的影响
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheUpdate {
    /// 该Worker的记录被整体替换
    Replaced { worker_id: String },
    /// 空载荷（遗嘱或主动清理），该Worker被移除
    Removed { worker_id: String },
    /// 主题或载荷格式错误，缓存保持不变
    Ignored,
}

/// worker_id -> 最近一次能力消息
///
/// 所有读写都经过同一把互斥锁，且不嵌套加锁。
struct CapabilityCache {
    topic_prefix: String,
    by_worker: Mutex<HashMap<String, CapabilityMessage>>,
}

impl CapabilityCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CapabilityMessage>> {
        self.by_worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, topic: &str, payload: &[u8]) -> CacheUpdate {
        let Some(worker_id) = worker_id_from_topic(&self.topic_prefix, topic) else {
            warn!("Invalid capability topic format: {}", topic);
            return CacheUpdate::Ignored;
        };

        if CapabilityMessage::is_absence_payload(payload) {
            let removed = self.lock().remove(worker_id).is_some();
            if removed {
                info!("Worker {} disconnected (empty capability message)", worker_id);
            } else {
                debug!("Empty capability message for unknown worker {}", worker_id);
            }
            return CacheUpdate::Removed {
                worker_id: worker_id.to_string(),
            };
        }

        let message = match CapabilityMessage::from_payload(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Failed to parse capability message from {}: {}",
                    worker_id, e
                );
                return CacheUpdate::Ignored;
            }
        };

        if message.worker_id != worker_id {
            warn!(
                "Capability payload id {} does not match topic worker {}, keying by topic",
                message.worker_id, worker_id
            );
        }

        debug!(
            "Updated capabilities for {}: {:?}, idle: {}",
            worker_id, message.task_types, message.idle
        );
        self.lock().insert(worker_id.to_string(), message);

        CacheUpdate::Replaced {
            worker_id: worker_id.to_string(),
        }
    }
}

/// 集群能力聚合器
///
/// 订阅 `<prefix>/+`，把每个Worker最近一次的能力消息保存在内存中，并提供按任务类型
/// 汇总的只读查询。每个服务进程只构造一个实例，由服务的启动/关闭流程持有，
/// 通过 `Arc` 注入到请求处理器。broker不可用时以降级模式运行（视图始终为空）。
pub struct CapabilityAggregator {
    connector: Arc<dyn TransportConnector>,
    client_id: String,
    cache: Arc<CapabilityCache>,
    transport: tokio::sync::Mutex<Option<Arc<dyn PubSubTransport>>>,
    ready: watch::Sender<bool>,
    degraded: AtomicBool,
}

impl CapabilityAggregator {
    pub fn new(connector: Arc<dyn TransportConnector>, topic_prefix: impl Into<String>) -> Self {
        let (ready, _) = watch::channel(false);
        let suffix = uuid::Uuid::new_v4().simple().to_string();

        Self {
            connector,
            client_id: format!("aggregator-{}", &suffix[..8]),
            cache: Arc::new(CapabilityCache {
                topic_prefix: topic_prefix.into(),
                by_worker: Mutex::new(HashMap::new()),
            }),
            transport: tokio::sync::Mutex::new(None),
            ready,
            degraded: AtomicBool::new(false),
        }
    }

    /// 连接broker并订阅所有Worker的能力主题
    ///
    /// 连接或订阅失败不会返回错误，聚合器进入降级模式。
    pub async fn start(&self) {
        let mut transport_slot = self.transport.lock().await;
        if transport_slot.is_some() {
            debug!("Capability aggregator already started");
            return;
        }

        let filter = wildcard_topic(&self.cache.topic_prefix);
        match self.connector.connect(&self.client_id, None).await {
            Ok(transport) => {
                let cache = Arc::clone(&self.cache);
                let handler: MessageHandler = Arc::new(move |topic: &str, payload: &[u8]| {
                    cache.apply(topic, payload);
                });

                match transport.subscribe(&filter, handler).await {
                    Ok(()) => {
                        info!(
                            "Subscribed to capability topics: {} ({})",
                            filter,
                            self.connector.backend_name()
                        );
                        self.degraded.store(false, Ordering::SeqCst);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to subscribe to {}: {}, capability view stays empty",
                            filter, e
                        );
                        self.degraded.store(true, Ordering::SeqCst);
                    }
                }
                *transport_slot = Some(transport);
            }
            Err(e) => {
                warn!(
                    "Capability transport unavailable, aggregator running in degraded mode: {}",
                    e
                );
                self.degraded.store(true, Ordering::SeqCst);
            }
        }

        self.ready.send_replace(true);
    }

    /// 处理一条能力消息（传输层回调的同一路径）
    pub fn on_message(&self, topic: &str, payload: &[u8]) -> CacheUpdate {
        self.cache.apply(topic, payload)
    }

    /// 按任务类型汇总空闲Worker数；没有Worker声明的类型不出现在结果中
    pub fn idle_counts_by_task_type(&self) -> BTreeMap<String, usize> {
        let by_worker = self.cache.lock();
        let mut aggregated = BTreeMap::new();
        for message in by_worker.values() {
            for task_type in &message.task_types {
                *aggregated.entry(task_type.clone()).or_insert(0) += message.idle_count() as usize;
            }
        }
        aggregated
    }

    /// 按任务类型汇总Worker总数（不论忙闲）
    pub fn worker_counts_by_task_type(&self) -> BTreeMap<String, usize> {
        let by_worker = self.cache.lock();
        let mut aggregated = BTreeMap::new();
        for message in by_worker.values() {
            for task_type in &message.task_types {
                *aggregated.entry(task_type.clone()).or_insert(0) += 1;
            }
        }
        aggregated
    }

    pub fn worker_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// 某个Worker最近一次的能力消息
    pub fn worker(&self, worker_id: &str) -> Option<CapabilityMessage> {
        self.cache.lock().get(worker_id).cloned()
    }

    /// 等待 `start()` 完成（无论是否降级）
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.subscribe();
        let ok = matches!(
            tokio::time::timeout(timeout, ready.wait_for(|r| *r)).await,
            Ok(Ok(_))
        );
        ok
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// 断开与broker的连接，可重复调用
    pub async fn shutdown(&self) {
        let Some(transport) = self.transport.lock().await.take() else {
            return;
        };

        match transport.disconnect().await {
            Ok(()) => info!("Capability aggregator disconnected from broker"),
            Err(e) => error!("Error disconnecting capability aggregator: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FleetResult;
    use fleet_core::LastWill;

    struct NoBroker;

    #[async_trait::async_trait]
    impl TransportConnector for NoBroker {
        async fn connect(
            &self,
            _client_id: &str,
            _last_will: Option<LastWill>,
        ) -> FleetResult<Arc<dyn PubSubTransport>> {
            Err(fleet_core::FleetError::TransportUnavailable("down".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "none"
        }
    }

    fn aggregator() -> CapabilityAggregator {
        CapabilityAggregator::new(Arc::new(NoBroker), "fleet/workers")
    }

    #[test]
    fn test_malformed_topic_is_ignored() {
        let aggregator = aggregator();
        let update = aggregator.on_message(
            "fleet",
            br#"{"id":"w1","capabilities":["a"],"idle_count":1,"timestamp":1}"#,
        );
        assert_eq!(update, CacheUpdate::Ignored);
        assert_eq!(aggregator.worker_count(), 0);
    }

    #[test]
    fn test_parse_failure_keeps_last_known_state() {
        let aggregator = aggregator();
        aggregator.on_message(
            "fleet/workers/w1",
            br#"{"id":"w1","capabilities":["a"],"idle_count":1,"timestamp":1}"#,
        );
        let update = aggregator.on_message("fleet/workers/w1", b"{broken");

        assert_eq!(update, CacheUpdate::Ignored);
        let cached = aggregator.worker("w1").unwrap();
        assert!(cached.idle);
        assert_eq!(cached.timestamp, 1);
    }

    #[tokio::test]
    async fn test_degraded_start_is_ready_and_empty() {
        let aggregator = aggregator();
        aggregator.start().await;

        assert!(aggregator.is_degraded());
        assert!(aggregator.wait_for_ready(Duration::from_millis(10)).await);
        assert!(aggregator.idle_counts_by_task_type().is_empty());
        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_not_ready_before_start() {
        let aggregator = aggregator();
        assert!(!aggregator.wait_for_ready(Duration::from_millis(10)).await);
    }
}
