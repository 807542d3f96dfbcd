use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fleet_core::models::topic_matches;
use fleet_core::{
    FleetError, FleetResult, LastWill, MessageHandler, PubSubTransport, TransportConnector,
};
use tracing::{debug, info};

/// 内存发布/订阅broker
///
/// 在单进程内模拟MQTT broker的关键语义：每个主题保留最后一条消息并在订阅时
/// 立即投递；空载荷的保留发布会删除保留消息但仍投递给当前订阅者；
/// 连接非正常断开（[`PubSubTransport::abort`]）时代为发布遗嘱。
/// 消息在发布调用内同步投递，投递顺序与发布顺序一致。
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    retained: BTreeMap<String, Vec<u8>>,
    subscriptions: Vec<Subscription>,
    wills: HashMap<u64, LastWill>,
    clients: HashMap<u64, String>,
    next_connection_id: u64,
    unavailable: bool,
}

struct Subscription {
    connection_id: u64,
    filter: String,
    handler: MessageHandler,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟broker不可达，之后的 `connect` 返回 `TransportUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// 主题上当前保留的消息
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.lock().retained.get(topic).cloned()
    }

    pub fn connected_clients(&self) -> Vec<String> {
        let mut clients: Vec<String> = self.lock().clients.values().cloned().collect();
        clients.sort();
        clients
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, topic: &str, payload: &[u8], retain: bool) {
        let handlers: Vec<MessageHandler> = {
            let mut state = self.lock();
            if retain {
                if payload.is_empty() {
                    state.retained.remove(topic);
                } else {
                    state.retained.insert(topic.to_string(), payload.to_vec());
                }
            }
            state
                .subscriptions
                .iter()
                .filter(|s| topic_matches(&s.filter, topic))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in handlers {
            handler(topic, payload);
        }
    }

    fn add_subscription(&self, connection_id: u64, filter: &str, handler: MessageHandler) {
        let retained: Vec<(String, Vec<u8>)> = {
            let mut state = self.lock();
            state.subscriptions.push(Subscription {
                connection_id,
                filter: filter.to_string(),
                handler: Arc::clone(&handler),
            });
            state
                .retained
                .iter()
                .filter(|(topic, _)| topic_matches(filter, topic))
                .map(|(topic, payload)| (topic.clone(), payload.clone()))
                .collect()
        };

        for (topic, payload) in retained {
            handler(&topic, &payload);
        }
    }

    /// 移除连接，返回应发布的遗嘱（仅非正常断开时）
    fn remove_connection(&self, connection_id: u64, fire_will: bool) -> Option<LastWill> {
        let mut state = self.lock();
        state
            .subscriptions
            .retain(|s| s.connection_id != connection_id);
        state.clients.remove(&connection_id);
        let will = state.wills.remove(&connection_id);
        if fire_will {
            will
        } else {
            None
        }
    }
}

#[async_trait]
impl TransportConnector for InMemoryBroker {
    async fn connect(
        &self,
        client_id: &str,
        last_will: Option<LastWill>,
    ) -> FleetResult<Arc<dyn PubSubTransport>> {
        let connection_id = {
            let mut state = self.lock();
            if state.unavailable {
                return Err(FleetError::TransportUnavailable(
                    "in-memory broker is unavailable".to_string(),
                ));
            }
            state.next_connection_id += 1;
            let id = state.next_connection_id;
            state.clients.insert(id, client_id.to_string());
            if let Some(will) = last_will {
                state.wills.insert(id, will);
            }
            id
        };

        debug!("In-memory client {} connected ({})", client_id, connection_id);
        Ok(Arc::new(InMemoryConnection {
            connection_id,
            client_id: client_id.to_string(),
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

/// 内存broker上的一条客户端连接
pub struct InMemoryConnection {
    connection_id: u64,
    client_id: String,
    broker: InMemoryBroker,
    closed: AtomicBool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> FleetResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FleetError::Transport(format!(
                "connection for {} is closed",
                self.client_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PubSubTransport for InMemoryConnection {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> FleetResult<()> {
        self.ensure_open()?;
        self.broker.route(topic, payload, retain);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> FleetResult<()> {
        self.ensure_open()?;
        self.broker
            .add_subscription(self.connection_id, filter, handler);
        Ok(())
    }

    async fn disconnect(&self) -> FleetResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.broker.remove_connection(self.connection_id, false);
        info!("In-memory client {} disconnected", self.client_id);
        Ok(())
    }

    async fn abort(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(will) = self.broker.remove_connection(self.connection_id, true) {
            debug!(
                "Publishing last will for {} on {}",
                self.client_id, will.topic
            );
            self.broker.route(&will.topic, &will.payload, will.retain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    type Received = Arc<StdMutex<Vec<(String, Vec<u8>)>>>;

    fn recorder() -> (Received, MessageHandler) {
        let received: Received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: MessageHandler = Arc::new(move |topic: &str, payload: &[u8]| {
            sink.lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
        });
        (received, handler)
    }

    #[tokio::test]
    async fn test_retained_message_delivered_to_late_subscriber() {
        let broker = InMemoryBroker::new();
        let publisher = broker.connect("pub", None).await.unwrap();
        publisher
            .publish("fleet/workers/w1", b"state", true)
            .await
            .unwrap();

        let subscriber = broker.connect("sub", None).await.unwrap();
        let (received, handler) = recorder();
        subscriber.subscribe("fleet/workers/+", handler).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].1, b"state".to_vec());
    }

    #[tokio::test]
    async fn test_empty_retained_publish_clears_and_delivers() {
        let broker = InMemoryBroker::new();
        let subscriber = broker.connect("sub", None).await.unwrap();
        let (received, handler) = recorder();
        subscriber.subscribe("fleet/workers/+", handler).await.unwrap();

        let publisher = broker.connect("pub", None).await.unwrap();
        publisher.publish("fleet/workers/w1", b"x", true).await.unwrap();
        publisher.publish("fleet/workers/w1", b"", true).await.unwrap();

        assert!(broker.retained("fleet/workers/w1").is_none());
        assert_eq!(received.lock().unwrap().len(), 2);
        assert!(received.lock().unwrap()[1].1.is_empty());
    }

    #[tokio::test]
    async fn test_will_fires_only_on_abort() {
        let broker = InMemoryBroker::new();
        let clean = broker
            .connect("clean", Some(LastWill::clear_retained("fleet/workers/a")))
            .await
            .unwrap();
        let dirty = broker
            .connect("dirty", Some(LastWill::clear_retained("fleet/workers/b")))
            .await
            .unwrap();
        clean.publish("fleet/workers/a", b"a", true).await.unwrap();
        dirty.publish("fleet/workers/b", b"b", true).await.unwrap();

        clean.disconnect().await.unwrap();
        dirty.abort().await;

        assert_eq!(broker.retained("fleet/workers/a"), Some(b"a".to_vec()));
        assert!(broker.retained("fleet/workers/b").is_none());
        assert!(broker.connected_clients().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_broker_refuses_connections() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);
        let result = broker.connect("w1", None).await;
        assert!(matches!(result, Err(FleetError::TransportUnavailable(_))));
    }

    #[tokio::test]
    async fn test_publish_after_disconnect_fails() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect("w1", None).await.unwrap();
        conn.disconnect().await.unwrap();
        assert!(conn.publish("t/x", b"1", false).await.is_err());
        // idempotent
        assert!(conn.disconnect().await.is_ok());
    }
}
