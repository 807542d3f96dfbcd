use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::config::BrokerConfig;
use fleet_core::models::topic_matches;
use fleet_core::{
    FleetError, FleetResult, LastWill, MessageHandler, PubSubTransport, TransportConnector,
};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type Subscriptions = Arc<RwLock<Vec<(String, MessageHandler)>>>;

/// 基于 rumqttc 的MQTT连接工厂
///
/// 所有发布和订阅都使用 QoS 1；遗嘱消息在CONNECT时注册。
pub struct MqttConnector {
    config: BrokerConfig,
}

impl MqttConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn build_options(&self, client_id: &str, last_will: Option<LastWill>) -> MqttOptions {
        let client_id = format!("{}-{}", self.config.client_id_prefix, client_id);
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_seconds));
        options.set_clean_session(true);
        if let Some(will) = last_will {
            options.set_last_will(rumqttc::LastWill::new(
                will.topic,
                will.payload,
                QoS::AtLeastOnce,
                will.retain,
            ));
        }
        options
    }
}

#[async_trait]
impl TransportConnector for MqttConnector {
    async fn connect(
        &self,
        client_id: &str,
        last_will: Option<LastWill>,
    ) -> FleetResult<Arc<dyn PubSubTransport>> {
        let options = self.build_options(client_id, last_will);
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let subscriptions: Subscriptions = Arc::new(RwLock::new(Vec::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let (connected_tx, connected_rx) = oneshot::channel();

        let driver = tokio::spawn(drive_event_loop(
            event_loop,
            client.clone(),
            Arc::clone(&subscriptions),
            Arc::clone(&closing),
            connected_tx,
        ));

        let timeout = Duration::from_secs(self.config.connection_timeout_seconds);
        let outcome = match tokio::time::timeout(timeout, connected_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_)) => Err("event loop stopped before CONNACK".to_string()),
            Err(_) => Err(format!("no CONNACK within {}s", timeout.as_secs())),
        };

        if let Err(reason) = outcome {
            driver.abort();
            return Err(FleetError::TransportUnavailable(format!(
                "MQTT broker {} unreachable: {}",
                self.config.address(),
                reason
            )));
        }

        info!(
            "Connected to MQTT broker {} as {}-{}",
            self.config.address(),
            self.config.client_id_prefix,
            client_id
        );

        Ok(Arc::new(MqttTransport {
            client,
            subscriptions,
            closing,
            driver: Mutex::new(Some(driver)),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "mqtt"
    }
}

/// 驱动rumqttc事件循环：首次CONNACK通知连接方，之后的重连自动补订阅
async fn drive_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    subscriptions: Subscriptions,
    closing: Arc<AtomicBool>,
    connected_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut connected_tx = Some(connected_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if let Some(tx) = connected_tx.take() {
                    let _ = tx.send(Ok(()));
                    continue;
                }

                info!("Reconnected to MQTT broker, restoring subscriptions");
                let filters: Vec<String> = subscriptions
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .map(|(filter, _)| filter.clone())
                    .collect();
                for filter in filters {
                    if let Err(e) = client.try_subscribe(filter.clone(), QoS::AtLeastOnce) {
                        error!("Failed to restore subscription {}: {}", filter, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&subscriptions, &publish.topic, &publish.payload);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = connected_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                warn!(
                    "MQTT connection error: {}, retrying in {:?}",
                    e, RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn dispatch(subscriptions: &Subscriptions, topic: &str, payload: &[u8]) {
    let handlers: Vec<MessageHandler> = subscriptions
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|(filter, _)| topic_matches(filter, topic))
        .map(|(_, handler)| Arc::clone(handler))
        .collect();

    if handlers.is_empty() {
        debug!("No subscription matches topic {}", topic);
    }
    for handler in handlers {
        handler(topic, payload);
    }
}

/// 一条已建立的MQTT连接
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Subscriptions,
    closing: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl PubSubTransport for MqttTransport {
    /// 请求队列已满（broker断开期间事件循环不再消费）时立即失败，不会阻塞调用方
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> FleetResult<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| FleetError::Transport(format!("MQTT publish to {topic} failed: {e}")))
    }

    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> FleetResult<()> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((filter.to_string(), handler));

        self.client
            .try_subscribe(filter, QoS::AtLeastOnce)
            .map_err(|e| FleetError::Transport(format!("MQTT subscribe to {filter} failed: {e}")))
    }

    async fn disconnect(&self) -> FleetResult<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self
            .client
            .try_disconnect()
            .map_err(|e| FleetError::Transport(format!("MQTT disconnect failed: {e}")));

        let driver = self.driver.lock().await.take();
        if let Some(driver) = driver {
            let abort_handle = driver.abort_handle();
            if tokio::time::timeout(DISCONNECT_GRACE, driver).await.is_err() {
                warn!("MQTT event loop did not stop in time, aborting");
                abort_handle.abort();
            }
        }

        result
    }

    async fn abort(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.lock().await.take() {
            // 直接丢弃事件循环和socket，不发送DISCONNECT，broker随后发布遗嘱
            driver.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_carry_prefix_keep_alive_and_will() {
        let connector = MqttConnector::new(BrokerConfig {
            keep_alive_seconds: 12,
            ..BrokerConfig::default()
        });

        let options = connector.build_options(
            "worker-01",
            Some(LastWill::clear_retained("fleet/workers/worker-01")),
        );

        assert_eq!(options.client_id(), "fleet-worker-01");
        assert_eq!(options.keep_alive(), Duration::from_secs(12));
        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "fleet/workers/worker-01");
        assert!(will.message.is_empty());
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_options_without_will() {
        let connector = MqttConnector::new(BrokerConfig::default());
        let options = connector.build_options("aggregator", None);
        assert!(options.last_will().is_none());
    }

    #[tokio::test]
    async fn test_publish_fails_fast_when_request_queue_full() {
        let options = MqttConnector::new(BrokerConfig::default()).build_options("w1", None);
        // 事件循环保持存活但从不轮询，模拟broker断开期间请求无人消费
        let (client, _event_loop) = AsyncClient::new(options, 2);
        let transport = MqttTransport {
            client,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            closing: Arc::new(AtomicBool::new(false)),
            driver: Mutex::new(None),
        };

        for _ in 0..2 {
            transport.publish("fleet/workers/w1", b"{}", true).await.unwrap();
        }
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            transport.publish("fleet/workers/w1", b"{}", true),
        )
        .await
        .expect("publish must not wait for queue space");
        assert!(matches!(result, Err(FleetError::Transport(_))));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_unavailable() {
        let connector = MqttConnector::new(BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connection_timeout_seconds: 1,
            ..BrokerConfig::default()
        });

        let result = connector.connect("worker-01", None).await;
        assert!(matches!(result, Err(FleetError::TransportUnavailable(_))));
    }
}
