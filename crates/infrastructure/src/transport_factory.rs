use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::config::{BrokerConfig, TransportType};
use fleet_core::{FleetError, FleetResult, LastWill, PubSubTransport, TransportConnector};
use tracing::{debug, info};

use crate::MqttConnector;

pub struct TransportFactory;

impl TransportFactory {
    pub fn create(config: &BrokerConfig) -> Arc<dyn TransportConnector> {
        debug!("Creating transport connector with type: {:?}", config.r#type);

        match config.r#type {
            TransportType::Mqtt => {
                info!("Using MQTT transport at {}", config.address());
                Arc::new(MqttConnector::new(config.clone()))
            }
            TransportType::Disabled => {
                info!("Capability transport disabled, discovery runs in degraded mode");
                Arc::new(DisabledConnector)
            }
        }
    }
}

/// 永远不可用的连接工厂，用于显式关闭能力发现
pub struct DisabledConnector;

#[async_trait]
impl TransportConnector for DisabledConnector {
    async fn connect(
        &self,
        _client_id: &str,
        _last_will: Option<LastWill>,
    ) -> FleetResult<Arc<dyn PubSubTransport>> {
        Err(FleetError::TransportUnavailable(
            "capability transport is disabled by configuration".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_connector_is_unavailable() {
        let config = BrokerConfig {
            r#type: TransportType::Disabled,
            ..BrokerConfig::default()
        };
        let connector = TransportFactory::create(&config);
        assert_eq!(connector.backend_name(), "disabled");
        assert!(matches!(
            connector.connect("w1", None).await,
            Err(FleetError::TransportUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mqtt_connector_selected() {
        let connector = TransportFactory::create(&BrokerConfig::default());
        assert_eq!(connector.backend_name(), "mqtt");
    }
}
