//! 能力广播的传输层实现
//!
//! - [`MqttConnector`]: 生产环境使用的MQTT（保留消息 + 遗嘱）
//! - [`InMemoryBroker`]: 进程内broker，语义与MQTT一致，用于测试和单机运行
//! - [`DisabledConnector`]: 显式关闭能力发现

pub mod in_memory_transport;
pub mod mqtt_transport;
pub mod transport_factory;

pub use in_memory_transport::{InMemoryBroker, InMemoryConnection};
pub use mqtt_transport::{MqttConnector, MqttTransport};
pub use transport_factory::{DisabledConnector, TransportFactory};
