pub mod api_observability;
pub mod app_config;
pub mod broker;
pub mod discovery;
pub mod worker;

// Re-export main types for easier imports
pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use broker::{BrokerConfig, TransportType};
pub use discovery::DiscoveryConfig;
pub use worker::WorkerConfig;
