pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod shutdown;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use logging::init_logging;
pub use models::CapabilityMessage;
pub use shutdown::{ShutdownSignal, ShutdownStage, SignalListener};
pub use traits::{LastWill, MessageHandler, PubSubTransport, TaskRunner, TransportConnector};

/// 统一的Result类型
pub type FleetResult<T> = std::result::Result<T, FleetError>;
