pub mod task_runner;
pub mod transport;

pub use task_runner::TaskRunner;
pub use transport::{LastWill, MessageHandler, PubSubTransport, TransportConnector};
