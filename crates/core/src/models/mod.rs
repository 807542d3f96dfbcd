pub mod capability;
pub mod topic;

pub use capability::CapabilityMessage;
pub use topic::{topic_matches, wildcard_topic, worker_id_from_topic, worker_topic};
