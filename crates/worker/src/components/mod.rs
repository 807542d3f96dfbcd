pub mod capability_advertiser;
pub mod execution_loop;
pub mod heartbeat_manager;
pub mod task_resolution;
pub mod worker_lifecycle;

pub use capability_advertiser::CapabilityAdvertiser;
pub use execution_loop::{LoopState, LoopStats, WorkerExecutionLoop};
pub use heartbeat_manager::{HeartbeatHandle, HeartbeatManager};
pub use task_resolution::resolve_active_task_types;
pub use worker_lifecycle::WorkerLifecycleManager;
