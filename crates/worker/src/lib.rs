pub mod components;
pub mod process_runner;

pub use components::{
    resolve_active_task_types, CapabilityAdvertiser, HeartbeatHandle, HeartbeatManager, LoopState,
    LoopStats, WorkerExecutionLoop, WorkerLifecycleManager,
};
pub use process_runner::ProcessTaskRunner;
