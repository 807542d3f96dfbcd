use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::config::{DiscoveryConfig, WorkerConfig};
use fleet_core::{FleetError, FleetResult, ShutdownSignal, TaskRunner, TransportConnector};
use tracing::{error, info, warn};

use super::{
    resolve_active_task_types, CapabilityAdvertiser, HeartbeatManager, LoopStats,
    WorkerExecutionLoop,
};

/// Worker进程的唯一入口
///
/// 按依赖顺序构造组件：解析任务类型 → 能力广播器 → 心跳 → 执行循环。
/// 无论循环如何结束都会断开传输连接：正常结束时干净断开，强制退出时直接丢弃连接
/// 让broker发布遗嘱。
pub struct WorkerLifecycleManager {
    worker_id: String,
    requested_task_types: Option<BTreeSet<String>>,
    topic_prefix: String,
    heartbeat_interval: Duration,
    publish_timeout: Duration,
    poll_interval: Duration,
    connector: Arc<dyn TransportConnector>,
    runner: Arc<dyn TaskRunner>,
    shutdown: ShutdownSignal,
}

impl WorkerLifecycleManager {
    pub fn new(
        worker: &WorkerConfig,
        discovery: &DiscoveryConfig,
        connector: Arc<dyn TransportConnector>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            worker_id: worker.resolved_worker_id(),
            requested_task_types: worker.requested_task_types(),
            topic_prefix: discovery.topic_prefix.trim_end_matches('/').to_string(),
            heartbeat_interval: Duration::from_secs(discovery.heartbeat_interval_seconds),
            publish_timeout: discovery.publish_timeout(),
            poll_interval: Duration::from_millis(worker.poll_interval_ms),
            connector,
            runner,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// 使用外部提供的关闭信号（测试或嵌入时使用）
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// 运行Worker直到关闭
    ///
    /// 任务类型解析失败时在启动前返回错误；第二次关闭信号返回
    /// [`FleetError::ForcedShutdown`]，跳过清理。
    pub async fn run(&self) -> FleetResult<LoopStats> {
        info!("Initializing worker {}", self.worker_id);

        let available = self.runner.supported_task_types().await?;
        let active = resolve_active_task_types(&available, self.requested_task_types.as_ref())
            .inspect_err(|e| error!("Worker {} failed to start: {}", self.worker_id, e))?;

        let advertiser = Arc::new(
            CapabilityAdvertiser::new(
                self.worker_id.clone(),
                &self.topic_prefix,
                active,
                Arc::clone(&self.connector),
            )
            .with_publish_timeout(self.publish_timeout),
        );
        let heartbeat = HeartbeatManager::new(Arc::clone(&advertiser), self.heartbeat_interval);
        let execution_loop = WorkerExecutionLoop::new(
            Arc::clone(&self.runner),
            Arc::clone(&advertiser),
            heartbeat,
            self.poll_interval,
            self.shutdown.clone(),
        );

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.forced() => Err(FleetError::ForcedShutdown),
            stats = execution_loop.run() => Ok(stats),
        };

        match &outcome {
            Ok(_) => {
                advertiser.shutdown().await;
                info!("Worker {} shut down cleanly", self.worker_id);
            }
            Err(_) => {
                warn!("Force exit requested, terminating worker {} immediately", self.worker_id);
                advertiser.abandon().await;
            }
        }

        outcome
    }
}
