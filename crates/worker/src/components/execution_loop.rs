use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{ShutdownSignal, TaskRunner};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{CapabilityAdvertiser, HeartbeatManager};

/// 执行循环的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// 一次运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub jobs_processed: u64,
    pub empty_polls: u64,
    pub failed_attempts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Processed,
    NoJob,
    Failed,
}

/// Worker主循环
///
/// 每轮先发布 `idle=false`，再让任务执行组件认领并执行一个任务，最后无论结果
/// 如何都发布 `idle=true`。没有任务时休眠一个轮询间隔，处理了任务则立即进入下一轮。
/// 收到关闭信号后完成当前任务，取消并等待心跳任务，再清除广播。
pub struct WorkerExecutionLoop {
    worker_id: String,
    task_types: BTreeSet<String>,
    runner: Arc<dyn TaskRunner>,
    advertiser: Arc<CapabilityAdvertiser>,
    heartbeat: HeartbeatManager,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    state: watch::Sender<LoopState>,
}

impl WorkerExecutionLoop {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        advertiser: Arc<CapabilityAdvertiser>,
        heartbeat: HeartbeatManager,
        poll_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Starting);
        Self {
            worker_id: advertiser.worker_id().to_string(),
            task_types: advertiser.task_types().clone(),
            runner,
            advertiser,
            heartbeat,
            poll_interval,
            shutdown,
            state,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// 运行直到收到关闭请求并完成清理
    pub async fn run(&self) -> LoopStats {
        self.transition(LoopState::Starting);
        info!("Worker {} starting...", self.worker_id);
        self.advertiser.initialize().await;
        self.advertiser.publish_idle(true).await;

        let heartbeat = self.heartbeat.start(self.shutdown.clone());
        self.transition(LoopState::Running);

        let mut stats = LoopStats::default();
        while !self.shutdown.is_requested() {
            match self.process_next_job().await {
                JobOutcome::Processed => stats.jobs_processed += 1,
                JobOutcome::NoJob => {
                    stats.empty_polls += 1;
                    self.wait_before_next_poll().await;
                }
                JobOutcome::Failed => {
                    stats.failed_attempts += 1;
                    self.wait_before_next_poll().await;
                }
            }
        }

        self.transition(LoopState::Draining);
        info!("Worker {} shutting down...", self.worker_id);
        heartbeat.stop().await;
        self.advertiser.clear().await;

        self.transition(LoopState::Stopped);
        info!(
            "Worker {} stopped: {} jobs processed, {} empty polls, {} failed attempts",
            self.worker_id, stats.jobs_processed, stats.empty_polls, stats.failed_attempts
        );
        stats
    }

    async fn process_next_job(&self) -> JobOutcome {
        self.advertiser.publish_idle(false).await;

        let attempt = AssertUnwindSafe(self.runner.run_once(&self.task_types))
            .catch_unwind()
            .await;
        let outcome = match attempt {
            Ok(Ok(true)) => {
                info!("Job processed successfully");
                JobOutcome::Processed
            }
            Ok(Ok(false)) => {
                debug!("No jobs available");
                JobOutcome::NoJob
            }
            Ok(Err(e)) => {
                error!("Worker {} failed to process job: {}", self.worker_id, e);
                JobOutcome::Failed
            }
            Err(panic) => {
                error!(
                    "Worker {} job execution panicked: {}",
                    self.worker_id,
                    panic_message(panic.as_ref())
                );
                JobOutcome::Failed
            }
        };

        self.advertiser.publish_idle(true).await;
        outcome
    }

    async fn wait_before_next_poll(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.shutdown.requested() => {}
        }
    }

    fn transition(&self, next: LoopState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Worker {} loop state: {:?} -> {:?}", self.worker_id, previous, next);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
