use std::sync::Arc;
use std::time::Duration;

use fleet_core::ShutdownSignal;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::CapabilityAdvertiser;

/// 周期性重新发布能力快照，即使状态没有变化
pub struct HeartbeatManager {
    advertiser: Arc<CapabilityAdvertiser>,
    interval: Duration,
}

impl HeartbeatManager {
    pub fn new(advertiser: Arc<CapabilityAdvertiser>, interval: Duration) -> Self {
        Self {
            advertiser,
            interval,
        }
    }

    /// 启动心跳任务；第一次发布发生在一个完整间隔之后
    pub fn start(&self, shutdown: ShutdownSignal) -> HeartbeatHandle {
        let cancel = CancellationToken::new();
        let advertiser = Arc::clone(&self.advertiser);
        let period = self.interval;
        let token = cancel.clone();

        info!("Heartbeat task started (interval: {:?})", period);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Heartbeat task cancelled");
                        break;
                    }
                    _ = shutdown.requested() => {
                        debug!("Heartbeat task observed shutdown");
                        break;
                    }
                    _ = ticker.tick() => {
                        if shutdown.is_requested() {
                            break;
                        }
                        advertiser.publish().await;
                    }
                }
            }
        });

        HeartbeatHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// 心跳任务句柄；被丢弃时同样会取消任务
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// 取消心跳任务并等待其退出
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Heartbeat task failed: {}", e);
                }
            }
        }
        info!("Heartbeat task stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
