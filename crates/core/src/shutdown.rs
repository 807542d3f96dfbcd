use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 一次关闭请求所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    /// 第一次信号：完成当前任务后优雅退出
    Graceful,
    /// 第二次及之后的信号：立即退出，跳过清理
    Forced,
}

/// 进程级的关闭状态
///
/// 信号监听任务只调用 [`ShutdownSignal::trigger`]；取消心跳、发布清理消息等
/// 实际工作都由持有者在普通任务中完成。
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownState>,
}

#[derive(Default)]
struct ShutdownState {
    signals: AtomicU32,
    requested: CancellationToken,
    forced: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次关闭请求
    pub fn trigger(&self) -> ShutdownStage {
        let count = self.inner.signals.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.requested.cancel();
        if count == 1 {
            ShutdownStage::Graceful
        } else {
            self.inner.forced.cancel();
            ShutdownStage::Forced
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.is_cancelled()
    }

    pub fn is_forced(&self) -> bool {
        self.inner.forced.is_cancelled()
    }

    /// 等待第一次关闭请求
    pub async fn requested(&self) {
        self.inner.requested.cancelled().await
    }

    /// 等待强制关闭请求
    pub async fn forced(&self) {
        self.inner.forced.cancelled().await
    }

    pub fn signal_count(&self) -> u32 {
        self.inner.signals.load(Ordering::SeqCst)
    }
}

/// 进程信号监听器
///
/// 信号流在 [`SignalListener::install`] 时注册一次并在整个生命周期内复用，
/// 两次信号之间不存在未注册的窗口。
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: signal::windows::CtrlC,
}

impl SignalListener {
    /// 注册SIGINT/SIGTERM（Windows上为Ctrl+C）处理器
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(windows)]
        {
            Ok(Self {
                ctrl_c: signal::windows::ctrl_c()?,
            })
        }
    }

    /// 把每个信号转换为一次 [`ShutdownSignal::trigger`]，直到进入强制阶段
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        while self.next_signal().await {
            match shutdown.trigger() {
                ShutdownStage::Graceful => {
                    info!("收到关闭信号，完成当前任务后退出（再次发送信号将强制退出）");
                }
                ShutdownStage::Forced => {
                    warn!("再次收到关闭信号，强制退出");
                    return;
                }
            }
        }
        error!("信号流已关闭，停止监听关闭信号");
    }

    #[cfg(unix)]
    async fn next_signal(&mut self) -> bool {
        tokio::select! {
            received = self.interrupt.recv() => received.is_some(),
            received = self.terminate.recv() => received.is_some(),
        }
    }

    #[cfg(windows)]
    async fn next_signal(&mut self) -> bool {
        self.ctrl_c.recv().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_trigger_is_forced() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_requested());

        assert_eq!(shutdown.trigger(), ShutdownStage::Graceful);
        assert!(shutdown.is_requested());
        assert!(!shutdown.is_forced());

        assert_eq!(shutdown.trigger(), ShutdownStage::Forced);
        assert!(shutdown.is_forced());
        assert_eq!(shutdown.signal_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let shutdown = ShutdownSignal::new();
        let observer = shutdown.clone();

        let waiter = tokio::spawn(async move {
            observer.requested().await;
        });
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[cfg(unix)]
    fn send_sigterm_to_self() {
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listener_turns_repeated_signals_into_forced_stage() {
        let shutdown = ShutdownSignal::new();
        let listener = SignalListener::install().unwrap();
        let task = tokio::spawn(listener.run(shutdown.clone()));

        send_sigterm_to_self();
        tokio::time::timeout(Duration::from_secs(5), shutdown.requested())
            .await
            .unwrap();
        assert!(!shutdown.is_forced());

        send_sigterm_to_self();
        tokio::time::timeout(Duration::from_secs(5), shutdown.forced())
            .await
            .unwrap();
        assert_eq!(shutdown.signal_count(), 2);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
