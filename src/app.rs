use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_api::create_app;
use fleet_core::{AppConfig, FleetError, ShutdownSignal};
use fleet_dispatcher::CapabilityAggregator;
use fleet_infrastructure::TransportFactory;
use fleet_worker::{ProcessTaskRunner, WorkerLifecycleManager};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 轮询并执行任务，广播本机能力
    Worker,
    /// 聚合集群能力并提供只读HTTP接口
    Server,
}

impl AppMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "worker" => Ok(AppMode::Worker),
            "server" => Ok(AppMode::Server),
            other => Err(anyhow::anyhow!(
                "不支持的运行模式: {other}，支持的模式: worker, server"
            )),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        info!("初始化应用程序，模式: {:?}", mode);
        Self { config, mode }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行直到关闭；强制退出时返回 [`FleetError::ForcedShutdown`]
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        match self.mode {
            AppMode::Worker => self.run_worker(shutdown).await,
            AppMode::Server => self.run_server(shutdown).await,
        }
    }

    async fn run_worker(&self, shutdown: ShutdownSignal) -> Result<()> {
        let connector = TransportFactory::create(&self.config.broker);
        let runner = Arc::new(ProcessTaskRunner::from_config(&self.config.worker));

        let manager = WorkerLifecycleManager::new(
            &self.config.worker,
            &self.config.discovery,
            connector,
            runner,
        )
        .with_shutdown(shutdown);

        info!("启动Worker服务: {}", manager.worker_id());
        let stats = manager.run().await?;
        info!(
            "Worker服务已停止，共处理 {} 个任务",
            stats.jobs_processed
        );
        Ok(())
    }

    async fn run_server(&self, shutdown: ShutdownSignal) -> Result<()> {
        let connector = TransportFactory::create(&self.config.broker);
        let aggregator = Arc::new(CapabilityAggregator::new(
            connector,
            self.config.discovery.topic_prefix.trim_end_matches('/'),
        ));

        aggregator.start().await;
        let ready_timeout = Duration::from_secs(self.config.discovery.ready_timeout_seconds);
        if !aggregator.wait_for_ready(ready_timeout).await {
            warn!("能力聚合器在 {:?} 内未就绪", ready_timeout);
        }

        let app = create_app(Arc::clone(&aggregator));
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        let graceful = shutdown.clone();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move { graceful.requested().await })
            .into_future();

        let outcome = tokio::select! {
            biased;
            _ = shutdown.forced() => Err(FleetError::ForcedShutdown.into()),
            served = server => served.context("API服务器运行失败"),
        };

        aggregator.shutdown().await;
        info!("API服务器已停止");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(AppMode::parse("worker").unwrap(), AppMode::Worker);
        assert_eq!(AppMode::parse("server").unwrap(), AppMode::Server);
        assert!(AppMode::parse("dispatcher").is_err());
    }
}
