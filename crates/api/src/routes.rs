use std::sync::Arc;

use axum::{routing::get, Router};
use fleet_dispatcher::CapabilityAggregator;

use crate::handlers::{
    capabilities::{get_worker_capabilities, idle_capacity, worker_capacity},
    health::health_check,
};

/// API应用状态
///
/// 聚合器由服务的启动流程构造并拥有，这里只持有共享引用。
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<CapabilityAggregator>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/capabilities", get(idle_capacity))
        .route("/api/capabilities/workers", get(worker_capacity))
        .route("/api/capabilities/workers/{id}", get(get_worker_capabilities))
        .with_state(state)
}
