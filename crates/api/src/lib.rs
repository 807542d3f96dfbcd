//! # Fleet API
//!
//! 集群能力的只读HTTP接口，数据全部来自进程内的 [`CapabilityAggregator`]。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查（包含能力发现是否降级）
//! - `GET /api/capabilities` - 各任务类型的空闲Worker数
//! - `GET /api/capabilities/workers` - 各任务类型的Worker总数
//! - `GET /api/capabilities/workers/{id}` - 单个Worker最近一次的能力广播
//!
//! 所有成功响应都使用 [`response::ApiResponse`] 包装。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use fleet_dispatcher::CapabilityAggregator;
use tower::ServiceBuilder;

use middleware::{request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建带日志中间件的完整应用
pub fn create_app(aggregator: Arc<CapabilityAggregator>) -> Router {
    create_routes(AppState { aggregator }).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
