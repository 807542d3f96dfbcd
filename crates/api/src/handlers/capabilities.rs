use std::collections::BTreeMap;

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

/// 集群空闲容量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySummary {
    pub num_workers: usize,
    /// 任务类型 -> 空闲Worker数
    pub capabilities: BTreeMap<String, usize>,
}

/// 获取各任务类型的空闲Worker数
pub async fn idle_capacity(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(CapabilitySummary {
        num_workers: state.aggregator.worker_count(),
        capabilities: state.aggregator.idle_counts_by_task_type(),
    }))
}

/// 获取各任务类型的Worker总数（不论忙闲）
pub async fn worker_capacity(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.aggregator.worker_counts_by_task_type()))
}

/// 获取单个Worker最近一次的能力广播
pub async fn get_worker_capabilities(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let message = state
        .aggregator
        .worker(&id)
        .ok_or(ApiError::WorkerNotFound(id))?;
    Ok(success(message))
}
