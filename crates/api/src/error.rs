use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Worker {0} 未广播能力信息")]
    WorkerNotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, suggestions) = match &self {
            ApiError::WorkerNotFound(_) => (
                StatusCode::NOT_FOUND,
                "WORKER_NOT_FOUND",
                vec![
                    "请检查Worker ID是否正确".to_string(),
                    "Worker可能已下线，其广播已被清除".to_string(),
                ],
            ),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
