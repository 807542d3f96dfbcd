use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let discovery = if state.aggregator.is_degraded() {
        "degraded"
    } else {
        "ok"
    };

    Json(json!({
        "status": "ok",
        "discovery": discovery,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "fleet-capability-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
