use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready (checks the database connection)
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, StatusCode> {
    match sqlx::query("SELECT 1")
        .execute(state.db_pool.get_pool())
        .await
    {
        Ok(_) => Ok(Json(json!({ "status": "ready" }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
