// src/handlers/health.rs

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::config::AppState;

// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "Saúde",
    responses(
        (status = 200, description = "Serviço no ar")
    )
)]
pub async fn health(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "leads-api",
        "timezone": app_state.config.timezone.name(),
    }))
}
