// src/handlers.rs

use axum::{
    extract::rejection::JsonRejection,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{common::error::AppError, config::AppState};

pub mod automation;
pub mod health;
pub mod leads;
pub mod quick_replies;
pub mod reminders;

// Envelope de sucesso: { success: true, data }
pub(crate) fn envelope<T: Serialize>(data: T) -> Value {
    json!({ "success": true, "data": data })
}

// Corpo JSON malformado vira erro no envelope padrão (400), não o texto do axum
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(vec![format!("Corpo inválido: {}", rejection.body_text())]))
}

/// Rotas da API, sem as camadas (CORS, Swagger) que o main acrescenta.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Leads
        .route("/leads", post(leads::create_lead).get(leads::list_leads))
        .route("/leads/batch", post(leads::create_leads_batch))
        .route("/leads/{id}", put(leads::update_lead))
        .route("/leads/{id}/follow-ups/additional", post(leads::create_additional_follow_ups))
        // Automação
        .route("/automation", post(automation::dispatch))
        .route("/automation/auto-contact", post(automation::auto_contact))
        .route("/automation/process-flow-jobs", post(automation::process_flow_jobs))
        .route("/automation/manual-automation", post(automation::manual_automation))
        .route(
            "/automation/settings",
            get(automation::get_settings).put(automation::update_settings),
        )
        // Lembretes
        .route("/reminders/grouped", get(reminders::grouped_reminders))
        .route("/reminders/{id}/complete", post(reminders::complete_reminder))
        .route("/reminders/{id}/snooze", post(reminders::snooze_reminder))
        // Respostas rápidas
        .route("/quick-replies/rank", post(quick_replies::rank))
        .with_state(app_state)
}
