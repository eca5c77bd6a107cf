// src/handlers/leads.rs

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::{envelope, json_body},
    middleware::i18n::Locale,
    models::{
        lead::{Lead, LeadFilters, LeadPatch, LeadPayload},
        reminder::{AdditionalFollowUpsRequest, Reminder},
    },
};

// POST /leads
#[utoipa::path(
    post,
    path = "/leads",
    tag = "Leads",
    request_body = LeadPayload,
    responses(
        (status = 201, description = "Lead criado", body = Lead),
        (status = 400, description = "Dados inválidos ou tabela de apoio sem o valor")
    )
)]
pub async fn create_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    payload: Result<Json<LeadPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let lead = app_state
        .lead_service
        .create(&payload, Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Lead criado com sucesso", "data": lead })),
    ))
}

// GET /leads
#[utoipa::path(
    get,
    path = "/leads",
    tag = "Leads",
    params(LeadFilters),
    responses(
        (status = 200, description = "Leads não arquivados, mais recentes primeiro", body = Vec<Lead>)
    )
)]
pub async fn list_leads(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(filters): Query<LeadFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let leads = app_state
        .lead_service
        .list(filters)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(json!({ "success": true, "count": leads.len(), "data": leads })))
}

// PUT /leads/{id}
#[utoipa::path(
    put,
    path = "/leads/{id}",
    tag = "Leads",
    request_body = LeadPatch,
    params(("id" = Uuid, Path, description = "ID do lead")),
    responses(
        (status = 200, description = "Lead atualizado", body = Lead),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn update_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    patch: Result<Json<LeadPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let patch = json_body(patch).map_err(|e| e.to_api_error(&locale))?;
    let lead = app_state
        .lead_service
        .update(id, &patch, Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(json!({ "success": true, "message": "Lead atualizado com sucesso", "data": lead })))
}

// POST /leads/batch
#[utoipa::path(
    post,
    path = "/leads/batch",
    tag = "Leads",
    request_body(content = Object, description = "{ \"leads\": [ ... ] }"),
    responses(
        (status = 200, description = "Resultado por item", body = crate::services::lead_service::BatchResults),
        (status = 400, description = "Campo \"leads\" ausente ou não é lista")
    )
)]
pub async fn create_leads_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(body).map_err(|e| e.to_api_error(&locale))?;
    let Some(items) = body.get("leads").and_then(Value::as_array) else {
        return Err(AppError::Validation(vec!["Campo \"leads\" deve ser um array".to_string()])
            .to_api_error(&locale));
    };

    let results = app_state.lead_service.create_batch(items, Utc::now()).await;
    let message = format!(
        "Processados {} leads: {} sucesso, {} falhas",
        items.len(),
        results.success.len(),
        results.failed.len()
    );

    Ok(Json(json!({ "success": true, "message": message, "results": results })))
}

// POST /leads/{id}/follow-ups/additional
#[utoipa::path(
    post,
    path = "/leads/{id}/follow-ups/additional",
    tag = "Leads",
    request_body = AdditionalFollowUpsRequest,
    params(("id" = Uuid, Path, description = "ID do lead")),
    responses(
        (status = 201, description = "Follow-ups criados", body = Vec<Reminder>),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn create_additional_follow_ups(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    payload: Result<Json<AdditionalFollowUpsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let created = app_state
        .follow_up_rules
        .create_additional_follow_ups(id, payload.count, payload.interval_days, payload.start_from_days, Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(envelope(created))))
}
