// src/handlers/automation.rs

use axum::{body::Bytes, extract::{rejection::JsonRejection, State}, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::{envelope, json_body},
    middleware::{action::AutomationAction, i18n::Locale},
    models::{
        automation::{AutomationSettings, LeadWebhookEvent, ManualAutomationRequest},
        flow_job::ProcessSummary,
        lead::Lead,
    },
    services::auto_contact::{AutoContactAction, AutoContactOutcome},
};

// =============================================================================
//  OPERAÇÕES (compartilhadas entre as rotas dedicadas e o despacho por ação)
// =============================================================================

async fn run_auto_contact(app_state: &AppState, event: LeadWebhookEvent) -> Result<AutoContactOutcome, AppError> {
    if event.is_delete() {
        return Ok(AutoContactOutcome {
            action: AutoContactAction::Ignored,
            flow_id: None,
            jobs_created: 0,
            jobs_cancelled: 0,
            reason: Some("Evento de exclusão".to_string()),
        });
    }

    let lead = Lead::from_webhook_record(&event.record)
        .ok_or_else(|| AppError::Validation(vec!["Campo \"record\" ausente ou inválido".to_string()]))?;
    let previous = Lead::from_webhook_record(&event.old_record);

    app_state
        .auto_contact
        .handle_lead_event(&lead, previous.as_ref(), Utc::now())
        .await
}

async fn run_manual(app_state: &AppState, request: ManualAutomationRequest) -> Result<usize, AppError> {
    request.validate()?;
    app_state
        .job_processor
        .send_manual(request.target(), &request.parts(), request.lead_id, Utc::now())
        .await
}

fn parse_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| AppError::Validation(vec![format!("Corpo inválido: {}", e)]))
}

// =============================================================================
//  ROTAS
// =============================================================================

// POST /automation?action=...
#[utoipa::path(
    post,
    path = "/automation",
    tag = "Automação",
    params(("action" = Option<String>, Query, description = "auto-contact | process-flow-jobs | manual-automation (ou cabeçalho x-action)")),
    request_body(content = Object, description = "Corpo da ação escolhida"),
    responses(
        (status = 200, description = "Resultado da ação"),
        (status = 400, description = "Ação ausente ou desconhecida")
    )
)]
pub async fn dispatch(
    State(app_state): State<AppState>,
    locale: Locale,
    action: AutomationAction,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError::Validation(vec![format!("JSON inválido: {}", e)]).to_api_error(&locale)
        })?
    };

    let result = match action {
        AutomationAction::AutoContact => match parse_body::<LeadWebhookEvent>(payload) {
            Ok(event) => run_auto_contact(&app_state, event).await.map(envelope),
            Err(e) => Err(e),
        },
        AutomationAction::ProcessFlowJobs => app_state
            .job_processor
            .process_due_jobs(Utc::now())
            .await
            .map(envelope),
        AutomationAction::ManualAutomation => match parse_body::<ManualAutomationRequest>(payload) {
            Ok(request) => run_manual(&app_state, request)
                .await
                .map(|sent| envelope(json!({ "sent": sent }))),
            Err(e) => Err(e),
        },
    };

    result.map(Json).map_err(|e| e.to_api_error(&locale))
}

// POST /automation/auto-contact
#[utoipa::path(
    post,
    path = "/automation/auto-contact",
    tag = "Automação",
    request_body = LeadWebhookEvent,
    responses(
        (status = 200, description = "Fluxo agendado, cancelado ou ignorado", body = AutoContactOutcome),
        (status = 400, description = "Registro ausente")
    )
)]
pub async fn auto_contact(
    State(app_state): State<AppState>,
    locale: Locale,
    payload: Result<Json<LeadWebhookEvent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let event = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let outcome = run_auto_contact(&app_state, event)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(outcome)))
}

// POST /automation/process-flow-jobs
#[utoipa::path(
    post,
    path = "/automation/process-flow-jobs",
    tag = "Automação",
    responses(
        (status = 200, description = "Resumo da rodada", body = ProcessSummary)
    )
)]
pub async fn process_flow_jobs(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .job_processor
        .process_due_jobs(Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(summary)))
}

// POST /automation/manual-automation
#[utoipa::path(
    post,
    path = "/automation/manual-automation",
    tag = "Automação",
    request_body = ManualAutomationRequest,
    responses(
        (status = 200, description = "Mensagens enviadas"),
        (status = 400, description = "Destino ou mensagens ausentes"),
        (status = 502, description = "Falha no gateway do WhatsApp")
    )
)]
pub async fn manual_automation(
    State(app_state): State<AppState>,
    locale: Locale,
    payload: Result<Json<ManualAutomationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let sent = run_manual(&app_state, request)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(json!({ "sent": sent }))))
}

// GET /automation/settings
#[utoipa::path(
    get,
    path = "/automation/settings",
    tag = "Automação",
    responses(
        (status = 200, description = "Configuração normalizada (sem a chave da API)", body = AutomationSettings)
    )
)]
pub async fn get_settings(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let settings = app_state
        .automation_config
        .current()
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(&*settings)))
}

// PUT /automation/settings
#[utoipa::path(
    put,
    path = "/automation/settings",
    tag = "Automação",
    request_body(content = Object, description = "Documento de configuração da automação"),
    responses(
        (status = 200, description = "Configuração salva", body = AutomationSettings),
        (status = 400, description = "Documento não é um objeto")
    )
)]
pub async fn update_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let document = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let settings = app_state
        .automation_config
        .save(&document)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(&*settings)))
}
