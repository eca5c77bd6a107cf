// src/handlers/reminders.rs

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::{envelope, json_body},
    middleware::i18n::Locale,
    models::reminder::Reminder,
    services::reminder_service::{
        CompletionResult, GroupedReminders, ReminderPeriod, SnoozeOption, format_estimated_time,
    },
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct GroupedQuery {
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteReminderRequest {
    // ISO 8601; ausente = agora
    pub completed_at: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SnoozeRequest {
    pub option: SnoozeOption,
}

const PERIODS: [(&str, ReminderPeriod); 6] = [
    ("overdue", ReminderPeriod::Overdue),
    ("today", ReminderPeriod::Today),
    ("tomorrow", ReminderPeriod::Tomorrow),
    ("thisWeek", ReminderPeriod::ThisWeek),
    ("thisMonth", ReminderPeriod::ThisMonth),
    ("later", ReminderPeriod::Later),
];

// GET /reminders/grouped
#[utoipa::path(
    get,
    path = "/reminders/grouped",
    tag = "Lembretes",
    params(GroupedQuery),
    responses(
        (status = 200, description = "Lembretes por período, com urgência", body = GroupedReminders)
    )
)]
pub async fn grouped_reminders(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(query): Query<GroupedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let grouped = app_state
        .reminder_service
        .grouped(query.lead_id, Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    let labels: Map<String, Value> = PERIODS
        .iter()
        .map(|(key, period)| (key.to_string(), json!(period.label())))
        .collect();

    // Tempo estimado já formatado para exibição
    let estimates: Map<String, Value> = [
        &grouped.overdue,
        &grouped.today,
        &grouped.tomorrow,
        &grouped.this_week,
        &grouped.this_month,
        &grouped.later,
    ]
    .into_iter()
    .flatten()
    .filter(|r| r.reminder.tempo_estimado_minutos.is_some())
    .map(|r| {
        (
            r.reminder.id.to_string(),
            json!(format_estimated_time(r.reminder.tempo_estimado_minutos)),
        )
    })
    .collect();

    Ok(Json(json!({
        "success": true,
        "data": grouped,
        "labels": labels,
        "estimatedTimes": estimates,
    })))
}

// POST /reminders/{id}/complete
#[utoipa::path(
    post,
    path = "/reminders/{id}/complete",
    tag = "Lembretes",
    request_body = CompleteReminderRequest,
    params(("id" = Uuid, Path, description = "ID do lembrete")),
    responses(
        (status = 200, description = "Lembrete concluído; follow-ups seguintes reagendados", body = CompletionResult),
        (status = 404, description = "Lembrete não encontrado")
    )
)]
pub async fn complete_reminder(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Corpo opcional
    let payload: CompleteReminderRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteReminderRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            AppError::Validation(vec![format!("Corpo inválido: {}", e)]).to_api_error(&locale)
        })?
    };
    let completed_at = payload.completed_at;

    let result = app_state
        .reminder_service
        .complete_reminder(id, completed_at.as_deref(), Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(result)))
}

// POST /reminders/{id}/snooze
#[utoipa::path(
    post,
    path = "/reminders/{id}/snooze",
    tag = "Lembretes",
    request_body = SnoozeRequest,
    params(("id" = Uuid, Path, description = "ID do lembrete")),
    responses(
        (status = 200, description = "Lembrete adiado", body = Reminder),
        (status = 404, description = "Lembrete não encontrado")
    )
)]
pub async fn snooze_reminder(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    payload: Result<Json<SnoozeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let reminder = app_state
        .reminder_service
        .snooze(id, payload.option, Utc::now())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(envelope(reminder)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::testing::test_state,
        handlers::router,
        models::reminder::{ReminderPriority, FOLLOW_UP},
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Duration;
    use tower::ServiceExt;

    fn reminder(lead_id: Option<Uuid>, due_in: Duration, minutes: Option<i32>) -> Reminder {
        let now = Utc::now();
        Reminder {
            id: Uuid::new_v4(),
            lead_id,
            contract_id: None,
            tipo: FOLLOW_UP.into(),
            titulo: "Ligar".into(),
            descricao: None,
            data_lembrete: now + due_in,
            lido: false,
            prioridade: ReminderPriority::Alta,
            snooze_count: None,
            tags: vec![],
            tempo_estimado_minutos: minutes,
            created_at: now,
        }
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn grouped_includes_labels_and_filters_by_lead() {
        let (state, store, _) = test_state();
        let lead_id = Uuid::new_v4();
        let overdue = reminder(Some(lead_id), Duration::days(-3), Some(90));
        store.put_reminder(overdue.clone());
        store.put_reminder(reminder(None, Duration::days(-3), None));

        let (status, body) = call(router(state), "GET", &format!("/reminders/grouped?leadId={}", lead_id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["labels"]["overdue"], json!("Atrasados"));
        assert_eq!(body["data"]["overdue"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["overdue"][0]["urgency"], json!("critical"));
        assert_eq!(body["estimatedTimes"][overdue.id.to_string()], json!("1h 30min"));
    }

    #[tokio::test]
    async fn complete_marks_read_and_accepts_empty_body() {
        let (state, store, _) = test_state();
        let target = reminder(None, Duration::hours(2), None);
        store.put_reminder(target.clone());
        let app = router(state);

        let (status, body) = call(app.clone(), "POST", &format!("/reminders/{}/complete", target.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reminderId"], json!(target.id.to_string()));
        assert_eq!(body["data"]["rescheduled"], json!(0));

        let (status, _) = call(app, "POST", &format!("/reminders/{}/complete", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn snooze_moves_the_reminder() {
        let (state, store, _) = test_state();
        let target = reminder(None, Duration::minutes(-5), None);
        store.put_reminder(target.clone());
        let app = router(state);

        let (status, body) = call(
            app.clone(),
            "POST",
            &format!("/reminders/{}/snooze", target.id),
            Some(json!({ "option": "hour-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let due: chrono::DateTime<Utc> = serde_json::from_value(body["data"]["data_lembrete"].clone()).unwrap();
        assert!(due > Utc::now() + Duration::minutes(50));

        let (status, body) = call(
            app,
            "POST",
            &format!("/reminders/{}/snooze", target.id),
            Some(json!({ "option": "daqui-a-pouco" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }
}
