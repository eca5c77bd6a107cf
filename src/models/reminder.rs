// src/models/reminder.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Tipos de lembrete criados pela automação de follow-up
pub const FOLLOW_UP: &str = "Follow-up";
pub const FOLLOW_UP_CUSTOM: &str = "Follow-up Personalizado";
pub const FOLLOW_UP_ADDITIONAL: &str = "Follow-up Adicional";

pub const AUTOMATIC_FOLLOW_UP_KINDS: [&str; 3] = [FOLLOW_UP, FOLLOW_UP_CUSTOM, FOLLOW_UP_ADDITIONAL];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema, Default)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReminderPriority {
    Alta,
    #[default]
    Normal,
    Baixa,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct Reminder {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    #[schema(example = "Follow-up")]
    pub tipo: String,
    pub titulo: String,
    pub descricao: Option<String>,
    pub data_lembrete: DateTime<Utc>,
    pub lido: bool,
    pub prioridade: ReminderPriority,
    pub snooze_count: Option<i32>,
    #[serde(default, deserialize_with = "crate::models::lead::null_as_empty")]
    pub tags: Vec<String>,
    pub tempo_estimado_minutos: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub lead_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub tipo: String,
    pub titulo: String,
    pub descricao: Option<String>,
    pub data_lembrete: DateTime<Utc>,
    pub prioridade: ReminderPriority,
}

// Regra de follow-up por lead, que substitui a tabela padrão para o status
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct FollowUpCustomRule {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub status: String,
    pub days_after: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: ReminderPriority,
    pub active: bool,
}

fn one() -> u32 {
    1
}

// Corpo do POST /leads/:id/follow-ups/additional
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalFollowUpsRequest {
    #[validate(range(min = 1, max = 30, message = "\"count\" deve estar entre 1 e 30"))]
    pub count: u32,
    #[validate(range(min = 1, max = 365, message = "\"intervalDays\" deve estar entre 1 e 365"))]
    pub interval_days: u32,
    #[serde(default = "one")]
    #[validate(range(max = 365, message = "\"startFromDays\" deve ser no máximo 365"))]
    pub start_from_days: u32,
}
