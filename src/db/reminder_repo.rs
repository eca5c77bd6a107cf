// src/db/reminder_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text::normalize_text},
    db::store::ReminderStore,
    models::reminder::{AUTOMATIC_FOLLOW_UP_KINDS, FollowUpCustomRule, NewReminder, Reminder},
};

const REMINDER_COLUMNS: &str = r#"
    id, lead_id, contract_id, tipo, titulo, descricao, data_lembrete, lido,
    prioridade, snooze_count, tags, tempo_estimado_minutos, created_at
"#;

#[derive(Clone)]
pub struct ReminderRepository {
    pool: PgPool,
}

impl ReminderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderStore for ReminderRepository {
    async fn get_reminder(&self, id: Uuid) -> Result<Option<Reminder>, AppError> {
        let reminder = sqlx::query_as::<_, Reminder>(&format!(
            "SELECT {} FROM reminders WHERE id = $1",
            REMINDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reminder)
    }

    async fn list_reminders(&self, lead_id: Option<Uuid>) -> Result<Vec<Reminder>, AppError> {
        let reminders = sqlx::query_as::<_, Reminder>(&format!(
            r#"
            SELECT {}
            FROM reminders
            WHERE ($1::uuid IS NULL OR lead_id = $1)
            ORDER BY data_lembrete ASC
            "#,
            REMINDER_COLUMNS
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reminders)
    }

    async fn pending_follow_ups(&self, lead_id: Uuid) -> Result<Vec<Reminder>, AppError> {
        let kinds: Vec<String> = AUTOMATIC_FOLLOW_UP_KINDS.iter().map(|k| k.to_string()).collect();

        let reminders = sqlx::query_as::<_, Reminder>(&format!(
            r#"
            SELECT {}
            FROM reminders
            WHERE lead_id = $1
              AND tipo = ANY($2)
              AND lido = FALSE
            ORDER BY data_lembrete ASC
            "#,
            REMINDER_COLUMNS
        ))
        .bind(lead_id)
        .bind(&kinds)
        .fetch_all(&self.pool)
        .await?;

        Ok(reminders)
    }

    async fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder, AppError> {
        let created = sqlx::query_as::<_, Reminder>(&format!(
            r#"
            INSERT INTO reminders (lead_id, contract_id, tipo, titulo, descricao, data_lembrete, lido, prioridade)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(reminder.lead_id)
        .bind(reminder.contract_id)
        .bind(&reminder.tipo)
        .bind(&reminder.titulo)
        .bind(&reminder.descricao)
        .bind(reminder.data_lembrete)
        .bind(reminder.prioridade)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn update_due_date(&self, id: Uuid, due: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE reminders SET data_lembrete = $2 WHERE id = $1")
            .bind(id)
            .bind(due)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE reminders SET lido = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn snooze(&self, id: Uuid, due: DateTime<Utc>) -> Result<Option<Reminder>, AppError> {
        let reminder = sqlx::query_as::<_, Reminder>(&format!(
            r#"
            UPDATE reminders
            SET data_lembrete = $2, snooze_count = COALESCE(snooze_count, 0) + 1
            WHERE id = $1
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(id)
        .bind(due)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reminder)
    }

    async fn active_custom_rules(&self, lead_id: Uuid, status: &str) -> Result<Vec<FollowUpCustomRule>, AppError> {
        let rules = sqlx::query_as::<_, FollowUpCustomRule>(
            r#"
            SELECT id, lead_id, status, days_after, title, description, priority, active
            FROM follow_up_custom_rules
            WHERE lead_id = $1 AND active = TRUE
            ORDER BY days_after ASC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        // Status comparado sem acento nem caixa
        let wanted = normalize_text(status);
        Ok(rules.into_iter().filter(|r| normalize_text(&r.status) == wanted).collect())
    }
}
