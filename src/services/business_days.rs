// src/services/business_days.rs
//
// Aritmética de dias úteis (sábado e domingo excluídos) e o reagendamento dos
// follow-ups pendentes quando um lembrete é concluído com atraso.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{common::error::AppError, common::text::parse_instant, db::ReminderStore};

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn skip_weekend(mut date: NaiveDate) -> NaiveDate {
    while is_weekend(date) {
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    date
}

// Converte horário local para instante; no "buraco" do horário de verão anda 1h.
pub(crate) fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

/// Início do dia útil: meia-noite local, pulando para segunda se cair no fim de semana.
pub fn business_day_start(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    skip_weekend(instant.with_timezone(&tz).date_naive())
}

/// Dias úteis de atraso entre a data original e a conclusão. Nunca negativo.
pub fn calculate_business_day_delay(original: DateTime<Utc>, completed: DateTime<Utc>, tz: Tz) -> i64 {
    let original_start = business_day_start(original, tz);
    let completion_end = business_day_start(completed, tz);

    if completion_end <= original_start {
        return 0;
    }

    let mut delay = 0;
    let mut cursor = original_start;
    while cursor < completion_end {
        let Some(next) = cursor.succ_opt() else { break };
        cursor = next;
        if !is_weekend(cursor) {
            delay += 1;
        }
    }
    delay
}

/// Avança `days` dias úteis mantendo o horário local.
pub fn add_business_days(instant: DateTime<Utc>, days: i64, tz: Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(&tz).naive_local();
    let mut date = local.date();
    let mut added = 0;

    while added < days {
        let Some(next) = date.succ_opt() else { break };
        date = next;
        if !is_weekend(date) {
            added += 1;
        }
    }

    local_to_utc(tz, skip_weekend(date).and_time(local.time()))
}

// =============================================================================
//  REAGENDAMENTO DE FOLLOW-UPS
// =============================================================================

#[derive(Clone)]
pub struct FollowUpRescheduler {
    reminders: Arc<dyn ReminderStore>,
    tz: Tz,
}

impl FollowUpRescheduler {
    pub fn new(reminders: Arc<dyn ReminderStore>, tz: Tz) -> Self {
        Self { reminders, tz }
    }

    /// Empurra os follow-ups pendentes do lead pelo atraso (em dias úteis) da conclusão.
    /// Datas inválidas são registradas no log e viram no-op. Retorna quantos foram movidos.
    pub async fn reschedule_pending_follow_ups(
        &self,
        lead_id: Uuid,
        original_date: &str,
        completed_at: &str,
    ) -> Result<usize, AppError> {
        let (Some(original), Some(completed)) = (parse_instant(original_date), parse_instant(completed_at)) else {
            tracing::warn!(
                %lead_id,
                original_date,
                completed_at,
                "Datas inválidas no reagendamento de follow-ups; nada a fazer"
            );
            return Ok(0);
        };

        let delay = calculate_business_day_delay(original, completed, self.tz);
        if delay == 0 {
            return Ok(0);
        }

        let original_start = local_to_utc(
            self.tz,
            business_day_start(original, self.tz).and_time(chrono::NaiveTime::MIN),
        );

        let pending = self.reminders.pending_follow_ups(lead_id).await?;
        let mut moved = 0;

        // Lembretes anteriores ao original ficam onde estão
        for reminder in pending.iter().filter(|r| r.data_lembrete >= original_start) {
            let due = add_business_days(reminder.data_lembrete, delay, self.tz);
            self.reminders.update_due_date(reminder.id, due).await?;
            moved += 1;
        }

        tracing::info!(%lead_id, delay, moved, "Follow-ups pendentes reagendados");
        Ok(moved)
    }
}
