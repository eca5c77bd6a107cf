// src/services/reminder_service.rs

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ReminderStore,
    models::reminder::{Reminder, ReminderPriority},
    services::business_days::{FollowUpRescheduler, local_to_utc},
};

// =============================================================================
//  AGRUPAMENTO E URGÊNCIA
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ReminderPeriod {
    Overdue,
    Today,
    Tomorrow,
    ThisWeek,
    ThisMonth,
    Later,
}

impl ReminderPeriod {
    pub fn label(&self) -> &'static str {
        match self {
            ReminderPeriod::Overdue => "Atrasados",
            ReminderPeriod::Today => "Hoje",
            ReminderPeriod::Tomorrow => "Amanhã",
            ReminderPeriod::ThisWeek => "Esta Semana",
            ReminderPeriod::ThisMonth => "Este Mês",
            ReminderPeriod::Later => "Mais Tarde",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedReminder {
    #[serde(flatten)]
    pub reminder: Reminder,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupedReminders {
    pub overdue: Vec<RankedReminder>,
    pub today: Vec<RankedReminder>,
    pub tomorrow: Vec<RankedReminder>,
    pub this_week: Vec<RankedReminder>,
    pub this_month: Vec<RankedReminder>,
    pub later: Vec<RankedReminder>,
}

impl GroupedReminders {
    fn bucket_mut(&mut self, period: ReminderPeriod) -> &mut Vec<RankedReminder> {
        match period {
            ReminderPeriod::Overdue => &mut self.overdue,
            ReminderPeriod::Today => &mut self.today,
            ReminderPeriod::Tomorrow => &mut self.tomorrow,
            ReminderPeriod::ThisWeek => &mut self.this_week,
            ReminderPeriod::ThisMonth => &mut self.this_month,
            ReminderPeriod::Later => &mut self.later,
        }
    }
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 { (date.year() + 1, 1) } else { (date.year(), date.month() + 1) };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Compara dias do calendário local; a hora do lembrete não importa.
pub fn reminder_period(reminder: &Reminder, now: DateTime<Utc>, tz: Tz) -> ReminderPeriod {
    let today = now.with_timezone(&tz).date_naive();
    let day = reminder.data_lembrete.with_timezone(&tz).date_naive();
    let tomorrow = today + Duration::days(1);
    // Semana ISO termina no domingo
    let end_of_week = today + Duration::days(6 - i64::from(today.weekday().num_days_from_monday()));

    if is_overdue(reminder, now, tz) {
        ReminderPeriod::Overdue
    } else if day == today {
        ReminderPeriod::Today
    } else if day == tomorrow {
        ReminderPeriod::Tomorrow
    } else if day <= end_of_week {
        ReminderPeriod::ThisWeek
    } else if day <= end_of_month(today) {
        ReminderPeriod::ThisMonth
    } else {
        ReminderPeriod::Later
    }
}

// Atrasado = dia local anterior a hoje e ainda não lido
fn is_overdue(reminder: &Reminder, now: DateTime<Utc>, tz: Tz) -> bool {
    let today = now.with_timezone(&tz).date_naive();
    reminder.data_lembrete.with_timezone(&tz).date_naive() < today && !reminder.lido
}

/// | situação                         | urgência  |
/// |----------------------------------|-----------|
/// | atrasado (dia anterior, não lido)| critical  |
/// | alta, vence em até 24h           | critical  |
/// | alta, depois de 24h              | high      |
/// | demais, vence em até 2h          | high      |
/// | demais, vence em até 24h         | medium    |
/// | demais                           | low       |
pub fn urgency_level(reminder: &Reminder, now: DateTime<Utc>, tz: Tz) -> Urgency {
    if is_overdue(reminder, now, tz) {
        return Urgency::Critical;
    }

    let minutes_until = (reminder.data_lembrete - now).num_minutes();

    if reminder.prioridade == ReminderPriority::Alta {
        return if minutes_until <= 24 * 60 { Urgency::Critical } else { Urgency::High };
    }

    if minutes_until <= 2 * 60 {
        Urgency::High
    } else if minutes_until <= 24 * 60 {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

pub fn group_reminders(reminders: Vec<Reminder>, now: DateTime<Utc>, tz: Tz) -> GroupedReminders {
    let mut grouped = GroupedReminders::default();
    for reminder in reminders {
        let period = reminder_period(&reminder, now, tz);
        let urgency = urgency_level(&reminder, now, tz);
        grouped.bucket_mut(period).push(RankedReminder { reminder, urgency });
    }
    grouped
}

/// "" | "N min" | "Hh" | "Hh Mmin"
pub fn format_estimated_time(minutes: Option<i32>) -> String {
    match minutes {
        None | Some(0) => String::new(),
        Some(m) if m < 60 => format!("{} min", m),
        Some(m) if m % 60 == 0 => format!("{}h", m / 60),
        Some(m) => format!("{}h {}min", m / 60, m % 60),
    }
}

// =============================================================================
//  SONECA
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
pub enum SnoozeOption {
    #[serde(rename = "minutes-15")]
    Minutes15,
    #[serde(rename = "minutes-30")]
    Minutes30,
    #[serde(rename = "hour-1")]
    Hour1,
    #[serde(rename = "tomorrow")]
    Tomorrow,
    #[serde(rename = "next-week")]
    NextWeek,
}

pub fn snooze_until(option: SnoozeOption, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let at_nine = |days: i64| {
        let date = now.with_timezone(&tz).date_naive() + Duration::days(days);
        local_to_utc(tz, date.and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN)))
    };

    match option {
        SnoozeOption::Minutes15 => now + Duration::minutes(15),
        SnoozeOption::Minutes30 => now + Duration::minutes(30),
        SnoozeOption::Hour1 => now + Duration::hours(1),
        SnoozeOption::Tomorrow => at_nine(1),
        SnoozeOption::NextWeek => at_nine(7),
    }
}

// =============================================================================
//  SERVIÇO
// =============================================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub reminder_id: Uuid,
    pub rescheduled: usize,
}

#[derive(Clone)]
pub struct ReminderService {
    reminders: Arc<dyn ReminderStore>,
    rescheduler: FollowUpRescheduler,
    tz: Tz,
}

impl ReminderService {
    pub fn new(reminders: Arc<dyn ReminderStore>, tz: Tz) -> Self {
        let rescheduler = FollowUpRescheduler::new(reminders.clone(), tz);
        Self { reminders, rescheduler, tz }
    }

    async fn find(&self, id: Uuid) -> Result<Reminder, AppError> {
        self.reminders
            .get_reminder(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lembrete não encontrado".to_string()))
    }

    /// Marca como lido e empurra os follow-ups seguintes do lead pelo atraso.
    /// `completed_at` chega cru do cliente; sem valor, vale `now`.
    pub async fn complete_reminder(
        &self,
        id: Uuid,
        completed_at: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CompletionResult, AppError> {
        let reminder = self.find(id).await?;
        self.reminders.mark_read(id).await?;

        let rescheduled = match reminder.lead_id {
            Some(lead_id) => {
                let completed = completed_at.map(str::to_string).unwrap_or_else(|| now.to_rfc3339());
                self.rescheduler
                    .reschedule_pending_follow_ups(lead_id, &reminder.data_lembrete.to_rfc3339(), &completed)
                    .await?
            }
            None => 0,
        };

        Ok(CompletionResult { reminder_id: id, rescheduled })
    }

    pub async fn snooze(&self, id: Uuid, option: SnoozeOption, now: DateTime<Utc>) -> Result<Reminder, AppError> {
        let due = snooze_until(option, now, self.tz);
        self.reminders
            .snooze(id, due)
            .await?
            .ok_or_else(|| AppError::NotFound("Lembrete não encontrado".to_string()))
    }

    pub async fn grouped(&self, lead_id: Option<Uuid>, now: DateTime<Utc>) -> Result<GroupedReminders, AppError> {
        let reminders = self.reminders.list_reminders(lead_id).await?;
        Ok(group_reminders(reminders, now, self.tz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, models::reminder::FOLLOW_UP};
    use chrono_tz::America::Sao_Paulo;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn reminder(due: &str, lido: bool, prioridade: ReminderPriority) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            lead_id: None,
            contract_id: None,
            tipo: FOLLOW_UP.into(),
            titulo: "Ligar".into(),
            descricao: None,
            data_lembrete: at(due),
            lido,
            prioridade,
            snooze_count: None,
            tags: vec![],
            tempo_estimado_minutos: None,
            created_at: at("2024-05-01T12:00:00Z"),
        }
    }

    // Quarta-feira, 15/05/2024, 10:00 em São Paulo
    fn now() -> DateTime<Utc> {
        at("2024-05-15T10:00:00-03:00")
    }

    #[test]
    fn buckets_follow_local_calendar_days() {
        let cases = [
            ("2024-05-14T09:00:00-03:00", false, ReminderPeriod::Overdue),
            ("2024-05-15T08:00:00-03:00", false, ReminderPeriod::Today),
            ("2024-05-15T23:30:00-03:00", false, ReminderPeriod::Today),
            ("2024-05-16T00:10:00-03:00", false, ReminderPeriod::Tomorrow),
            ("2024-05-19T18:00:00-03:00", false, ReminderPeriod::ThisWeek),
            ("2024-05-20T09:00:00-03:00", false, ReminderPeriod::ThisMonth),
            ("2024-05-31T21:00:00-03:00", false, ReminderPeriod::ThisMonth),
            ("2024-06-01T09:00:00-03:00", false, ReminderPeriod::Later),
            // Lido no passado não é atraso
            ("2024-05-14T09:00:00-03:00", true, ReminderPeriod::ThisWeek),
        ];

        for (due, lido, expected) in cases {
            let r = reminder(due, lido, ReminderPriority::Normal);
            assert_eq!(reminder_period(&r, now(), Sao_Paulo), expected, "{}", due);
        }
    }

    #[test]
    fn urgency_decision_table() {
        let cases = [
            ("2024-05-14T09:00:00-03:00", ReminderPriority::Baixa, Urgency::Critical),
            // Vencido hoje mais cedo ainda não é atraso
            ("2024-05-15T09:00:00-03:00", ReminderPriority::Normal, Urgency::High),
            ("2024-05-16T09:00:00-03:00", ReminderPriority::Alta, Urgency::Critical),
            ("2024-05-17T09:00:00-03:00", ReminderPriority::Alta, Urgency::High),
            ("2024-05-15T11:30:00-03:00", ReminderPriority::Normal, Urgency::High),
            ("2024-05-16T08:00:00-03:00", ReminderPriority::Normal, Urgency::Medium),
            ("2024-05-20T08:00:00-03:00", ReminderPriority::Normal, Urgency::Low),
        ];

        for (due, prioridade, expected) in cases {
            assert_eq!(urgency_level(&reminder(due, false, prioridade), now(), Sao_Paulo), expected, "{}", due);
        }
    }

    #[test]
    fn grouping_keeps_every_reminder_once() {
        let reminders = vec![
            reminder("2024-05-10T09:00:00-03:00", false, ReminderPriority::Normal),
            reminder("2024-05-15T15:00:00-03:00", false, ReminderPriority::Alta),
            reminder("2024-07-01T09:00:00-03:00", false, ReminderPriority::Baixa),
        ];
        let grouped = group_reminders(reminders, now(), Sao_Paulo);

        assert_eq!(grouped.overdue.len(), 1);
        assert_eq!(grouped.overdue[0].urgency, Urgency::Critical);
        assert_eq!(grouped.today.len(), 1);
        assert_eq!(grouped.later.len(), 1);
        assert_eq!(grouped.later[0].urgency, Urgency::Low);
    }

    #[test]
    fn estimated_time_formats() {
        assert_eq!(format_estimated_time(None), "");
        assert_eq!(format_estimated_time(Some(0)), "");
        assert_eq!(format_estimated_time(Some(45)), "45 min");
        assert_eq!(format_estimated_time(Some(120)), "2h");
        assert_eq!(format_estimated_time(Some(95)), "1h 35min");
        assert_eq!(ReminderPeriod::ThisMonth.label(), "Este Mês");
    }

    #[test]
    fn snooze_options() {
        let now = at("2024-05-15T22:40:00-03:00");
        assert_eq!(snooze_until(SnoozeOption::Minutes15, now, Sao_Paulo), at("2024-05-15T22:55:00-03:00"));
        assert_eq!(snooze_until(SnoozeOption::Hour1, now, Sao_Paulo), at("2024-05-15T23:40:00-03:00"));
        assert_eq!(snooze_until(SnoozeOption::Tomorrow, now, Sao_Paulo), at("2024-05-16T09:00:00-03:00"));
        assert_eq!(snooze_until(SnoozeOption::NextWeek, now, Sao_Paulo), at("2024-05-22T09:00:00-03:00"));
    }

    #[tokio::test]
    async fn completing_late_pushes_following_follow_ups() {
        let store = Arc::new(MemoryStore::seeded());
        let service = ReminderService::new(store.clone(), Sao_Paulo);
        let lead_id = Uuid::new_v4();

        // Sexta como data original; concluído na segunda seguinte = 1 dia útil
        let mut done = reminder("2024-05-17T09:00:00-03:00", false, ReminderPriority::Alta);
        done.lead_id = Some(lead_id);
        let mut next = reminder("2024-05-21T09:00:00-03:00", false, ReminderPriority::Normal);
        next.lead_id = Some(lead_id);
        store.put_reminder(done.clone());
        store.put_reminder(next.clone());

        let result = service
            .complete_reminder(done.id, Some("2024-05-20T14:00:00-03:00"), now())
            .await
            .unwrap();

        assert_eq!(result.rescheduled, 1);
        let moved = store.get_reminder(next.id).await.unwrap().unwrap();
        assert_eq!(moved.data_lembrete, at("2024-05-22T09:00:00-03:00"));
        assert!(store.get_reminder(done.id).await.unwrap().unwrap().lido);
    }

    #[tokio::test]
    async fn snooze_increments_count_and_missing_is_not_found() {
        let store = Arc::new(MemoryStore::seeded());
        let service = ReminderService::new(store.clone(), Sao_Paulo);
        let r = reminder("2024-05-15T09:00:00-03:00", false, ReminderPriority::Normal);
        store.put_reminder(r.clone());

        let snoozed = service.snooze(r.id, SnoozeOption::Minutes30, now()).await.unwrap();
        assert_eq!(snoozed.snooze_count, Some(1));
        assert_eq!(snoozed.data_lembrete, at("2024-05-15T10:30:00-03:00"));

        let missing = service.snooze(Uuid::new_v4(), SnoozeOption::Hour1, now()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
