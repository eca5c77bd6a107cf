// src/services/flow_scheduler.rs
//
// Gera uma geração de jobs pendentes por (lead, fluxo). Reagendar apaga a geração
// anterior antes de inserir a nova.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::FlowJobStore,
    models::{
        automation::{AutoContactFlow, AutomationSettings},
        flow_job::{FlowJob, NewFlowJob},
    },
    services::send_window::ResolvedWindow,
};

#[derive(Clone)]
pub struct FlowScheduler {
    jobs: Arc<dyn FlowJobStore>,
    tz: Tz,
}

impl FlowScheduler {
    pub fn new(jobs: Arc<dyn FlowJobStore>, tz: Tz) -> Self {
        Self { jobs, tz }
    }

    /// Um job por passo. O atraso de cada passo conta a partir de `now`.
    pub async fn schedule_flow_jobs(
        &self,
        lead_id: Uuid,
        flow: &AutoContactFlow,
        settings: &AutomationSettings,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlowJob>, AppError> {
        let window = ResolvedWindow::resolve(&settings.effective_scheduling(flow), self.tz);

        let jobs: Vec<NewFlowJob> = flow
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let delay = Duration::milliseconds((step.delay_hours * 3_600_000.0).round() as i64);
                NewFlowJob {
                    lead_id,
                    flow_id: flow.id.clone(),
                    step_id: step.id.clone(),
                    step_index: index as i32,
                    action_type: step.action.action_type().to_string(),
                    scheduled_at: window.next_allowed(now + delay),
                }
            })
            .collect();

        let replaced = self.jobs.delete_pending(lead_id, &flow.id).await?;
        let created = self.jobs.insert_jobs(jobs).await?;

        tracing::info!(
            %lead_id,
            flow_id = %flow.id,
            created = created.len(),
            replaced,
            "Jobs do fluxo agendados"
        );
        Ok(created)
    }

    /// Pendentes -> skipped. `flow_id = None` cancela todos os fluxos do lead.
    pub async fn cancel_flow_jobs(
        &self,
        lead_id: Uuid,
        flow_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let cancelled = self.jobs.skip_pending(lead_id, flow_id, reason, now).await?;
        if cancelled > 0 {
            tracing::info!(%lead_id, flow_id, cancelled, reason, "Jobs pendentes cancelados");
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        models::{automation::AutomationSettings, flow_job::JobStatus},
    };
    use chrono_tz::America::Sao_Paulo;
    use serde_json::json;

    fn settings() -> AutomationSettings {
        AutomationSettings::from_value(&json!({
            "scheduling": { "timezone": "America/Sao_Paulo", "startHour": "08:00", "endHour": "19:00",
                            "allowedWeekdays": [1, 2, 3, 4, 5] },
            "flows": [{
                "id": "proposta",
                "triggerStatus": "Proposta enviada",
                "steps": [
                    { "delayValue": 24, "delayUnit": "hours", "customMessage": "Oi {{primeiro_nome}}" },
                    { "delayValue": 3, "delayUnit": "days", "actionType": "update_status", "targetStatus": "Perdido" }
                ]
            }]
        }))
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn step_delays_are_measured_from_now_and_fit_the_window() {
        let store = Arc::new(MemoryStore::seeded());
        let scheduler = FlowScheduler::new(store.clone(), Sao_Paulo);
        let settings = settings();
        let lead_id = Uuid::new_v4();

        // Quarta 10:00 -> +24h quinta 10:00; +3 dias sábado 10:00 -> segunda 08:00
        let jobs = scheduler
            .schedule_flow_jobs(lead_id, &settings.flows[0], &settings, at("2024-05-15T10:00:00-03:00"))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].scheduled_at, at("2024-05-16T10:00:00-03:00"));
        assert_eq!(jobs[0].action_type, "send_message");
        assert_eq!(jobs[1].scheduled_at, at("2024-05-20T08:00:00-03:00"));
        assert_eq!(jobs[1].step_id, "proposta-step-1");
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending && j.attempts == 0));
    }

    #[tokio::test]
    async fn rescheduling_keeps_a_single_pending_generation() {
        let store = Arc::new(MemoryStore::seeded());
        let scheduler = FlowScheduler::new(store.clone(), Sao_Paulo);
        let settings = settings();
        let lead_id = Uuid::new_v4();
        let now = at("2024-05-15T10:00:00-03:00");

        let first = scheduler.schedule_flow_jobs(lead_id, &settings.flows[0], &settings, now).await.unwrap();
        let second = scheduler.schedule_flow_jobs(lead_id, &settings.flows[0], &settings, now).await.unwrap();

        let jobs = store.list_jobs_for_lead(lead_id).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| second.iter().any(|s| s.id == j.id)));
        assert!(jobs.iter().all(|j| first.iter().all(|f| f.id != j.id)));
    }

    #[tokio::test]
    async fn cancel_marks_pending_jobs_skipped_with_reason() {
        let store = Arc::new(MemoryStore::seeded());
        let scheduler = FlowScheduler::new(store.clone(), Sao_Paulo);
        let settings = settings();
        let lead_id = Uuid::new_v4();
        let now = at("2024-05-15T10:00:00-03:00");

        scheduler.schedule_flow_jobs(lead_id, &settings.flows[0], &settings, now).await.unwrap();
        let cancelled = scheduler.cancel_flow_jobs(lead_id, Some("proposta"), "Lead mudou de fluxo", now).await.unwrap();

        assert_eq!(cancelled, 2);
        let jobs = store.list_jobs_for_lead(lead_id).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Skipped));
        assert_eq!(jobs[0].last_error.as_deref(), Some("Lead mudou de fluxo"));
    }
}
