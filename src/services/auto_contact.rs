// src/services/auto_contact.rs
//
// Ponto de entrada da automação: chamado a cada insert/update de lead (webhook ou API).

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    common::{error::AppError, text::normalize_text},
    models::{
        automation::{AutoContactFlow, AutomationSettings},
        lead::Lead,
    },
    services::{
        automation_config::AutomationConfigService,
        conditions::{EVENT_LEAD_CREATED, EVENT_LEAD_UPDATED, matches_auto_contact_flow, should_exit_flow},
        flow_scheduler::FlowScheduler,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AutoContactAction {
    Ignored,
    Cancelled,
    Scheduled,
    Unchanged,
    NoMatch,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoContactOutcome {
    pub action: AutoContactAction,
    pub flow_id: Option<String>,
    pub jobs_created: usize,
    pub jobs_cancelled: u64,
    pub reason: Option<String>,
}

impl AutoContactOutcome {
    fn new(action: AutoContactAction) -> Self {
        Self { action, flow_id: None, jobs_created: 0, jobs_cancelled: 0, reason: None }
    }

    fn because(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

#[derive(Clone)]
pub struct AutoContactService {
    config: AutomationConfigService,
    scheduler: FlowScheduler,
}

impl AutoContactService {
    pub fn new(config: AutomationConfigService, scheduler: FlowScheduler) -> Self {
        Self { config, scheduler }
    }

    /// `previous = None` significa lead recém-criado.
    pub async fn handle_lead_event(
        &self,
        lead: &Lead,
        previous: Option<&Lead>,
        now: DateTime<Utc>,
    ) -> Result<AutoContactOutcome, AppError> {
        let settings = self.config.current().await?;
        if !settings.enabled {
            return Ok(AutoContactOutcome::new(AutoContactAction::Ignored).because("Automação desativada"));
        }

        if lead.arquivado {
            let cancelled = self.scheduler.cancel_flow_jobs(lead.id, None, "Lead arquivado", now).await?;
            let mut outcome = AutoContactOutcome::new(AutoContactAction::Cancelled).because("Lead arquivado");
            outcome.jobs_cancelled = cancelled;
            return Ok(outcome);
        }

        let event = if previous.is_some() { EVENT_LEAD_UPDATED } else { EVENT_LEAD_CREATED };

        let matched = first_matching_flow(&settings, lead, event);

        let Some(flow) = matched else {
            let cancelled = self
                .scheduler
                .cancel_flow_jobs(lead.id, None, "Lead não atende a nenhum fluxo", now)
                .await?;
            let mut outcome = AutoContactOutcome::new(AutoContactAction::NoMatch);
            outcome.jobs_cancelled = cancelled;
            return Ok(outcome);
        };

        let mut cancelled = 0;
        for other in settings.flows.iter().filter(|f| f.id != flow.id) {
            cancelled += self
                .scheduler
                .cancel_flow_jobs(lead.id, Some(&other.id), "Lead passou para outro fluxo", now)
                .await?;
        }

        // Atualizações incidentais (ex.: ultimo_contato) não reiniciam os timers;
        // trocar de fluxo por outro campo (origem, tags...) reinicia.
        let status_changed = previous.is_none_or(|old| normalize_text(&old.status) != normalize_text(&lead.status));
        let flow_changed = previous
            .is_some_and(|old| first_matching_flow(&settings, old, event).is_none_or(|f| f.id != flow.id));

        let mut outcome = if status_changed || flow_changed {
            let created = self.scheduler.schedule_flow_jobs(lead.id, flow, &settings, now).await?;
            let mut outcome = AutoContactOutcome::new(AutoContactAction::Scheduled);
            outcome.jobs_created = created.len();
            outcome
        } else {
            AutoContactOutcome::new(AutoContactAction::Unchanged).because("Status não mudou")
        };

        outcome.flow_id = Some(flow.id.clone());
        outcome.jobs_cancelled = cancelled;
        Ok(outcome)
    }
}

// Primeiro fluxo ativo que casa e do qual o lead não sai
fn first_matching_flow<'a>(settings: &'a AutomationSettings, lead: &Lead, event: &str) -> Option<&'a AutoContactFlow> {
    settings.flows.iter().filter(|f| f.active).find(|flow| {
        matches_auto_contact_flow(flow, lead, Some(event)) && !should_exit_flow(flow, lead, Some(event))
    })
}
