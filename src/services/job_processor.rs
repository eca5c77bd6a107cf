// src/services/job_processor.rs
//
// Processa a fila de jobs dos fluxos. Cada chamada é uma rodada: busca os vencidos,
// reivindica um a um (CAS com lease), revalida o lead e executa a ação do passo.
// A falha de um job nunca interrompe os demais.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::Stores,
    models::{
        automation::{AutoContactFlow, AutomationSettings, FlowStep, MessagePart, MessageSource, StepAction},
        flow_job::{FlowJob, ProcessSummary},
        lead::{Lead, LeadUpdate, LookupKind, NewInteraction},
    },
    services::{
        automation_config::AutomationConfigService,
        conditions::{matches_auto_contact_flow, should_exit_flow},
        send_window::ResolvedWindow,
        templates::{PlaceholderContext, render_part},
        whatsapp::{MessageSender, OutboundMessage, chat_id_for},
    },
};

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub batch_size: i64,
    pub lease: Duration,
    // 1 = sem nova tentativa
    pub max_attempts: i32,
    pub retry_backoff: Duration,
    pub whapi_token: Option<String>,
    pub timezone: Tz,
}

// Destino de um job reivindicado
#[derive(Debug, PartialEq)]
enum JobOutcome {
    Completed,
    Skipped(String),
    Deferred(DateTime<Utc>),
    // Falha definitiva: não entra na política de retry
    Failed(String),
}

#[derive(Clone)]
pub struct JobProcessor {
    stores: Stores,
    config: AutomationConfigService,
    sender: Arc<dyn MessageSender>,
    options: ProcessorOptions,
}

impl JobProcessor {
    pub fn new(
        stores: Stores,
        config: AutomationConfigService,
        sender: Arc<dyn MessageSender>,
        options: ProcessorOptions,
    ) -> Self {
        Self { stores, config, sender, options }
    }

    pub async fn process_due_jobs(&self, now: DateTime<Utc>) -> Result<ProcessSummary, AppError> {
        let due = self.stores.jobs.fetch_due(now, self.options.batch_size).await?;
        let mut summary = ProcessSummary::default();
        if due.is_empty() {
            return Ok(summary);
        }

        let settings = self.config.current().await?;

        for job in due {
            let claimed = match self.stores.jobs.claim(job.id, now, now + self.options.lease).await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => {
                    summary.contended += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, "Falha ao reivindicar job: {}", e);
                    continue;
                }
            };
            summary.processed += 1;

            let outcome = self.process_claimed(&claimed, &settings, now).await;
            if let Err(e) = self.record_outcome(&claimed, outcome, now, &mut summary).await {
                tracing::error!(job_id = %claimed.id, "Falha ao registrar resultado do job: {}", e);
            }
        }

        tracing::info!(
            processed = summary.processed,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            deferred = summary.deferred,
            retried = summary.retried,
            "Rodada de jobs concluída"
        );
        Ok(summary)
    }

    async fn record_outcome(
        &self,
        job: &FlowJob,
        outcome: Result<JobOutcome, AppError>,
        now: DateTime<Utc>,
        summary: &mut ProcessSummary,
    ) -> Result<(), AppError> {
        let jobs = &self.stores.jobs;

        match outcome {
            Ok(JobOutcome::Completed) => {
                if jobs.complete(job.id, job.claimed_until, now).await? {
                    summary.completed += 1;
                } else {
                    lease_lost(job, summary);
                }
            }
            Ok(JobOutcome::Skipped(reason)) => {
                tracing::info!(job_id = %job.id, lead_id = %job.lead_id, %reason, "Job ignorado");
                if jobs.skip(job.id, job.claimed_until, &reason, now).await? {
                    summary.skipped += 1;
                } else {
                    lease_lost(job, summary);
                }
            }
            Ok(JobOutcome::Deferred(at)) => {
                // Adiar por horário não gasta tentativa
                jobs.reschedule(job.id, at, (job.attempts - 1).max(0), None).await?;
                tracing::info!(job_id = %job.id, scheduled_at = %at, "Job adiado para a próxima janela");
                summary.deferred += 1;
            }
            Ok(JobOutcome::Failed(reason)) => {
                tracing::warn!(job_id = %job.id, lead_id = %job.lead_id, %reason, "Job falhou");
                if jobs.fail(job.id, job.claimed_until, &reason, now).await? {
                    summary.failed += 1;
                } else {
                    lease_lost(job, summary);
                }
            }
            Err(e) => {
                let message = e.to_string();
                if job.attempts < self.options.max_attempts {
                    let retry_at = now + self.options.retry_backoff;
                    tracing::warn!(
                        job_id = %job.id,
                        attempts = job.attempts,
                        retry_at = %retry_at,
                        "Job falhou; nova tentativa agendada: {}",
                        message
                    );
                    jobs.reschedule(job.id, retry_at, job.attempts, Some(&message)).await?;
                    summary.retried += 1;
                } else {
                    tracing::error!(job_id = %job.id, lead_id = %job.lead_id, "Job falhou: {}", message);
                    if jobs.fail(job.id, job.claimed_until, &message, now).await? {
                        summary.failed += 1;
                    } else {
                        lease_lost(job, summary);
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_claimed(
        &self,
        job: &FlowJob,
        settings: &AutomationSettings,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, AppError> {
        let Some(lead) = self.stores.leads.get_lead(job.lead_id).await? else {
            return Ok(JobOutcome::Failed("Lead não encontrado".to_string()));
        };

        if !settings.enabled {
            return Ok(JobOutcome::Skipped("Automação desativada".to_string()));
        }
        let Some(flow) = settings.flow(&job.flow_id) else {
            return Ok(JobOutcome::Skipped("Fluxo removido da configuração".to_string()));
        };
        if !flow.active {
            return Ok(JobOutcome::Skipped("Fluxo inativo".to_string()));
        }
        let Some(step) = find_step(flow, job) else {
            return Ok(JobOutcome::Skipped("Passo removido do fluxo".to_string()));
        };

        let window = ResolvedWindow::resolve(&settings.effective_scheduling(flow), self.options.timezone);
        if !window.contains(now) {
            return Ok(JobOutcome::Deferred(window.next_allowed(now)));
        }

        if let (StepAction::SendMessage { .. }, Some(limit)) = (&step.action, window.daily_send_limit) {
            let (day_start, day_end) = window.local_day_bounds(now);
            let sent = self.stores.jobs.count_sent_between(day_start, day_end).await?;
            if sent >= i64::from(limit) {
                tracing::info!(job_id = %job.id, sent, limit, "Limite diário de envios atingido");
                return Ok(JobOutcome::Deferred(window.next_allowed(day_end)));
            }
        }

        if lead.arquivado {
            return Ok(JobOutcome::Skipped("Lead arquivado".to_string()));
        }
        if !matches_auto_contact_flow(flow, &lead, None) {
            return Ok(JobOutcome::Skipped("Lead não atende mais às condições do fluxo".to_string()));
        }
        if should_exit_flow(flow, &lead, None) {
            return Ok(JobOutcome::Skipped("Condição de saída do fluxo atingida".to_string()));
        }

        self.execute(&step.action, flow, &lead, settings, now).await
    }

    async fn execute(
        &self,
        action: &StepAction,
        flow: &AutoContactFlow,
        lead: &Lead,
        settings: &AutomationSettings,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, AppError> {
        match action {
            StepAction::SendMessage { source } => self.send_message(source, flow, lead, settings, now).await,
            StepAction::UpdateStatus { target_status } => {
                let status = self
                    .stores
                    .leads
                    .resolve_lookup(LookupKind::Status, target_status)
                    .await?
                    .ok_or_else(|| AppError::LookupNotFound(format!("Status \"{}\" não encontrado", target_status)))?;

                let update = LeadUpdate { status: Some(status), ..Default::default() };
                self.stores.leads.update_lead(lead.id, update).await?;
                tracing::info!(lead_id = %lead.id, status = %target_status, "Status do lead atualizado pelo fluxo");
                Ok(JobOutcome::Completed)
            }
            StepAction::ArchiveLead => {
                self.stores.leads.archive_lead(lead.id).await?;
                tracing::info!(lead_id = %lead.id, "Lead arquivado pelo fluxo");
                Ok(JobOutcome::Completed)
            }
            StepAction::DeleteLead => {
                self.stores.jobs.skip_pending(lead.id, None, "Lead excluído", now).await?;
                self.stores.leads.delete_lead(lead.id).await?;
                tracing::info!(lead_id = %lead.id, "Lead excluído pelo fluxo");
                Ok(JobOutcome::Completed)
            }
        }
    }

    async fn send_message(
        &self,
        source: &MessageSource,
        flow: &AutoContactFlow,
        lead: &Lead,
        settings: &AutomationSettings,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, AppError> {
        let parts: Vec<MessagePart> = match source {
            MessageSource::Template { template_id } => match settings.template(template_id) {
                Some(template) => template.parts.clone(),
                None => return Ok(JobOutcome::Failed(format!("Template \"{}\" não encontrado", template_id))),
            },
            MessageSource::Custom { message } => vec![message.clone()],
        };

        let Some(chat_id) = chat_id_for(&lead.telefone) else {
            return Ok(JobOutcome::Failed("Lead sem telefone válido".to_string()));
        };

        let Some(token) = self.token(settings) else {
            return Ok(JobOutcome::Failed("Token do Whapi não configurado".to_string()));
        };

        let ctx = PlaceholderContext::new(lead, now, self.options.timezone);
        let mut summary = Vec::with_capacity(parts.len());

        // Uma mensagem por parte, na ordem do template
        for part in parts.iter().map(|p| render_part(p, &ctx)) {
            let message = OutboundMessage::from_part(&chat_id, &part);
            self.sender.send(token, &message).await?;
            summary.push(part.text.or(part.caption).unwrap_or_else(|| format!("[{}]", part.kind.as_str())));
        }

        self.stores
            .interactions
            .record_interaction(NewInteraction {
                lead_id: lead.id,
                tipo: "Mensagem Automática".to_string(),
                descricao: format!("Fluxo \"{}\": {}", flow.name, summary.join("\n")),
                responsavel: lead.responsavel.clone(),
                data_interacao: now,
            })
            .await?;
        self.stores.leads.touch_last_contact(lead.id, now).await?;

        tracing::info!(lead_id = %lead.id, flow_id = %flow.id, parts = parts.len(), "Mensagem automática enviada");
        Ok(JobOutcome::Completed)
    }

    // WHAPI_TOKEN do ambiente tem prioridade sobre o apiKey salvo
    fn token<'a>(&'a self, settings: &'a AutomationSettings) -> Option<&'a str> {
        self.options
            .whapi_token
            .as_deref()
            .or(settings.api_key.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Disparo avulso (manual-automation). Envia na ordem e para no primeiro erro do gateway.
    pub async fn send_manual(
        &self,
        to: &str,
        parts: &[MessagePart],
        lead_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut errors = Vec::new();
        let chat_id = chat_id_for(to);
        if chat_id.is_none() {
            errors.push("Campo \"chatId\" ou \"phone\" é obrigatório".to_string());
        }
        if parts.is_empty() {
            errors.push("Informe ao menos uma mensagem válida".to_string());
        }
        let Some(chat_id) = chat_id.filter(|_| errors.is_empty()) else {
            return Err(AppError::Validation(errors));
        };

        let settings = self.config.current().await?;
        let token = self
            .token(&settings)
            .ok_or_else(|| AppError::Validation(vec!["Token do Whapi não configurado".to_string()]))?;

        for part in parts {
            self.sender.send(token, &OutboundMessage::from_part(&chat_id, part)).await?;
        }

        if let Some(lead_id) = lead_id {
            self.stores
                .interactions
                .record_interaction(NewInteraction {
                    lead_id,
                    tipo: "Mensagem Manual".to_string(),
                    descricao: format!("{} mensagem(ns) enviada(s) para {}", parts.len(), chat_id),
                    responsavel: "Automação".to_string(),
                    data_interacao: now,
                })
                .await?;
            self.stores.leads.touch_last_contact(lead_id, now).await?;
        }

        tracing::info!(to = %chat_id, sent = parts.len(), "Disparo manual concluído");
        Ok(parts.len())
    }
}

// Outro processador reivindicou o job depois que o lease venceu
fn lease_lost(job: &FlowJob, summary: &mut ProcessSummary) {
    tracing::warn!(job_id = %job.id, lead_id = %job.lead_id, "Lease perdido; resultado descartado");
    summary.contended += 1;
}

// Pelo id do passo; se o fluxo foi editado, pela posição
fn find_step<'a>(flow: &'a AutoContactFlow, job: &FlowJob) -> Option<&'a FlowStep> {
    flow.steps
        .iter()
        .find(|s| s.id == job.step_id)
        .or_else(|| flow.steps.get(usize::try_from(job.step_index).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{FlowJobStore, LeadStore, MemoryStore, SettingsStore},
        models::{
            automation::{AUTO_CONTACT_INTEGRATION_SLUG, ContentKind},
            flow_job::{JobStatus, NewFlowJob},
            lead::fixtures::sample_lead,
        },
        services::{flow_scheduler::FlowScheduler, whatsapp::testing::RecordingSender},
    };
    use chrono_tz::America::Sao_Paulo;
    use serde_json::{Value, json};

    struct Harness {
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        processor: JobProcessor,
        scheduler: FlowScheduler,
        config: AutomationConfigService,
    }

    fn options(max_attempts: i32) -> ProcessorOptions {
        ProcessorOptions {
            batch_size: 25,
            lease: Duration::minutes(5),
            max_attempts,
            retry_backoff: Duration::minutes(15),
            whapi_token: None,
            timezone: Sao_Paulo,
        }
    }

    async fn harness(document: Value, max_attempts: i32) -> Harness {
        let store = Arc::new(MemoryStore::seeded());
        store
            .upsert_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG, &document)
            .await
            .unwrap();

        let stores = Stores::in_memory(store.clone());
        let config = AutomationConfigService::new(stores.settings.clone(), std::time::Duration::ZERO);
        let sender = Arc::new(RecordingSender::default());
        let processor = JobProcessor::new(stores.clone(), config.clone(), sender.clone(), options(max_attempts));
        let scheduler = FlowScheduler::new(stores.jobs.clone(), Sao_Paulo);

        Harness { store, sender, processor, scheduler, config }
    }

    fn document() -> Value {
        json!({
            "enabled": true,
            "apiKey": "Bearer segredo",
            "messageTemplates": [{
                "id": "boas-vindas",
                "name": "Boas-vindas",
                "parts": [
                    { "type": "text", "text": "{{saudacao}}, {{primeiro_nome}}!" },
                    { "type": "image", "mediaUrl": "https://cdn/tabela.png", "caption": "Tabela {{origem}}" }
                ]
            }],
            "scheduling": { "timezone": "America/Sao_Paulo", "startHour": "08:00", "endHour": "19:00",
                            "allowedWeekdays": [1, 2, 3, 4, 5] },
            "flows": [{
                "id": "proposta",
                "name": "Proposta enviada",
                "triggerStatus": "Proposta enviada",
                "exitConditions": [{ "field": "status", "operator": "equals", "value": "Fechado" }],
                "steps": [{ "delayValue": 24, "delayUnit": "hours", "templateId": "boas-vindas" }]
            }]
        })
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn schedule(h: &Harness, lead: &Lead, now: DateTime<Utc>) -> FlowJob {
        h.store.put_lead(lead.clone());
        let settings = h.config.current().await.unwrap();
        h.scheduler
            .schedule_flow_jobs(lead.id, &settings.flows[0], &settings, now)
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn end_to_end_job_is_sent_only_after_due_time() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        let created_at = at("2024-05-15T10:00:00-03:00");
        let job = schedule(&h, &lead, created_at).await;
        assert_eq!(job.scheduled_at, at("2024-05-16T10:00:00-03:00"));

        // Antes do horário: nada é selecionado
        let early = h.processor.process_due_jobs(at("2024-05-15T15:00:00-03:00")).await.unwrap();
        assert_eq!(early, ProcessSummary::default());
        assert_eq!(h.store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Pending);

        let run_at = at("2024-05-16T10:05:00-03:00");
        let summary = h.processor.process_due_jobs(run_at).await.unwrap();
        assert_eq!(summary.completed, 1);

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "5511987654321@s.whatsapp.net");
        assert_eq!(sent[0].body.as_deref(), Some("Bom dia, João!"));
        assert_eq!(sent[1].kind, ContentKind::Image);
        assert_eq!(sent[1].caption.as_deref(), Some("Tabela tráfego pago"));

        let done = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.attempts, 1);
        assert!(done.last_error.is_none());

        assert_eq!(h.store.interactions().len(), 1);
        assert_eq!(h.store.get_lead(lead.id).await.unwrap().unwrap().ultimo_contato, run_at);
    }

    #[tokio::test]
    async fn outside_window_defers_without_spending_attempts() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        let job = schedule(&h, &lead, at("2024-05-15T10:00:00-03:00")).await;

        // Sábado: devido, mas fora da janela
        let saturday = at("2024-05-18T11:00:00-03:00");
        let summary = h.processor.process_due_jobs(saturday).await.unwrap();
        assert_eq!(summary.deferred, 1);

        let deferred = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(deferred.status, JobStatus::Pending);
        assert_eq!(deferred.attempts, 0);
        assert_eq!(deferred.scheduled_at, at("2024-05-20T08:00:00-03:00"));
        assert!(deferred.claimed_until.is_none());
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_lead_fails_and_removed_flow_skips() {
        let h = harness(document(), 3).await;
        let now = at("2024-05-16T10:00:00-03:00");

        let orphan = h
            .store
            .insert_jobs(vec![NewFlowJob {
                lead_id: uuid::Uuid::new_v4(),
                flow_id: "proposta".into(),
                step_id: "proposta-step-0".into(),
                step_index: 0,
                action_type: "send_message".into(),
                scheduled_at: now,
            }])
            .await
            .unwrap()
            .remove(0);

        let lead = sample_lead();
        h.store.put_lead(lead.clone());
        let stale = h
            .store
            .insert_jobs(vec![NewFlowJob {
                lead_id: lead.id,
                flow_id: "apagado".into(),
                step_id: "apagado-step-0".into(),
                step_index: 0,
                action_type: "send_message".into(),
                scheduled_at: now,
            }])
            .await
            .unwrap()
            .remove(0);

        let summary = h.processor.process_due_jobs(now).await.unwrap();
        assert_eq!((summary.failed, summary.skipped, summary.retried), (1, 1, 0));

        let orphan = h.store.get_job(orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.last_error.as_deref(), Some("Lead não encontrado"));
        assert_eq!(h.store.get_job(stale.id).await.unwrap().unwrap().status, JobStatus::Skipped);
    }

    #[tokio::test]
    async fn lead_that_no_longer_matches_is_skipped() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        let job = schedule(&h, &lead, at("2024-05-15T10:00:00-03:00")).await;

        let mut closed = lead.clone();
        closed.status = "Fechado".into();
        h.store.put_lead(closed);

        let summary = h.processor.process_due_jobs(at("2024-05-16T11:00:00-03:00")).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(h.store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Skipped);
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn gateway_error_fails_by_default_and_retries_when_allowed() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        let job = schedule(&h, &lead, at("2024-05-15T10:00:00-03:00")).await;

        h.sender.fail_next("Whapi respondeu 500");
        let now = at("2024-05-16T11:00:00-03:00");
        let summary = h.processor.process_due_jobs(now).await.unwrap();
        assert_eq!(summary.failed, 1);
        let failed = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("Whapi respondeu 500"));

        let h = harness(document(), 2).await;
        let job = schedule(&h, &lead, at("2024-05-15T10:00:00-03:00")).await;
        h.sender.fail_next("Whapi respondeu 500");
        let summary = h.processor.process_due_jobs(now).await.unwrap();
        assert_eq!(summary.retried, 1);

        let retried = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.scheduled_at, now + Duration::minutes(15));

        let summary = h.processor.process_due_jobs(now + Duration::minutes(16)).await.unwrap();
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn daily_limit_defers_to_next_day() {
        let mut doc = document();
        doc["scheduling"]["dailySendLimit"] = json!(1);
        let h = harness(doc, 1).await;

        let first = sample_lead();
        let second = sample_lead();
        let job_a = schedule(&h, &first, at("2024-05-15T10:00:00-03:00")).await;
        let job_b = schedule(&h, &second, at("2024-05-15T10:00:00-03:00")).await;

        let summary = h.processor.process_due_jobs(at("2024-05-16T11:00:00-03:00")).await.unwrap();
        assert_eq!((summary.completed, summary.deferred), (1, 1));

        let statuses = [
            h.store.get_job(job_a.id).await.unwrap().unwrap(),
            h.store.get_job(job_b.id).await.unwrap().unwrap(),
        ];
        let deferred = statuses.iter().find(|j| j.status == JobStatus::Pending).unwrap();
        assert_eq!(deferred.scheduled_at, at("2024-05-17T08:00:00-03:00"));
        assert_eq!(deferred.attempts, 0);
    }

    #[tokio::test]
    async fn update_status_with_unknown_target_fails_loudly() {
        let doc = json!({
            "enabled": true,
            "flows": [{ "id": "f", "steps": [{ "actionType": "update_status", "targetStatus": "Inexistente" }] }]
        });
        let h = harness(doc, 1).await;
        let lead = sample_lead();
        let job = schedule(&h, &lead, at("2024-05-16T10:00:00-03:00")).await;

        h.processor.process_due_jobs(at("2024-05-16T10:00:00-03:00")).await.unwrap();
        let failed = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.last_error.unwrap().contains("Inexistente"));
    }

    #[tokio::test]
    async fn update_status_and_archive_mutate_the_lead() {
        let doc = json!({
            "enabled": true,
            "flows": [{ "id": "f", "steps": [
                { "actionType": "update_status", "targetStatus": "perdido" },
                { "actionType": "archive_lead", "delayHours": 1 }
            ] }]
        });
        let h = harness(doc, 1).await;
        let lead = sample_lead();
        schedule(&h, &lead, at("2024-05-16T10:00:00-03:00")).await;

        h.processor.process_due_jobs(at("2024-05-16T10:00:00-03:00")).await.unwrap();
        let updated = h.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(updated.status, "Perdido");
        assert!(!updated.arquivado);

        h.processor.process_due_jobs(at("2024-05-16T11:00:00-03:00")).await.unwrap();
        assert!(h.store.get_lead(lead.id).await.unwrap().unwrap().arquivado);
    }

    #[tokio::test]
    async fn claimed_job_is_not_taken_twice_until_lease_expires() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        let job = schedule(&h, &lead, at("2024-05-15T10:00:00-03:00")).await;
        let now = at("2024-05-16T11:00:00-03:00");

        // Outro processador levou o job e morreu
        h.store.claim(job.id, now, now + Duration::minutes(5)).await.unwrap();
        let summary = h.processor.process_due_jobs(now).await.unwrap();
        assert_eq!(summary.processed, 0);

        let later = now + Duration::minutes(10);
        let summary = h.processor.process_due_jobs(later).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(h.store.get_job(job.id).await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn manual_send_goes_out_in_order_and_logs_interaction() {
        let h = harness(document(), 1).await;
        let lead = sample_lead();
        h.store.put_lead(lead.clone());
        let now = at("2024-05-16T11:00:00-03:00");

        let parts = vec![
            MessagePart::text("Olá"),
            MessagePart::from_value(&json!({ "type": "document", "mediaUrl": "https://cdn/a.pdf", "filename": "a.pdf" }))
                .unwrap(),
        ];
        let sent = h.processor.send_manual("(11) 98765-4321", &parts, Some(lead.id), now).await.unwrap();

        assert_eq!(sent, 2);
        let messages = h.sender.sent();
        assert_eq!(messages[0].to, "5511987654321@s.whatsapp.net");
        assert_eq!(messages[1].kind, ContentKind::Document);
        assert_eq!(h.store.interactions()[0].tipo, "Mensagem Manual");
        assert_eq!(h.store.get_lead(lead.id).await.unwrap().unwrap().ultimo_contato, now);

        let invalid = h.processor.send_manual("", &[], None, now).await;
        assert!(matches!(invalid, Err(AppError::Validation(e)) if e.len() == 2));

        h.sender.fail_next("Whapi respondeu 500: erro");
        let failed = h.processor.send_manual("5511987654321", &parts, None, now).await;
        assert!(matches!(failed, Err(AppError::Gateway(_))));
    }
}
