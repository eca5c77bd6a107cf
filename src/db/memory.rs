// src/db/memory.rs
//
// Store em memória: usado quando não há DATABASE_URL e nos testes.
// Os jobs ficam numa arena indexada (Vec + índice por id), com `claimed_until`
// como lease explícito.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text::normalize_text},
    db::store::{
        FlowJobStore, InteractionStore, LeadStore, ReminderStore, SettingsStore, StoredSettings,
    },
    models::{
        flow_job::{FlowJob, JobStatus, NewFlowJob},
        lead::{Lead, LeadFilters, LeadUpdate, LookupKind, LookupValue, NewInteraction, NewLead},
        reminder::{AUTOMATIC_FOLLOW_UP_KINDS, FollowUpCustomRule, NewReminder, Reminder},
    },
};

const DEFAULT_STATUSES: [&str; 8] = [
    "Novo",
    "Em contato",
    "Contato realizado",
    "Cotando",
    "Proposta enviada",
    "Proposta em análise",
    "Fechado",
    "Perdido",
];
const DEFAULT_ORIGENS: [&str; 5] = ["tráfego pago", "Telein", "indicação", "orgânico", "Ully"];
const DEFAULT_TIPOS: [&str; 4] = ["Pessoa Física", "MEI", "CNPJ", "Adesão"];

#[derive(Default)]
struct MemoryState {
    leads: HashMap<Uuid, Lead>,
    lookups: Vec<LookupValue>,
    reminders: HashMap<Uuid, Reminder>,
    custom_rules: Vec<FollowUpCustomRule>,
    // Arena de jobs: posição estável, índice por id
    jobs: Vec<FlowJob>,
    job_index: HashMap<Uuid, usize>,
    settings: HashMap<String, StoredSettings>,
    interactions: Vec<NewInteraction>,
}

impl MemoryState {
    fn job_mut(&mut self, id: Uuid) -> Option<&mut FlowJob> {
        let slot = *self.job_index.get(&id)?;
        self.jobs.get_mut(slot)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Store com as tabelas de apoio padrão (status, origens, tipos).
    pub fn seeded() -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            let seeds = [
                (LookupKind::Status, &DEFAULT_STATUSES[..]),
                (LookupKind::Origem, &DEFAULT_ORIGENS[..]),
                (LookupKind::TipoContratacao, &DEFAULT_TIPOS[..]),
            ];
            for (kind, names) in seeds {
                for nome in names {
                    state.lookups.push(LookupValue { id: Uuid::new_v4(), kind, nome: nome.to_string() });
                }
            }
        }
        store
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("store em memória envenenado")))
    }

    fn finish(
        &self,
        id: Uuid,
        lease: Option<DateTime<Utc>>,
        status: JobStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let Some(job) = state.job_mut(id).filter(|j| j.holds_lease(lease)) else {
            return Ok(false);
        };
        job.status = status;
        job.last_error = Some(reason.to_string());
        job.claimed_until = None;
        job.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.state()?.leads.get(&id).cloned())
    }

    async fn list_leads(&self, filters: &LeadFilters) -> Result<Vec<Lead>, AppError> {
        let state = self.state()?;
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|l| !l.arquivado)
            .filter(|l| filters.status.as_ref().is_none_or(|s| &l.status == s))
            .filter(|l| filters.responsavel.as_ref().is_none_or(|r| &l.responsavel == r))
            .filter(|l| filters.telefone.as_ref().is_none_or(|t| &l.telefone == t))
            .filter(|l| {
                filters.email.as_ref().is_none_or(|e| {
                    l.email.as_deref().is_some_and(|le| le.eq_ignore_ascii_case(e))
                })
            })
            .cloned()
            .collect();

        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        leads.truncate(filters.limit.unwrap_or(100).max(0) as usize);
        Ok(leads)
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, AppError> {
        let created = Lead {
            id: Uuid::new_v4(),
            nome_completo: lead.nome_completo,
            telefone: lead.telefone,
            email: lead.email,
            cidade: lead.cidade,
            regiao: lead.regiao,
            origem: lead.origem.nome,
            origem_id: Some(lead.origem.id),
            tipo_contratacao: lead.tipo_contratacao.nome,
            tipo_contratacao_id: Some(lead.tipo_contratacao.id),
            status: lead.status.nome,
            status_id: Some(lead.status.id),
            operadora_atual: lead.operadora_atual,
            responsavel: lead.responsavel,
            observacoes: lead.observacoes,
            tags: lead.tags,
            data_criacao: lead.data_criacao,
            ultimo_contato: lead.ultimo_contato,
            proximo_retorno: lead.proximo_retorno,
            arquivado: false,
            created_at: Utc::now(),
        };

        self.state()?.leads.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_lead(&self, id: Uuid, update: LeadUpdate) -> Result<Option<Lead>, AppError> {
        let mut state = self.state()?;
        Ok(state.leads.get_mut(&id).map(|lead| {
            update.apply_to(lead);
            lead.clone()
        }))
    }

    async fn archive_lead(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(lead) = self.state()?.leads.get_mut(&id) {
            lead.arquivado = true;
        }
        Ok(())
    }

    async fn delete_lead(&self, id: Uuid) -> Result<(), AppError> {
        self.state()?.leads.remove(&id);
        Ok(())
    }

    async fn touch_last_contact(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(lead) = self.state()?.leads.get_mut(&id) {
            lead.ultimo_contato = at;
        }
        Ok(())
    }

    async fn resolve_lookup(&self, kind: LookupKind, name: &str) -> Result<Option<LookupValue>, AppError> {
        let wanted = normalize_text(name);
        Ok(self
            .state()?
            .lookups
            .iter()
            .find(|l| l.kind == kind && normalize_text(&l.nome) == wanted)
            .cloned())
    }
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn get_reminder(&self, id: Uuid) -> Result<Option<Reminder>, AppError> {
        Ok(self.state()?.reminders.get(&id).cloned())
    }

    async fn list_reminders(&self, lead_id: Option<Uuid>) -> Result<Vec<Reminder>, AppError> {
        let state = self.state()?;
        let mut reminders: Vec<Reminder> = state
            .reminders
            .values()
            .filter(|r| lead_id.is_none() || r.lead_id == lead_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|r| r.data_lembrete);
        Ok(reminders)
    }

    async fn pending_follow_ups(&self, lead_id: Uuid) -> Result<Vec<Reminder>, AppError> {
        let state = self.state()?;
        let mut reminders: Vec<Reminder> = state
            .reminders
            .values()
            .filter(|r| r.lead_id == Some(lead_id))
            .filter(|r| !r.lido && AUTOMATIC_FOLLOW_UP_KINDS.contains(&r.tipo.as_str()))
            .cloned()
            .collect();
        reminders.sort_by_key(|r| r.data_lembrete);
        Ok(reminders)
    }

    async fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder, AppError> {
        let created = Reminder {
            id: Uuid::new_v4(),
            lead_id: reminder.lead_id,
            contract_id: reminder.contract_id,
            tipo: reminder.tipo,
            titulo: reminder.titulo,
            descricao: reminder.descricao,
            data_lembrete: reminder.data_lembrete,
            lido: false,
            prioridade: reminder.prioridade,
            snooze_count: None,
            tags: Vec::new(),
            tempo_estimado_minutos: None,
            created_at: Utc::now(),
        };
        self.state()?.reminders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_due_date(&self, id: Uuid, due: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(reminder) = self.state()?.reminders.get_mut(&id) {
            reminder.data_lembrete = due;
        }
        Ok(())
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(reminder) = self.state()?.reminders.get_mut(&id) {
            reminder.lido = true;
        }
        Ok(())
    }

    async fn snooze(&self, id: Uuid, due: DateTime<Utc>) -> Result<Option<Reminder>, AppError> {
        let mut state = self.state()?;
        Ok(state.reminders.get_mut(&id).map(|reminder| {
            reminder.data_lembrete = due;
            reminder.snooze_count = Some(reminder.snooze_count.unwrap_or(0) + 1);
            reminder.clone()
        }))
    }

    async fn active_custom_rules(&self, lead_id: Uuid, status: &str) -> Result<Vec<FollowUpCustomRule>, AppError> {
        let state = self.state()?;
        let wanted = normalize_text(status);
        let mut rules: Vec<FollowUpCustomRule> = state
            .custom_rules
            .iter()
            .filter(|r| r.lead_id == lead_id && r.active && normalize_text(&r.status) == wanted)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.days_after);
        Ok(rules)
    }
}

#[async_trait]
impl FlowJobStore for MemoryStore {
    async fn insert_jobs(&self, jobs: Vec<NewFlowJob>) -> Result<Vec<FlowJob>, AppError> {
        let mut state = self.state()?;
        let now = Utc::now();
        let mut created = Vec::with_capacity(jobs.len());

        for job in jobs {
            let row = FlowJob {
                id: Uuid::new_v4(),
                lead_id: job.lead_id,
                flow_id: job.flow_id,
                step_id: job.step_id,
                step_index: job.step_index,
                action_type: job.action_type,
                scheduled_at: job.scheduled_at,
                status: JobStatus::Pending,
                attempts: 0,
                last_error: None,
                claimed_until: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            let slot = state.jobs.len();
            state.job_index.insert(row.id, slot);
            state.jobs.push(row.clone());
            created.push(row);
        }

        Ok(created)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<FlowJob>, AppError> {
        let state = self.state()?;
        Ok(state.job_index.get(&id).and_then(|slot| state.jobs.get(*slot)).cloned())
    }

    async fn list_jobs_for_lead(&self, lead_id: Uuid) -> Result<Vec<FlowJob>, AppError> {
        let state = self.state()?;
        let mut jobs: Vec<FlowJob> = state.jobs.iter().filter(|j| j.lead_id == lead_id).cloned().collect();
        jobs.sort_by_key(|j| j.scheduled_at);
        Ok(jobs)
    }

    async fn delete_pending(&self, lead_id: Uuid, flow_id: &str) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.jobs.len();
        state
            .jobs
            .retain(|j| !(j.lead_id == lead_id && j.flow_id == flow_id && j.status == JobStatus::Pending));
        let removed = (before - state.jobs.len()) as u64;

        // Compacta a arena: reconstrói o índice
        if removed > 0 {
            let index = state.jobs.iter().enumerate().map(|(slot, j)| (j.id, slot)).collect();
            state.job_index = index;
        }
        Ok(removed)
    }

    async fn skip_pending(
        &self,
        lead_id: Uuid,
        flow_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let mut count = 0;
        for job in state.jobs.iter_mut() {
            let flow_matches = flow_id.is_none_or(|f| job.flow_id == f);
            if job.lead_id == lead_id && job.status == JobStatus::Pending && flow_matches {
                job.status = JobStatus::Skipped;
                job.last_error = Some(reason.to_string());
                job.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FlowJob>, AppError> {
        let state = self.state()?;
        let mut due: Vec<FlowJob> = state
            .jobs
            .iter()
            .filter(|j| j.scheduled_at <= now && j.is_claimable(now))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<FlowJob>, AppError> {
        let mut state = self.state()?;
        let Some(job) = state.job_mut(id) else {
            return Ok(None);
        };
        if !job.is_claimable(now) {
            return Ok(None);
        }

        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.claimed_until = Some(lease_until);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        attempts: i32,
        last_error: Option<&str>,
    ) -> Result<(), AppError> {
        if let Some(job) = self.state()?.job_mut(id) {
            job.status = JobStatus::Pending;
            job.scheduled_at = scheduled_at;
            job.attempts = attempts;
            job.last_error = last_error.map(str::to_string);
            job.claimed_until = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, id: Uuid, lease: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.state()?;
        let Some(job) = state.job_mut(id).filter(|j| j.holds_lease(lease)) else {
            return Ok(false);
        };
        job.status = JobStatus::Completed;
        job.last_error = None;
        job.claimed_until = None;
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn fail(&self, id: Uuid, lease: Option<DateTime<Utc>>, error: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.finish(id, lease, JobStatus::Failed, error, now)
    }

    async fn skip(&self, id: Uuid, lease: Option<DateTime<Utc>>, reason: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.finish(id, lease, JobStatus::Skipped, reason, now)
    }

    async fn count_sent_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64, AppError> {
        let state = self.state()?;
        let count = state
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed && j.action_type == "send_message")
            .filter(|j| j.completed_at.is_some_and(|at| at >= start && at < end))
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_integration_settings(&self, slug: &str) -> Result<Option<StoredSettings>, AppError> {
        Ok(self.state()?.settings.get(slug).cloned())
    }

    async fn upsert_integration_settings(&self, slug: &str, settings: &Value) -> Result<StoredSettings, AppError> {
        let stored = StoredSettings { settings: settings.clone(), updated_at: Utc::now() };
        self.state()?.settings.insert(slug.to_string(), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn record_interaction(&self, interaction: NewInteraction) -> Result<(), AppError> {
        self.state()?.interactions.push(interaction);
        Ok(())
    }
}

// Atalhos para montar cenários nos testes
#[cfg(test)]
impl MemoryStore {
    pub fn put_lead(&self, lead: Lead) {
        self.state.lock().unwrap().leads.insert(lead.id, lead);
    }

    pub fn put_reminder(&self, reminder: Reminder) {
        self.state.lock().unwrap().reminders.insert(reminder.id, reminder);
    }

    pub fn put_custom_rule(&self, rule: FollowUpCustomRule) {
        self.state.lock().unwrap().custom_rules.push(rule);
    }

    pub fn jobs(&self) -> Vec<FlowJob> {
        self.state.lock().unwrap().jobs.clone()
    }

    pub fn interactions(&self) -> Vec<NewInteraction> {
        self.state.lock().unwrap().interactions.clone()
    }

    pub fn lookup(&self, kind: LookupKind, nome: &str) -> LookupValue {
        self.state
            .lock()
            .unwrap()
            .lookups
            .iter()
            .find(|l| l.kind == kind && l.nome == nome)
            .cloned()
            .unwrap()
    }
}
