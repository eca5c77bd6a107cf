// src/db/store.rs
//
// Contratos de persistência usados pelos serviços. Implementados pelos repositórios
// Postgres e pelo `MemoryStore`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        FlowJobRepository, InteractionRepository, LeadRepository, MemoryStore,
        ReminderRepository, SettingsRepository,
    },
    models::{
        flow_job::{FlowJob, NewFlowJob},
        lead::{Lead, LeadFilters, LeadUpdate, LookupKind, LookupValue, NewInteraction, NewLead},
        reminder::{FollowUpCustomRule, NewReminder, Reminder},
    },
};

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError>;
    async fn list_leads(&self, filters: &LeadFilters) -> Result<Vec<Lead>, AppError>;
    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, AppError>;
    async fn update_lead(&self, id: Uuid, update: LeadUpdate) -> Result<Option<Lead>, AppError>;
    async fn archive_lead(&self, id: Uuid) -> Result<(), AppError>;
    async fn delete_lead(&self, id: Uuid) -> Result<(), AppError>;
    async fn touch_last_contact(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    /// Busca sem diferenciar caixa/acentos.
    async fn resolve_lookup(&self, kind: LookupKind, name: &str) -> Result<Option<LookupValue>, AppError>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn get_reminder(&self, id: Uuid) -> Result<Option<Reminder>, AppError>;
    async fn list_reminders(&self, lead_id: Option<Uuid>) -> Result<Vec<Reminder>, AppError>;
    /// Follow-ups automáticos não lidos do lead, por data crescente.
    async fn pending_follow_ups(&self, lead_id: Uuid) -> Result<Vec<Reminder>, AppError>;
    async fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder, AppError>;
    async fn update_due_date(&self, id: Uuid, due: DateTime<Utc>) -> Result<(), AppError>;
    async fn mark_read(&self, id: Uuid) -> Result<(), AppError>;
    async fn snooze(&self, id: Uuid, due: DateTime<Utc>) -> Result<Option<Reminder>, AppError>;
    async fn active_custom_rules(&self, lead_id: Uuid, status: &str) -> Result<Vec<FollowUpCustomRule>, AppError>;
}

#[async_trait]
pub trait FlowJobStore: Send + Sync {
    async fn insert_jobs(&self, jobs: Vec<NewFlowJob>) -> Result<Vec<FlowJob>, AppError>;
    async fn get_job(&self, id: Uuid) -> Result<Option<FlowJob>, AppError>;
    async fn list_jobs_for_lead(&self, lead_id: Uuid) -> Result<Vec<FlowJob>, AppError>;
    /// Apaga a geração pendente de (lead, fluxo).
    async fn delete_pending(&self, lead_id: Uuid, flow_id: &str) -> Result<u64, AppError>;
    /// Pendentes do lead -> skipped. `flow_id = None` cancela todos os fluxos.
    async fn skip_pending(
        &self,
        lead_id: Uuid,
        flow_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;
    /// Pendentes vencidos + processing com lease expirado, mais antigos primeiro.
    async fn fetch_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FlowJob>, AppError>;
    /// Compare-and-swap pending -> processing. `None` se outro processador levou.
    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<FlowJob>, AppError>;
    /// Volta para pending com novo horário e contagem de tentativas.
    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        attempts: i32,
        last_error: Option<&str>,
    ) -> Result<(), AppError>;
    /// Finalizações só valem para quem ainda detém o lease (`lease` = `claimed_until`
    /// devolvido pelo claim). Devolvem `false` quando o lease foi perdido.
    async fn complete(&self, id: Uuid, lease: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<bool, AppError>;
    async fn fail(&self, id: Uuid, lease: Option<DateTime<Utc>>, error: &str, now: DateTime<Utc>) -> Result<bool, AppError>;
    async fn skip(&self, id: Uuid, lease: Option<DateTime<Utc>>, reason: &str, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// Envios concluídos no intervalo (limite diário).
    async fn count_sent_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64, AppError>;
}

#[derive(Debug, Clone)]
pub struct StoredSettings {
    pub settings: Value,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_integration_settings(&self, slug: &str) -> Result<Option<StoredSettings>, AppError>;
    async fn upsert_integration_settings(&self, slug: &str, settings: &Value) -> Result<StoredSettings, AppError>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record_interaction(&self, interaction: NewInteraction) -> Result<(), AppError>;
}

// Pacote de stores injetado no AppState e nos serviços
#[derive(Clone)]
pub struct Stores {
    pub leads: Arc<dyn LeadStore>,
    pub reminders: Arc<dyn ReminderStore>,
    pub jobs: Arc<dyn FlowJobStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub interactions: Arc<dyn InteractionStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            leads: Arc::new(LeadRepository::new(pool.clone())),
            reminders: Arc::new(ReminderRepository::new(pool.clone())),
            jobs: Arc::new(FlowJobRepository::new(pool.clone())),
            settings: Arc::new(SettingsRepository::new(pool.clone())),
            interactions: Arc::new(InteractionRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            leads: store.clone(),
            reminders: store.clone(),
            jobs: store.clone(),
            settings: store.clone(),
            interactions: store,
        }
    }
}
