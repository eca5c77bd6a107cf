// src/models/flow_job.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Mapeia o CREATE TYPE flow_job_status do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "flow_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

// Uma linha por (lead, fluxo, passo)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct FlowJob {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub flow_id: String,
    pub step_id: String,
    pub step_index: i32,
    pub action_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    // Lease do processador; vencido, o job pode ser reivindicado de novo
    pub claimed_until: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowJob {
    /// Vencido e livre: pendente ou com lease expirado.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Pending => true,
            JobStatus::Processing => self.claimed_until.is_none_or(|until| until < now),
            _ => false,
        }
    }

    /// Ainda em processamento com o lease recebido no claim.
    pub fn holds_lease(&self, lease: Option<DateTime<Utc>>) -> bool {
        self.status == JobStatus::Processing && self.claimed_until == lease
    }
}

#[derive(Debug, Clone)]
pub struct NewFlowJob {
    pub lead_id: Uuid,
    pub flow_id: String,
    pub step_id: String,
    pub step_index: i32,
    pub action_type: String,
    pub scheduled_at: DateTime<Utc>,
}

// Resultado de uma rodada do processador
#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct ProcessSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub retried: usize,
    // Já reivindicados por outra execução
    pub contended: usize,
}
