// src/db/flow_job_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::FlowJobStore,
    models::flow_job::{FlowJob, JobStatus, NewFlowJob},
};

const JOB_COLUMNS: &str = r#"
    id, lead_id, flow_id, step_id, step_index, action_type, scheduled_at,
    status, attempts, last_error, claimed_until, completed_at, created_at, updated_at
"#;

// Fila de jobs do fluxo automático ('auto_contact_flow_jobs')
#[derive(Clone)]
pub struct FlowJobRepository {
    pool: PgPool,
}

impl FlowJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Estado final com motivo; exige o mesmo lease do claim
    async fn finish(
        &self,
        id: Uuid,
        lease: Option<DateTime<Utc>>,
        status: JobStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE auto_contact_flow_jobs
            SET status = $3, last_error = $4, claimed_until = NULL, updated_at = $5
            WHERE id = $1
              AND status = 'processing'
              AND claimed_until IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(lease)
        .bind(status)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl FlowJobStore for FlowJobRepository {
    async fn insert_jobs(&self, jobs: Vec<NewFlowJob>) -> Result<Vec<FlowJob>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(jobs.len());

        for job in jobs {
            let row = sqlx::query_as::<_, FlowJob>(&format!(
                r#"
                INSERT INTO auto_contact_flow_jobs (
                    lead_id, flow_id, step_id, step_index, action_type, scheduled_at, status, attempts
                )
                VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0)
                RETURNING {}
                "#,
                JOB_COLUMNS
            ))
            .bind(job.lead_id)
            .bind(&job.flow_id)
            .bind(&job.step_id)
            .bind(job.step_index)
            .bind(&job.action_type)
            .bind(job.scheduled_at)
            .fetch_one(&mut *tx)
            .await?;

            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<FlowJob>, AppError> {
        let job = sqlx::query_as::<_, FlowJob>(&format!(
            "SELECT {} FROM auto_contact_flow_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn list_jobs_for_lead(&self, lead_id: Uuid) -> Result<Vec<FlowJob>, AppError> {
        let jobs = sqlx::query_as::<_, FlowJob>(&format!(
            "SELECT {} FROM auto_contact_flow_jobs WHERE lead_id = $1 ORDER BY scheduled_at ASC",
            JOB_COLUMNS
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn delete_pending(&self, lead_id: Uuid, flow_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM auto_contact_flow_jobs WHERE lead_id = $1 AND flow_id = $2 AND status = 'pending'",
        )
        .bind(lead_id)
        .bind(flow_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn skip_pending(
        &self,
        lead_id: Uuid,
        flow_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE auto_contact_flow_jobs
            SET status = 'skipped', last_error = $3, updated_at = $4
            WHERE lead_id = $1
              AND status = 'pending'
              AND ($2::text IS NULL OR flow_id = $2)
            "#,
        )
        .bind(lead_id)
        .bind(flow_id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FlowJob>, AppError> {
        let jobs = sqlx::query_as::<_, FlowJob>(&format!(
            r#"
            SELECT {}
            FROM auto_contact_flow_jobs
            WHERE scheduled_at <= $1
              AND (
                status = 'pending'
                OR (status = 'processing' AND (claimed_until IS NULL OR claimed_until < $1))
              )
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#,
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<FlowJob>, AppError> {
        // UPDATE condicional de uma linha: só um processador vence
        let job = sqlx::query_as::<_, FlowJob>(&format!(
            r#"
            UPDATE auto_contact_flow_jobs
            SET status = 'processing',
                attempts = attempts + 1,
                claimed_until = $3,
                updated_at = $2
            WHERE id = $1
              AND (
                status = 'pending'
                OR (status = 'processing' AND (claimed_until IS NULL OR claimed_until < $2))
              )
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .bind(lease_until)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        attempts: i32,
        last_error: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE auto_contact_flow_jobs
            SET status = $2, scheduled_at = $3, attempts = $4, last_error = $5,
                claimed_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(JobStatus::Pending)
        .bind(scheduled_at)
        .bind(attempts)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, lease: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE auto_contact_flow_jobs
            SET status = 'completed', last_error = NULL, claimed_until = NULL,
                completed_at = $3, updated_at = $3
            WHERE id = $1
              AND status = 'processing'
              AND claimed_until IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(lease)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, id: Uuid, lease: Option<DateTime<Utc>>, error: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.finish(id, lease, JobStatus::Failed, error, now).await
    }

    async fn skip(&self, id: Uuid, lease: Option<DateTime<Utc>>, reason: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.finish(id, lease, JobStatus::Skipped, reason, now).await
    }

    async fn count_sent_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM auto_contact_flow_jobs
            WHERE status = 'completed'
              AND action_type = 'send_message'
              AND completed_at >= $1
              AND completed_at < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
