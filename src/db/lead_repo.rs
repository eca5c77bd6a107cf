// src/db/lead_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text::normalize_text},
    db::store::LeadStore,
    models::lead::{Lead, LeadFilters, LeadUpdate, LookupKind, LookupValue, NewLead},
};

const LEAD_COLUMNS: &str = r#"
    id, nome_completo, telefone, email, cidade, regiao,
    origem, origem_id, tipo_contratacao, tipo_contratacao_id, status, status_id,
    operadora_atual, responsavel, observacoes, tags,
    data_criacao, ultimo_contato, proximo_retorno, arquivado, created_at
"#;

// O repositório de leads, responsável pelas tabelas 'leads' e 'lead_lookups'
#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for LeadRepository {
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn list_leads(&self, filters: &LeadFilters) -> Result<Vec<Lead>, AppError> {
        // Filtros opcionais: NULL desliga a cláusula
        let sql = format!(
            r#"
            SELECT {}
            FROM leads
            WHERE arquivado = FALSE
              AND ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR responsavel = $2)
              AND ($3::text IS NULL OR telefone = $3)
              AND ($4::text IS NULL OR email ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5
            "#,
            LEAD_COLUMNS
        );

        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(filters.status.as_deref())
            .bind(filters.responsavel.as_deref())
            .bind(filters.telefone.as_deref())
            .bind(filters.email.as_deref())
            .bind(filters.limit.unwrap_or(100))
            .fetch_all(&self.pool)
            .await?;

        Ok(leads)
    }

    async fn insert_lead(&self, lead: NewLead) -> Result<Lead, AppError> {
        let sql = format!(
            r#"
            INSERT INTO leads (
                nome_completo, telefone, email, cidade, regiao,
                origem, origem_id, tipo_contratacao, tipo_contratacao_id, status, status_id,
                operadora_atual, responsavel, observacoes, proximo_retorno, tags,
                data_criacao, ultimo_contato, arquivado
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, FALSE)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let created = sqlx::query_as::<_, Lead>(&sql)
            .bind(&lead.nome_completo)
            .bind(&lead.telefone)
            .bind(&lead.email)
            .bind(&lead.cidade)
            .bind(&lead.regiao)
            .bind(&lead.origem.nome)
            .bind(lead.origem.id)
            .bind(&lead.tipo_contratacao.nome)
            .bind(lead.tipo_contratacao.id)
            .bind(&lead.status.nome)
            .bind(lead.status.id)
            .bind(&lead.operadora_atual)
            .bind(&lead.responsavel)
            .bind(&lead.observacoes)
            .bind(lead.proximo_retorno)
            .bind(&lead.tags)
            .bind(lead.data_criacao)
            .bind(lead.ultimo_contato)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn update_lead(&self, id: Uuid, update: LeadUpdate) -> Result<Option<Lead>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lê com lock, aplica a atualização parcial em memória e grava a linha inteira
        let current = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM leads WHERE id = $1 FOR UPDATE",
            LEAD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut lead) = current else {
            return Ok(None);
        };
        update.apply_to(&mut lead);

        let sql = format!(
            r#"
            UPDATE leads SET
                nome_completo = $2, telefone = $3, email = $4, cidade = $5, regiao = $6,
                origem = $7, origem_id = $8, tipo_contratacao = $9, tipo_contratacao_id = $10,
                status = $11, status_id = $12, operadora_atual = $13, responsavel = $14,
                observacoes = $15, proximo_retorno = $16
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let updated = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(&lead.nome_completo)
            .bind(&lead.telefone)
            .bind(&lead.email)
            .bind(&lead.cidade)
            .bind(&lead.regiao)
            .bind(&lead.origem)
            .bind(lead.origem_id)
            .bind(&lead.tipo_contratacao)
            .bind(lead.tipo_contratacao_id)
            .bind(&lead.status)
            .bind(lead.status_id)
            .bind(&lead.operadora_atual)
            .bind(&lead.responsavel)
            .bind(&lead.observacoes)
            .bind(lead.proximo_retorno)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(updated))
    }

    async fn archive_lead(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET arquivado = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_lead(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_last_contact(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET ultimo_contato = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_lookup(&self, kind: LookupKind, name: &str) -> Result<Option<LookupValue>, AppError> {
        // Poucas linhas por tipo: a comparação sem acento é feita no Rust
        let candidates = sqlx::query_as::<_, LookupValue>(
            "SELECT id, kind, nome FROM lead_lookups WHERE kind = $1 AND ativo = TRUE",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        let wanted = normalize_text(name);
        Ok(candidates.into_iter().find(|c| normalize_text(&c.nome) == wanted))
    }
}
