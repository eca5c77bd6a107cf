// src/db/interaction_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{common::error::AppError, db::store::InteractionStore, models::lead::NewInteraction};

#[derive(Clone)]
pub struct InteractionRepository {
    pool: PgPool,
}

impl InteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for InteractionRepository {
    async fn record_interaction(&self, interaction: NewInteraction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO interactions (lead_id, tipo, descricao, responsavel, data_interacao)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(interaction.lead_id)
        .bind(&interaction.tipo)
        .bind(&interaction.descricao)
        .bind(&interaction.responsavel)
        .bind(interaction.data_interacao)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
