// src/db/settings_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    db::store::{SettingsStore, StoredSettings},
};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    settings: Value,
    updated_at: DateTime<Utc>,
}

impl From<SettingsRow> for StoredSettings {
    fn from(row: SettingsRow) -> Self {
        StoredSettings { settings: row.settings, updated_at: row.updated_at }
    }
}

#[async_trait]
impl SettingsStore for SettingsRepository {
    async fn get_integration_settings(&self, slug: &str) -> Result<Option<StoredSettings>, AppError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT settings, updated_at FROM integration_settings WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredSettings::from))
    }

    async fn upsert_integration_settings(&self, slug: &str, settings: &Value) -> Result<StoredSettings, AppError> {
        // UPSERT (Insert or Update)
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            INSERT INTO integration_settings (slug, settings)
            VALUES ($1, $2)
            ON CONFLICT (slug)
            DO UPDATE SET
                settings = EXCLUDED.settings,
                updated_at = NOW()
            RETURNING settings, updated_at
            "#,
        )
        .bind(slug)
        .bind(settings)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
