// src/services/automation_config.rs
//
// Leitura da configuração de automação com cache explícito: expira após o TTL e é
// invalidado a cada gravação.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{
    common::error::AppError,
    db::SettingsStore,
    models::automation::{AUTO_CONTACT_INTEGRATION_SLUG, AutomationSettings},
};

struct CachedSettings {
    loaded_at: Instant,
    settings: Arc<AutomationSettings>,
}

#[derive(Clone)]
pub struct AutomationConfigService {
    store: Arc<dyn SettingsStore>,
    ttl: Duration,
    cache: Arc<Mutex<Option<CachedSettings>>>,
}

impl AutomationConfigService {
    pub fn new(store: Arc<dyn SettingsStore>, ttl: Duration) -> Self {
        Self { store, ttl, cache: Arc::new(Mutex::new(None)) }
    }

    fn cached(&self) -> Option<Arc<AutomationSettings>> {
        let guard = self.cache.lock().ok()?;
        guard
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| c.settings.clone())
    }

    /// Configuração normalizada. Sem linha gravada: automação desligada.
    pub async fn current(&self) -> Result<Arc<AutomationSettings>, AppError> {
        if let Some(settings) = self.cached() {
            return Ok(settings);
        }

        let raw = self.store.get_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG).await?;
        let settings = Arc::new(
            raw.map(|stored| AutomationSettings::from_value(&stored.settings))
                .unwrap_or_default(),
        );

        if let Ok(mut guard) = self.cache.lock() {
            *guard = Some(CachedSettings { loaded_at: Instant::now(), settings: settings.clone() });
        }
        Ok(settings)
    }

    pub async fn save(&self, document: &Value) -> Result<Arc<AutomationSettings>, AppError> {
        if !document.is_object() {
            return Err(AppError::Validation(vec![
                "A configuração de automação deve ser um objeto JSON".to_string(),
            ]));
        }

        self.store
            .upsert_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG, document)
            .await?;
        self.invalidate();
        tracing::info!("Configuração de automação atualizada");

        self.current().await
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn missing_document_means_disabled() {
        let service = AutomationConfigService::new(Arc::new(MemoryStore::seeded()), Duration::from_secs(60));
        assert!(!service.current().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let store = Arc::new(MemoryStore::seeded());
        let service = AutomationConfigService::new(store.clone(), Duration::from_secs(60));

        store
            .upsert_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG, &json!({ "enabled": true }))
            .await
            .unwrap();
        assert!(service.current().await.unwrap().enabled);

        // Gravação direta no store não passa pelo serviço: cache continua valendo
        store
            .upsert_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG, &json!({ "enabled": false }))
            .await
            .unwrap();
        assert!(service.current().await.unwrap().enabled);

        service.invalidate();
        assert!(!service.current().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn save_invalidates_and_rejects_non_objects() {
        let service = AutomationConfigService::new(Arc::new(MemoryStore::seeded()), Duration::from_secs(60));
        assert!(!service.current().await.unwrap().enabled);

        let saved = service.save(&json!({ "enabled": true })).await.unwrap();
        assert!(saved.enabled);
        assert!(matches!(service.save(&json!([1, 2])).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn zero_ttl_always_reloads() {
        let store = Arc::new(MemoryStore::seeded());
        let service = AutomationConfigService::new(store.clone(), Duration::ZERO);

        assert!(!service.current().await.unwrap().enabled);
        store
            .upsert_integration_settings(AUTO_CONTACT_INTEGRATION_SLUG, &json!({ "enabled": true }))
            .await
            .unwrap();
        assert!(service.current().await.unwrap().enabled);
    }
}
