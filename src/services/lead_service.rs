// src/services/lead_service.rs
//
// Cadastro de leads pela API externa: validação, normalização e resolução das
// tabelas de apoio. Toda escrita bem-sucedida alimenta a automação.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        text::{normalize_phone, normalize_text, parse_instant},
    },
    db::LeadStore,
    models::lead::{Lead, LeadFilters, LeadPatch, LeadPayload, LeadUpdate, LookupKind, LookupValue, NewLead},
    services::{auto_contact::AutoContactService, follow_up_rules::FollowUpRuleService},
};

pub const VALID_ORIGINS: [&str; 5] = ["tráfego pago", "Telein", "indicação", "orgânico", "Ully"];
const ORIGIN_ALIASES: [(&str, &str); 2] = [("ully", "Ully"), ("painel do corretor", "Ully")];
const DEFAULT_STATUS: &str = "Novo";

/// Nome canônico da origem, aceitando variações de caixa/acento e apelidos.
pub fn canonical_origin(origem: &str) -> Option<&'static str> {
    let wanted = normalize_text(origem);
    VALID_ORIGINS
        .iter()
        .copied()
        .find(|o| normalize_text(o) == wanted)
        .or_else(|| {
            ORIGIN_ALIASES
                .iter()
                .find(|(alias, _)| normalize_text(alias) == wanted)
                .map(|(_, canonical)| *canonical)
        })
}

fn origin_error() -> String {
    let aliases: Vec<&str> = ORIGIN_ALIASES.iter().map(|(alias, _)| *alias).collect();
    format!(
        "Campo \"origem\" deve ser um dos valores: {} (variações aceitas: {})",
        VALID_ORIGINS.join(", "),
        aliases.join(", ")
    )
}

fn required(errors: &mut Vec<String>, field: &str, value: &Option<String>) {
    if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
        errors.push(format!("Campo \"{}\" é obrigatório e deve ser uma string", field));
    }
}

// x@y.z sem espaços
fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    let valid_part = |s: &str| !s.is_empty() && !s.contains(char::is_whitespace) && !s.contains('@');
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    valid_part(local) && valid_part(host) && valid_part(tld)
}

// Campos de texto livre: espaços aparados, vazio vira NULL
fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSuccess {
    pub index: usize,
    pub data: Lead,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchFailure {
    pub index: usize,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BatchResults {
    pub success: Vec<BatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Clone)]
pub struct LeadService {
    leads: Arc<dyn LeadStore>,
    auto_contact: AutoContactService,
    follow_ups: FollowUpRuleService,
}

impl LeadService {
    pub fn new(leads: Arc<dyn LeadStore>, auto_contact: AutoContactService, follow_ups: FollowUpRuleService) -> Self {
        Self { leads, auto_contact, follow_ups }
    }

    async fn lookup(&self, kind: LookupKind, name: &str) -> Result<LookupValue, AppError> {
        let label = match kind {
            LookupKind::Status => "Status",
            LookupKind::Origem => "Origem",
            LookupKind::TipoContratacao => "Tipo de contratação",
        };
        self.leads
            .resolve_lookup(kind, name)
            .await?
            .ok_or_else(|| AppError::LookupNotFound(format!("{} \"{}\" não encontrado", label, name)))
    }

    // =========================================================================
    //  CRIAÇÃO
    // =========================================================================

    async fn prepare_new_lead(&self, payload: &LeadPayload, now: DateTime<Utc>) -> Result<NewLead, AppError> {
        let mut errors = Vec::new();
        required(&mut errors, "nome_completo", &payload.nome_completo);
        required(&mut errors, "telefone", &payload.telefone);
        required(&mut errors, "origem", &payload.origem);
        required(&mut errors, "tipo_contratacao", &payload.tipo_contratacao);
        required(&mut errors, "responsavel", &payload.responsavel);

        let origem = payload.origem.as_deref().filter(|o| !o.trim().is_empty());
        let canonical = origem.and_then(canonical_origin);
        if origem.is_some() && canonical.is_none() {
            errors.push(origin_error());
        }

        let email = trimmed(payload.email.as_deref());
        if email.as_deref().is_some_and(|e| !looks_like_email(e)) {
            errors.push("Campo \"email\" deve ser um endereço de e-mail válido".to_string());
        }

        let data_criacao = match payload.data_criacao.as_deref() {
            Some(raw) => {
                let parsed = parse_instant(raw);
                if parsed.is_none() {
                    errors.push("Campo \"data_criacao\" deve ser uma data válida (ISO 8601 ou YYYY-MM-DD)".to_string());
                }
                parsed
            }
            None => None,
        };

        let proximo_retorno = match trimmed(payload.proximo_retorno.as_deref()) {
            Some(raw) => {
                let parsed = parse_instant(&raw);
                if parsed.is_none() {
                    errors.push("Campo \"proximo_retorno\" deve ser uma data válida".to_string());
                }
                parsed
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let origem = self.lookup(LookupKind::Origem, canonical.unwrap_or_default()).await?;
        let tipo = self
            .lookup(LookupKind::TipoContratacao, payload.tipo_contratacao.as_deref().unwrap_or_default().trim())
            .await?;
        let status_name = trimmed(payload.status.as_deref()).unwrap_or_else(|| DEFAULT_STATUS.to_string());
        let status = self.lookup(LookupKind::Status, &status_name).await?;

        // Data de criação retroativa também vale como último contato
        let created = data_criacao.unwrap_or(now);

        Ok(NewLead {
            nome_completo: payload.nome_completo.as_deref().unwrap_or_default().trim().to_string(),
            telefone: normalize_phone(payload.telefone.as_deref().unwrap_or_default()),
            email,
            cidade: trimmed(payload.cidade.as_deref()),
            regiao: trimmed(payload.regiao.as_deref()),
            origem,
            tipo_contratacao: tipo,
            status,
            operadora_atual: trimmed(payload.operadora_atual.as_deref()),
            responsavel: payload.responsavel.as_deref().unwrap_or_default().trim().to_string(),
            observacoes: trimmed(payload.observacoes.as_deref()),
            proximo_retorno,
            tags: payload.tags.clone(),
            data_criacao: created,
            ultimo_contato: created,
        })
    }

    pub async fn create(&self, payload: &LeadPayload, now: DateTime<Utc>) -> Result<Lead, AppError> {
        let new_lead = self.prepare_new_lead(payload, now).await?;
        let lead = self.leads.insert_lead(new_lead).await?;
        tracing::info!(lead_id = %lead.id, origem = %lead.origem, "Lead criado");

        self.after_write(&lead, None, now).await;
        Ok(lead)
    }

    /// Cada item é validado e inserido isoladamente; falhas não interrompem o lote.
    pub async fn create_batch(&self, items: &[Value], now: DateTime<Utc>) -> BatchResults {
        let mut results = BatchResults::default();

        for (index, item) in items.iter().enumerate() {
            let payload: LeadPayload = match serde_json::from_value(item.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    results.failed.push(BatchFailure {
                        index,
                        data: item.clone(),
                        errors: Some(vec![format!("Formato inválido: {}", e)]),
                        error: None,
                    });
                    continue;
                }
            };

            match self.create(&payload, now).await {
                Ok(lead) => results.success.push(BatchSuccess { index, data: lead }),
                Err(AppError::Validation(errors)) => results.failed.push(BatchFailure {
                    index,
                    data: item.clone(),
                    errors: Some(errors),
                    error: None,
                }),
                Err(e) => results.failed.push(BatchFailure {
                    index,
                    data: item.clone(),
                    errors: None,
                    error: Some(e.to_string()),
                }),
            }
        }

        tracing::info!(
            total = items.len(),
            success = results.success.len(),
            failed = results.failed.len(),
            "Lote de leads processado"
        );
        results
    }

    // =========================================================================
    //  LEITURA E ATUALIZAÇÃO
    // =========================================================================

    pub async fn list(&self, mut filters: LeadFilters) -> Result<Vec<Lead>, AppError> {
        filters.telefone = filters.telefone.as_deref().map(normalize_phone);
        filters.limit = Some(filters.limit.unwrap_or(100));
        self.leads.list_leads(&filters).await
    }

    async fn prepare_update(&self, patch: &LeadPatch) -> Result<LeadUpdate, AppError> {
        let mut errors = Vec::new();

        let origem = match trimmed(patch.origem.as_deref()) {
            Some(raw) => match canonical_origin(&raw) {
                Some(canonical) => Some(canonical),
                None => {
                    errors.push(origin_error());
                    None
                }
            },
            None => None,
        };

        let email = patch.email.as_ref().map(|e| trimmed(e.as_deref()));
        if let Some(Some(e)) = &email {
            if !looks_like_email(e) {
                errors.push("Campo \"email\" deve ser um endereço de e-mail válido".to_string());
            }
        }

        let proximo_retorno = match &patch.proximo_retorno {
            Some(raw) => match trimmed(raw.as_deref()) {
                Some(value) => match parse_instant(&value) {
                    Some(parsed) => Some(Some(parsed)),
                    None => {
                        errors.push("Campo \"proximo_retorno\" deve ser uma data válida".to_string());
                        None
                    }
                },
                None => Some(None),
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let mut update = LeadUpdate {
            nome_completo: trimmed(patch.nome_completo.as_deref()),
            telefone: trimmed(patch.telefone.as_deref()).map(|t| normalize_phone(&t)),
            email,
            cidade: patch.cidade.as_ref().map(|v| trimmed(v.as_deref())),
            regiao: patch.regiao.as_ref().map(|v| trimmed(v.as_deref())),
            operadora_atual: patch.operadora_atual.as_ref().map(|v| trimmed(v.as_deref())),
            responsavel: trimmed(patch.responsavel.as_deref()),
            proximo_retorno,
            observacoes: patch.observacoes.as_ref().map(|v| trimmed(v.as_deref())),
            ..Default::default()
        };

        if let Some(origem) = origem {
            update.origem = Some(self.lookup(LookupKind::Origem, origem).await?);
        }
        if let Some(tipo) = trimmed(patch.tipo_contratacao.as_deref()) {
            update.tipo_contratacao = Some(self.lookup(LookupKind::TipoContratacao, &tipo).await?);
        }
        if let Some(status) = trimmed(patch.status.as_deref()) {
            update.status = Some(self.lookup(LookupKind::Status, &status).await?);
        }

        Ok(update)
    }

    pub async fn update(&self, id: Uuid, patch: &LeadPatch, now: DateTime<Utc>) -> Result<Lead, AppError> {
        let not_found = || AppError::NotFound("Lead não encontrado".to_string());

        let previous = self.leads.get_lead(id).await?.ok_or_else(not_found)?;
        let update = self.prepare_update(patch).await?;
        let lead = self.leads.update_lead(id, update).await?.ok_or_else(not_found)?;
        tracing::info!(lead_id = %lead.id, "Lead atualizado");

        self.after_write(&lead, Some(&previous), now).await;
        Ok(lead)
    }

    // Automação nunca derruba o CRUD: erros só vão para o log
    async fn after_write(&self, lead: &Lead, previous: Option<&Lead>, now: DateTime<Utc>) {
        match self.auto_contact.handle_lead_event(lead, previous, now).await {
            Ok(outcome) => tracing::debug!(lead_id = %lead.id, action = ?outcome.action, "Automação avaliada"),
            Err(e) => tracing::error!(lead_id = %lead.id, error = %e, "Falha ao avaliar automação do lead"),
        }

        let status_changed = previous.is_some_and(|old| normalize_text(&old.status) != normalize_text(&lead.status));
        if status_changed {
            if let Err(e) = self.follow_ups.on_status_change(lead, now).await {
                tracing::error!(lead_id = %lead.id, error = %e, "Falha ao criar lembretes de status");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{FlowJobStore, MemoryStore, ReminderStore, SettingsStore},
        models::automation::AUTO_CONTACT_INTEGRATION_SLUG,
        services::{automation_config::AutomationConfigService, flow_scheduler::FlowScheduler},
    };
    use chrono_tz::America::Sao_Paulo;
    use serde_json::json;
    use std::time::Duration;

    fn service(store: &Arc<MemoryStore>) -> LeadService {
        let config = AutomationConfigService::new(store.clone(), Duration::from_secs(60));
        let auto_contact = AutoContactService::new(config, FlowScheduler::new(store.clone(), Sao_Paulo));
        let follow_ups = FollowUpRuleService::new(store.clone(), store.clone(), Sao_Paulo);
        LeadService::new(store.clone(), auto_contact, follow_ups)
    }

    fn payload() -> LeadPayload {
        serde_json::from_value(json!({
            "nome_completo": "  Maria Souza ",
            "telefone": "(11) 98888-7777",
            "email": "maria@exemplo.com.br",
            "origem": "Painel do Corretor",
            "tipo_contratacao": "pessoa fisica",
            "responsavel": "Nick"
        }))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-15T10:00:00-03:00").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn origin_aliases_are_canonicalized() {
        assert_eq!(canonical_origin("TRAFEGO PAGO"), Some("tráfego pago"));
        assert_eq!(canonical_origin("painel do corretor"), Some("Ully"));
        assert_eq!(canonical_origin("organico"), Some("orgânico"));
        assert_eq!(canonical_origin("Instagram"), None);
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.c"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("a b@c.d"));
        assert!(!looks_like_email("@c.d"));
    }

    #[tokio::test]
    async fn create_normalizes_and_resolves_lookups() {
        let store = Arc::new(MemoryStore::seeded());
        let lead = service(&store).create(&payload(), now()).await.unwrap();

        assert_eq!(lead.nome_completo, "Maria Souza");
        assert_eq!(lead.telefone, "11988887777");
        assert_eq!(lead.origem, "Ully");
        assert_eq!(lead.tipo_contratacao, "Pessoa Física");
        assert_eq!(lead.status, "Novo");
        assert_eq!(lead.status_id, Some(store.lookup(LookupKind::Status, "Novo").id));
        assert_eq!(lead.data_criacao, now());
    }

    #[tokio::test]
    async fn retroactive_creation_date_is_also_last_contact() {
        let store = Arc::new(MemoryStore::seeded());
        let mut p = payload();
        p.data_criacao = Some("2024-01-02".into());
        let lead = service(&store).create(&p, now()).await.unwrap();

        let expected = parse_instant("2024-01-02T00:00:00-03:00").unwrap();
        assert_eq!(lead.data_criacao, expected);
        assert_eq!(lead.ultimo_contato, expected);
    }

    #[tokio::test]
    async fn validation_collects_every_problem() {
        let store = Arc::new(MemoryStore::seeded());
        let p = LeadPayload {
            origem: Some("Instagram".into()),
            email: Some("sem-arroba".into()),
            ..Default::default()
        };

        let Err(AppError::Validation(errors)) = service(&store).create(&p, now()).await else {
            panic!("esperava erro de validação");
        };
        assert_eq!(errors.len(), 6);
        assert!(errors.iter().any(|e| e.contains("variações aceitas: ully, painel do corretor")));
    }

    #[tokio::test]
    async fn unknown_status_is_a_lookup_error() {
        let store = Arc::new(MemoryStore::seeded());
        let mut p = payload();
        p.status = Some("Congelado".into());
        let result = service(&store).create(&p, now()).await;
        assert!(matches!(result, Err(AppError::LookupNotFound(_))));
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let store = Arc::new(MemoryStore::seeded());
        let items = vec![
            serde_json::to_value(payload()).unwrap(),
            json!({ "nome_completo": "Sem telefone" }),
            json!({ "nome_completo": 42 }),
        ];

        let results = service(&store).create_batch(&items, now()).await;
        assert_eq!(results.success.len(), 1);
        assert_eq!(results.failed.len(), 2);
        assert_eq!(results.failed[0].index, 1);
        assert!(results.failed[0].errors.as_ref().is_some_and(|e| e.len() == 4));
    }

    #[tokio::test]
    async fn update_status_triggers_automation_and_follow_up_rules() {
        let store = Arc::new(MemoryStore::seeded());
        store
            .upsert_integration_settings(
                AUTO_CONTACT_INTEGRATION_SLUG,
                &json!({
                    "enabled": true,
                    "flows": [{ "id": "contato", "triggerStatus": "Contato realizado",
                                "steps": [{ "delayHours": 2, "customMessage": "Oi {{primeiro_nome}}" }] }]
                }),
            )
            .await
            .unwrap();

        let service = service(&store);
        let lead = service.create(&payload(), now()).await.unwrap();
        assert!(store.list_jobs_for_lead(lead.id).await.unwrap().is_empty());

        let patch = LeadPatch { status: Some("contato realizado".into()), ..Default::default() };
        let updated = service.update(lead.id, &patch, now()).await.unwrap();

        assert_eq!(updated.status, "Contato realizado");
        assert_eq!(store.list_jobs_for_lead(lead.id).await.unwrap().len(), 1);
        let reminders = store.list_reminders(Some(lead.id)).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].tipo, "Follow-up");
    }

    #[tokio::test]
    async fn update_clears_nullable_fields_and_404s() {
        let store = Arc::new(MemoryStore::seeded());
        let service = service(&store);
        let lead = service.create(&payload(), now()).await.unwrap();

        let patch: LeadPatch = serde_json::from_value(json!({ "email": null, "cidade": " Campinas " })).unwrap();
        let updated = service.update(lead.id, &patch, now()).await.unwrap();
        assert_eq!(updated.email, None);
        assert_eq!(updated.cidade.as_deref(), Some("Campinas"));

        let missing = service.update(Uuid::new_v4(), &LeadPatch::default(), now()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_normalized_phone() {
        let store = Arc::new(MemoryStore::seeded());
        let service = service(&store);
        service.create(&payload(), now()).await.unwrap();

        let filters = LeadFilters { telefone: Some("(11) 98888-7777".into()), ..Default::default() };
        assert_eq!(service.list(filters).await.unwrap().len(), 1);
    }
}
