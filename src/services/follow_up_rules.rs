// src/services/follow_up_rules.rs
//
// Lembretes criados automaticamente na mudança de status do lead e follow-ups
// adicionais pedidos pelo corretor.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    common::{error::AppError, text::normalize_text},
    db::{LeadStore, ReminderStore},
    models::{
        lead::{Lead, LeadUpdate},
        reminder::{FOLLOW_UP, FOLLOW_UP_ADDITIONAL, FOLLOW_UP_CUSTOM, NewReminder, Reminder, ReminderPriority},
    },
    services::business_days::local_to_utc,
};

struct StatusReminderRule {
    hours_from_now: i64,
    title: &'static str,
    description: &'static str,
    tipo: &'static str,
    priority: ReminderPriority,
}

// Chave: status normalizado (sem acento, minúsculo)
fn default_rule(status: &str) -> Option<StatusReminderRule> {
    match normalize_text(status).as_str() {
        "contato realizado" => Some(StatusReminderRule {
            hours_from_now: 24,
            title: "Revisar contato e planejar próximo passo",
            description: "Confirme interesse e avance para proposta ou requalificação.",
            tipo: FOLLOW_UP,
            priority: ReminderPriority::Alta,
        }),
        "proposta em analise" => Some(StatusReminderRule {
            hours_from_now: 48,
            title: "Acompanhar proposta em análise",
            description: "Verifique dúvidas pendentes e reforce benefícios do plano.",
            tipo: "Retorno",
            priority: ReminderPriority::Normal,
        }),
        _ => None,
    }
}

const FOLLOW_UP_HOUR: u32 = 9;

#[derive(Clone)]
pub struct FollowUpRuleService {
    leads: Arc<dyn LeadStore>,
    reminders: Arc<dyn ReminderStore>,
    tz: Tz,
}

impl FollowUpRuleService {
    pub fn new(leads: Arc<dyn LeadStore>, reminders: Arc<dyn ReminderStore>, tz: Tz) -> Self {
        Self { leads, reminders, tz }
    }

    // Dia local `now + days`, às 09:00
    fn at_follow_up_hour(&self, now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        let date = (now.with_timezone(&self.tz) + Duration::days(days)).date_naive();
        let nine = NaiveTime::from_hms_opt(FOLLOW_UP_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
        local_to_utc(self.tz, date.and_time(nine))
    }

    /// Regras personalizadas ativas substituem a tabela padrão para o status.
    pub async fn on_status_change(&self, lead: &Lead, now: DateTime<Utc>) -> Result<Vec<Reminder>, AppError> {
        let custom = self.reminders.active_custom_rules(lead.id, &lead.status).await?;

        let new_reminders: Vec<NewReminder> = if !custom.is_empty() {
            custom
                .iter()
                .map(|rule| NewReminder {
                    lead_id: Some(lead.id),
                    contract_id: None,
                    tipo: FOLLOW_UP_CUSTOM.to_string(),
                    titulo: format!("{} - {}", rule.title, lead.nome_completo),
                    descricao: rule.description.clone(),
                    data_lembrete: self.at_follow_up_hour(now, i64::from(rule.days_after)),
                    prioridade: rule.priority,
                })
                .collect()
        } else if let Some(rule) = default_rule(&lead.status) {
            // Minutos zerados na hora local, como no cadastro manual
            let local = (now + Duration::hours(rule.hours_from_now)).with_timezone(&self.tz).naive_local();
            let hour = NaiveTime::from_hms_opt(local.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
            let due = local_to_utc(self.tz, local.date().and_time(hour));
            vec![NewReminder {
                lead_id: Some(lead.id),
                contract_id: None,
                tipo: rule.tipo.to_string(),
                titulo: format!("{} - {}", rule.title, lead.nome_completo),
                descricao: Some(rule.description.to_string()),
                data_lembrete: due,
                prioridade: rule.priority,
            }]
        } else {
            return Ok(Vec::new());
        };

        let mut created = Vec::with_capacity(new_reminders.len());
        for reminder in new_reminders {
            created.push(self.reminders.insert_reminder(reminder).await?);
        }

        if let Some(earliest) = created.iter().map(|r| r.data_lembrete).min() {
            let update = LeadUpdate { proximo_retorno: Some(Some(earliest)), ..Default::default() };
            self.leads.update_lead(lead.id, update).await?;
        }

        tracing::info!(lead_id = %lead.id, status = %lead.status, created = created.len(), "Lembretes de status criados");
        Ok(created)
    }

    /// Lembretes no dia `start_from_days + i * interval_days`, às 09:00 locais.
    pub async fn create_additional_follow_ups(
        &self,
        lead_id: Uuid,
        count: u32,
        interval_days: u32,
        start_from_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, AppError> {
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lead não encontrado".to_string()))?;

        let mut created = Vec::with_capacity(count as usize);
        for index in 0..count {
            let offset = i64::from(start_from_days) + i64::from(index) * i64::from(interval_days);
            let reminder = NewReminder {
                lead_id: Some(lead.id),
                contract_id: None,
                tipo: FOLLOW_UP_ADDITIONAL.to_string(),
                titulo: format!("Follow-up adicional {} - {}", index + 1, lead.nome_completo),
                descricao: Some("Follow-up manual adicional registrado pelo usuário.".to_string()),
                data_lembrete: self.at_follow_up_hour(now, offset),
                prioridade: ReminderPriority::Alta,
            };
            created.push(self.reminders.insert_reminder(reminder).await?);
        }

        tracing::info!(%lead_id, created = created.len(), "Follow-ups adicionais criados");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, models::{lead::fixtures::sample_lead, reminder::FollowUpCustomRule}};
    use chrono_tz::America::Sao_Paulo;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn service(store: &Arc<MemoryStore>) -> FollowUpRuleService {
        FollowUpRuleService::new(store.clone(), store.clone(), Sao_Paulo)
    }

    #[tokio::test]
    async fn default_rule_creates_reminder_with_minutes_zeroed() {
        let store = Arc::new(MemoryStore::seeded());
        let mut lead = sample_lead();
        lead.status = "Contato Realizado".into();
        store.put_lead(lead.clone());

        let created = service(&store).on_status_change(&lead, at("2024-05-15T10:37:12-03:00")).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].tipo, FOLLOW_UP);
        assert_eq!(created[0].prioridade, ReminderPriority::Alta);
        assert_eq!(created[0].data_lembrete, at("2024-05-16T10:00:00-03:00"));
        assert_eq!(created[0].titulo, "Revisar contato e planejar próximo passo - João da Silva");

        let reloaded = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(reloaded.proximo_retorno, Some(created[0].data_lembrete));
    }

    #[tokio::test]
    async fn default_rule_truncates_in_local_time_for_half_hour_offsets() {
        let store = Arc::new(MemoryStore::seeded());
        let mut lead = sample_lead();
        lead.status = "Contato realizado".into();
        store.put_lead(lead.clone());
        let service = FollowUpRuleService::new(store.clone(), store.clone(), chrono_tz::Asia::Kolkata);

        let created = service.on_status_change(&lead, at("2024-05-15T10:37:12+05:30")).await.unwrap();

        assert_eq!(created[0].data_lembrete, at("2024-05-16T10:00:00+05:30"));
    }

    #[tokio::test]
    async fn custom_rules_replace_defaults() {
        let store = Arc::new(MemoryStore::seeded());
        let mut lead = sample_lead();
        lead.status = "Contato realizado".into();
        store.put_lead(lead.clone());

        for (days, active) in [(3, true), (1, true), (2, false)] {
            store.put_custom_rule(FollowUpCustomRule {
                id: Uuid::new_v4(),
                lead_id: lead.id,
                status: "Contato realizado".into(),
                days_after: days,
                title: format!("Retorno em {} dias", days),
                description: None,
                priority: ReminderPriority::Baixa,
                active,
            });
        }

        let created = service(&store).on_status_change(&lead, at("2024-05-15T22:30:00-03:00")).await.unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|r| r.tipo == FOLLOW_UP_CUSTOM));
        assert_eq!(created[0].data_lembrete, at("2024-05-16T09:00:00-03:00"));
        assert_eq!(created[1].data_lembrete, at("2024-05-18T09:00:00-03:00"));

        let reloaded = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(reloaded.proximo_retorno, Some(at("2024-05-16T09:00:00-03:00")));
    }

    #[tokio::test]
    async fn status_without_rule_creates_nothing() {
        let store = Arc::new(MemoryStore::seeded());
        let lead = sample_lead();
        store.put_lead(lead.clone());
        let created = service(&store).on_status_change(&lead, Utc::now()).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn additional_follow_ups_are_spaced_by_interval() {
        let store = Arc::new(MemoryStore::seeded());
        let lead = sample_lead();
        store.put_lead(lead.clone());

        let created = service(&store)
            .create_additional_follow_ups(lead.id, 3, 2, 1, at("2024-05-15T16:00:00-03:00"))
            .await
            .unwrap();

        let dates: Vec<_> = created.iter().map(|r| r.data_lembrete).collect();
        assert_eq!(
            dates,
            vec![
                at("2024-05-16T09:00:00-03:00"),
                at("2024-05-18T09:00:00-03:00"),
                at("2024-05-20T09:00:00-03:00"),
            ]
        );
        assert_eq!(created[2].titulo, "Follow-up adicional 3 - João da Silva");
        assert!(created.iter().all(|r| r.prioridade == ReminderPriority::Alta));
    }

    #[tokio::test]
    async fn additional_follow_ups_require_existing_lead() {
        let store = Arc::new(MemoryStore::seeded());
        let result = service(&store)
            .create_additional_follow_ups(Uuid::new_v4(), 1, 1, 1, Utc::now())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
