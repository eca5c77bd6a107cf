// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use chrono_tz::Tz;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{MemoryStore, Stores},
    services::{
        AutoContactService, AutomationConfigService, FollowUpRuleService, JobProcessor, LeadService,
        ReminderService,
        flow_scheduler::FlowScheduler,
        job_processor::ProcessorOptions,
        whatsapp::{MessageSender, WhapiClient},
    },
};

// Configuração lida do ambiente (.env incluído)
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub app_addr: String,
    pub timezone: Tz,
    pub whapi_base_url: String,
    pub whapi_token: Option<String>,
    pub job_batch_size: i64,
    pub job_lease_seconds: i64,
    pub job_max_attempts: i32,
    pub job_retry_backoff_minutes: i64,
    pub settings_cache_seconds: u64,
    pub db_max_connections: u32,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// Valor ausente usa o padrão; valor malformado é erro de configuração
fn parsed_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Variável {} inválida: {:?}", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let timezone_name = optional_var("APP_TIMEZONE").unwrap_or_else(|| "America/Sao_Paulo".to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| anyhow::anyhow!("APP_TIMEZONE inválido ({}): {}", timezone_name, e))?;

        Ok(Self {
            database_url: optional_var("DATABASE_URL"),
            app_addr: optional_var("APP_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            timezone,
            whapi_base_url: optional_var("WHAPI_BASE_URL").unwrap_or_else(|| "https://gate.whapi.cloud".to_string()),
            whapi_token: optional_var("WHAPI_TOKEN"),
            job_batch_size: parsed_var("JOB_BATCH_SIZE", 25)?,
            job_lease_seconds: parsed_var("JOB_LEASE_SECONDS", 300)?,
            job_max_attempts: parsed_var("JOB_MAX_ATTEMPTS", 1)?,
            job_retry_backoff_minutes: parsed_var("JOB_RETRY_BACKOFF_MINUTES", 15)?,
            settings_cache_seconds: parsed_var("SETTINGS_CACHE_SECONDS", 60)?,
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", 5)?,
        })
    }

    fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            batch_size: self.job_batch_size.max(1),
            lease: chrono::Duration::seconds(self.job_lease_seconds.max(1)),
            max_attempts: self.job_max_attempts.max(1),
            retry_backoff: chrono::Duration::minutes(self.job_retry_backoff_minutes.max(0)),
            whapi_token: self.whapi_token.clone(),
            timezone: self.timezone,
        }
    }
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub automation_config: AutomationConfigService,
    pub auto_contact: AutoContactService,
    pub job_processor: JobProcessor,
    pub lead_service: LeadService,
    pub reminder_service: ReminderService,
    pub follow_up_rules: FollowUpRuleService,
}

impl AppState {
    /// Conecta ao Postgres quando há DATABASE_URL; sem ela, sobe com o store em memória.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let stores = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(url)
                    .await
                    .context("Falha ao conectar ao banco de dados")?;

                sqlx::migrate!()
                    .run(&pool)
                    .await
                    .context("Falha ao rodar as migrações do banco de dados")?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida e migrações aplicadas");
                Stores::postgres(pool)
            }
            None => {
                tracing::warn!("DATABASE_URL não definida; usando store em memória");
                Stores::in_memory(Arc::new(MemoryStore::seeded()))
            }
        };

        let sender: Arc<dyn MessageSender> = Arc::new(WhapiClient::new(&config.whapi_base_url)?);
        Ok(Self::assemble(config, stores, sender))
    }

    // --- Monta o gráfico de dependências ---
    pub fn assemble(config: Config, stores: Stores, sender: Arc<dyn MessageSender>) -> Self {
        let tz = config.timezone;

        let automation_config = AutomationConfigService::new(
            stores.settings.clone(),
            Duration::from_secs(config.settings_cache_seconds),
        );
        let scheduler = FlowScheduler::new(stores.jobs.clone(), tz);
        let auto_contact = AutoContactService::new(automation_config.clone(), scheduler);
        let follow_up_rules = FollowUpRuleService::new(stores.leads.clone(), stores.reminders.clone(), tz);
        let lead_service = LeadService::new(stores.leads.clone(), auto_contact.clone(), follow_up_rules.clone());
        let reminder_service = ReminderService::new(stores.reminders.clone(), tz);
        let job_processor = JobProcessor::new(
            stores,
            automation_config.clone(),
            sender,
            config.processor_options(),
        );

        Self {
            config: Arc::new(config),
            automation_config,
            auto_contact,
            job_processor,
            lead_service,
            reminder_service,
            follow_up_rules,
        }
    }
}
