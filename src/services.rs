// src/services.rs

// Motor de datas e janelas
pub mod business_days;
pub mod send_window;

// Automação de contato
pub mod conditions;
pub mod templates;
pub mod whatsapp;
pub mod automation_config;
pub mod flow_scheduler;
pub mod auto_contact;
pub mod job_processor;

// Lembretes, leads e respostas rápidas
pub mod follow_up_rules;
pub mod reminder_service;
pub mod quick_replies;
pub mod lead_service;

pub use auto_contact::AutoContactService;
pub use automation_config::AutomationConfigService;
pub use follow_up_rules::FollowUpRuleService;
pub use job_processor::JobProcessor;
pub use lead_service::LeadService;
pub use reminder_service::ReminderService;
