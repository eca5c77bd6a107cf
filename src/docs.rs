// src/docs.rs

use utoipa::OpenApi;
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,

        // --- Leads ---
        handlers::leads::create_lead,
        handlers::leads::list_leads,
        handlers::leads::update_lead,
        handlers::leads::create_leads_batch,
        handlers::leads::create_additional_follow_ups,

        // --- Automação ---
        handlers::automation::dispatch,
        handlers::automation::auto_contact,
        handlers::automation::process_flow_jobs,
        handlers::automation::manual_automation,
        handlers::automation::get_settings,
        handlers::automation::update_settings,

        // --- Lembretes ---
        handlers::reminders::grouped_reminders,
        handlers::reminders::complete_reminder,
        handlers::reminders::snooze_reminder,

        // --- Respostas rápidas ---
        handlers::quick_replies::rank,
    ),
    components(
        schemas(
            // --- Leads ---
            models::lead::Lead,
            models::lead::LeadPayload,
            models::lead::LeadPatch,
            services::lead_service::BatchResults,
            services::lead_service::BatchSuccess,
            services::lead_service::BatchFailure,

            // --- Automação ---
            models::automation::AutomationSettings,
            models::automation::LeadWebhookEvent,
            models::automation::ManualAutomationRequest,
            models::flow_job::ProcessSummary,
            services::auto_contact::AutoContactAction,
            services::auto_contact::AutoContactOutcome,

            // --- Lembretes ---
            models::reminder::Reminder,
            models::reminder::ReminderPriority,
            models::reminder::AdditionalFollowUpsRequest,
            services::reminder_service::GroupedReminders,
            services::reminder_service::RankedReminder,
            services::reminder_service::Urgency,
            services::reminder_service::SnoozeOption,
            services::reminder_service::CompletionResult,
            handlers::reminders::CompleteReminderRequest,
            handlers::reminders::SnoozeRequest,

            // --- Respostas rápidas ---
            models::quick_reply::QuickReply,
            models::quick_reply::ConversationMessage,
            handlers::quick_replies::RankQuickRepliesRequest,
        )
    ),
    tags(
        (name = "Saúde", description = "Verificação de disponibilidade"),
        (name = "Leads", description = "Cadastro de leads pela API externa"),
        (name = "Automação", description = "Fluxos de contato automático via WhatsApp"),
        (name = "Lembretes", description = "Agenda de follow-ups"),
        (name = "Respostas rápidas", description = "Sugestões para o atendimento")
    )
)]
pub struct ApiDoc;
