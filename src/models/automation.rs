// src/models/automation.rs
//
// Configuração do fluxo de contato automático. O documento fica guardado como JSON em
// `integration_settings` e é normalizado aqui, uma vez, para tipos fechados. Qualquer
// pedaço malformado vira o valor padrão em vez de erro.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const AUTO_CONTACT_INTEGRATION_SLUG: &str = "whatsapp_auto_contact";

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_START_HOUR: &str = "08:00";
pub const DEFAULT_END_HOUR: &str = "19:00";

// =============================================================================
//  CONDIÇÕES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Origem,
    Status,
    TipoContratacao,
    Responsavel,
    Cidade,
    Regiao,
    OperadoraAtual,
    Nome,
    Telefone,
    Email,
    Tag,
    // `lead_created` / `event`: compara com o evento que disparou a avaliação
    Event,
    DataCriacao,
    UltimoContato,
    ProximoRetorno,
    // Campo desconhecido: nunca tem valor no lead
    Unknown(String),
}

impl ConditionField {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "origem" => ConditionField::Origem,
            "status" => ConditionField::Status,
            "tipo_contratacao" => ConditionField::TipoContratacao,
            "responsavel" => ConditionField::Responsavel,
            "cidade" => ConditionField::Cidade,
            "regiao" => ConditionField::Regiao,
            "operadora_atual" => ConditionField::OperadoraAtual,
            "nome" | "nome_completo" => ConditionField::Nome,
            "telefone" => ConditionField::Telefone,
            "email" => ConditionField::Email,
            "tag" | "tags" => ConditionField::Tag,
            "lead_created" | "event" => ConditionField::Event,
            "data_criacao" | "created_at" => ConditionField::DataCriacao,
            "ultimo_contato" => ConditionField::UltimoContato,
            "proximo_retorno" => ConditionField::ProximoRetorno,
            other => ConditionField::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    NotEquals,
    NotContains,
    StartsWith,
    EndsWith,
    InList,
    NotInList,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl ConditionOperator {
    // Operador desconhecido cai em `equals`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "contains" => ConditionOperator::Contains,
            "not_equals" => ConditionOperator::NotEquals,
            "not_contains" => ConditionOperator::NotContains,
            "starts_with" => ConditionOperator::StartsWith,
            "ends_with" => ConditionOperator::EndsWith,
            "in_list" => ConditionOperator::InList,
            "not_in_list" => ConditionOperator::NotInList,
            "greater_than" => ConditionOperator::GreaterThan,
            "greater_or_equal" => ConditionOperator::GreaterOrEqual,
            "less_than" => ConditionOperator::LessThan,
            "less_or_equal" => ConditionOperator::LessOrEqual,
            _ => ConditionOperator::Equals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLogic {
    All,
    Any,
}

impl ConditionLogic {
    fn parse(value: Option<&Value>, default: ConditionLogic) -> Self {
        match value.and_then(Value::as_str).map(|s| s.trim().to_lowercase()) {
            Some(s) if s == "any" => ConditionLogic::Any,
            Some(s) if s == "all" => ConditionLogic::All,
            _ => default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FlowCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: String,
}

impl FlowCondition {
    pub fn new(field: ConditionField, operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self { field, operator, value: value.into() }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let field = str_field(value, "field")?;
        let operator = str_field(value, "operator").unwrap_or_default();
        let expected = match value.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|i| match i {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(","),
            _ => String::new(),
        };

        Some(Self {
            field: ConditionField::parse(&field),
            operator: ConditionOperator::parse(&operator),
            value: expected,
        })
    }
}

// =============================================================================
//  MENSAGENS E TEMPLATES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
}

impl ContentKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("image") => ContentKind::Image,
            Some("video") => ContentKind::Video,
            Some("audio") | Some("voice") => ContentKind::Audio,
            Some("document") => ContentKind::Document,
            _ => ContentKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub kind: ContentKind,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

impl MessagePart {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            text: Some(body.into()),
            media_url: None,
            caption: None,
            filename: None,
        }
    }

    // Aceita "texto puro" ou {type, text|content|message, mediaUrl|url, caption, filename}
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(s) = value.as_str() {
            return (!s.trim().is_empty()).then(|| MessagePart::text(s));
        }

        let kind = ContentKind::parse(value.get("type").and_then(Value::as_str));
        let text = str_field(value, "text")
            .or_else(|| str_field(value, "content"))
            .or_else(|| str_field(value, "message"));
        let media_url = str_field(value, "mediaUrl").or_else(|| str_field(value, "url"));

        let part = Self {
            kind,
            text,
            media_url,
            caption: str_field(value, "caption"),
            filename: str_field(value, "filename"),
        };

        part.is_usable().then_some(part)
    }

    pub fn is_usable(&self) -> bool {
        match self.kind {
            ContentKind::Text => self.text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            _ => self.media_url.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MessageTemplate {
    pub id: String,
    pub name: String,
    pub parts: Vec<MessagePart>,
}

impl MessageTemplate {
    fn from_value(value: &Value, index: usize) -> Option<Self> {
        let id = str_field(value, "id").unwrap_or_else(|| format!("template-{}", index));
        let name = str_field(value, "name").unwrap_or_else(|| id.clone());

        let mut parts: Vec<MessagePart> = value
            .get("parts")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(MessagePart::from_value).collect())
            .unwrap_or_default();

        if parts.is_empty() {
            if let Some(message) = str_field(value, "message").or_else(|| str_field(value, "content")) {
                parts.push(MessagePart::text(message));
            }
        }

        (!parts.is_empty()).then_some(Self { id, name, parts })
    }
}

// =============================================================================
//  PASSOS DO FLUXO
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("minutes") | Some("minute") | Some("minutos") => DelayUnit::Minutes,
            Some("days") | Some("day") | Some("dias") => DelayUnit::Days,
            _ => DelayUnit::Hours,
        }
    }

    pub fn to_hours(self, value: f64) -> f64 {
        match self {
            DelayUnit::Minutes => value / 60.0,
            DelayUnit::Hours => value,
            DelayUnit::Days => value * 24.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "messageSource", rename_all = "snake_case")]
pub enum MessageSource {
    Template { template_id: String },
    Custom { message: MessagePart },
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "actionType", rename_all = "snake_case")]
pub enum StepAction {
    SendMessage { source: MessageSource },
    UpdateStatus { target_status: String },
    ArchiveLead,
    DeleteLead,
}

impl StepAction {
    pub fn action_type(&self) -> &'static str {
        match self {
            StepAction::SendMessage { .. } => "send_message",
            StepAction::UpdateStatus { .. } => "update_status",
            StepAction::ArchiveLead => "archive_lead",
            StepAction::DeleteLead => "delete_lead",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub id: String,
    // Atraso medido a partir do agendamento, não do passo anterior
    pub delay_hours: f64,
    pub action: StepAction,
}

impl FlowStep {
    fn from_value(value: &Value, flow_id: &str, index: usize) -> Option<Self> {
        let id = str_field(value, "id").unwrap_or_else(|| format!("{}-step-{}", flow_id, index));

        let delay_hours = match num_field(value, "delayValue") {
            Some(amount) => {
                DelayUnit::parse(value.get("delayUnit").and_then(Value::as_str)).to_hours(amount)
            }
            None => num_field(value, "delayHours").unwrap_or(0.0),
        }
        .max(0.0);

        let action_type = str_field(value, "actionType").unwrap_or_default().to_lowercase();
        let action = match action_type.as_str() {
            "update_status" => StepAction::UpdateStatus {
                target_status: str_field(value, "targetStatus")
                    .or_else(|| str_field(value, "statusToSet"))?,
            },
            "archive_lead" => StepAction::ArchiveLead,
            "delete_lead" => StepAction::DeleteLead,
            _ => StepAction::SendMessage { source: Self::message_source(value)? },
        };

        Some(Self { id, delay_hours, action })
    }

    fn message_source(value: &Value) -> Option<MessageSource> {
        let template_id = str_field(value, "templateId");
        let explicit = str_field(value, "messageSource").map(|s| s.to_lowercase());

        let custom = value
            .get("customMessage")
            .and_then(MessagePart::from_value)
            .or_else(|| value.get("message").and_then(MessagePart::from_value));

        match (explicit.as_deref(), template_id, custom) {
            (Some("custom"), _, Some(message)) => Some(MessageSource::Custom { message }),
            (Some("custom"), Some(template_id), None) => Some(MessageSource::Template { template_id }),
            (_, Some(template_id), _) => Some(MessageSource::Template { template_id }),
            (_, None, Some(message)) => Some(MessageSource::Custom { message }),
            _ => None,
        }
    }
}

// =============================================================================
//  JANELA DE ENVIO
// =============================================================================

// Todos os campos opcionais: a config do fluxo sobrescreve a global campo a campo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    pub timezone: Option<String>,
    pub start_hour: Option<String>,
    pub end_hour: Option<String>,
    pub allowed_weekdays: Option<Vec<u32>>,
    pub daily_send_limit: Option<u32>,
}

impl SchedulingConfig {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value.filter(|v| v.is_object()) else {
            return Self::default();
        };

        let allowed_weekdays = value.get("allowedWeekdays").and_then(Value::as_array).map(|days| {
            let mut parsed: Vec<u32> = days
                .iter()
                .filter_map(|d| d.as_u64().or_else(|| d.as_str().and_then(|s| s.trim().parse().ok())))
                // 0 (domingo no estilo JS) vira 7 (ISO)
                .map(|d| if d == 0 { 7 } else { d as u32 })
                .filter(|d| (1..=7).contains(d))
                .collect();
            parsed.sort_unstable();
            parsed.dedup();
            parsed
        });

        let daily_send_limit = num_field(value, "dailySendLimit")
            .filter(|limit| *limit >= 1.0)
            .map(|limit| limit as u32);

        Self {
            timezone: str_field(value, "timezone"),
            start_hour: str_field(value, "startHour"),
            end_hour: str_field(value, "endHour"),
            allowed_weekdays,
            daily_send_limit,
        }
    }

    /// Campos do fluxo têm precedência; o que faltar vem da config global.
    pub fn merged_over(&self, global: &SchedulingConfig) -> SchedulingConfig {
        SchedulingConfig {
            timezone: self.timezone.clone().or_else(|| global.timezone.clone()),
            start_hour: self.start_hour.clone().or_else(|| global.start_hour.clone()),
            end_hour: self.end_hour.clone().or_else(|| global.end_hour.clone()),
            allowed_weekdays: self
                .allowed_weekdays
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| global.allowed_weekdays.clone()),
            daily_send_limit: self.daily_send_limit.or(global.daily_send_limit),
        }
    }
}

// =============================================================================
//  FLUXO E DOCUMENTO
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoContactFlow {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub trigger_status: Option<String>,
    pub conditions: Vec<FlowCondition>,
    pub condition_logic: ConditionLogic,
    pub exit_conditions: Vec<FlowCondition>,
    pub exit_condition_logic: ConditionLogic,
    pub steps: Vec<FlowStep>,
    pub scheduling: SchedulingConfig,
}

impl AutoContactFlow {
    fn from_value(value: &Value, index: usize) -> Option<Self> {
        if !value.is_object() {
            return None;
        }

        let id = str_field(value, "id").unwrap_or_else(|| format!("flow-{}", index));
        let name = str_field(value, "name").unwrap_or_else(|| id.clone());

        let steps: Vec<FlowStep> = value
            .get("steps")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, step)| FlowStep::from_value(step, &id, i))
                    .collect()
            })
            .unwrap_or_default();

        // Fluxo sem passo utilizável é descartado
        if steps.is_empty() {
            tracing::warn!(flow_id = %id, "Fluxo sem passos válidos ignorado");
            return None;
        }

        let active = value
            .get("active")
            .or_else(|| value.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Some(Self {
            name,
            active,
            trigger_status: str_field(value, "triggerStatus"),
            conditions: conditions_field(value, "conditions"),
            condition_logic: ConditionLogic::parse(value.get("conditionLogic"), ConditionLogic::All),
            exit_conditions: conditions_field(value, "exitConditions"),
            exit_condition_logic: ConditionLogic::parse(
                value.get("exitConditionLogic"),
                ConditionLogic::Any,
            ),
            steps,
            scheduling: SchedulingConfig::from_value(value.get("scheduling")),
            id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomationSettings {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub templates: Vec<MessageTemplate>,
    pub flows: Vec<AutoContactFlow>,
    pub scheduling: SchedulingConfig,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            templates: Vec::new(),
            flows: Vec::new(),
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl AutomationSettings {
    /// Normaliza o documento salvo. Nunca falha.
    pub fn from_value(raw: &Value) -> Self {
        if !raw.is_object() {
            return Self::default();
        }

        let templates = raw
            .get("messageTemplates")
            .or_else(|| raw.get("templates"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, t)| MessageTemplate::from_value(t, i))
                    .collect()
            })
            .unwrap_or_default();

        let flows = raw
            .get("flows")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, f)| AutoContactFlow::from_value(f, i))
                    .collect()
            })
            .unwrap_or_default();

        // Mesmo formato do legado: `dailySendLimit` também aceito na raiz
        let mut scheduling = SchedulingConfig::from_value(raw.get("scheduling"));
        if scheduling.daily_send_limit.is_none() {
            scheduling.daily_send_limit = num_field(raw, "dailySendLimit")
                .filter(|limit| *limit >= 1.0)
                .map(|limit| limit as u32);
        }

        Self {
            enabled: raw.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            api_key: str_field(raw, "apiKey").or_else(|| str_field(raw, "token")),
            templates,
            flows,
            scheduling,
        }
    }

    pub fn flow(&self, id: &str) -> Option<&AutoContactFlow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn template(&self, id: &str) -> Option<&MessageTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn effective_scheduling(&self, flow: &AutoContactFlow) -> SchedulingConfig {
        flow.scheduling.merged_over(&self.scheduling)
    }
}

// --- helpers de leitura tolerante ---

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn num_field(value: &Value, key: &str) -> Option<f64> {
    let parsed = match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn conditions_field(value: &Value, key: &str) -> Vec<FlowCondition> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(FlowCondition::from_value).collect())
        .unwrap_or_default()
}

// =============================================================================
//  REQUISIÇÕES
// =============================================================================

// Corpo do manual-automation
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualAutomationRequest {
    pub chat_id: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Informe ao menos uma mensagem"))]
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<Value>,
    pub lead_id: Option<Uuid>,
}

impl ManualAutomationRequest {
    pub fn target(&self) -> &str {
        self.chat_id
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(self.phone.as_deref())
            .unwrap_or_default()
    }

    /// Partes utilizáveis, na ordem recebida.
    pub fn parts(&self) -> Vec<MessagePart> {
        self.messages.iter().filter_map(MessagePart::from_value).collect()
    }
}

// Corpo do webhook de banco: { type, record, old_record }
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LeadWebhookEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub record: Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub old_record: Value,
}

impl LeadWebhookEvent {
    pub fn is_delete(&self) -> bool {
        self.event_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("DELETE"))
    }
}
