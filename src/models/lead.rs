// src/models/lead.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- LEAD ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct Lead {
    pub id: Uuid,
    #[schema(example = "Maria da Silva")]
    pub nome_completo: String,
    #[schema(example = "11987654321")]
    pub telefone: String,
    pub email: Option<String>,
    pub cidade: Option<String>,
    pub regiao: Option<String>,

    // Classificações: id da tabela de apoio + rótulo denormalizado
    #[schema(example = "tráfego pago")]
    pub origem: String,
    pub origem_id: Option<Uuid>,
    #[schema(example = "Pessoa Física")]
    pub tipo_contratacao: String,
    pub tipo_contratacao_id: Option<Uuid>,
    #[schema(example = "Novo")]
    pub status: String,
    pub status_id: Option<Uuid>,

    pub operadora_atual: Option<String>,
    pub responsavel: String,
    pub observacoes: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,

    pub data_criacao: DateTime<Utc>,
    pub ultimo_contato: DateTime<Utc>,
    pub proximo_retorno: Option<DateTime<Utc>>,
    pub arquivado: bool,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    pub fn first_name(&self) -> &str {
        self.nome_completo.split_whitespace().next().unwrap_or("")
    }

    /// Lê um lead vindo de um webhook (`record`/`old_record`).
    /// Retorna `None` se o JSON não tiver o formato de uma linha de `leads`.
    pub fn from_webhook_record(value: &Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

// Colunas TEXT[] chegam como `null` nos webhooks
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// Tabelas de apoio (status, origem, tipo de contratação)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "lead_lookup_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Status,
    Origem,
    TipoContratacao,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct LookupValue {
    pub id: Uuid,
    pub kind: LookupKind,
    pub nome: String,
}

// --- ESCRITA ---

// Lead já validado e normalizado, pronto para o INSERT
#[derive(Debug, Clone)]
pub struct NewLead {
    pub nome_completo: String,
    pub telefone: String,
    pub email: Option<String>,
    pub cidade: Option<String>,
    pub regiao: Option<String>,
    pub origem: LookupValue,
    pub tipo_contratacao: LookupValue,
    pub status: LookupValue,
    pub operadora_atual: Option<String>,
    pub responsavel: String,
    pub observacoes: Option<String>,
    pub proximo_retorno: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub data_criacao: DateTime<Utc>,
    pub ultimo_contato: DateTime<Utc>,
}

// Atualização parcial. `Some(None)` limpa a coluna.
#[derive(Debug, Clone, Default)]
pub struct LeadUpdate {
    pub nome_completo: Option<String>,
    pub telefone: Option<String>,
    pub email: Option<Option<String>>,
    pub cidade: Option<Option<String>>,
    pub regiao: Option<Option<String>>,
    pub origem: Option<LookupValue>,
    pub tipo_contratacao: Option<LookupValue>,
    pub status: Option<LookupValue>,
    pub operadora_atual: Option<Option<String>>,
    pub responsavel: Option<String>,
    pub proximo_retorno: Option<Option<DateTime<Utc>>>,
    pub observacoes: Option<Option<String>>,
}

impl LeadUpdate {
    pub fn apply_to(&self, lead: &mut Lead) {
        if let Some(v) = &self.nome_completo {
            lead.nome_completo = v.clone();
        }
        if let Some(v) = &self.telefone {
            lead.telefone = v.clone();
        }
        if let Some(v) = &self.email {
            lead.email = v.clone();
        }
        if let Some(v) = &self.cidade {
            lead.cidade = v.clone();
        }
        if let Some(v) = &self.regiao {
            lead.regiao = v.clone();
        }
        if let Some(v) = &self.origem {
            lead.origem = v.nome.clone();
            lead.origem_id = Some(v.id);
        }
        if let Some(v) = &self.tipo_contratacao {
            lead.tipo_contratacao = v.nome.clone();
            lead.tipo_contratacao_id = Some(v.id);
        }
        if let Some(v) = &self.status {
            lead.status = v.nome.clone();
            lead.status_id = Some(v.id);
        }
        if let Some(v) = &self.operadora_atual {
            lead.operadora_atual = v.clone();
        }
        if let Some(v) = &self.responsavel {
            lead.responsavel = v.clone();
        }
        if let Some(v) = &self.proximo_retorno {
            lead.proximo_retorno = *v;
        }
        if let Some(v) = &self.observacoes {
            lead.observacoes = v.clone();
        }
    }
}

// --- PAYLOADS DA API ---

// Corpo do POST /leads. Tudo opcional aqui: a obrigatoriedade é checada no serviço,
// que devolve a lista completa de problemas de uma vez.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct LeadPayload {
    pub nome_completo: Option<String>,
    pub telefone: Option<String>,
    pub email: Option<String>,
    pub cidade: Option<String>,
    pub regiao: Option<String>,
    #[schema(example = "tráfego pago")]
    pub origem: Option<String>,
    #[schema(example = "Pessoa Física")]
    pub tipo_contratacao: Option<String>,
    pub operadora_atual: Option<String>,
    #[schema(example = "Novo")]
    pub status: Option<String>,
    pub responsavel: Option<String>,
    pub proximo_retorno: Option<String>,
    pub observacoes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[schema(example = "2024-05-10T09:30:00-03:00")]
    pub data_criacao: Option<String>,
}

// `null` explícito vira `Some(None)` (limpar coluna); campo ausente fica `None`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// Corpo do PUT /leads/:id
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LeadPatch {
    pub nome_completo: Option<String>,
    pub telefone: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub cidade: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub regiao: Option<Option<String>>,
    pub origem: Option<String>,
    pub tipo_contratacao: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub operadora_atual: Option<Option<String>>,
    pub status: Option<String>,
    pub responsavel: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub proximo_retorno: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub observacoes: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeadFilters {
    pub status: Option<String>,
    pub responsavel: Option<String>,
    pub telefone: Option<String>,
    pub email: Option<String>,
    pub limit: Option<i64>,
}

// Registro de interação gravado após cada envio automático
#[derive(Debug, Clone, Serialize)]
pub struct NewInteraction {
    pub lead_id: Uuid,
    pub tipo: String,
    pub descricao: String,
    pub responsavel: String,
    pub data_interacao: DateTime<Utc>,
}
