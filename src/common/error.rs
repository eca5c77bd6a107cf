// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::middleware::i18n::Locale;

// Tipo de erro da aplicação. Cada variante sabe o seu status HTTP.
#[derive(Debug, Error)]
pub enum AppError {
    // Lista de mensagens por campo (payloads da API de leads)
    #[error("Dados inválidos")]
    Validation(Vec<String>),

    #[error("Dados inválidos")]
    InvalidPayload(#[from] validator::ValidationErrors),

    // Status/origem/tipo que não existe nas tabelas de apoio
    #[error("{0}")]
    LookupNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Erro de banco de dados: {0}")]
    Database(#[from] sqlx::Error),

    // Falha no gateway do WhatsApp
    #[error("{0}")]
    Gateway(String),

    #[error("Erro interno do servidor: {0}")]
    Internal(#[from] anyhow::Error),
}

// Erro já resolvido para a resposta HTTP (status + corpo JSON)
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidPayload(_) | AppError::LookupNotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Mensagens de campo vindas do `validator`, achatadas numa lista
    fn validator_details(errors: &validator::ValidationErrors) -> Vec<String> {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("Campo \"{}\" é inválido", field),
                })
            })
            .collect();
        details.sort();
        details
    }

    /// Converte o erro no envelope `{success, error, details}` no idioma pedido.
    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let english = locale.is_english();
        let status = self.status_code();

        let (error, details) = match self {
            AppError::Validation(messages) => (
                if english { "Invalid data" } else { "Dados inválidos" }.to_string(),
                json!(messages),
            ),
            AppError::InvalidPayload(errors) => (
                if english { "Invalid data" } else { "Dados inválidos" }.to_string(),
                json!(Self::validator_details(errors)),
            ),
            AppError::LookupNotFound(message) | AppError::NotFound(message) => {
                (message.clone(), Value::Null)
            }
            AppError::Gateway(message) => (
                if english { "Failed to send message" } else { "Falha ao enviar mensagem" }.to_string(),
                json!(message),
            ),
            AppError::Database(e) => {
                tracing::error!("Erro de banco de dados: {}", e);
                (
                    if english { "Internal server error" } else { "Erro interno do servidor" }.to_string(),
                    json!(e.to_string()),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Erro Interno do Servidor: {:#}", e);
                (
                    if english { "Internal server error" } else { "Erro interno do servidor" }.to_string(),
                    json!(e.to_string()),
                )
            }
        };

        let mut body = json!({ "success": false, "error": error });
        if !details.is_null() {
            body["details"] = details;
        }

        ApiError { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// Sem Locale explícito a resposta sai em português.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}
