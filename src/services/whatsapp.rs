// src/services/whatsapp.rs
//
// Envio de mensagens pelo gateway Whapi.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::{
    common::{error::AppError, text::normalize_phone},
    models::automation::{ContentKind, MessagePart},
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Mensagem pronta para o gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to: String,
    pub kind: ContentKind,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

impl OutboundMessage {
    pub fn from_part(to: &str, part: &MessagePart) -> Self {
        Self {
            to: to.to_string(),
            kind: part.kind,
            body: part.text.clone(),
            media_url: part.media_url.clone(),
            caption: part.caption.clone(),
            filename: part.filename.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("/messages/{}", self.kind.as_str())
    }

    fn payload(&self) -> Value {
        match self.kind {
            ContentKind::Text => json!({ "to": self.to, "body": self.body.clone().unwrap_or_default() }),
            kind => {
                let mut payload = json!({ "to": self.to, "media": self.media_url });
                if let Some(caption) = self.caption.as_deref().filter(|c| !c.trim().is_empty()) {
                    payload["caption"] = json!(caption);
                }
                if kind == ContentKind::Document {
                    if let Some(filename) = &self.filename {
                        payload["filename"] = json!(filename);
                    }
                }
                payload
            }
        }
    }
}

/// Chat id do WhatsApp a partir do telefone. Ids já completos passam direto.
pub fn chat_id_for(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    if trimmed.contains('@') {
        return Some(trimmed.to_string());
    }

    let digits = normalize_phone(trimmed);
    if digits.is_empty() {
        return None;
    }

    let number = if !digits.starts_with("55") && digits.len() >= 10 {
        format!("55{}", digits)
    } else {
        digits
    };
    Some(format!("{}@s.whatsapp.net", number))
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, token: &str, message: &OutboundMessage) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct WhapiClient {
    client: Client,
    base_url: String,
}

impl WhapiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl MessageSender for WhapiClient {
    async fn send(&self, token: &str, message: &OutboundMessage) -> Result<(), AppError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

        let response = self
            .client
            .post(format!("{}{}", self.base_url, message.endpoint()))
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .json(&message.payload())
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Falha de conexão com o Whapi: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, to = %message.to, "Whapi recusou a mensagem");
            return Err(AppError::Gateway(format!("Whapi respondeu {}: {}", status.as_u16(), body)));
        }

        tracing::info!(to = %message.to, kind = message.kind.as_str(), "Mensagem enviada via Whapi");
        Ok(())
    }
}
