// src/models/quick_reply.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct QuickReply {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ConversationMessage {
    // "received" | "sent"
    pub message_type: String,
    pub message_text: Option<String>,
    pub media_caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingContext {
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    pub search_term: Option<String>,
    #[serde(default)]
    pub additional_keywords: Vec<String>,
}
