// src/handlers/quick_replies.rs

use axum::{extract::rejection::JsonRejection, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    common::error::ApiError,
    handlers::{envelope, json_body},
    middleware::i18n::Locale,
    models::quick_reply::{QuickReply, RankingContext},
    services::quick_replies::{find_top_quick_replies, rank_quick_replies},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankQuickRepliesRequest {
    #[serde(default)]
    pub replies: Vec<QuickReply>,
    #[serde(flatten)]
    pub context: RankingContext,
    // Sem limite devolve a lista inteira ordenada
    pub limit: Option<i64>,
}

// POST /quick-replies/rank
#[utoipa::path(
    post,
    path = "/quick-replies/rank",
    tag = "Respostas rápidas",
    request_body = RankQuickRepliesRequest,
    responses(
        (status = 200, description = "Respostas ordenadas pela relevância", body = Vec<QuickReply>)
    )
)]
pub async fn rank(
    locale: Locale,
    payload: Result<Json<RankQuickRepliesRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload).map_err(|e| e.to_api_error(&locale))?;
    let now = Utc::now();
    let ranked = match request.limit {
        Some(limit) => find_top_quick_replies(&request.replies, &request.context, limit, now),
        None => rank_quick_replies(&request.replies, &request.context, now),
    };

    Ok(Json(envelope(ranked)))
}
