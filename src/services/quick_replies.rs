// src/services/quick_replies.rs
//
// Ordena respostas rápidas pela última mensagem recebida na conversa.
// Puro: o relógio entra como parâmetro.

use std::{cmp::Ordering, collections::HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::{
    common::text::{normalize_text, tokenize},
    models::quick_reply::{QuickReply, RankingContext},
};

const RECENCY_WINDOW_DAYS: i64 = 60;
const FAVORITE_BONUS: f64 = 3.0;
const KEYWORD_BONUS: f64 = 2.0;
const SEARCH_BONUS: f64 = 1.5;

// 1 quando acabou de ser editada, 0 depois de 60 dias
fn recency_boost(reply: &QuickReply, now: DateTime<Utc>) -> f64 {
    let Some(reference) = reply.updated_at.or(reply.created_at) else {
        return 0.0;
    };

    let elapsed = (now - reference).num_milliseconds();
    let window = Duration::days(RECENCY_WINDOW_DAYS).num_milliseconds();

    if elapsed <= 0 {
        1.0
    } else if elapsed >= window {
        0.0
    } else {
        1.0 - elapsed as f64 / window as f64
    }
}

fn context_keywords(context: &RankingContext) -> HashSet<String> {
    let mut keywords: HashSet<String> =
        context.additional_keywords.iter().flat_map(|k| tokenize(k)).collect();

    let last_received = context
        .conversation_history
        .iter()
        .rev()
        .find(|m| m.message_type == "received");

    if let Some(message) = last_received {
        for text in [&message.message_text, &message.media_caption].into_iter().flatten() {
            keywords.extend(tokenize(text));
        }
    }

    keywords
}

fn score(reply: &QuickReply, search_tokens: &[String], keywords: &HashSet<String>, now: DateTime<Utc>) -> f64 {
    let mut reply_tokens: HashSet<String> = tokenize(&reply.title).into_iter().collect();
    reply_tokens.extend(tokenize(&reply.content));
    if let Some(category) = &reply.category {
        reply_tokens.extend(tokenize(category));
    }

    let mut total = 0.0;
    if reply.is_favorite {
        total += FAVORITE_BONUS;
    }

    total += KEYWORD_BONUS * keywords.iter().filter(|k| reply_tokens.contains(*k)).count() as f64;
    total += SEARCH_BONUS * search_tokens.iter().filter(|t| reply_tokens.contains(*t)).count() as f64;

    total + recency_boost(reply, now)
}

/// Maior pontuação primeiro; empate desfeito pelo título sem acento/caixa.
pub fn rank_quick_replies(replies: &[QuickReply], context: &RankingContext, now: DateTime<Utc>) -> Vec<QuickReply> {
    let keywords = context_keywords(context);
    let search_tokens = context.search_term.as_deref().map(tokenize).unwrap_or_default();

    let mut scored: Vec<(f64, String, &QuickReply)> = replies
        .iter()
        .map(|r| (score(r, &search_tokens, &keywords, now), normalize_text(&r.title), r))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });

    scored.into_iter().map(|(_, _, reply)| reply.clone()).collect()
}

pub fn find_top_quick_replies(
    replies: &[QuickReply],
    context: &RankingContext,
    limit: i64,
    now: DateTime<Utc>,
) -> Vec<QuickReply> {
    if limit <= 0 {
        return Vec::new();
    }

    let mut ranked = rank_quick_replies(replies, context, now);
    ranked.truncate(limit as usize);
    ranked
}
