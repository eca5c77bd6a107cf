// src/middleware/action.rs

use axum::{
    extract::{FromRequestParts, Query},
    http::{request::Parts, StatusCode},
};
use serde::Deserialize;
use serde_json::json;

use crate::common::error::ApiError;

// Cabeçalho alternativo ao ?action=
const ACTION_HEADER: &str = "x-action";

// Ações aceitas pelo endpoint de automação
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationAction {
    AutoContact,
    ProcessFlowJobs,
    ManualAutomation,
}

impl AutomationAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "auto-contact" => Some(Self::AutoContact),
            "process-flow-jobs" => Some(Self::ProcessFlowJobs),
            "manual-automation" => Some(Self::ManualAutomation),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionQuery {
    action: Option<String>,
}

fn bad_request(message: String) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        body: json!({ "success": false, "error": message }),
    }
}

impl<S> FromRequestParts<S> for AutomationAction
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // A query tem precedência sobre o cabeçalho
        let from_query = Query::<ActionQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.action)
            .filter(|a| !a.trim().is_empty());

        let from_header = parts
            .headers
            .get(ACTION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(raw) = from_query.or(from_header) else {
            return Err(bad_request(
                "Informe a ação em ?action= ou no cabeçalho x-action".to_string(),
            ));
        };

        AutomationAction::parse(&raw).ok_or_else(|| bad_request(format!("Ação desconhecida: {}", raw)))
    }
}
