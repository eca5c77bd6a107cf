// src/services/templates.rs
//
// Substituição de placeholders `{{chave}}` nas mensagens automáticas.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    models::{automation::MessagePart, lead::Lead},
    services::send_window::greeting,
};

pub struct PlaceholderContext<'a> {
    pub lead: &'a Lead,
    pub greeting: &'static str,
}

impl<'a> PlaceholderContext<'a> {
    pub fn new(lead: &'a Lead, now: DateTime<Utc>, tz: Tz) -> Self {
        Self { lead, greeting: greeting(now, tz) }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let lead = self.lead;
        let value = match key {
            "nome" | "lead_nome" => lead.nome_completo.clone(),
            "primeiro_nome" | "lead_primeiro_nome" => lead.first_name().to_string(),
            "saudacao" | "greeting" => self.greeting.to_string(),
            "origem" | "lead_origem" => lead.origem.clone(),
            "cidade" => lead.cidade.clone().unwrap_or_default(),
            "responsavel" | "lead_responsavel" => lead.responsavel.clone(),
            "telefone" => lead.telefone.clone(),
            "lead_status" => lead.status.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// Troca os placeholders conhecidos; os desconhecidos ficam como estão.
pub fn render(template: &str, ctx: &PlaceholderContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            output.push_str(&rest[open..]);
            return output;
        };

        let key = after_open[..close].trim().to_lowercase();
        match ctx.lookup(&key) {
            Some(value) => output.push_str(&value),
            None => output.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    output.push_str(rest);
    output
}

pub fn render_part(part: &MessagePart, ctx: &PlaceholderContext) -> MessagePart {
    MessagePart {
        text: part.text.as_deref().map(|t| render(t, ctx)),
        caption: part.caption.as_deref().map(|c| render(c, ctx)),
        ..part.clone()
    }
}
