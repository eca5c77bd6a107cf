// src/services/conditions.rs
//
// Avaliação das condições de entrada e de saída dos fluxos contra um lead.
// Funções puras, sem estado compartilhado.

use crate::{
    common::text::{normalize_text, parse_instant},
    models::{
        automation::{AutoContactFlow, ConditionField, ConditionLogic, ConditionOperator, FlowCondition},
        lead::Lead,
    },
};

pub const EVENT_LEAD_CREATED: &str = "lead_created";
pub const EVENT_LEAD_UPDATED: &str = "lead_updated";

// Tabela de acesso: campo simbólico -> valor textual no lead
fn field_value(field: &ConditionField, lead: &Lead, event: Option<&str>) -> Option<String> {
    match field {
        ConditionField::Origem => Some(lead.origem.clone()),
        ConditionField::Status => Some(lead.status.clone()),
        ConditionField::TipoContratacao => Some(lead.tipo_contratacao.clone()),
        ConditionField::Responsavel => Some(lead.responsavel.clone()),
        ConditionField::Cidade => lead.cidade.clone(),
        ConditionField::Regiao => lead.regiao.clone(),
        ConditionField::OperadoraAtual => lead.operadora_atual.clone(),
        ConditionField::Nome => Some(lead.nome_completo.clone()),
        ConditionField::Telefone => Some(lead.telefone.clone()),
        ConditionField::Email => lead.email.clone(),
        ConditionField::Event => event.map(str::to_string),
        ConditionField::DataCriacao => Some(lead.data_criacao.to_rfc3339()),
        ConditionField::UltimoContato => Some(lead.ultimo_contato.to_rfc3339()),
        ConditionField::ProximoRetorno => lead.proximo_retorno.map(|d| d.to_rfc3339()),
        ConditionField::Tag | ConditionField::Unknown(_) => None,
    }
}

fn split_list(expected: &str) -> Vec<String> {
    expected
        .split([',', ';'])
        .map(normalize_text)
        .filter(|item| !item.is_empty())
        .collect()
}

// Número primeiro; senão data em milissegundos
fn comparable(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.replace(',', ".").parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    parse_instant(trimmed).map(|d| d.timestamp_millis() as f64)
}

fn compare_ordering(source: &str, expected: &str, operator: ConditionOperator) -> bool {
    let (Some(left), Some(right)) = (comparable(source), comparable(expected)) else {
        return false;
    };

    match operator {
        ConditionOperator::GreaterThan => left > right,
        ConditionOperator::GreaterOrEqual => left >= right,
        ConditionOperator::LessThan => left < right,
        ConditionOperator::LessOrEqual => left <= right,
        _ => false,
    }
}

// Valor ausente: só as formas negativas podem valer
fn matches_missing(expected: &str, operator: ConditionOperator) -> bool {
    match operator {
        ConditionOperator::NotEquals | ConditionOperator::NotContains => !normalize_text(expected).is_empty(),
        ConditionOperator::NotInList => !split_list(expected).is_empty(),
        _ => false,
    }
}

/// Compara um valor textual com o esperado, sem diferenciar caixa nem acentos.
pub fn match_text_condition(source: Option<&str>, expected: &str, operator: ConditionOperator) -> bool {
    let raw_source = source.unwrap_or_default();
    let value = normalize_text(raw_source);
    if value.is_empty() {
        return matches_missing(expected, operator);
    }

    let target = normalize_text(expected);
    match operator {
        ConditionOperator::Equals => value == target,
        ConditionOperator::NotEquals => value != target,
        ConditionOperator::Contains => !target.is_empty() && value.contains(&target),
        ConditionOperator::NotContains => target.is_empty() || !value.contains(&target),
        ConditionOperator::StartsWith => !target.is_empty() && value.starts_with(&target),
        ConditionOperator::EndsWith => !target.is_empty() && value.ends_with(&target),
        ConditionOperator::InList => split_list(expected).contains(&value),
        ConditionOperator::NotInList => !split_list(expected).contains(&value),
        ConditionOperator::GreaterThan
        | ConditionOperator::GreaterOrEqual
        | ConditionOperator::LessThan
        | ConditionOperator::LessOrEqual => compare_ordering(raw_source, expected, operator),
    }
}

/// Variante para o conjunto de tags: positivo se alguma tag atende, negativo se nenhuma.
pub fn match_tags_condition(tags: &[String], expected: &str, operator: ConditionOperator) -> bool {
    let present: Vec<&String> = tags.iter().filter(|t| !normalize_text(t).is_empty()).collect();
    if present.is_empty() {
        return matches_missing(expected, operator);
    }

    let any = |op: ConditionOperator| present.iter().any(|tag| match_text_condition(Some(tag.as_str()), expected, op));

    match operator {
        ConditionOperator::NotEquals => !any(ConditionOperator::Equals),
        ConditionOperator::NotContains => !any(ConditionOperator::Contains),
        ConditionOperator::NotInList => !any(ConditionOperator::InList),
        positive => any(positive),
    }
}

pub fn matches_flow_condition(condition: &FlowCondition, lead: &Lead, event: Option<&str>) -> bool {
    match &condition.field {
        ConditionField::Tag => match_tags_condition(&lead.tags, &condition.value, condition.operator),
        field => {
            let value = field_value(field, lead, event);
            match_text_condition(value.as_deref(), &condition.value, condition.operator)
        }
    }
}

// Sem evento (reavaliação no processador), condições de evento não se aplicam
fn applicable<'a>(
    conditions: &'a [FlowCondition],
    event: Option<&'a str>,
) -> impl Iterator<Item = &'a FlowCondition> + 'a {
    conditions
        .iter()
        .filter(move |c| event.is_some() || c.field != ConditionField::Event)
}

fn combine<'a>(
    mut conditions: impl Iterator<Item = &'a FlowCondition>,
    logic: ConditionLogic,
    lead: &Lead,
    event: Option<&str>,
) -> bool {
    match logic {
        ConditionLogic::All => conditions.all(|c| matches_flow_condition(c, lead, event)),
        ConditionLogic::Any => conditions.any(|c| matches_flow_condition(c, lead, event)),
    }
}

/// Condições do fluxo + `triggerStatus` (quando não há condição de status explícita).
/// Lista vazia casa com qualquer lead.
pub fn matches_auto_contact_flow(flow: &AutoContactFlow, lead: &Lead, event: Option<&str>) -> bool {
    let mut conditions: Vec<FlowCondition> = applicable(&flow.conditions, event).cloned().collect();

    if let Some(trigger) = flow.trigger_status.as_deref() {
        if !conditions.iter().any(|c| c.field == ConditionField::Status) {
            conditions.push(FlowCondition::new(ConditionField::Status, ConditionOperator::Equals, trigger));
        }
    }

    if conditions.is_empty() {
        return true;
    }
    combine(conditions.iter(), flow.condition_logic, lead, event)
}

/// Sem condições de saída configuradas, nunca sai.
pub fn should_exit_flow(flow: &AutoContactFlow, lead: &Lead, event: Option<&str>) -> bool {
    let exits: Vec<&FlowCondition> = applicable(&flow.exit_conditions, event).collect();
    if exits.is_empty() {
        return false;
    }
    combine(exits.into_iter(), flow.exit_condition_logic, lead, event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        automation::{FlowStep, SchedulingConfig, StepAction},
        lead::fixtures::sample_lead,
    };

    fn flow(conditions: Vec<FlowCondition>, logic: ConditionLogic) -> AutoContactFlow {
        AutoContactFlow {
            id: "f".into(),
            name: "Fluxo".into(),
            active: true,
            trigger_status: None,
            conditions,
            condition_logic: logic,
            exit_conditions: vec![],
            exit_condition_logic: ConditionLogic::Any,
            steps: vec![FlowStep { id: "s".into(), delay_hours: 0.0, action: StepAction::ArchiveLead }],
            scheduling: SchedulingConfig::default(),
        }
    }

    fn cond(field: ConditionField, operator: ConditionOperator, value: &str) -> FlowCondition {
        FlowCondition::new(field, operator, value)
    }

    #[test]
    fn text_comparison_ignores_case_and_accents() {
        assert!(match_text_condition(Some("São Paulo"), "sao paulo", ConditionOperator::Equals));
        assert!(match_text_condition(Some("  SÃO   paulo "), "São Paulo", ConditionOperator::Equals));
        assert!(match_text_condition(Some("Tráfego Pago"), "trafego", ConditionOperator::StartsWith));
        assert!(match_text_condition(Some("Tráfego Pago"), "PAGO", ConditionOperator::EndsWith));
        assert!(match_text_condition(Some("Tráfego Pago"), "fego", ConditionOperator::Contains));
    }

    #[test]
    fn in_list_and_not_in_list_are_complements() {
        let lists = ["Telein, Ully", "indicação;orgânico", "tráfego pago"];
        let sources = [Some("Telein"), Some("Indicacao"), Some("Ully "), Some("outro"), None, Some("")];

        for list in lists {
            for source in sources {
                let inside = match_text_condition(source, list, ConditionOperator::InList);
                let outside = match_text_condition(source, list, ConditionOperator::NotInList);
                assert_ne!(inside, outside, "{:?} em {:?}", source, list);
            }
        }
    }

    #[test]
    fn missing_values_only_match_negative_operators() {
        assert!(match_text_condition(None, "x", ConditionOperator::NotEquals));
        assert!(match_text_condition(Some("   "), "x", ConditionOperator::NotContains));
        assert!(!match_text_condition(None, "", ConditionOperator::NotEquals));
        assert!(!match_text_condition(None, "x", ConditionOperator::Equals));
        assert!(!match_text_condition(None, "1", ConditionOperator::GreaterThan));
    }

    #[test]
    fn ordering_parses_numbers_then_dates() {
        assert!(match_text_condition(Some("10"), "9", ConditionOperator::GreaterThan));
        assert!(match_text_condition(Some("2,5"), "2.5", ConditionOperator::GreaterOrEqual));
        assert!(match_text_condition(Some("2024-05-10T12:00:00Z"), "2024-06-01", ConditionOperator::LessThan));
        assert!(!match_text_condition(Some("abc"), "1", ConditionOperator::LessOrEqual));
    }

    #[test]
    fn date_fields_compare_chronologically() {
        let lead = sample_lead();
        let after = cond(ConditionField::DataCriacao, ConditionOperator::GreaterOrEqual, "2024-05-01");
        let before = cond(ConditionField::DataCriacao, ConditionOperator::LessThan, "2024-05-01");
        assert!(matches_flow_condition(&after, &lead, None));
        assert!(!matches_flow_condition(&before, &lead, None));

        // proximo_retorno ausente
        let retorno = cond(ConditionField::ProximoRetorno, ConditionOperator::LessThan, "2030-01-01");
        assert!(!matches_flow_condition(&retorno, &lead, None));
    }

    #[test]
    fn tags_use_array_semantics() {
        let lead = sample_lead();
        let has_vip = cond(ConditionField::Tag, ConditionOperator::Equals, "vip");
        let not_vip = cond(ConditionField::Tag, ConditionOperator::NotEquals, "vip");
        let premium = cond(ConditionField::Tag, ConditionOperator::Contains, "premium");
        let listed = cond(ConditionField::Tag, ConditionOperator::NotInList, "frio, quente");

        assert!(matches_flow_condition(&has_vip, &lead, None));
        assert!(!matches_flow_condition(&not_vip, &lead, None));
        assert!(matches_flow_condition(&premium, &lead, None));
        assert!(matches_flow_condition(&listed, &lead, None));

        let mut untagged = sample_lead();
        untagged.tags.clear();
        assert!(!matches_flow_condition(&has_vip, &untagged, None));
        assert!(matches_flow_condition(&not_vip, &untagged, None));
    }

    #[test]
    fn unknown_fields_have_no_value() {
        let lead = sample_lead();
        let c = cond(ConditionField::Unknown("cor".into()), ConditionOperator::Equals, "azul");
        assert!(!matches_flow_condition(&c, &lead, None));
    }

    #[test]
    fn empty_condition_list_matches_everything() {
        assert!(matches_auto_contact_flow(&flow(vec![], ConditionLogic::All), &sample_lead(), None));
    }

    #[test]
    fn any_versus_all_logic() {
        let lead = sample_lead();
        let conditions = vec![
            cond(ConditionField::Origem, ConditionOperator::Equals, "Trafego Pago"),
            cond(ConditionField::Cidade, ConditionOperator::Equals, "Rio de Janeiro"),
        ];

        assert!(matches_auto_contact_flow(&flow(conditions.clone(), ConditionLogic::Any), &lead, None));
        assert!(!matches_auto_contact_flow(&flow(conditions, ConditionLogic::All), &lead, None));
    }

    #[test]
    fn trigger_status_is_added_unless_status_condition_exists() {
        let lead = sample_lead();

        let mut by_trigger = flow(vec![], ConditionLogic::All);
        by_trigger.trigger_status = Some("Novo".into());
        assert!(!matches_auto_contact_flow(&by_trigger, &lead, None));

        let mut explicit = flow(
            vec![cond(ConditionField::Status, ConditionOperator::Contains, "proposta")],
            ConditionLogic::All,
        );
        explicit.trigger_status = Some("Novo".into());
        assert!(matches_auto_contact_flow(&explicit, &lead, None));
    }

    #[test]
    fn event_conditions_only_apply_when_an_event_is_given() {
        let lead = sample_lead();
        let on_create = flow(
            vec![cond(ConditionField::Event, ConditionOperator::Equals, EVENT_LEAD_CREATED)],
            ConditionLogic::All,
        );

        assert!(matches_auto_contact_flow(&on_create, &lead, Some(EVENT_LEAD_CREATED)));
        assert!(!matches_auto_contact_flow(&on_create, &lead, Some(EVENT_LEAD_UPDATED)));
        assert!(matches_auto_contact_flow(&on_create, &lead, None));
    }

    #[test]
    fn exit_conditions_default_to_any_and_empty_never_exits() {
        let lead = sample_lead();
        let mut f = flow(vec![], ConditionLogic::All);
        assert!(!should_exit_flow(&f, &lead, None));

        f.exit_conditions = vec![
            cond(ConditionField::Status, ConditionOperator::Equals, "Fechado"),
            cond(ConditionField::Tag, ConditionOperator::Equals, "VIP"),
        ];
        assert!(should_exit_flow(&f, &lead, None));

        f.exit_condition_logic = ConditionLogic::All;
        assert!(!should_exit_flow(&f, &lead, None));
    }
}
