// src/services/send_window.rs
//
// Janela de envio: fuso IANA, dias da semana ISO (1 = segunda) e faixa de horário.
// Todo cálculo é feito no horário local do fuso configurado.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::{
    models::automation::{DEFAULT_END_HOUR, DEFAULT_START_HOUR, SchedulingConfig},
    services::business_days::local_to_utc,
};

// Pouco mais de um ano: termina mesmo com configuração ruim
const MAX_CANDIDATE_DAYS: usize = 370;

fn parse_hour(raw: &str) -> Option<NaiveTime> {
    let mut pieces = raw.trim().splitn(2, ':');
    let hour: u32 = pieces.next()?.trim().parse().ok()?;
    let minute: u32 = match pieces.next() {
        Some(m) => m.trim().get(..2).unwrap_or(m.trim()).parse().ok()?,
        None => 0,
    };

    if hour == 24 && minute == 0 {
        return NaiveTime::from_hms_opt(23, 59, 59);
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Janela já resolvida: nada opcional, pronta para o cálculo.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWindow {
    pub tz: Tz,
    pub start: NaiveTime,
    pub end: NaiveTime,
    // Índice 1..=7 (ISO)
    weekdays: [bool; 8],
    pub daily_send_limit: Option<u32>,
}

impl ResolvedWindow {
    pub fn resolve(config: &SchedulingConfig, fallback_tz: Tz) -> Self {
        let tz = match config.timezone.as_deref() {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(timezone = name, "Fuso horário inválido na configuração; usando o padrão");
                fallback_tz
            }),
            None => fallback_tz,
        };

        let default_start = parse_hour(DEFAULT_START_HOUR).unwrap_or(NaiveTime::MIN);
        let default_end = parse_hour(DEFAULT_END_HOUR).unwrap_or(NaiveTime::MIN);

        let mut start = config.start_hour.as_deref().and_then(parse_hour).unwrap_or(default_start);
        let mut end = config.end_hour.as_deref().and_then(parse_hour).unwrap_or(default_end);

        // Faixa invertida ou vazia nunca teria horário válido
        if end <= start {
            tracing::warn!(%start, %end, "Faixa de horário inválida; usando 08:00-19:00");
            start = default_start;
            end = default_end;
        }

        let mut weekdays = [false; 8];
        match config.allowed_weekdays.as_deref() {
            Some(days) if !days.is_empty() => {
                for day in days.iter().filter(|d| (1..=7).contains(*d)) {
                    weekdays[*day as usize] = true;
                }
            }
            // Lista vazia ou ausente: todos os dias
            _ => weekdays[1..].fill(true),
        }

        Self { tz, start, end, weekdays, daily_send_limit: config.daily_send_limit }
    }

    fn allows_weekday(&self, local: &NaiveDateTime) -> bool {
        self.weekdays[local.weekday().number_from_monday() as usize]
    }

    fn within_hours(&self, local: &NaiveDateTime) -> bool {
        let time = local.time();
        time >= self.start && time <= self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.tz).naive_local();
        self.allows_weekday(&local) && self.within_hours(&local)
    }

    /// Próximo instante dentro da janela. Instante já válido volta inalterado.
    pub fn next_allowed(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        let mut candidate = reference.with_timezone(&self.tz).naive_local();
        let mut moved = false;

        for _ in 0..MAX_CANDIDATE_DAYS {
            if !self.allows_weekday(&candidate) || candidate.time() > self.end {
                let Some(next_day) = candidate.date().succ_opt() else { break };
                candidate = next_day.and_time(self.start);
                moved = true;
                continue;
            }

            if candidate.time() < self.start {
                candidate = candidate.date().and_time(self.start);
                moved = true;
            }

            if !moved {
                return reference;
            }

            let instant = local_to_utc(self.tz, candidate);
            // O ajuste de horário de verão pode empurrar para fora da faixa
            if self.contains(instant) {
                return instant;
            }
            candidate = instant.with_timezone(&self.tz).naive_local();
        }

        tracing::warn!(%reference, "Nenhuma janela de envio encontrada; mantendo o horário original");
        reference
    }

    /// Início e fim (exclusivo) do dia local que contém `instant`.
    pub fn local_day_bounds(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = instant.with_timezone(&self.tz).date_naive();
        let start = local_to_utc(self.tz, date.and_time(NaiveTime::MIN));
        let end = date
            .succ_opt()
            .map(|next| local_to_utc(self.tz, next.and_time(NaiveTime::MIN)))
            .unwrap_or(start + Duration::days(1));
        (start, end)
    }
}

pub fn get_next_allowed_send_at(reference: DateTime<Utc>, config: &SchedulingConfig, fallback_tz: Tz) -> DateTime<Utc> {
    ResolvedWindow::resolve(config, fallback_tz).next_allowed(reference)
}

pub fn greeting(instant: DateTime<Utc>, tz: Tz) -> &'static str {
    match instant.with_timezone(&tz).hour() {
        5..=11 => "Bom dia",
        12..=17 => "Boa tarde",
        _ => "Boa noite",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{New_York, Sao_Paulo};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn business_hours() -> SchedulingConfig {
        SchedulingConfig {
            timezone: Some("America/Sao_Paulo".into()),
            start_hour: Some("08:00".into()),
            end_hour: Some("19:00".into()),
            allowed_weekdays: Some(vec![1, 2, 3, 4, 5]),
            daily_send_limit: None,
        }
    }

    #[test]
    fn in_window_instant_is_returned_unchanged() {
        let t = at("2024-05-15T10:17:23.456-03:00");
        let next = get_next_allowed_send_at(t, &business_hours(), Sao_Paulo);
        assert_eq!(next, t);
        assert_eq!(get_next_allowed_send_at(next, &business_hours(), Sao_Paulo), next);
    }

    #[test]
    fn saturday_moves_to_monday_start() {
        let next = get_next_allowed_send_at(at("2024-05-18T10:00:00-03:00"), &business_hours(), Sao_Paulo);
        assert_eq!(next, at("2024-05-20T08:00:00-03:00"));
    }

    #[test]
    fn before_start_snaps_to_start_same_day() {
        let next = get_next_allowed_send_at(at("2024-05-15T06:30:00-03:00"), &business_hours(), Sao_Paulo);
        assert_eq!(next, at("2024-05-15T08:00:00-03:00"));
    }

    #[test]
    fn after_end_moves_to_next_allowed_day() {
        let next = get_next_allowed_send_at(at("2024-05-17T19:30:00-03:00"), &business_hours(), Sao_Paulo);
        assert_eq!(next, at("2024-05-20T08:00:00-03:00"));
    }

    #[test]
    fn empty_weekday_list_allows_every_day() {
        let mut config = business_hours();
        config.allowed_weekdays = Some(vec![]);
        let saturday = at("2024-05-18T10:00:00-03:00");
        assert_eq!(get_next_allowed_send_at(saturday, &config, Sao_Paulo), saturday);
    }

    #[test]
    fn missing_fields_use_defaults_and_fallback_zone() {
        let window = ResolvedWindow::resolve(&SchedulingConfig::default(), Sao_Paulo);
        assert_eq!(window.tz, Sao_Paulo);
        assert_eq!(window.start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(window.end, NaiveTime::from_hms_opt(19, 0, 0).unwrap());

        let mut config = business_hours();
        config.timezone = Some("Lua/Crateras".into());
        assert_eq!(ResolvedWindow::resolve(&config, Sao_Paulo).tz, Sao_Paulo);
    }

    #[test]
    fn result_always_lands_inside_window() {
        let config = business_hours();
        let window = ResolvedWindow::resolve(&config, Sao_Paulo);
        let mut t = at("2024-05-13T00:00:00-03:00");
        for _ in 0..(24 * 8) {
            let next = window.next_allowed(t);
            assert!(window.contains(next), "{} -> {}", t, next);
            assert!(next >= t);
            t += Duration::minutes(53);
        }
    }

    #[test]
    fn dst_gap_start_is_shifted_into_existing_time() {
        // 2024-03-10: em Nova York 02:00 pula para 03:00
        let config = SchedulingConfig {
            timezone: Some("America/New_York".into()),
            start_hour: Some("02:30".into()),
            end_hour: Some("05:00".into()),
            allowed_weekdays: None,
            daily_send_limit: None,
        };
        let window = ResolvedWindow::resolve(&config, Sao_Paulo);
        let next = window.next_allowed(at("2024-03-10T01:00:00-05:00"));
        assert_eq!(next, at("2024-03-10T03:30:00-04:00"));
        assert_eq!(window.tz, New_York);
    }

    #[test]
    fn local_day_bounds_follow_timezone() {
        let window = ResolvedWindow::resolve(&business_hours(), Sao_Paulo);
        let (start, end) = window.local_day_bounds(at("2024-05-15T01:00:00Z"));
        assert_eq!(start, at("2024-05-14T00:00:00-03:00"));
        assert_eq!(end, at("2024-05-15T00:00:00-03:00"));
    }

    #[test]
    fn greeting_follows_local_hour() {
        assert_eq!(greeting(at("2024-05-15T14:59:00Z"), Sao_Paulo), "Bom dia");
        assert_eq!(greeting(at("2024-05-15T15:00:00Z"), Sao_Paulo), "Boa tarde");
        assert_eq!(greeting(at("2024-05-15T21:00:00Z"), Sao_Paulo), "Boa noite");
        assert_eq!(greeting(at("2024-05-15T07:00:00Z"), Sao_Paulo), "Boa noite");
    }
}
