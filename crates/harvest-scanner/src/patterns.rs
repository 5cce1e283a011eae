//! Pattern Library: stateless field parsers over raw text.
//!
//! Every parser returns `Option`; a miss is resolved to the field's default
//! by the extraction pipeline, never surfaced as an error.

use chrono::{NaiveTime, Timelike};
use harvest_site::{LocaleRules, Meridiem};
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

const MINUTES_PER_DAY: i64 = 24 * 60;

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2}):(\d{2})(?:\s*([ap])\.?\s*m(?:\.|\b))?").expect("valid regex")
    })
}

fn money_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[$€£]\s*(\d[\d.,]*)(?:\s*([A-Z]{3})\b)?").expect("valid regex")
    })
}

fn hours_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(?:horas?|hours?|hrs?|h)(?:[^a-z]|$)").expect("valid regex")
    })
}

fn minutes_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(?:minutos?|minutes?|mins?|m)(?:[^a-z]|$)").expect("valid regex")
    })
}

/// Default capture for integer fields.
pub fn default_integer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("valid regex"))
}

/// Default capture for decimal fields.
pub fn default_decimal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("valid regex"))
}

/// Collapse runs of whitespace and trim.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `HH:MM` in the text, read on a 12-hour clock when followed by a
/// meridiem marker (`PM`, `p.m.`) or when the text carries one of the
/// locale's period words, otherwise on a 24-hour clock.
#[must_use]
pub fn parse_time(text: &str, locale: &LocaleRules) -> Option<NaiveTime> {
    let caps = time_regex().captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;

    let meridiem = match caps.get(3) {
        Some(m) if m.as_str().eq_ignore_ascii_case("a") => Some(Meridiem::Am),
        Some(_) => Some(Meridiem::Pm),
        None => period_word(text, locale),
    };

    let hour = match meridiem {
        Some(Meridiem::Am) if (1..=12).contains(&hour) => hour % 12,
        Some(Meridiem::Pm) if (1..=12).contains(&hour) => hour % 12 + 12,
        _ => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Earliest locale period word occurring in the text.
fn period_word(text: &str, locale: &LocaleRules) -> Option<Meridiem> {
    if locale.meridiem_words.is_empty() {
        return None;
    }

    let haystack = text.to_lowercase();
    locale
        .meridiem_words
        .iter()
        .filter_map(|(word, meridiem)| {
            haystack
                .find(&word.to_lowercase())
                .map(|pos| (pos, *meridiem))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, meridiem)| meridiem)
}

/// Parsed currency amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Money {
    /// Amount in currency units
    pub amount: f64,
    /// ISO 4217 code
    pub currency: String,
}

/// First currency-symbol-prefixed amount, e.g. `"$180.000 COP/noche"`.
///
/// Thousands separators are stripped and the locale decimal separator is
/// honoured. A trailing three-letter code names the currency; otherwise the
/// locale default applies.
#[must_use]
pub fn parse_money(text: &str, locale: &LocaleRules) -> Option<Money> {
    let caps = money_regex().captures(text)?;

    let is_separator = |c: char| c == locale.thousands_separator || c == locale.decimal_separator;
    let token = caps[1].trim_end_matches(is_separator);
    let normalized: String = token
        .chars()
        .filter(|c| *c != locale.thousands_separator)
        .map(|c| if c == locale.decimal_separator { '.' } else { c })
        .collect();
    let amount = normalized.parse::<f64>().ok()?;

    let currency = caps
        .get(2)
        .map_or_else(|| locale.default_currency.clone(), |m| m.as_str().to_string());

    Some(Money { amount, currency })
}

fn capture<'t>(text: &'t str, pattern: &Regex) -> Option<&'t str> {
    let caps = pattern.captures(text)?;
    caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str())
}

/// Whole number captured by the pattern (first group, or whole match).
#[must_use]
pub fn parse_integer(text: &str, pattern: &Regex) -> Option<i64> {
    let raw = capture(text, pattern)?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Fractional number captured by the pattern.
///
/// A token holding a single kind of separator treats it as the decimal
/// point ("4.85" and "4,85" both read 4.85); when both appear the locale
/// decides which one groups thousands.
#[must_use]
pub fn parse_decimal(text: &str, pattern: &Regex, locale: &LocaleRules) -> Option<f64> {
    let raw = capture(text, pattern)?.trim();

    let has_dot = raw.contains('.');
    let has_comma = raw.contains(',');

    let normalized: String = if has_dot && has_comma {
        raw.chars()
            .filter(|c| *c != locale.thousands_separator)
            .map(|c| if c == locale.decimal_separator { '.' } else { c })
            .collect()
    } else {
        raw.replace(',', ".")
    };

    normalized.parse().ok()
}

/// Span written out as hours and/or minutes ("1h 30m", "2 horas 5 minutos").
#[must_use]
pub fn parse_duration(text: &str) -> Option<Elapsed> {
    let hours = hours_regex()
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok());
    let minutes = minutes_regex()
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok());

    if hours.is_none() && minutes.is_none() {
        return None;
    }

    let total = hours
        .unwrap_or(0)
        .checked_mul(60)?
        .checked_add(minutes.unwrap_or(0))?;
    Some(Elapsed::from_minutes(total))
}

/// First known label present in the text (declaration order wins), else
/// the pattern's capture.
#[must_use]
pub fn match_category(text: &str, labels: &[String], pattern: Option<&Regex>) -> Option<String> {
    let haystack = text.to_lowercase();

    labels
        .iter()
        .find(|label| haystack.contains(&label.to_lowercase()))
        .cloned()
        .or_else(|| pattern.and_then(|p| capture_text(text, p)))
}

/// Pattern capture with whitespace collapsed; `None` when empty.
#[must_use]
pub fn capture_text(text: &str, pattern: &Regex) -> Option<String> {
    let cleaned = clean_text(capture(text, pattern)?);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Time elapsed between two clock readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    minutes: u32,
}

impl Elapsed {
    /// Build from a minute count.
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    /// Time from `start` to `end` on the same day; an `end` earlier than
    /// `start` is taken as the next day (overnight departures).
    #[must_use]
    pub fn between(start: NaiveTime, end: NaiveTime) -> Self {
        let start = i64::from(start.num_seconds_from_midnight() / 60);
        let end = i64::from(end.num_seconds_from_midnight() / 60);

        let mut diff = end - start;
        if diff < 0 {
            diff += MINUTES_PER_DAY;
        }

        Self {
            minutes: u32::try_from(diff).unwrap_or(0),
        }
    }

    /// Total minutes
    #[must_use]
    pub fn total_minutes(&self) -> u32 {
        self.minutes
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.minutes / 60;
        let minutes = self.minutes % 60;

        let hours_text = match hours {
            1 => "1 hora".to_string(),
            h => format!("{h} horas"),
        };
        let minutes_text = match minutes {
            1 => "1 minuto".to_string(),
            m => format!("{m} minutos"),
        };

        match (hours, minutes) {
            (0, _) => f.write_str(&minutes_text),
            (_, 0) => f.write_str(&hours_text),
            _ => write!(f, "{hours_text} {minutes_text}"),
        }
    }
}

impl Serialize for Elapsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Elapsed", 2)?;
        state.serialize_field("minutes", &self.minutes)?;
        state.serialize_field("text", &self.to_string())?;
        state.end()
    }
}
