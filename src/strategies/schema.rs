//! Free-text market question parsing.
//!
//! Turns a question such as "Will the high temperature in NYC be 90°F or above on June 1?"
//! into a [`ThresholdSchema`], and pulls a location and target date out of event text.
//! Every step returns an `Option` and the callers chain them in a fixed priority order.

use chrono::{Datelike, Days, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::strategies::types::{SchemaSide, ThresholdSchema};

pub const NO_DIRECTIONAL_THRESHOLD: &str =
    "Could not extract directional threshold (above/below) from market text.";
pub const ONLY_DIRECTIONAL_SUPPORTED: &str =
    "Only directional threshold temperature markets are supported.";

/// Location used when the text names none.
pub const DEFAULT_LOCATION: &str = "New York";

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            cached(&CELL, $re)
        }
    };
}

pattern!(explicit_unit_re, r"(?i)(-?\d+(?:\.\d+)?)\s*°\s*([CF])");
pattern!(bare_unit_re, r"(?i)(-?\d+(?:\.\d+)?)\s*([CF])\b");
pattern!(directional_value_re, r"(?i)(-?\d+(?:\.\d+)?)\s*(?:or\s+(?:above|below|higher|lower)|>=|<=)");
pattern!(high_re, r"(?i)\b(high(?:est)?|max(?:imum)?)\s+temperature\b|\bhigh(?:est)?\b");
pattern!(low_re, r"(?i)\blow(?:est)?\s+temperature\b|\blow(?:est)?\b");
pattern!(mentions_high_low_re, r"(?i)\b(?:high|low)\b");
pattern!(gte_phrase_re, r"\b(or\s+above|or\s+higher|at\s+least|greater\s+than)\b");
pattern!(lte_phrase_re, r"\b(or\s+below|or\s+lower|at\s+most|less\s+than)\b");
pattern!(whitespace_re, r"\s+");
pattern!(in_location_re, r"(?i)\bin\s+([A-Za-z][A-Za-z\s.'-]{2,})\b(?:\?|,| on | by | at |$)");
pattern!(for_location_re, r"(?i)\bfor\s+([A-Za-z][A-Za-z\s.'-]{2,})\b(?:\?|,| on | by | at |$)");
pattern!(iso_date_re, r"\b(20\d{2}-\d{2}-\d{2})\b");
pattern!(
    month_day_re,
    r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?(?:,\s*(20\d{2}))?"
);
pattern!(relative_day_re, r"(?i)\b(today|tomorrow)\b");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Gte,
    Lte,
}

/// Parse a market question into a directional temperature threshold.
pub fn parse_threshold_schema(question: &str) -> ThresholdSchema {
    let normalized = question.trim();

    if let Some(schema) = parse_directional_threshold(normalized) {
        return schema;
    }

    if mentions_high_low_re().is_match(normalized) {
        ThresholdSchema::unsupported(NO_DIRECTIONAL_THRESHOLD)
    } else {
        ThresholdSchema::unsupported(ONLY_DIRECTIONAL_SUPPORTED)
    }
}

fn parse_directional_threshold(text: &str) -> Option<ThresholdSchema> {
    let (value, unit) = extract_temperature(text)?;
    let operator = infer_operator(&text.to_lowercase())?;

    let is_high = high_re().is_match(text);
    let is_low = low_re().is_match(text);

    let threshold_f = match unit {
        Unit::Celsius => c_to_f(value),
        Unit::Fahrenheit => value,
    };

    // A question naming both quantities is ambiguous and stays unsupported.
    let side = match (is_high, is_low, operator) {
        (true, false, Operator::Gte) => SchemaSide::HighGte,
        (true, false, Operator::Lte) => SchemaSide::HighLte,
        (false, true, Operator::Gte) => SchemaSide::LowGte,
        (false, true, Operator::Lte) => SchemaSide::LowLte,
        _ => return None,
    };

    Some(ThresholdSchema::supported(side, threshold_f))
}

fn extract_temperature(text: &str) -> Option<(f64, Unit)> {
    let explicit = explicit_unit_re()
        .captures(text)
        .or_else(|| bare_unit_re().captures(text));

    if let Some(cap) = explicit {
        let value = cap[1].parse::<f64>().ok()?;
        let unit = if cap[2].eq_ignore_ascii_case("c") {
            Unit::Celsius
        } else {
            Unit::Fahrenheit
        };
        return Some((value, unit));
    }

    let cap = directional_value_re().captures(text)?;
    let value = cap[1].parse::<f64>().ok()?;
    Some((value, Unit::Fahrenheit))
}

fn infer_operator(lower: &str) -> Option<Operator> {
    if lower.contains(">=") {
        return Some(Operator::Gte);
    }
    if lower.contains("<=") {
        return Some(Operator::Lte);
    }
    if gte_phrase_re().is_match(lower) {
        return Some(Operator::Gte);
    }
    if lte_phrase_re().is_match(lower) {
        return Some(Operator::Lte);
    }
    None
}

fn c_to_f(c: f64) -> f64 {
    c * (9.0 / 5.0) + 32.0
}

/// Location and date a market question refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredTarget {
    pub location_name: String,
    pub target_date: NaiveDate,
}

/// Infer location and target date relative to the current UTC date.
pub fn infer_location_and_date(text: &str) -> Option<InferredTarget> {
    infer_location_and_date_on(text, Utc::now().date_naive())
}

/// Same as [`infer_location_and_date`] with an explicit "today".
///
/// Both halves fall back (to tomorrow and to [`DEFAULT_LOCATION`]), so this only
/// yields `None` if date arithmetic overflows.
pub fn infer_location_and_date_on(text: &str, today: NaiveDate) -> Option<InferredTarget> {
    let cleaned = whitespace_re().replace_all(text, " ");
    let cleaned = cleaned.trim();

    let target_date = infer_date(cleaned, today)?;
    let location_name = infer_location(cleaned)?;

    Some(InferredTarget {
        location_name,
        target_date,
    })
}

fn infer_location(text: &str) -> Option<String> {
    for re in [in_location_re(), for_location_re()] {
        if let Some(cap) = re.captures(text) {
            let name = cap[1].trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    Some(DEFAULT_LOCATION.to_string())
}

fn infer_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(cap) = iso_date_re().captures(text) {
        if let Ok(date) = NaiveDate::parse_from_str(&cap[1], "%Y-%m-%d") {
            return Some(date);
        }
    }

    if let Some(cap) = month_day_re().captures(text) {
        let year = cap
            .get(3)
            .and_then(|y| y.as_str().parse::<i32>().ok())
            .unwrap_or_else(|| today.year());
        let month = month_number(&cap[1]);
        let day = cap[2].parse::<u32>().ok();
        if let (Some(month), Some(day)) = (month, day) {
            if (1..=31).contains(&day) {
                // Day overflow rolls into the next month ("February 30" -> March 1/2).
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, 1)
                    .and_then(|first| first.checked_add_days(Days::new(u64::from(day - 1))))
                {
                    return Some(date);
                }
            }
        }
    }

    if let Some(cap) = relative_day_re().captures(text) {
        if cap[1].eq_ignore_ascii_case("tomorrow") {
            return today.checked_add_days(Days::new(1));
        }
        return Some(today);
    }

    today.checked_add_days(Days::new(1))
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .map(|idx| idx as u32 + 1)
}
