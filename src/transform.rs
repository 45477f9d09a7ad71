//! Value transformations applied by the field mapper
//!
//! Every function here is total: input it cannot interpret yields `None`, so
//! a bad field degrades to null without affecting the rest of the record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

lazy_static! {
    static ref NORMALIZED_DATE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref LEADING_ISO_DATE: Regex = Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ]").unwrap();
    static ref EPOCH_DIGITS: Regex = Regex::new(r"^\d{9,13}(\.\d+)?$").unwrap();
    static ref ORDINAL_SUFFIX: Regex = Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap();
    static ref SIGNED_INTEGER: Regex = Regex::new(r"-?\d[\d,]*").unwrap();
    static ref DECIMAL: Regex = Regex::new(r"-?\d[\d,]*(?:\.\d+)?|-?\.\d+").unwrap();
    static ref CURRENCY_CODE: Regex = Regex::new(
        r"\b(USD|EUR|GBP|INR|JPY|CAD|AUD|CNY|KRW|CHF|SEK|MXN|BRL|SGD|HKD|NZD|ZAR|AED)\b"
    )
    .unwrap();
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
];

/// Month-first before day-first for slash dates, matching US export defaults.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B, %Y",
    "%A, %B %d, %Y",
];

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("CA$", "CAD"),
    ("A$", "AUD"),
    ("Rs.", "INR"),
    ("₹", "INR"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₩", "KRW"),
    ("$", "USD"),
];

/// Normalize any supported date representation to `YYYY-MM-DD`.
pub fn normalize_date(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().and_then(date_from_epoch),
        Value::String(s) => normalize_date_str(s),
        _ => None,
    }
}

pub fn normalize_date_str(input: &str) -> Option<String> {
    let mut text = input.trim();
    if text.is_empty() {
        return None;
    }
    if NORMALIZED_DATE.is_match(text) {
        return NaiveDate::parse_from_str(text, DATE_FORMAT)
            .ok()
            .map(|d| d.format(DATE_FORMAT).to_string());
    }
    // "Reviewed in India on 5 March 2023"
    if let Some((_, tail)) = text.split_once(" on ") {
        text = tail.trim();
    }
    if EPOCH_DIGITS.is_match(text) {
        return text.parse::<f64>().ok().and_then(date_from_epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.format(DATE_FORMAT).to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.format(DATE_FORMAT).to_string());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.format(DATE_FORMAT).to_string());
        }
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(text, "$1");
    let cleaned = cleaned.trim_end_matches('.').trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
            return Some(date.format(DATE_FORMAT).to_string());
        }
    }

    // Timestamps with offsets chrono will not take, e.g. "2024-03-05T10:00:00+0000 UTC"
    LEADING_ISO_DATE
        .captures(text)
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], DATE_FORMAT).ok())
        .map(|d| d.format(DATE_FORMAT).to_string())
}

/// Seconds, or milliseconds when the magnitude says so. Values below 1973
/// are more likely counts or years than timestamps.
fn date_from_epoch(raw: f64) -> Option<String> {
    if !raw.is_finite() || raw < 100_000_000.0 {
        return None;
    }
    let seconds = if raw >= 100_000_000_000.0 { raw / 1000.0 } else { raw };
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0).map(|dt| dt.format(DATE_FORMAT).to_string())
}

/// Parse integers out of numbers or free text ("1,204 people found this helpful").
pub fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_integer_str(s),
        _ => None,
    }
}

pub fn parse_integer_str(text: &str) -> Option<i64> {
    if let Some(m) = SIGNED_INTEGER.find(text) {
        return m.as_str().replace(',', "").parse::<i64>().ok();
    }
    // Amazon writes a single vote as "One person found this helpful"
    let lowered = text.trim().to_lowercase();
    if lowered.starts_with("one ") || lowered.starts_with("a person") {
        return Some(1);
    }
    None
}

/// First decimal number in the value.
pub fn parse_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_decimal_token(s).and_then(|t| t.parse::<f64>().ok()),
        _ => None,
    }
}

fn first_decimal_token(text: &str) -> Option<String> {
    DECIMAL.find(text).map(|m| m.as_str().replace(',', ""))
}

/// Star-rating text as it is stored on a post: just the numeric token, e.g. "4.5".
pub fn star_rating_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => first_decimal_token(s),
        _ => None,
    }
}

/// Split a combined price such as "$19.99" or "19.99 EUR" into amount and currency code.
pub fn parse_price(value: &Value) -> (Option<f64>, Option<String>) {
    match value {
        Value::Number(n) => (n.as_f64(), None),
        Value::String(s) => {
            let amount = first_decimal_token(s).and_then(|t| t.parse::<f64>().ok());
            (amount, currency_in_text(s))
        }
        _ => (None, None),
    }
}

/// Normalize a currency field ("usd", "$", "EUR") to an ISO code.
pub fn normalize_currency(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if text.len() == 3 && text.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(text.to_ascii_uppercase());
    }
    currency_in_text(text)
}

fn currency_in_text(text: &str) -> Option<String> {
    if let Some(caps) = CURRENCY_CODE.captures(text) {
        return Some(caps[1].to_string());
    }
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| text.contains(symbol))
        .map(|(_, code)| code.to_string())
}

/// Plain text field: strings trimmed, numbers rendered, everything else absent.
pub fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_date_is_unchanged() {
        assert_eq!(normalize_date_str("2024-02-29").as_deref(), Some("2024-02-29"));
        let once = normalize_date_str("March 5, 2023").unwrap();
        assert_eq!(normalize_date_str(&once), Some(once.clone()));
    }

    #[test]
    fn test_invalid_normalized_shape_is_null() {
        assert_eq!(normalize_date_str("2023-02-30"), None);
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(normalize_date_str("2023-07-14 18:22:05").as_deref(), Some("2023-07-14"));
        assert_eq!(normalize_date_str("2023-07-14 18:22:05.123456").as_deref(), Some("2023-07-14"));
        assert_eq!(normalize_date_str("2023-07-14T18:22:05Z").as_deref(), Some("2023-07-14"));
        assert_eq!(
            normalize_date_str("Fri, 14 Jul 2023 18:22:05 +0000").as_deref(),
            Some("2023-07-14")
        );
    }

    #[test]
    fn test_locale_formats() {
        assert_eq!(
            normalize_date_str("Reviewed in India on 5 March 2023").as_deref(),
            Some("2023-03-05")
        );
        assert_eq!(normalize_date_str("5th March 2023").as_deref(), Some("2023-03-05"));
        assert_eq!(normalize_date_str("Mar 5, 2023").as_deref(), Some("2023-03-05"));
        assert_eq!(normalize_date_str("03/05/2023").as_deref(), Some("2023-03-05"));
        assert_eq!(normalize_date_str("25/12/2022").as_deref(), Some("2022-12-25"));
    }

    #[test]
    fn test_epoch_values() {
        assert_eq!(normalize_date(&json!(1_700_000_000)).as_deref(), Some("2023-11-14"));
        assert_eq!(normalize_date(&json!(1_700_000_000_000_i64)).as_deref(), Some("2023-11-14"));
        assert_eq!(normalize_date(&json!("1700000000")).as_deref(), Some("2023-11-14"));
        assert_eq!(normalize_date(&json!(1_700_000_000.5)).as_deref(), Some("2023-11-14"));
    }

    #[test]
    fn test_unparseable_date_is_null() {
        assert_eq!(normalize_date_str("3 weeks ago"), None);
        assert_eq!(normalize_date_str(""), None);
        assert_eq!(normalize_date(&json!(true)), None);
    }

    #[test]
    fn test_integer_from_free_text() {
        assert_eq!(parse_integer(&json!("1,204 people found this helpful")), Some(1204));
        assert_eq!(parse_integer(&json!("One person found this helpful")), Some(1));
        assert_eq!(parse_integer(&json!("nobody")), None);
        assert_eq!(parse_integer(&json!(-5)), Some(-5));
        assert_eq!(parse_integer(&json!("12,345 ratings")), Some(12345));
    }

    #[test]
    fn test_price_and_currency() {
        assert_eq!(parse_price(&json!("$19.99")), (Some(19.99), Some("USD".to_string())));
        assert_eq!(parse_price(&json!("₹1,299.00")), (Some(1299.0), Some("INR".to_string())));
        assert_eq!(parse_price(&json!("19.99 EUR")), (Some(19.99), Some("EUR".to_string())));
        assert_eq!(parse_price(&json!("1500")), (Some(1500.0), None));
        assert_eq!(parse_price(&json!("call for price")), (None, None));
    }

    #[test]
    fn test_currency_field_normalization() {
        assert_eq!(normalize_currency(&json!("usd")).as_deref(), Some("USD"));
        assert_eq!(normalize_currency(&json!("£")).as_deref(), Some("GBP"));
        assert_eq!(normalize_currency(&json!("")), None);
    }

    #[test]
    fn test_star_rating_text_and_number() {
        assert_eq!(star_rating_text(&json!("4.5 out of 5 stars")).as_deref(), Some("4.5"));
        assert_eq!(parse_decimal(&json!("5.0 out of 5 stars")), Some(5.0));
        assert_eq!(star_rating_text(&json!(4)).as_deref(), Some("4"));
        assert_eq!(star_rating_text(&json!("no rating")), None);
    }
}
