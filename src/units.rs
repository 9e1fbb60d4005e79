//! Large-number unit suffixes used by the game's price display

use regex::Regex;
use thiserror::Error;

/// Suffix ladder: (short name, power of ten)
const UNITS: &[(&str, i32)] = &[
    ("", 0),
    ("M", 6),
    ("B", 9),
    ("T", 12),
    ("q", 15),
    ("Q", 18),
    ("s", 21),
    ("S", 24),
    ("o", 27),
    ("N", 30),
    ("d", 33),
    ("U", 36),
    ("D", 39),
    ("Td", 42),
    ("qd", 45),
    ("Qd", 48),
];

const MAX_EXPONENT: i32 = 48;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("'{0}' is not an amount (expected e.g. 12.5B)")]
    Malformed(String),
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

fn exponent_of(short: &str) -> Option<i32> {
    UNITS.iter().find(|(s, _)| *s == short).map(|(_, exp)| *exp)
}

fn short_for(exponent: i32) -> &'static str {
    UNITS
        .iter()
        .rev()
        .find(|(_, exp)| *exp <= exponent)
        .map_or("", |(s, _)| *s)
}

/// Render an amount the way the game shows prices, e.g. `12.500 B`.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0.00".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    if magnitude <= 1 {
        format!("{:.2}", value)
    } else if magnitude <= 7 {
        format!("{:.0}", value)
    } else {
        let exponent = (magnitude - magnitude.rem_euclid(3)).min(MAX_EXPONENT);
        let short = short_for(exponent);
        let exponent = exponent_of(short).unwrap_or(0);
        format!("{:.3} {}", value / 10f64.powi(exponent), short)
    }
}

/// Parse `12.5B`, `12.5 B`, `3e6` or `42` into a plain number.
pub fn parse_amount(text: &str) -> Result<f64, AmountError> {
    let re = Regex::new(r"^\s*(-?\d+(?:\.\d*)?(?:[eE][+-]?\d+)?)\s*([A-Za-z]*)\s*$")?;
    let cap = re
        .captures(text)
        .ok_or_else(|| AmountError::Malformed(text.to_string()))?;

    let number: f64 = cap[1]
        .parse()
        .map_err(|_| AmountError::Malformed(text.to_string()))?;
    let exponent =
        exponent_of(&cap[2]).ok_or_else(|| AmountError::UnknownUnit(cap[2].to_string()))?;

    let value = number * 10f64.powi(exponent);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AmountError::Malformed(text.to_string()))
    }
}

/// Render seconds as `1d 02h 03m 04s`, dropping leading zero fields.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "never".to_string();
    }
    let total = seconds.max(0.0).round() as u64;
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, secs) = (rest / 60, rest % 60);

    if days > 0 {
        format!("{}d {:02}h {:02}m {:02}s", days, hours, minutes, secs)
    } else if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
