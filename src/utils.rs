use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];
const CURRENCY_CODES: &[&str] = &["aed", "dhs", "dh", "usd", "eur", "gbp", "sar", "inr"];

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parses a spreadsheet text cell into a decimal amount.
///
/// Handles the formats finance staff actually type:
/// - Thousands separators: "1,234,567.89"
/// - Currency symbols and codes: "$1,000", "AED 500", "250.00 USD"
/// - Accounting negatives: "(200.00)" and trailing minus "200-"
/// - Scientific notation: "1.5e3"
///
/// Returns None for blank or non-numeric text.
pub fn parse_amount(value: &str) -> Option<Decimal> {
    let mut body: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(*c, ',' | ' ' | '\u{a0}' | '\'') && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    if body.is_empty() {
        return None;
    }

    body = strip_currency_code(&body);

    let mut negative = false;
    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }
    if body.len() > 1 && body.ends_with('-') {
        negative = !negative;
        body.pop();
    }

    // Currency codes can sit inside the parentheses too: "(AED 200)"
    let body = strip_currency_code(&body);
    if body.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(&body)
        .or_else(|_| Decimal::from_scientific(&body))
        .ok()?;

    Some(if negative { -parsed } else { parsed })
}

fn strip_currency_code(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    for code in CURRENCY_CODES {
        if let Some(rest) = lower.strip_prefix(code) {
            let rest = rest.trim_start_matches('.');
            if rest.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '(' | '.')) {
                return body[body.len() - rest.len()..].to_string();
            }
        }
        if let Some(rest) = lower.strip_suffix(code) {
            if rest.ends_with(|c: char| c.is_ascii_digit() || matches!(c, ')' | '-')) {
                return body[..rest.len()].to_string();
            }
        }
    }
    body.to_string()
}

/// Sort key for a period label.
///
/// Labels that name a month ("Jan", "January 2024", "2024-01", "Jan-24")
/// order chronologically and before free-form labels, which order lexically.
/// A month without a year sorts as year 0 so "Jan" < "Feb" still holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PeriodKey {
    Month { year: i32, month: u32 },
    Label(String),
}

impl PeriodKey {
    pub fn from_label(label: &str) -> Self {
        match parse_period_label(label) {
            Some((year, month)) => PeriodKey::Month {
                year: year.unwrap_or(0),
                month,
            },
            None => PeriodKey::Label(label.trim().to_lowercase()),
        }
    }
}

/// Compares two period labels using [`PeriodKey`] ordering.
pub fn compare_periods(a: &str, b: &str) -> Ordering {
    PeriodKey::from_label(a).cmp(&PeriodKey::from_label(b))
}

/// Extracts (year, month) from a sheet name.
///
/// Accepts "YYYY-MM", "YYYY/MM", "MM-YYYY", a month name or three-letter
/// abbreviation optionally followed by a two- or four-digit year
/// ("Jan", "March 2024", "Feb-24", "sep_2023").
pub fn parse_period_label(label: &str) -> Option<(Option<i32>, u32)> {
    let lowered = label.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if let Some(numeric) = parse_numeric_period(&lowered) {
        return Some(numeric);
    }

    let parts: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '/' | '.' | '\''))
        .filter(|p| !p.is_empty())
        .collect();

    let month = parts.first().and_then(|name| month_from_name(name))?;

    let year = match parts.get(1) {
        None => None,
        Some(y) if parts.len() == 2 => Some(parse_year(y)?),
        Some(_) => return None,
    };

    Some((year, month))
}

fn parse_numeric_period(text: &str) -> Option<(Option<i32>, u32)> {
    let (first, second) = text.split_once(['-', '/'])?;
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(first) || !all_digits(second) {
        return None;
    }

    let (year, month) = match (first.len(), second.len()) {
        (4, 1..=2) => (first, second),
        (1..=2, 4) => (second, first),
        _ => return None,
    };

    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((Some(year.parse().ok()?), month))
}

fn month_from_name(name: &str) -> Option<u32> {
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|full| full.starts_with(name))
        .map(|idx| idx as u32 + 1)
}

fn parse_year(text: &str) -> Option<i32> {
    if !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i32 = text.parse().ok()?;
    match text.len() {
        2 => Some(2000 + value),
        4 => Some(value),
        _ => None,
    }
}
