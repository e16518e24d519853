//! Canonicalizes the bank-statement/release-report decimal format: decimal
//! comma, thousands dot, leading minus for negatives (§4.7, §8 invariant 9).

use bigdecimal::BigDecimal;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("malformed statement amount: {0}")]
pub struct DecimalParseError(String);

/// `-1.234,56` -> `-1234.56`. Thousands separators are dots, the decimal
/// separator is a comma; a leading minus marks negatives.
pub fn parse_statement_amount(raw: &str) -> Result<BigDecimal, DecimalParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecimalParseError(raw.to_string()));
    }

    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed),
    };

    let normalized = rest.replace('.', "").replace(',', ".");
    let canonical = format!("{sign}{normalized}");

    BigDecimal::from_str(&canonical).map_err(|_| DecimalParseError(raw.to_string()))
}

/// `DD-MM-YYYY` as used throughout the bank-statement and release-report
/// formats (§4.7).
pub fn parse_statement_date(raw: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%d-%m-%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_canonical_example() {
        // Invariant 9: -1.234,56 -> -1234.56
        let parsed = parse_statement_amount("-1.234,56").unwrap();
        assert_eq!(parsed.to_string(), "-1234.56");
    }

    #[test]
    fn handles_values_without_thousands_separator() {
        let parsed = parse_statement_amount("193,03").unwrap();
        assert_eq!(parsed.to_string(), "193.03");
    }

    #[test]
    fn handles_negative_small_values() {
        let parsed = parse_statement_amount("-193,03").unwrap();
        assert_eq!(parsed.to_string(), "-193.03");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse_statement_amount("").is_err());
    }

    #[test]
    fn parses_ddmmyyyy_dates() {
        let date = parse_statement_date("15-02-2026").unwrap();
        assert_eq!(date.to_string(), "2026-02-15");
    }
}
