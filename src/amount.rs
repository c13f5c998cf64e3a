//! Monetary amount helpers: half-up rounding, locale-tolerant parsing and
//! the JSON representation used on the wire.

use bigdecimal::num_bigint::Sign;
use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

use crate::types::{LedgerError, LedgerResult};

/// Number of decimal places kept for every amount in a ledger entry.
pub const MONEY_SCALE: i64 = 2;

/// Largest difference tolerated between total debits and total credits.
pub fn tolerance() -> BigDecimal {
    BigDecimal::new(1.into(), MONEY_SCALE)
}

/// Largest amount accepted on an invoice line or an imported row. JSON
/// numbers are doubles, which hold every cent exactly up to this size.
pub fn max_amount() -> BigDecimal {
    BigDecimal::new(999_999_999_999_i64.into(), MONEY_SCALE)
}

/// Round to two decimal places, ties away from zero.
pub fn round_half_up(value: &BigDecimal) -> BigDecimal {
    // zero comes back with scale 0 otherwise
    value
        .with_scale_round(MONEY_SCALE, RoundingMode::HalfUp)
        .with_scale(MONEY_SCALE)
}

/// Round an invoice amount and check it is positive and within
/// [`max_amount`]. Amounts rounding to 0.00 are rejected.
pub fn checked_amount(value: &BigDecimal) -> LedgerResult<BigDecimal> {
    let rounded = round_half_up(value);
    if rounded <= BigDecimal::from(0) {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be at least 0.01, got {value}"
        )));
    }
    if rounded > max_amount() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount {value} exceeds the maximum of {}",
            max_amount()
        )));
    }
    Ok(rounded)
}

/// Format with exactly two decimals, optionally using a decimal comma.
pub fn format_amount(value: &BigDecimal, decimal_comma: bool) -> String {
    let (cents, _) = round_half_up(value).into_bigint_and_exponent();
    let sign = if cents.sign() == Sign::Minus { "-" } else { "" };
    let magnitude = cents.magnitude();
    let separator = if decimal_comma { ',' } else { '.' };
    format!("{sign}{}{separator}{:02}", magnitude / 100u32, magnitude % 100u32)
}

/// Parse an amount written either in European (`1.234,56`) or
/// US (`1,234.56`) notation, with or without a currency symbol.
pub fn parse_amount(raw: &str) -> LedgerResult<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches("EUR")
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err(LedgerError::InvalidAmount(format!(
            "'{raw}' is not a number"
        )));
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (None, Some(_)) if cleaned.matches(',').count() > 1 => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    BigDecimal::from_str(&normalized)
        .map_err(|_| LedgerError::InvalidAmount(format!("'{raw}' is not a number")))
}

/// Interpret a JSON value (number or string) as an amount.
pub fn from_json(value: &serde_json::Value) -> LedgerResult<BigDecimal> {
    match value {
        // Display of a JSON number is its shortest round-trip form, so
        // 10.005 stays 10.005 for anything up to 15 significant digits.
        serde_json::Value::Number(number) => BigDecimal::from_str(&number.to_string())
            .map_err(|_| LedgerError::InvalidAmount(format!("'{number}' is not a number"))),
        serde_json::Value::String(text) => parse_amount(text),
        other => Err(LedgerError::InvalidAmount(format!(
            "expected a number, found {other}"
        ))),
    }
}

/// Serde adapter writing amounts as JSON numbers and reading them from
/// numbers or strings.
pub mod serde_number {
    use bigdecimal::{BigDecimal, ToPrimitive};
    use serde::{de, ser, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        let rounded = super::round_half_up(value);
        if rounded.abs() > super::max_amount() {
            return Err(ser::Error::custom(format!("amount {value} out of range")));
        }
        let number = rounded
            .to_f64()
            .ok_or_else(|| ser::Error::custom(format!("amount {value} out of range")))?;
        serializer.serialize_f64(number)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let value = match RawAmount::deserialize(deserializer)? {
            RawAmount::Number(number) => {
                BigDecimal::from_str(&number.to_string()).map_err(de::Error::custom)?
            }
            RawAmount::Text(text) => super::parse_amount(&text).map_err(de::Error::custom)?,
        };
        if value.abs() > super::max_amount() {
            return Err(de::Error::custom(format!("amount {value} out of range")));
        }
        Ok(value)
    }
}
