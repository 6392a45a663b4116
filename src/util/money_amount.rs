use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// Represents a price-like numeric value in human-readable currency format.
/// Accepts strings like "$0.50", "1,000", or raw numbers.
///
/// Challenge amounts and auto-pay ceilings are USD-denominated decimals;
/// conversion to on-chain token units happens in [`MoneyAmount::as_token_units`].
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct MoneyAmount(pub Decimal);

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error("Amount must be at most {}", money_amount::MAX_STR)]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
}

mod money_amount {
    use super::*;
    use once_cell::sync::Lazy;

    pub const MAX_STR: &str = "999999999";

    pub static MAX: Lazy<Decimal> =
        Lazy::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

impl MoneyAmount {
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        // Remove anything that isn't digit, dot, minus
        let cleaned = Regex::new(r"[^\d\.\-]+")
            .unwrap()
            .replace_all(input, "")
            .to_string();

        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }

        if parsed > *money_amount::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }

        Ok(MoneyAmount(parsed))
    }

    /// Converts this USD-denominated amount to the token's native integer
    /// unit: multiply by `10^decimals` and truncate. Truncation rather than
    /// rounding keeps the client from ever requesting more units than the
    /// decimal amount covers.
    pub fn as_token_units(&self, decimals: u32) -> Result<u64, MoneyAmountParseError> {
        let factor = 10u64
            .checked_pow(decimals)
            .map(Decimal::from)
            .ok_or(MoneyAmountParseError::OutOfRange)?;
        let scaled = self
            .0
            .checked_mul(factor)
            .ok_or(MoneyAmountParseError::OutOfRange)?
            .trunc();
        scaled.to_u64().ok_or(MoneyAmountParseError::OutOfRange)
    }
}

/// Formats an integer token-unit amount back into a decimal string, e.g.
/// `12345677` with 6 decimals becomes `"12.345677"`. Used in balance errors.
pub fn format_units(units: u64, decimals: u32) -> String {
    let decimal = Decimal::from_i128_with_scale(units as i128, decimals);
    MoneyAmount(decimal.normalize()).to_string()
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::from_str(value)
    }
}

impl From<u64> for MoneyAmount {
    fn from(value: u64) -> Self {
        MoneyAmount(Decimal::from(value))
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MoneyAmount::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_currency_formats() {
        assert_eq!(
            MoneyAmount::parse("0.50").unwrap(),
            MoneyAmount::parse("$0.50").unwrap()
        );
        assert_eq!(MoneyAmount::parse("1,000").unwrap().to_string(), "1000");
    }

    #[test]
    fn rejects_negative() {
        assert!(matches!(
            MoneyAmount::parse("-1.50"),
            Err(MoneyAmountParseError::Negative)
        ));
    }

    #[test]
    fn zero_is_allowed() {
        assert_eq!(MoneyAmount::parse("0").unwrap().to_string(), "0");
    }

    #[test]
    fn token_units_exact_for_six_decimals() {
        let amount = MoneyAmount::parse("12.345678").unwrap();
        assert_eq!(amount.as_token_units(6).unwrap(), 12_345_678);
    }

    #[test]
    fn token_units_truncate_excess_precision() {
        // 0.0000019 has 7 fractional digits; the 7th is dropped, not rounded.
        let amount = MoneyAmount::parse("0.0000019").unwrap();
        assert_eq!(amount.as_token_units(6).unwrap(), 1);
    }

    #[test]
    fn token_units_for_half_dollar() {
        let amount = MoneyAmount::parse("0.50").unwrap();
        assert_eq!(amount.as_token_units(6).unwrap(), 500_000);
    }

    #[test]
    fn token_units_reject_oversized_decimals() {
        let amount = MoneyAmount::parse("1").unwrap();
        assert_eq!(amount.as_token_units(19).unwrap(), 10_000_000_000_000_000_000);
        assert!(matches!(
            amount.as_token_units(20),
            Err(MoneyAmountParseError::OutOfRange)
        ));
        assert!(matches!(
            amount.as_token_units(200),
            Err(MoneyAmountParseError::OutOfRange)
        ));
    }

    #[test]
    fn formats_units_back_to_decimal() {
        assert_eq!(format_units(12_345_677, 6), "12.345677");
        assert_eq!(format_units(500_000, 6), "0.5");
        assert_eq!(format_units(0, 6), "0");
    }

    #[test]
    fn roundtrips_through_serde_as_string() {
        let amount = MoneyAmount::parse("0.50").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"0.5\"");
        let back: MoneyAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
