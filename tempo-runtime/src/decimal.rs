//! Decimal helpers shared by the pipeline and the quote engine.
//!
//! Monetary and token amounts never pass through binary floating point:
//! they travel as decimal strings on every wire format and are parsed into
//! `rust_decimal::Decimal` only where arithmetic happens.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Lenient parse used by the ledger writer: anything unparseable counts as 0,
/// matching the "skip zero-amount entries" derivation rule.
pub fn dec_or_zero(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

/// Strict parse used by the validator: the field must be a non-negative
/// decimal.
pub fn parse_non_negative(raw: &str) -> Option<Decimal> {
    let value = Decimal::from_str(raw.trim()).ok()?;
    if value.is_sign_negative() {
        return None;
    }
    Some(value)
}

/// Format `value` at the token's declared precision: round down to
/// `decimals` places, then strip trailing zeros.
pub fn format_at_scale(value: Decimal, decimals: u32) -> String {
    value
        .round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
        .normalize()
        .to_string()
}

/// Scale an integer amount of base units (decimal digit string, e.g. a
/// uint256 rendered in base 10) down by `decimals`, producing a plain decimal
/// string. Works on digit strings directly so reserves larger than any fixed
/// decimal type stay exact.
pub fn scale_base_units(raw_digits: &str, decimals: u32) -> String {
    let digits = raw_digits.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return "0".to_string();
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits.to_string();
    }

    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dec_or_zero_falls_back() {
        assert_eq!(dec_or_zero("1.5"), Decimal::new(15, 1));
        assert_eq!(dec_or_zero(""), Decimal::ZERO);
        assert_eq!(dec_or_zero("not-a-number"), Decimal::ZERO);
    }

    #[test]
    fn test_parse_non_negative_rejects_negative() {
        assert!(parse_non_negative("0").is_some());
        assert!(parse_non_negative("12.25").is_some());
        assert!(parse_non_negative("-0.01").is_none());
        assert!(parse_non_negative("abc").is_none());
    }

    #[test]
    fn test_format_at_scale_rounds_down_and_strips() {
        let v = Decimal::from_str("1.23456789").unwrap();
        assert_eq!(format_at_scale(v, 4), "1.2345");
        assert_eq!(format_at_scale(Decimal::from_str("3.1000").unwrap(), 8), "3.1");
        assert_eq!(format_at_scale(Decimal::ZERO, 18), "0");
    }

    #[test]
    fn test_scale_base_units() {
        assert_eq!(scale_base_units("1000000000000000000", 18), "1");
        assert_eq!(scale_base_units("1500000000000000000", 18), "1.5");
        assert_eq!(scale_base_units("42", 0), "42");
        assert_eq!(scale_base_units("42", 6), "0.000042");
        assert_eq!(scale_base_units("", 18), "0");
        // larger than any 96-bit decimal: stays exact
        assert_eq!(
            scale_base_units("123456789012345678901234567890123", 18),
            "123456789012345.678901234567890123"
        );
    }
}
