//! Conversions between coin strings and smallest-unit amounts

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::types::Value;

/// Parse a decimal coin amount such as `"0.5"` or `"12"` into smallest units.
///
/// The fraction is right-padded to eight digits; more than eight is rejected.
pub fn parse_coins(s: &str) -> Result<Value> {
    let s = s.trim();
    let (integral, fraction) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if fraction.len() > COIN_DECIMALS {
        return Err(LedgerError::InvalidValue(format!(
            "{}: more than {} decimals",
            s, COIN_DECIMALS
        )));
    }
    if integral.is_empty() && fraction.is_empty() {
        return Err(LedgerError::InvalidValue("empty amount".into()));
    }
    let digits_ok = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits_ok(integral) || !digits_ok(fraction) {
        return Err(LedgerError::InvalidValue(format!("{}: not a decimal amount", s)));
    }

    let whole: Value = if integral.is_empty() {
        0
    } else {
        integral
            .parse()
            .map_err(|_| LedgerError::InvalidValue(format!("{}: out of range", s)))?
    };
    let mut padded = fraction.to_string();
    while padded.len() < COIN_DECIMALS {
        padded.push('0');
    }
    let frac: Value = padded
        .parse()
        .map_err(|_| LedgerError::InvalidValue(format!("{}: bad fraction", s)))?;

    whole
        .checked_mul(SATOSHIS_PER_COIN)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| LedgerError::InvalidValue(format!("{}: out of range", s)))
}

/// Parse a feed value string: with a `.` it is coins, otherwise smallest units
pub fn parse_value(s: &str) -> Result<Value> {
    let s = s.trim();
    if s.contains('.') {
        parse_coins(s)
    } else {
        s.parse()
            .map_err(|_| LedgerError::InvalidValue(format!("{}: not an integer amount", s)))
    }
}

/// Format smallest units as coins, trimming trailing zeros down to two decimals
pub fn format_coins(value: Value) -> String {
    let whole = value / SATOSHIS_PER_COIN;
    let mut frac = format!("{:08}", value % SATOSHIS_PER_COIN);
    while frac.len() > 2 && frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}", whole, frac)
}

/// Format smallest units as coins with all eight decimals
pub fn format_coins_fixed(value: Value) -> String {
    format!(
        "{}.{:08}",
        value / SATOSHIS_PER_COIN,
        value % SATOSHIS_PER_COIN
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coins() {
        assert_eq!(parse_coins("1").unwrap(), 100_000_000);
        assert_eq!(parse_coins("0.5").unwrap(), 50_000_000);
        assert_eq!(parse_coins(".00000001").unwrap(), 1);
        assert_eq!(parse_coins("21.00000000").unwrap(), 2_100_000_000);
    }

    #[test]
    fn test_parse_coins_rejects() {
        assert!(parse_coins("1.123456789").is_err());
        assert!(parse_coins("-1").is_err());
        assert!(parse_coins("abc").is_err());
        assert!(parse_coins(".").is_err());
    }

    #[test]
    fn test_parse_value_dispatch() {
        assert_eq!(parse_value("0.0001").unwrap(), 10_000);
        assert_eq!(parse_value("10000").unwrap(), 10_000);
        assert!(parse_value("1e5").is_err());
    }

    #[test]
    fn test_format_coins() {
        assert_eq!(format_coins(0), "0.00");
        assert_eq!(format_coins(100_000_000), "1.00");
        assert_eq!(format_coins(77_700_000), "0.777");
        assert_eq!(format_coins(1), "0.00000001");
        assert_eq!(format_coins_fixed(150_000_000), "1.50000000");
    }
}
