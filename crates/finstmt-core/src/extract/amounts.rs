//! Amount parsing for statement text.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a printed amount into a signed decimal.
///
/// Handles `$`, thousands commas, a leading `-`/`+`, parentheses and a
/// trailing `-` (negative), and `CR`/`DR` suffixes (credit positive,
/// debit negative).
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    let mut negative = false;

    let upper = s.to_ascii_uppercase();
    if upper.ends_with("CR") {
        s = s[..s.len() - 2].trim_end();
    } else if upper.ends_with("DR") {
        negative = true;
        s = s[..s.len() - 2].trim_end();
    }

    if let Some(rest) = s.strip_suffix('-') {
        negative = true;
        s = rest.trim_end();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.trim_start();
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{00a0}'))
        .collect();

    if cleaned.is_empty()
        || !cleaned.chars().any(|c| c.is_ascii_digit())
        || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }

    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

/// At most two decimal places and magnitude below 10^12.
pub fn is_plausible_amount(amount: &Decimal) -> bool {
    amount.scale() <= 2 && amount.abs() < Decimal::from(1_000_000_000_000_i64)
}

/// Whether two balances agree within `tolerance`. Values too far apart to
/// subtract never agree.
pub fn balances_match(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b).is_some_and(|diff| diff.abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("-4.75"), Some(dec("-4.75")));
        assert_eq!(parse_amount("-$4.75"), Some(dec("-4.75")));
        assert_eq!(parse_amount("+100.00"), Some(dec("100.00")));
        assert_eq!(parse_amount("(12.00)"), Some(dec("-12.00")));
        assert_eq!(parse_amount("($12.00)"), Some(dec("-12.00")));
        assert_eq!(parse_amount("4.75-"), Some(dec("-4.75")));
        assert_eq!(parse_amount("9.99 CR"), Some(dec("9.99")));
        assert_eq!(parse_amount("9.99DR"), Some(dec("-9.99")));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("$"), None);
        assert_eq!(parse_amount("12a.00"), None);
        assert_eq!(parse_amount("STARBUCKS"), None);
    }

    #[test]
    fn test_plausible_amount() {
        assert!(is_plausible_amount(&dec("1234.56")));
        assert!(!is_plausible_amount(&dec("1.234")));
        assert!(!is_plausible_amount(&dec("1000000000000.00")));
    }

    #[test]
    fn test_balances_match() {
        let tol = dec("0.01");
        assert!(balances_match(dec("10.00"), dec("10.01"), tol));
        assert!(!balances_match(dec("10.00"), dec("10.02"), tol));
        assert!(!balances_match(Decimal::MAX, Decimal::MIN, tol));
    }
}
