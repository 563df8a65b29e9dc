use std::fmt;

/// Coin amounts are stored as integer minor units (1 coin = 100 cents) so
/// balance arithmetic is exact. "20" coins is 2000 cents.
pub type Cents = i64;

/// Balance credited to a freshly opened account: 1000.00 coins.
pub const DEFAULT_STARTING_BALANCE: Cents = 100_000;

/// Format cents as a human-readable coin string.
/// Example: 2000 -> "20.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal coin string into cents.
/// Example: "20" -> 2000, "12.5" -> 1250, "-5" -> -500
///
/// Digits past the second decimal place are truncated. Negative values parse
/// successfully; rejecting them is up to the operation consuming the amount.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, fraction_str) = digits.split_once('.').unwrap_or((digits, ""));
    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if fraction_str.contains('.') {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        parse_digits(units_str)?
    };

    if !fraction_str.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    // all ASCII from here, so byte slicing stays on char boundaries
    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => parse_digits(fraction_str)? * 10,
        _ => parse_digits(&fraction_str[..2])?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

fn parse_digits(s: &str) -> Result<i64, ParseCentsError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseCentsError::InvalidFormat);
    }
    s.parse().map_err(|_| ParseCentsError::Overflow)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid coin amount format"),
            ParseCentsError::Overflow => write!(f, "coin amount is too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(2000), "20.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-500), "-5.00");
        assert_eq!(format_cents(DEFAULT_STARTING_BALANCE), "1000.00");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("20"), Ok(2000));
        assert_eq!(parse_cents("20.00"), Ok(2000));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("-5"), Ok(-500));
        assert_eq!(parse_cents("100.999"), Ok(10099));
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert_eq!(parse_cents("abc"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("12.34.56"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents(""), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("+3"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("1.23abc"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("1.1x"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(
            parse_cents("99999999999999999999"),
            Err(ParseCentsError::Overflow)
        );
    }

    #[test]
    fn test_parse_cents_multibyte_fraction() {
        assert_eq!(parse_cents("1.aé"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("1.é"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("é.50"), Err(ParseCentsError::InvalidFormat));
    }
}
