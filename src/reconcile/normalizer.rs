//! Chip value normalization.
//!
//! Turns chip-classified text ("1,234,000", "2M", "1.5k") into a positive
//! integer. Suffix values are computed on the decimal digits directly, so
//! "2.3M" is exactly 2,300,000 and fractional chips are truncated.

use crate::error::ParseError;

/// Parse chip text into a positive integer.
///
/// - Keeps only digits, `,`, `.` and a trailing K/M/B magnitude letter
/// - With a suffix, the prefix is a decimal number scaled by 10^3/10^6/10^9
/// - Without a suffix, separators are dropped and the digits read directly
pub fn normalize_chip_value(text: &str) -> Result<u64, ParseError> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.') || c.is_ascii_alphabetic())
        .collect();

    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    let (number, multiplier) = match cleaned.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&cleaned[..cleaned.len() - 1], 1_000u64),
        Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000u64),
        Some('B') => (&cleaned[..cleaned.len() - 1], 1_000_000_000u64),
        _ => (cleaned.as_str(), 1u64),
    };

    if number.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(ParseError::Invalid(text.to_string()));
    }

    let value = if multiplier > 1 {
        scale_decimal(number, multiplier).ok_or_else(|| ParseError::Invalid(text.to_string()))?
    } else {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(ParseError::Empty);
        }
        digits
            .parse::<u64>()
            .map_err(|_| ParseError::Invalid(text.to_string()))?
    };

    if value == 0 {
        return Err(ParseError::Zero);
    }

    Ok(value)
}

/// Normalize and apply an optional plausibility band
pub fn normalize_in_range(
    text: &str,
    min: Option<u64>,
    max: Option<u64>,
) -> Result<u64, ParseError> {
    let value = normalize_chip_value(text)?;
    if min.is_some_and(|m| value < m) || max.is_some_and(|m| value > m) {
        return Err(ParseError::OutOfRange { value });
    }
    Ok(value)
}

/// `integer[.fraction] * multiplier`, truncated, without floating point.
/// Thousands separators in the integer part are tolerated.
fn scale_decimal(number: &str, multiplier: u64) -> Option<u64> {
    let (int_part, frac_part) = match number.rfind('.') {
        Some(pos) => (&number[..pos], &number[pos + 1..]),
        None => (number, ""),
    };

    let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if int_part.contains('.') || frac_part.contains(',') {
        return None;
    }
    if int_digits.is_empty() && frac_part.is_empty() {
        return None;
    }

    let int_value: u64 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };
    let mut value = int_value.checked_mul(multiplier)?;

    // Only as many fractional digits as the multiplier can resolve matter
    let scale_digits = multiplier.ilog10() as usize;
    let frac: String = frac_part.chars().take(scale_digits).collect();
    if !frac.is_empty() {
        let frac_value: u64 = frac.parse().ok()?;
        let frac_scale = 10u64.pow((scale_digits - frac.len()) as u32);
        value = value.checked_add(frac_value * frac_scale)?;
    }

    Some(value)
}
