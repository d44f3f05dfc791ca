//! Phone number normalization for SMS delivery.
//!
//! Numbers are rewritten to an E.164-like `+<country><subscriber>` form:
//! - `+...` numbers are validated, then passed through exactly as written
//! - `00...` international prefix becomes `+`
//! - a leading `0` trunk prefix is replaced by the country code
//! - numbers already starting with the country code just gain the `+`
//! - anything else is treated as a bare national number

use thiserror::Error;

/// E.164 allows at most 15 digits after the `+`.
const MAX_DIGITS: usize = 15;

/// Shortest number we accept as routable.
const MIN_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("no phone number available")]
    Missing,

    #[error("invalid phone number format: {0}")]
    InvalidFormat(String),
}

/// Normalize `raw` into `+<digits>` using `country_code` for local numbers.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Missing);
    }

    let (has_plus, body) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let digits: String = body
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhoneError::InvalidFormat(raw.to_string()));
    }

    let international = if has_plus {
        digits
    } else if let Some(rest) = digits.strip_prefix("00") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{}{}", country_code, rest)
    } else if digits.starts_with(country_code) && digits.len() >= country_code.len() + MIN_DIGITS {
        digits
    } else {
        format!("{}{}", country_code, digits)
    };

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&international.len()) {
        return Err(PhoneError::InvalidFormat(raw.to_string()));
    }

    if has_plus {
        return Ok(trimmed.to_string());
    }
    Ok(format!("+{}", international))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GH: &str = "233";

    #[test]
    fn test_local_trunk_prefix_rewritten() {
        assert_eq!(normalize_phone("0244123456", GH).unwrap(), "+233244123456");
    }

    #[test]
    fn test_plus_number_passes_through() {
        assert_eq!(normalize_phone("+233244123456", GH).unwrap(), "+233244123456");
        assert_eq!(normalize_phone("+447700900123", GH).unwrap(), "+447700900123");
        assert_eq!(
            normalize_phone(" +233 24 411 1222 ", GH).unwrap(),
            "+233 24 411 1222"
        );
    }

    #[test]
    fn test_separators_removed() {
        assert_eq!(
            normalize_phone("024 412-3456", GH).unwrap(),
            "+233244123456"
        );
        assert_eq!(
            normalize_phone("(024) 412.3456", GH).unwrap(),
            "+233244123456"
        );
    }

    #[test]
    fn test_double_zero_international_prefix() {
        assert_eq!(normalize_phone("00447700900123", GH).unwrap(), "+447700900123");
    }

    #[test]
    fn test_country_code_without_plus() {
        assert_eq!(normalize_phone("233244123456", GH).unwrap(), "+233244123456");
    }

    #[test]
    fn test_bare_national_number() {
        assert_eq!(normalize_phone("244123456", GH).unwrap(), "+233244123456");
    }

    #[test]
    fn test_blank_is_missing() {
        assert_eq!(normalize_phone("   ", GH), Err(PhoneError::Missing));
    }

    #[test]
    fn test_letters_rejected() {
        assert!(matches!(
            normalize_phone("024-CALL-NOW", GH),
            Err(PhoneError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            normalize_phone("+1234", GH),
            Err(PhoneError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_too_long_rejected() {
        assert!(matches!(
            normalize_phone("02441234567890123", GH),
            Err(PhoneError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(PhoneError::Missing.to_string(), "no phone number available");
        assert_eq!(
            PhoneError::InvalidFormat("abc".to_string()).to_string(),
            "invalid phone number format: abc"
        );
    }
}
