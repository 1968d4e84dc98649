//! The numeric grammar.
//!
//! Numbers arrive as identifier text (optionally joined across a `.` by the
//! parser): an optional sign, digits with `_` separators, an optional
//! fraction, and an optional exponent. The same grammar backs the `number`,
//! `int`, and `float` tags when they convert strings.

use crate::Value;

/// Whether identifier text should be classified as a number candidate.
pub fn is_number_start(text: &str) -> bool {
    matches!(text.as_bytes().first(), Some(b'0'..=b'9' | b'+' | b'-'))
}

/// Parse a numeric literal into an integer or float value.
///
/// Underscore rules: no leading or trailing underscore on any digit run, no
/// consecutive underscores. The result is a float when the literal has a
/// fraction or an exponent; NaN and infinity are rejected.
pub fn parse_number(literal: &str) -> Result<Value, String> {
    validate_underscores(literal)?;
    let cleaned: String = literal.chars().filter(|c| *c != '_').collect();

    let is_float = cleaned.contains(['.', 'e', 'E']);
    if is_float {
        let value: f64 = cleaned
            .parse()
            .map_err(|_| format!("invalid number '{literal}'"))?;
        if value.is_nan() {
            return Err(format!("number '{literal}' is not a number"));
        }
        if value.is_infinite() {
            return Err(format!("number '{literal}' is not finite"));
        }
        Ok(Value::Float(value))
    } else {
        let value: i64 = cleaned
            .parse()
            .map_err(|_| format!("invalid number '{literal}'"))?;
        Ok(Value::Int(value))
    }
}

/// Check the underscore placement rules over every digit run in the literal.
fn validate_underscores(literal: &str) -> Result<(), String> {
    if literal.contains("__") {
        return Err(format!("consecutive underscores in number '{literal}'"));
    }
    let mut prev: Option<char> = None;
    for c in literal.chars() {
        if c == '_' && !matches!(prev, Some(p) if p.is_ascii_digit()) {
            return Err(format!("leading underscore in number '{literal}'"));
        }
        if c != '_'
            && !c.is_ascii_digit()
            && matches!(prev, Some('_'))
        {
            return Err(format!("trailing underscore in number '{literal}'"));
        }
        prev = Some(c);
    }
    if prev == Some('_') {
        return Err(format!("trailing underscore in number '{literal}'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(parse_number("0"), Ok(Value::Int(0)));
        assert_eq!(parse_number("42"), Ok(Value::Int(42)));
        assert_eq!(parse_number("-7"), Ok(Value::Int(-7)));
        assert_eq!(parse_number("+7"), Ok(Value::Int(7)));
        assert_eq!(parse_number("1_000_000"), Ok(Value::Int(1_000_000)));
    }

    #[test]
    fn test_floats() {
        assert_eq!(parse_number("1.5"), Ok(Value::Float(1.5)));
        assert_eq!(parse_number("-0.25"), Ok(Value::Float(-0.25)));
        assert_eq!(parse_number("1_000.5"), Ok(Value::Float(1000.5)));
    }

    #[test]
    fn test_exponent_promotes_to_float() {
        assert_eq!(parse_number("1e3"), Ok(Value::Float(1000.0)));
        assert_eq!(parse_number("1.5e-3"), Ok(Value::Float(0.0015)));
        assert_eq!(parse_number("2E2"), Ok(Value::Float(200.0)));
    }

    #[test]
    fn test_underscore_rules() {
        assert!(
            parse_number("1__000")
                .unwrap_err()
                .contains("consecutive underscores")
        );
        assert!(
            parse_number("_1")
                .unwrap_err()
                .contains("leading underscore")
        );
        assert!(
            parse_number("1_")
                .unwrap_err()
                .contains("trailing underscore")
        );
        assert!(
            parse_number("1_.5")
                .unwrap_err()
                .contains("trailing underscore")
        );
        assert!(
            parse_number("-_5")
                .unwrap_err()
                .contains("leading underscore")
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_number("1+2").is_err());
        assert!(parse_number("-").is_err());
        assert!(parse_number("0x10").is_err());
        assert!(parse_number("1.2.3").is_err());
    }

    #[test]
    fn test_overflow_and_infinity_rejected() {
        assert!(parse_number("1e999").unwrap_err().contains("not finite"));
        assert!(parse_number("99999999999999999999").is_err());
    }

    #[test]
    fn test_number_start_classification() {
        assert!(is_number_start("42"));
        assert!(is_number_start("+1"));
        assert!(is_number_start("-x"));
        assert!(!is_number_start("x1"));
        assert!(!is_number_start(""));
    }
}
