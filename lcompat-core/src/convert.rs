//! Value conversions

use crate::error::{CompatError, CompatResult};
use crate::host::{RawApi, ValueType};
use crate::index::abs_index;

/// Integer at `idx`, or `None` when the value is not convertible.
#[cfg(feature = "lua51")]
pub fn to_integer_x<H: RawApi>(host: &H, idx: i32) -> Option<i64> {
    let n = host.to_integer(idx);
    (n != 0 || host.is_number(idx)).then_some(n)
}

/// Number at `idx`, or `None` when the value is not convertible.
#[cfg(feature = "lua51")]
pub fn to_number_x<H: RawApi>(host: &H, idx: i32) -> Option<f64> {
    let n = host.to_number(idx);
    (n != 0.0 || host.is_number(idx)).then_some(n)
}

/// Whether the value at `idx` is a number with an exact integer value.
pub fn is_integer<H: RawApi>(host: &H, idx: i32) -> bool {
    if host.type_of(idx) != ValueType::Number {
        return false;
    }
    host.to_integer(idx) as f64 == host.to_number(idx)
}

/// Parse a numeric literal: decimal with optional exponent, or `0x`
/// hexadecimal, surrounded by optional whitespace.
pub fn str_to_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let n = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u64::from_str_radix(hex, 16).ok()? as f64
        }
        Some(_) => return None,
        // rejects "inf", "nan" and the empty string
        None if digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') => {
            digits.parse().ok()?
        }
        None => return None,
    };
    Some(if negative { -n } else { n })
}

/// Push the number `s` denotes and return `s.len() + 1`; return `0` and push
/// nothing if `s` is not a numeral.
pub fn string_to_number<H: RawApi>(host: &mut H, s: &str) -> usize {
    match str_to_number(s) {
        Some(n) => {
            host.push_number(n);
            s.len() + 1
        }
        None => 0,
    }
}

/// Push the string form of the value at `idx` and return its bytes.
///
/// `__tostring` takes precedence; reference values without one are shown as
/// `<type>: 0x<address>`.
pub fn to_lstring<H: RawApi>(host: &mut H, idx: i32) -> CompatResult<Vec<u8>> {
    let idx = abs_index(host, idx);
    if host.call_meta(idx, "__tostring")? {
        if !host.is_string(-1) {
            return Err(CompatError::Type(
                "'__tostring' must return a string".to_string(),
            ));
        }
    } else {
        match host.type_of(idx) {
            ValueType::Nil => host.push_bytes(b"nil"),
            ValueType::String | ValueType::Number => host.push_value(idx),
            ValueType::Boolean => {
                let text: &[u8] = if host.to_boolean(idx) { b"true" } else { b"false" };
                host.push_bytes(text);
            }
            other => {
                let text = format!("{}: 0x{:08x}", other.name(), host.to_pointer(idx));
                host.push_bytes(text.as_bytes());
            }
        }
    }
    Ok(host.to_bytes(-1).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHost, Value};

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number("10"), Some(10.0));
        assert_eq!(str_to_number("  2.5  "), Some(2.5));
        assert_eq!(str_to_number("0x10"), Some(16.0));
        assert_eq!(str_to_number("-1e3"), Some(-1000.0));
        assert_eq!(str_to_number(".5"), Some(0.5));
        assert_eq!(str_to_number("abc"), None);
        assert_eq!(str_to_number(""), None);
        assert_eq!(str_to_number("nan"), None);
        assert_eq!(str_to_number("1 2"), None);
    }

    #[test]
    fn test_hex_digits_only() {
        assert_eq!(str_to_number("0xfF"), Some(255.0));
        assert_eq!(str_to_number("-0x10"), Some(-16.0));
        assert_eq!(str_to_number("0x+10"), None);
        assert_eq!(str_to_number("0x-1"), None);
        assert_eq!(str_to_number("0x"), None);
        assert_eq!(str_to_number("0x1g"), None);
    }

    #[test]
    fn test_string_to_number_pushes_on_success() {
        let mut host = MemoryHost::new();
        assert_eq!(string_to_number(&mut host, " 42 "), 5);
        assert_eq!(host.number_at(-1), Some(42.0));
        assert_eq!(string_to_number(&mut host, "4x2"), 0);
        assert_eq!(host.get_top(), 1);
    }

    #[test]
    fn test_is_integer() {
        let mut host = MemoryHost::new();
        host.push_number(3.0);
        host.push_number(3.5);
        host.push_str("3");
        assert!(is_integer(&host, 1));
        assert!(!is_integer(&host, 2));
        // numeric strings are not numbers
        assert!(!is_integer(&host, 3));
    }

    #[cfg(feature = "lua51")]
    #[test]
    fn test_extended_conversions() {
        let mut host = MemoryHost::new();
        host.push_number(0.0);
        host.push_str("7.9");
        host.push_boolean(true);
        assert_eq!(to_integer_x(&host, 1), Some(0));
        assert_eq!(to_integer_x(&host, 2), Some(7));
        assert_eq!(to_integer_x(&host, 3), None);
        assert_eq!(to_number_x(&host, 2), Some(7.9));
        assert_eq!(to_number_x(&host, 3), None);
        assert_eq!(to_number_x(&host, 4), None);
    }

    #[test]
    fn test_to_lstring_defaults() {
        let mut host = MemoryHost::new();
        host.push_nil();
        host.push_boolean(false);
        host.push_number(12.5);
        host.new_table();

        assert_eq!(to_lstring(&mut host, 1).unwrap(), b"nil");
        assert_eq!(to_lstring(&mut host, 2).unwrap(), b"false");
        assert_eq!(to_lstring(&mut host, 3).unwrap(), b"12.5");
        let table = to_lstring(&mut host, 4).unwrap();
        assert!(table.starts_with(b"table: 0x"));
        assert_eq!(host.get_top(), 8);
        // the source number is left untouched
        assert_eq!(host.value(3), Value::Number(12.5));
    }

    #[test]
    fn test_to_lstring_hook() {
        let mut host = MemoryHost::new();
        host.new_table();
        host.new_table();
        host.push_closure(
            |h: &mut MemoryHost| {
                h.push_str("custom");
                Ok(1)
            },
            0,
        );
        host.set_field(-2, "__tostring").unwrap();
        host.set_metatable(-2);
        assert_eq!(to_lstring(&mut host, -1).unwrap(), b"custom");
        assert_eq!(host.get_top(), 2);

        host.new_table();
        host.new_table();
        host.push_closure(
            |h: &mut MemoryHost| {
                h.push_boolean(true);
                Ok(1)
            },
            0,
        );
        host.set_field(-2, "__tostring").unwrap();
        host.set_metatable(-2);
        let err = to_lstring(&mut host, -1).unwrap_err();
        assert_eq!(err.to_string(), "'__tostring' must return a string");
    }
}
