//! Values of the in-memory host

use std::fmt;
use std::rc::Rc;

use crate::convert::str_to_number;
use crate::host::ValueType;

/// A value stored in a [`MemoryHost`](super::MemoryHost)
///
/// Reference values carry an arena id; two references are identical when
/// their ids are.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    Str(Rc<[u8]>),
    Table(usize),
    Function(usize),
    LightUserdata(usize),
    Userdata(usize),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s.as_bytes()))
    }

    pub fn bytes(b: &[u8]) -> Value {
        Value::Str(Rc::from(b))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::Str(_) => ValueType::String,
            Value::Table(_) => ValueType::Table,
            Value::Function(_) => ValueType::Function,
            Value::LightUserdata(_) => ValueType::LightUserdata,
            Value::Userdata(_) => ValueType::Userdata,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is true
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Numeric value, converting numeric strings
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => std::str::from_utf8(s).ok().and_then(str_to_number),
            _ => None,
        }
    }

    /// String bytes, converting numbers
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Str(s) => Some(s.to_vec()),
            Value::Number(n) => Some(format_number(*n).into_bytes()),
            _ => None,
        }
    }

    /// Identity of reference values, distinct per kind; `0` otherwise
    pub fn pointer(&self) -> usize {
        match self {
            Value::Table(id) => 0x1000_0000 + id * 0x40,
            Value::Function(id) => 0x2000_0000 + id * 0x40,
            Value::Userdata(id) => 0x3000_0000 + id * 0x40,
            Value::LightUserdata(p) => *p,
            _ => 0,
        }
    }
}

/// Raw equality: no metamethods
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            (Value::Userdata(a), Value::Userdata(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            other => write!(f, "{}: 0x{:08x}", other.value_type().name(), other.pointer()),
        }
    }
}

/// Format a number the way the host does (`%.14g`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let exp = n.abs().log10().floor() as i32;
    if !(-4..14).contains(&exp) {
        let formatted = format!("{:.13e}", n);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let mantissa = trim_fraction(mantissa);
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (13 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(7.0), "7");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1.0 / 3.0), "0.33333333333333");
        assert_eq!(format_number(1e20), "1e+20");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }

    #[test]
    fn test_raw_equality() {
        assert_eq!(Value::str("a"), Value::bytes(b"a"));
        assert_ne!(Value::Table(1), Value::Table(2));
        assert_ne!(Value::Number(1.0), Value::str("1"));
        assert!(Value::Number(0.0).truthy());
        assert!(!Value::Boolean(false).truthy());
    }
}
