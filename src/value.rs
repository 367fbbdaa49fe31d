use std::cmp::Ordering;
use std::fmt;

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Literal data flowing through the evaluator and the define table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    None,
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    None,
    Unsigned,
    Signed,
    Float,
    Text,
    Boolean,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "none",
            ValueType::Unsigned => "unsigned",
            ValueType::Signed => "signed",
            ValueType::Float => "float",
            ValueType::Text => "string",
            ValueType::Boolean => "boolean",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("division by zero")]
    DivideByZero,
    #[error("operator `{op}` is not defined for {ty} values")]
    Unsupported { op: &'static str, ty: &'static str },
}

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Div => "/",
            Arith::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bitwise {
    And,
    Or,
    Xor,
}

/// Bring two values to a common representation.
///
/// Values that already share a tag are returned untouched. Otherwise text wins
/// over float, float wins over the integer families, and two integers meet as
/// Signed if either side was Signed. Anything else collapses to None.
pub fn promote(a: &Value, b: &Value) -> (Value, Value) {
    if a.value_type() == b.value_type() {
        return (a.clone(), b.clone());
    }
    if matches!(a, Value::Text(_)) || matches!(b, Value::Text(_)) {
        return (Value::Text(a.to_string()), Value::Text(b.to_string()));
    }
    if matches!(a, Value::Float(_)) || matches!(b, Value::Float(_)) {
        return (Value::Float(a.to_float()), Value::Float(b.to_float()));
    }
    if a.is_numeric() || b.is_numeric() {
        if matches!(a, Value::Signed(_)) || matches!(b, Value::Signed(_)) {
            return (Value::Signed(a.to_signed()), Value::Signed(b.to_signed()));
        }
        return (Value::Unsigned(a.to_unsigned()), Value::Unsigned(b.to_unsigned()));
    }
    (Value::None, Value::None)
}

/// Parse an integer the way the lexer spells them: `0x` hex, leading-zero octal, decimal.
pub fn parse_uint(s: &str) -> Option<u64> {
    let t = s.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if t.len() > 1 && t.starts_with('0') {
        u64::from_str_radix(&t[1..], 8).ok()
    } else {
        t.parse::<u64>().ok()
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Unsigned(_) => ValueType::Unsigned,
            Value::Signed(_) => ValueType::Signed,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Unsigned, Signed, Float and Boolean form the numeric family.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Unsigned(_) | Value::Signed(_) | Value::Float(_) | Value::Boolean(_)
        )
    }

    // Signed is truthy only when strictly positive.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Unsigned(v) => *v != 0,
            Value::Signed(v) => *v > 0,
            Value::Float(v) => *v > 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Value::None => 0.0,
            Value::Unsigned(v) => *v as f64,
            Value::Signed(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Value::Boolean(b) => f64::from(u8::from(*b)),
        }
    }

    pub fn to_unsigned(&self) -> u64 {
        match self {
            Value::None => 0,
            Value::Unsigned(v) => *v,
            Value::Signed(v) => *v as u64,
            Value::Float(v) => v
                .to_u64()
                .or_else(|| v.to_i64().map(|i| i as u64))
                .unwrap_or(0),
            Value::Text(s) => parse_uint(s).unwrap_or(0),
            Value::Boolean(b) => u64::from(*b),
        }
    }

    pub fn to_signed(&self) -> i64 {
        match self {
            Value::None => 0,
            Value::Unsigned(v) => *v as i64,
            Value::Signed(v) => *v,
            Value::Float(v) => v.to_i64().unwrap_or(0),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| parse_uint(s).map(|v| v as i64))
                .unwrap_or(0),
            Value::Boolean(b) => i64::from(*b),
        }
    }

    pub fn to_hex_string(&self) -> String {
        self.radix_string("hex", 16)
    }

    pub fn to_oct_string(&self) -> String {
        self.radix_string("oct", 8)
    }

    pub fn to_bin_string(&self) -> String {
        self.radix_string("bin", 2)
    }

    fn radix_string(&self, name: &str, radix: u32) -> String {
        if !self.is_numeric() {
            tracing::warn!(
                "{}() of a {} value, falling back to plain string",
                name,
                self.value_type().name()
            );
            return self.to_string();
        }
        let signed = self.to_signed();
        let (negative, magnitude) = match self {
            Value::Signed(_) | Value::Float(_) if signed < 0 => (true, signed.unsigned_abs()),
            _ => (false, self.to_unsigned()),
        };
        let digits = match radix {
            16 => format!("0x{magnitude:x}"),
            8 if magnitude == 0 => "0".to_string(),
            8 => format!("0{magnitude:o}"),
            _ => format!("0b{magnitude:b}"),
        };
        if negative {
            format!("-{digits}")
        } else {
            digits
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.arith(rhs, Arith::Add)
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.arith(rhs, Arith::Sub)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.arith(rhs, Arith::Mul)
    }

    pub fn div(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.arith(rhs, Arith::Div)
    }

    pub fn rem(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.arith(rhs, Arith::Rem)
    }

    fn arith(&self, rhs: &Value, op: Arith) -> Result<Value, EvalError> {
        let (a, b) = promote(self, rhs);
        match (a, b) {
            (Value::Unsigned(x), Value::Unsigned(y)) => Ok(Value::Unsigned(match op {
                Arith::Add => x.wrapping_add(y),
                Arith::Sub => x.wrapping_sub(y),
                Arith::Mul => x.wrapping_mul(y),
                Arith::Div => x.checked_div(y).ok_or(EvalError::DivideByZero)?,
                Arith::Rem => x.checked_rem(y).ok_or(EvalError::DivideByZero)?,
            })),
            (Value::Signed(x), Value::Signed(y)) => {
                if y == 0 && matches!(op, Arith::Div | Arith::Rem) {
                    return Err(EvalError::DivideByZero);
                }
                Ok(Value::Signed(match op {
                    Arith::Add => x.wrapping_add(y),
                    Arith::Sub => x.wrapping_sub(y),
                    Arith::Mul => x.wrapping_mul(y),
                    Arith::Div => x.wrapping_div(y),
                    Arith::Rem => x.wrapping_rem(y),
                }))
            }
            (Value::Float(x), Value::Float(y)) => Ok(Value::Float(match op {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Div => x / y,
                Arith::Rem => x % y,
            })),
            (Value::Boolean(x), Value::Boolean(y)) => {
                Value::Unsigned(u64::from(x)).arith(&Value::Unsigned(u64::from(y)), op)
            }
            (Value::Text(x), Value::Text(y)) if matches!(op, Arith::Add) => Ok(Value::Text(x + &y)),
            (a, _) => Err(EvalError::Unsupported {
                op: op.symbol(),
                ty: a.value_type().name(),
            }),
        }
    }

    /// Ordering after promotion. Text compares lexically, None equals None.
    pub fn compare(&self, rhs: &Value) -> Option<Ordering> {
        let (a, b) = promote(self, rhs);
        match (&a, &b) {
            (Value::Unsigned(x), Value::Unsigned(y)) => Some(x.cmp(y)),
            (Value::Signed(x), Value::Signed(y)) => Some(x.cmp(y)),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
            (Value::None, Value::None) => Some(Ordering::Equal),
            _ => None,
        }
    }

    pub fn equals(&self, rhs: &Value) -> bool {
        self.compare(rhs) == Some(Ordering::Equal)
    }

    pub fn greater(&self, rhs: &Value) -> bool {
        self.compare(rhs) == Some(Ordering::Greater)
    }

    pub fn less(&self, rhs: &Value) -> bool {
        self.compare(rhs) == Some(Ordering::Less)
    }

    pub fn greater_or_equal(&self, rhs: &Value) -> bool {
        matches!(self.compare(rhs), Some(Ordering::Greater | Ordering::Equal))
    }

    pub fn less_or_equal(&self, rhs: &Value) -> bool {
        matches!(self.compare(rhs), Some(Ordering::Less | Ordering::Equal))
    }

    pub fn bit_and(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.bitwise(rhs, Bitwise::And)
    }

    pub fn bit_or(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.bitwise(rhs, Bitwise::Or)
    }

    pub fn bit_xor(&self, rhs: &Value) -> Result<Value, EvalError> {
        self.bitwise(rhs, Bitwise::Xor)
    }

    fn bitwise(&self, rhs: &Value, op: Bitwise) -> Result<Value, EvalError> {
        let apply = |x: u64, y: u64| match op {
            Bitwise::And => x & y,
            Bitwise::Or => x | y,
            Bitwise::Xor => x ^ y,
        };
        let (a, b) = promote(self, rhs);
        match (a, b) {
            (Value::Unsigned(x), Value::Unsigned(y)) => Ok(Value::Unsigned(apply(x, y))),
            (Value::Signed(x), Value::Signed(y)) => {
                Ok(Value::Signed(apply(x as u64, y as u64) as i64))
            }
            (Value::Boolean(x), Value::Boolean(y)) => {
                Ok(Value::Boolean(apply(u64::from(x), u64::from(y)) != 0))
            }
            (a, _) => Err(EvalError::Unsupported {
                op: match op {
                    Bitwise::And => "&",
                    Bitwise::Or => "|",
                    Bitwise::Xor => "^",
                },
                ty: a.value_type().name(),
            }),
        }
    }

    pub fn shl(&self, rhs: &Value) -> Result<Value, EvalError> {
        let n = rhs.to_unsigned();
        match self {
            Value::Unsigned(_) | Value::Boolean(_) => Ok(Value::Unsigned(
                u32::try_from(n)
                    .ok()
                    .and_then(|n| self.to_unsigned().checked_shl(n))
                    .unwrap_or(0),
            )),
            Value::Signed(v) => Ok(Value::Signed(
                u32::try_from(n).ok().and_then(|n| v.checked_shl(n)).unwrap_or(0),
            )),
            other => Err(EvalError::Unsupported {
                op: "<<",
                ty: other.value_type().name(),
            }),
        }
    }

    pub fn shr(&self, rhs: &Value) -> Result<Value, EvalError> {
        let n = rhs.to_unsigned();
        match self {
            Value::Unsigned(_) | Value::Boolean(_) => Ok(Value::Unsigned(
                u32::try_from(n)
                    .ok()
                    .and_then(|n| self.to_unsigned().checked_shr(n))
                    .unwrap_or(0),
            )),
            Value::Signed(v) => {
                let fill = if *v < 0 { -1 } else { 0 };
                Ok(Value::Signed(
                    u32::try_from(n).ok().and_then(|n| v.checked_shr(n)).unwrap_or(fill),
                ))
            }
            other => Err(EvalError::Unsupported {
                op: ">>",
                ty: other.value_type().name(),
            }),
        }
    }

    /// Arithmetic minus. Integer families come out Signed.
    pub fn negate(&self) -> Result<Value, EvalError> {
        match self {
            Value::Unsigned(v) => Ok(Value::Signed((*v as i64).wrapping_neg())),
            Value::Signed(v) => Ok(Value::Signed(v.wrapping_neg())),
            Value::Boolean(b) => Ok(Value::Signed(-i64::from(*b))),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(EvalError::Unsupported {
                op: "-",
                ty: other.value_type().name(),
            }),
        }
    }

    pub fn bitwise_not(&self) -> Result<Value, EvalError> {
        match self {
            Value::Unsigned(v) => Ok(Value::Unsigned(!v)),
            Value::Signed(v) => Ok(Value::Signed(!v)),
            Value::Boolean(b) => Ok(Value::Unsigned(!u64::from(*b))),
            other => Err(EvalError::Unsupported {
                op: "~",
                ty: other.value_type().name(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Signed(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::None,
            Value::Unsigned(5),
            Value::Unsigned(0),
            Value::Signed(-3),
            Value::Signed(5),
            Value::Float(5.0),
            Value::Float(2.5),
            Value::Text("5".into()),
            Value::Text("abc".into()),
            Value::Boolean(true),
            Value::Boolean(false),
        ]
    }

    #[test]
    fn equality_is_commutative_under_promotion() {
        for a in samples() {
            for b in samples() {
                assert_eq!(a.equals(&b), b.equals(&a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn promotion_leaves_matching_tags_alone() {
        let pairs = [
            (Value::Unsigned(3), Value::Unsigned(9)),
            (Value::Signed(-3), Value::Signed(9)),
            (Value::Float(1.5), Value::Float(-2.0)),
            (Value::Boolean(true), Value::Boolean(false)),
        ];
        for (a, b) in pairs {
            assert_eq!(promote(&a, &b), (a.clone(), b.clone()));
        }
    }

    #[test]
    fn promotion_order() {
        assert_eq!(
            promote(&Value::Unsigned(1), &Value::Text("x".into())),
            (Value::Text("1".into()), Value::Text("x".into()))
        );
        assert_eq!(
            promote(&Value::Signed(-1), &Value::Float(0.5)),
            (Value::Float(-1.0), Value::Float(0.5))
        );
        assert_eq!(
            promote(&Value::Unsigned(7), &Value::Signed(-1)),
            (Value::Signed(7), Value::Signed(-1))
        );
        assert_eq!(
            promote(&Value::Boolean(true), &Value::Unsigned(4)),
            (Value::Unsigned(1), Value::Unsigned(4))
        );
    }

    #[test]
    fn signed_truthiness_is_strictly_positive() {
        assert!(Value::Signed(1).to_bool());
        assert!(!Value::Signed(0).to_bool());
        assert!(!Value::Signed(-1).to_bool());
        assert!(Value::Unsigned(u64::MAX).to_bool());
        assert!(!Value::Text(String::new()).to_bool());
        assert!(!Value::Float(-0.5).to_bool());
    }

    #[test]
    fn radix_strings() {
        assert_eq!(Value::Unsigned(255).to_hex_string(), "0xff");
        assert_eq!(Value::Unsigned(8).to_oct_string(), "010");
        assert_eq!(Value::Unsigned(5).to_bin_string(), "0b101");
        assert_eq!(Value::Signed(-16).to_hex_string(), "-0x10");
        assert_eq!(Value::Text("hi".into()).to_hex_string(), "hi");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(Value::Unsigned(4).negate(), Ok(Value::Signed(-4)));
        assert_eq!(Value::Unsigned(0).bitwise_not(), Ok(Value::Unsigned(u64::MAX)));
        assert!(matches!(
            Value::Float(1.0).bitwise_not(),
            Err(EvalError::Unsupported { op: "~", ty: "float" })
        ));
        assert!(Value::Text("x".into()).negate().is_err());
    }

    #[test]
    fn arithmetic_keeps_signed_tag() {
        assert_eq!(Value::Unsigned(2).sub(&Value::Signed(5)), Ok(Value::Signed(-3)));
        assert_eq!(Value::Text("a".into()).add(&Value::Unsigned(1)), Ok(Value::Text("a1".into())));
        assert_eq!(Value::Unsigned(1).div(&Value::Unsigned(0)), Err(EvalError::DivideByZero));
    }
}
