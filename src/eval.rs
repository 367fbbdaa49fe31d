use crate::context::Defines;
use crate::error::{Error, Result};
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};
use crate::value::{EvalError, Value, ValueType};

#[derive(Debug, Clone, Copy)]
enum OpToken {
    P(Punct),
    K(Keyword),
}

struct OperatorClass {
    token: OpToken,
    repeating: bool,
    apply: fn(&Value, &Value) -> Result<Value, EvalError>,
}

impl OperatorClass {
    fn matches(&self, t: &Token) -> bool {
        match self.token {
            OpToken::P(p) => t.is_punct(p),
            OpToken::K(k) => t.is_keyword(k),
        }
    }
}

fn op_eq(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.equals(b)))
}
fn op_ne(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(!a.equals(b)))
}
fn op_gt(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.greater(b)))
}
fn op_lt(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.less(b)))
}
fn op_ge(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.greater_or_equal(b)))
}
fn op_le(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.less_or_equal(b)))
}
fn op_and(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.to_bool() && b.to_bool()))
}
fn op_or(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.to_bool() || b.to_bool()))
}
fn op_xor(a: &Value, b: &Value) -> Result<Value, EvalError> {
    Ok(Value::Boolean(a.to_bool() != b.to_bool()))
}

/// Binary operators in the order they are tried after a primary.
///
/// This is not conventional precedence: only the first class that matches the
/// token after the left operand is consumed, and the expression ends when the
/// next operator belongs to a different class. `1 + 2 * 3` therefore stops
/// after `1 + 2`. Comparisons take a whole expression on the right; the other
/// classes fold primaries left to right, so `8 - 4 - 2 - 1` is 1.
const OPERATOR_ORDER: &[OperatorClass] = &[
    OperatorClass { token: OpToken::P(Punct::EqEq), repeating: false, apply: op_eq },
    OperatorClass { token: OpToken::P(Punct::NotEq), repeating: false, apply: op_ne },
    OperatorClass { token: OpToken::P(Punct::Gt), repeating: false, apply: op_gt },
    OperatorClass { token: OpToken::P(Punct::Lt), repeating: false, apply: op_lt },
    OperatorClass { token: OpToken::P(Punct::Shl), repeating: false, apply: Value::shl },
    OperatorClass { token: OpToken::P(Punct::Shr), repeating: false, apply: Value::shr },
    OperatorClass { token: OpToken::P(Punct::Ge), repeating: false, apply: op_ge },
    OperatorClass { token: OpToken::P(Punct::Le), repeating: false, apply: op_le },
    OperatorClass { token: OpToken::K(Keyword::And), repeating: true, apply: op_and },
    OperatorClass { token: OpToken::K(Keyword::Or), repeating: true, apply: op_or },
    OperatorClass { token: OpToken::K(Keyword::Xor), repeating: true, apply: op_xor },
    OperatorClass { token: OpToken::P(Punct::Amp), repeating: true, apply: Value::bit_and },
    OperatorClass { token: OpToken::P(Punct::Pipe), repeating: true, apply: Value::bit_or },
    OperatorClass { token: OpToken::P(Punct::Caret), repeating: true, apply: Value::bit_xor },
    OperatorClass { token: OpToken::P(Punct::Plus), repeating: true, apply: Value::add },
    OperatorClass { token: OpToken::P(Punct::Minus), repeating: true, apply: Value::sub },
    OperatorClass { token: OpToken::P(Punct::Star), repeating: true, apply: Value::mul },
    OperatorClass { token: OpToken::P(Punct::Slash), repeating: true, apply: Value::div },
    OperatorClass { token: OpToken::P(Punct::Percent), repeating: true, apply: Value::rem },
];

pub struct Evaluator<'a> {
    defines: &'a Defines,
}

impl<'a> Evaluator<'a> {
    pub fn new(defines: &'a Defines) -> Self {
        Self { defines }
    }

    /// Evaluate the whole stream; trailing tokens are an error.
    pub fn evaluate(&self, ts: &mut TokenStream) -> Result<Value> {
        let v = self.parse_expression(ts)?;
        ts.expect_eof()?;
        Ok(v)
    }

    pub fn parse_expression(&self, ts: &mut TokenStream) -> Result<Value> {
        let lhs = self.parse_primary(ts)?;
        let Some(class) = OPERATOR_ORDER.iter().find(|c| c.matches(ts.peek())) else {
            return Ok(lhs);
        };

        let mut acc = lhs;
        if class.repeating {
            while class.matches(ts.peek()) {
                let line = ts.line();
                ts.discard(1);
                let rhs = self.parse_primary(ts)?;
                acc = (class.apply)(&acc, &rhs).map_err(|e| Error::eval(line, e))?;
            }
        } else {
            let line = ts.line();
            ts.discard(1);
            let rhs = self.parse_expression(ts)?;
            acc = (class.apply)(&acc, &rhs).map_err(|e| Error::eval(line, e))?;
        }
        Ok(acc)
    }

    pub fn parse_primary(&self, ts: &mut TokenStream) -> Result<Value> {
        let line = ts.line();
        match ts.peek().kind.clone() {
            TokenKind::Literal(v) => {
                ts.discard(1);
                Ok(v)
            }
            TokenKind::Punct(Punct::LParen) => {
                let mut inner = ts.take_group()?;
                self.evaluate(&mut inner)
            }
            TokenKind::Punct(Punct::Bang) | TokenKind::Keyword(Keyword::Not) => {
                ts.discard(1);
                let v = self.parse_primary(ts)?;
                Ok(Value::Boolean(!v.to_bool()))
            }
            TokenKind::Punct(Punct::Tilde) => {
                ts.discard(1);
                let v = self.parse_primary(ts)?;
                v.bitwise_not().map_err(|e| Error::eval(line, e))
            }
            TokenKind::Punct(Punct::Minus) => {
                ts.discard(1);
                let v = self.parse_primary(ts)?;
                v.negate().map_err(|e| Error::eval(line, e))
            }
            TokenKind::Keyword(Keyword::None) => {
                ts.discard(1);
                Ok(Value::None)
            }
            TokenKind::Keyword(Keyword::Isset) => {
                ts.discard(1);
                let name = self.name_argument(ts)?;
                Ok(Value::Boolean(self.defines.contains(&name)))
            }
            TokenKind::Keyword(Keyword::Value) => {
                ts.discard(1);
                let name = self.name_argument(ts)?;
                match self.defines.get(&name) {
                    Some(v) => Ok(v.clone()),
                    None => {
                        tracing::warn!("line {line}: value(\"{name}\") is not set");
                        Ok(Value::None)
                    }
                }
            }
            TokenKind::Keyword(Keyword::Valuetype) => {
                ts.discard(1);
                let name = self.name_argument(ts)?;
                let ty = self
                    .defines
                    .get(&name)
                    .map(Value::value_type)
                    .unwrap_or(ValueType::None);
                Ok(Value::Text(ty.name().to_string()))
            }
            TokenKind::Keyword(Keyword::Format) => {
                ts.discard(1);
                let mut args = ts.take_group()?;
                let mut out = String::new();
                for mut arg in args.split_commas() {
                    out.push_str(&self.evaluate(&mut arg)?.to_string());
                }
                Ok(Value::Text(out))
            }
            TokenKind::Keyword(
                k @ (Keyword::Hex
                | Keyword::Oct
                | Keyword::Bin
                | Keyword::String
                | Keyword::Unsigned
                | Keyword::Signed),
            ) => {
                ts.discard(1);
                let mut inner = ts.take_group()?;
                let v = self.evaluate(&mut inner)?;
                Ok(match k {
                    Keyword::Hex => Value::Text(v.to_hex_string()),
                    Keyword::Oct => Value::Text(v.to_oct_string()),
                    Keyword::Bin => Value::Text(v.to_bin_string()),
                    Keyword::String => Value::Text(v.to_string()),
                    Keyword::Unsigned => Value::Unsigned(v.to_unsigned()),
                    _ => Value::Signed(v.to_signed()),
                })
            }
            _ => Err(ts.unexpected("expression")),
        }
    }

    /// `( name )` where name is a string, a bare word, or any expression
    /// whose string form is the name.
    fn name_argument(&self, ts: &mut TokenStream) -> Result<String> {
        let mut inner = ts.take_group()?;
        if let Some(name) = bare_name(inner.peek()) {
            if inner.peek_at(1).is_eof() {
                return Ok(name);
            }
        }
        Ok(self.evaluate(&mut inner)?.to_string())
    }
}

/// A define or macro name spelled as a string literal or bare word.
pub fn bare_name(t: &Token) -> Option<String> {
    match &t.kind {
        TokenKind::Literal(Value::Text(s)) => Some(s.clone()),
        TokenKind::Ident(s) => Some(s.clone()),
        TokenKind::Keyword(k) => Some(k.as_str().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn eval_with(defines: &Defines, text: &str) -> Result<Value> {
        let mut ts = TokenStream::new(tokenize(text).unwrap());
        Evaluator::new(defines).evaluate(&mut ts)
    }

    fn eval(text: &str) -> Value {
        eval_with(&Defines::default(), text).unwrap()
    }

    #[test]
    fn subtraction_folds_left() {
        assert_eq!(eval("8 - 4 - 2 - 1"), Value::Unsigned(1));
        assert_eq!(eval("100 / 10 / 5"), Value::Unsigned(2));
    }

    #[test]
    fn only_first_operator_class_is_consumed() {
        let defines = Defines::default();
        let mut ts = TokenStream::new(tokenize("1 + 2 * 3").unwrap());
        let v = Evaluator::new(&defines).parse_expression(&mut ts).unwrap();
        assert_eq!(v, Value::Unsigned(3));
        assert!(ts.peek().is_punct(Punct::Star));
        assert!(eval_with(&defines, "1 + 2 * 3").is_err());
        assert_eq!(eval("1 + (2 * 3)"), Value::Unsigned(7));
    }

    #[test]
    fn comparison_takes_full_right_side() {
        assert_eq!(eval("7 == 5 + 2"), Value::Boolean(true));
        assert_eq!(eval("1 << 4"), Value::Unsigned(16));
        assert_eq!(eval("3 != 3"), Value::Boolean(false));
    }

    #[test]
    fn builtins_consult_defines() {
        let mut d = Defines::default();
        d.set("x", Value::Unsigned(5));
        assert_eq!(eval_with(&d, "value(\"x\")").unwrap(), Value::Unsigned(5));
        assert_eq!(eval_with(&d, "isset(\"x\")").unwrap(), Value::Boolean(true));
        assert_eq!(eval_with(&d, "isset(\"y\")").unwrap(), Value::Boolean(false));
        assert_eq!(eval_with(&d, "valuetype(\"x\")").unwrap(), Value::Text("unsigned".into()));
        assert_eq!(eval_with(&d, "valuetype(\"y\")").unwrap(), Value::Text("none".into()));
        assert_eq!(eval_with(&d, "value(\"y\")").unwrap(), Value::None);
    }

    #[test]
    fn casts_and_format() {
        assert_eq!(eval("hex(255)"), Value::Text("0xff".into()));
        assert_eq!(eval("bin(5)"), Value::Text("0b101".into()));
        assert_eq!(eval("signed(5)"), Value::Signed(5));
        assert_eq!(eval("unsigned(\"0x10\")"), Value::Unsigned(16));
        assert_eq!(eval("format(\"r\", 8, \"-\", true)"), Value::Text("r8-true".into()));
    }

    #[test]
    fn unary_forms() {
        assert_eq!(eval("-5"), Value::Signed(-5));
        assert_eq!(eval("not 0"), Value::Boolean(true));
        assert_eq!(eval("~0 & 0xff"), Value::Unsigned(0xff));
        assert!(matches!(
            eval_with(&Defines::default(), "~1.5"),
            Err(Error::Eval { .. })
        ));
    }

    #[test]
    fn logical_operators_repeat() {
        assert_eq!(eval("1 and 1 and 0"), Value::Boolean(false));
        assert_eq!(eval("0 or 0 or 2"), Value::Boolean(true));
        assert_eq!(eval("1 xor 1 xor 1"), Value::Boolean(true));
    }
}
