use std::io::Read;

use crate::error::{Error, Result};
use crate::token::{Keyword, Punct, Token, TokenKind};
use crate::value::Value;

/// Byte-at-a-time input. End of stream and stream failure both read as `None`.
pub trait CharSource {
    fn next_char(&mut self) -> Option<u8>;
}

pub struct StrSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StrSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0 }
    }
}

impl CharSource for StrSource<'_> {
    fn next_char(&mut self) -> Option<u8> {
        let c = self.bytes.get(self.pos).copied()?;
        self.pos += 1;
        Some(c)
    }
}

pub struct ReaderSource<R> {
    inner: std::io::Bytes<R>,
    done: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self { inner: reader.bytes(), done: false }
    }
}

impl<R: Read> CharSource for ReaderSource<R> {
    fn next_char(&mut self) -> Option<u8> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok(c)) => Some(c),
            Some(Err(e)) => {
                tracing::warn!("read error treated as end of input: {e}");
                self.done = true;
                None
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

pub struct Lexer<S> {
    src: S,
    pushback: Option<u8>,
    line: u32,
}

impl<S: CharSource> Lexer<S> {
    pub fn new(src: S) -> Self {
        Self { src, pushback: None, line: 1 }
    }

    fn getc(&mut self) -> Option<u8> {
        let c = match self.pushback.take() {
            Some(c) => Some(c),
            None => self.src.next_char(),
        };
        if c == Some(b'\n') {
            self.line += 1;
        }
        c
    }

    fn ungetc(&mut self, c: Option<u8>) {
        let Some(c) = c else { return };
        assert!(self.pushback.is_none(), "lexer pushback already holds a byte");
        if c == b'\n' {
            self.line -= 1;
        }
        self.pushback = Some(c);
    }

    fn skip_blank(&mut self) -> Option<u8> {
        loop {
            let c = self.getc()?;
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => continue,
                b'/' => {
                    let next = self.getc();
                    if next == Some(b'/') {
                        while !matches!(self.getc(), None | Some(b'\n')) {}
                        continue;
                    }
                    self.ungetc(next);
                    return Some(c);
                }
                _ => return Some(c),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        let Some(c) = self.skip_blank() else {
            return Ok(Token::new(TokenKind::Eof, self.line));
        };
        let line = self.line;
        let kind = match c {
            b'"' => self.string(line)?,
            b'0'..=b'9' => self.number(c, line)?,
            c if c.is_ascii_alphabetic() => self.word(c),
            _ => TokenKind::Punct(self.punct(c, line)?),
        };
        Ok(Token::new(kind, line))
    }

    fn string(&mut self, line: u32) -> Result<TokenKind> {
        let mut bytes = Vec::new();
        loop {
            match self.getc() {
                None => return Err(Error::lex(line, "unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => match self.getc() {
                    Some(c @ (b'\\' | b'\'' | b'"')) => bytes.push(c),
                    Some(c) => {
                        return Err(Error::lex(
                            self.line,
                            format!("invalid escape `\\{}`", c as char),
                        ))
                    }
                    None => return Err(Error::lex(line, "unterminated string")),
                },
                Some(c) => bytes.push(c),
            }
        }
        let text = String::from_utf8(bytes).map_err(|_| Error::lex(line, "string is not valid UTF-8"))?;
        Ok(TokenKind::Literal(Value::Text(text)))
    }

    fn number(&mut self, first: u8, line: u32) -> Result<TokenKind> {
        let mut text = String::new();
        text.push(first as char);

        if first == b'0' {
            let c = self.getc();
            match c {
                Some(b'x' | b'X') => {
                    let mut digits = String::new();
                    loop {
                        let c = self.getc();
                        match c {
                            Some(d) if d.is_ascii_hexdigit() => digits.push(d as char),
                            _ => {
                                self.ungetc(c);
                                break;
                            }
                        }
                    }
                    if digits.is_empty() {
                        return Err(Error::lex(line, "malformed hex literal"));
                    }
                    let v = u64::from_str_radix(&digits, 16)
                        .map_err(|_| Error::lex(line, format!("hex literal 0x{digits} out of range")))?;
                    return Ok(TokenKind::Literal(Value::Unsigned(v)));
                }
                Some(d) if d.is_ascii_digit() || d == b'.' => text.push(d as char),
                _ => {
                    self.ungetc(c);
                    return Ok(TokenKind::Literal(Value::Unsigned(0)));
                }
            }
        }

        let mut float = text.contains('.');
        loop {
            let c = self.getc();
            match c {
                Some(b'.') if !float => {
                    float = true;
                    text.push('.');
                }
                Some(d) if d.is_ascii_digit() => text.push(d as char),
                _ => {
                    self.ungetc(c);
                    break;
                }
            }
        }

        if float {
            let v = text
                .parse::<f64>()
                .map_err(|_| Error::lex(line, format!("malformed float literal `{text}`")))?;
            return Ok(TokenKind::Literal(Value::Float(v)));
        }
        let (digits, radix) = if text.len() > 1 && text.starts_with('0') {
            (&text[1..], 8)
        } else {
            (text.as_str(), 10)
        };
        let v = u64::from_str_radix(digits, radix)
            .map_err(|_| Error::lex(line, format!("malformed integer literal `{text}`")))?;
        Ok(TokenKind::Literal(Value::Unsigned(v)))
    }

    fn word(&mut self, first: u8) -> TokenKind {
        let mut name = String::new();
        name.push(first.to_ascii_uppercase() as char);
        loop {
            let c = self.getc();
            match c {
                Some(d) if d.is_ascii_alphanumeric() || d == b'_' => {
                    name.push(d.to_ascii_uppercase() as char)
                }
                _ => {
                    self.ungetc(c);
                    break;
                }
            }
        }
        match name.as_str() {
            "TRUE" => return TokenKind::Literal(Value::Boolean(true)),
            "FALSE" => return TokenKind::Literal(Value::Boolean(false)),
            _ => {}
        }
        match Keyword::lookup(&name) {
            Some(k) => TokenKind::Keyword(k),
            None => TokenKind::Ident(name),
        }
    }

    fn punct(&mut self, c: u8, line: u32) -> Result<Punct> {
        let single = match c {
            b';' => Some(Punct::Semicolon),
            b'(' => Some(Punct::LParen),
            b')' => Some(Punct::RParen),
            b'{' => Some(Punct::LBrace),
            b'}' => Some(Punct::RBrace),
            b',' => Some(Punct::Comma),
            b'&' => Some(Punct::Amp),
            b'|' => Some(Punct::Pipe),
            b'^' => Some(Punct::Caret),
            b'~' => Some(Punct::Tilde),
            b'+' => Some(Punct::Plus),
            b'-' => Some(Punct::Minus),
            b'*' => Some(Punct::Star),
            b'/' => Some(Punct::Slash),
            b'%' => Some(Punct::Percent),
            _ => None,
        };
        if let Some(p) = single {
            return Ok(p);
        }

        let next = self.getc();
        let (p, used) = match (c, next) {
            (b'=', Some(b'=')) => (Punct::EqEq, true),
            (b'=', _) => (Punct::Assign, false),
            (b'!', Some(b'=')) => (Punct::NotEq, true),
            (b'!', _) => (Punct::Bang, false),
            (b'>', Some(b'=')) => (Punct::Ge, true),
            (b'>', Some(b'>')) => (Punct::Shr, true),
            (b'>', _) => (Punct::Gt, false),
            (b'<', Some(b'=')) => (Punct::Le, true),
            (b'<', Some(b'<')) => (Punct::Shl, true),
            (b'<', _) => (Punct::Lt, false),
            _ => {
                return Err(Error::lex(
                    line,
                    format!("unexpected character `{}`", c.escape_ascii()),
                ))
            }
        };
        if !used {
            self.ungetc(next);
        }
        Ok(p)
    }
}

/// Lex everything up to end of input. Mostly useful in tests.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(StrSource::new(text));
    let mut out = Vec::new();
    loop {
        let t = lexer.next_token()?;
        if t.is_eof() {
            return Ok(out);
        }
        out.push(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("0x1F 017 42 0 1.5"),
            vec![
                TokenKind::Literal(Value::Unsigned(0x1f)),
                TokenKind::Literal(Value::Unsigned(0o17)),
                TokenKind::Literal(Value::Unsigned(42)),
                TokenKind::Literal(Value::Unsigned(0)),
                TokenKind::Literal(Value::Float(1.5)),
            ]
        );
    }

    #[test]
    fn malformed_literals_are_lexical_errors() {
        assert!(matches!(tokenize("0x"), Err(Error::Lex { .. })));
        assert!(matches!(tokenize("09"), Err(Error::Lex { .. })));
        assert!(matches!(tokenize("\"abc"), Err(Error::Lex { .. })));
        assert!(matches!(tokenize("\"a\\n\""), Err(Error::Lex { .. })));
        assert!(matches!(tokenize("$"), Err(Error::Lex { .. })));
    }

    #[test]
    fn words_are_case_insensitive() {
        assert_eq!(
            kinds("Opcode mrm al True"),
            vec![
                TokenKind::Keyword(Keyword::Opcode),
                TokenKind::Keyword(Keyword::Mrm),
                TokenKind::Ident("AL".into()),
                TokenKind::Literal(Value::Boolean(true)),
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![TokenKind::Literal(Value::Text("a\"b\\c".into()))]
        );
    }

    #[test]
    fn operators_and_comments() {
        assert_eq!(
            kinds("a<<=b // trailing\n>= != !"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Punct(Punct::Shl),
                TokenKind::Punct(Punct::Assign),
                TokenKind::Ident("B".into()),
                TokenKind::Punct(Punct::Ge),
                TokenKind::Punct(Punct::NotEq),
                TokenKind::Punct(Punct::Bang),
            ]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let toks = tokenize("a\n\nb // c\nd").unwrap();
        let lines: Vec<u32> = toks.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3, 4]);
    }
}
