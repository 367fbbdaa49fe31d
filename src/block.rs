use crate::error::{Error, Result};
use crate::lexer::{CharSource, Lexer};
use crate::token::{Keyword, Punct, Token, TokenKind};

/// Tokens of one statement: everything up to and including `;` or `{`, or a
/// closing `}` with its optional `if`/`macro` terminator.
pub type Block = Vec<Token>;

pub fn is_closing(block: &[Token]) -> bool {
    block.first().is_some_and(|t| t.is_punct(Punct::RBrace))
}

pub fn opens_body(block: &[Token]) -> bool {
    block.last().is_some_and(|t| t.is_punct(Punct::LBrace))
}

/// Terminator keyword absorbed into a closing block, if any.
pub fn terminator(block: &[Token]) -> Option<Keyword> {
    if !is_closing(block) {
        return None;
    }
    block.get(1).and_then(|t| match t.kind {
        TokenKind::Keyword(k @ (Keyword::If | Keyword::Macro)) => Some(k),
        _ => None,
    })
}

pub struct BlockReader<S> {
    lexer: Lexer<S>,
    peeked: Option<Token>,
}

impl<S: CharSource> BlockReader<S> {
    pub fn new(src: S) -> Self {
        Self { lexer: Lexer::new(src), peeked: None }
    }

    fn token(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        let t = match self.peeked.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(t))
    }

    fn absorb_if(&mut self, block: &mut Block, pred: impl Fn(&Token) -> bool) -> Result<bool> {
        if pred(self.peek()?) {
            block.push(self.token()?);
            return Ok(true);
        }
        Ok(false)
    }

    /// Next block from the input, or `None` at a clean end of input.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        let mut block = Block::new();
        loop {
            let t = self.token()?;
            if t.is_eof() {
                if block.is_empty() {
                    return Ok(None);
                }
                return Err(Error::syntax(t.line, "unexpected end of input, missing `;`"));
            }
            if t.is_punct(Punct::RBrace) {
                if !block.is_empty() {
                    return Err(Error::syntax(t.line, "unexpected `}`, missing `;`"));
                }
                block.push(t);
                self.absorb_if(&mut block, |t| {
                    t.is_keyword(Keyword::If) || t.is_keyword(Keyword::Macro)
                })?;
                self.absorb_if(&mut block, |t| t.is_punct(Punct::Semicolon))?;
                return Ok(Some(block));
            }
            let end = t.is_punct(Punct::Semicolon) || t.is_punct(Punct::LBrace);
            block.push(t);
            if end {
                return Ok(Some(block));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::StrSource;

    fn blocks(text: &str) -> Vec<Block> {
        let mut r = BlockReader::new(StrSource::new(text));
        let mut out = Vec::new();
        while let Some(b) = r.next_block().unwrap() {
            out.push(b);
        }
        out
    }

    #[test]
    fn splits_statements_and_bodies() {
        let b = blocks("if 1 { set \"a\" 1; } if log 2;");
        assert_eq!(b.len(), 4);
        assert!(opens_body(&b[0]));
        assert_eq!(b[1].len(), 4);
        assert_eq!(terminator(&b[2]), Some(Keyword::If));
        assert_eq!(b[3].len(), 3);
    }

    #[test]
    fn closing_brace_without_terminator() {
        let b = blocks("} else { } macro;");
        assert_eq!(b.len(), 3);
        assert_eq!(terminator(&b[0]), None);
        assert_eq!(terminator(&b[2]), Some(Keyword::Macro));
        assert_eq!(b[2].len(), 3);
    }

    #[test]
    fn missing_semicolon_at_end() {
        let mut r = BlockReader::new(StrSource::new("set \"a\" 1"));
        assert!(matches!(r.next_block(), Err(Error::Syntax { .. })));
    }
}
