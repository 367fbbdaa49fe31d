use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    Bin,
    Code,
    Comment,
    Constant,
    Cr,
    Desc,
    Dest,
    Dialect,
    Dr,
    Else,
    Error,
    Exception,
    Far,
    Format,
    Fpu,
    Hex,
    If,
    Immediate,
    Isset,
    Limit,
    Lock,
    Log,
    Macro,
    Memory,
    Mm,
    Mod,
    Modifies,
    Mrm,
    None,
    Not,
    Oct,
    Opcode,
    Or,
    Param,
    Pop,
    Prefix,
    Push,
    Reads,
    Reg,
    Rep,
    Rm,
    Seg,
    Set,
    Signed,
    Silent,
    Sreg,
    St,
    Stack,
    String,
    Tr,
    Ud,
    Unknown,
    Unset,
    Unsigned,
    Value,
    Valuetype,
    Wait,
    Warning,
    Writes,
    Xmm,
    Xor,
}

/// Reserved words, sorted by spelling for binary search.
pub const KEYWORDS: &[(&str, Keyword)] = &[
    ("AND", Keyword::And),
    ("BIN", Keyword::Bin),
    ("CODE", Keyword::Code),
    ("COMMENT", Keyword::Comment),
    ("CONSTANT", Keyword::Constant),
    ("CR", Keyword::Cr),
    ("DESC", Keyword::Desc),
    ("DEST", Keyword::Dest),
    ("DIALECT", Keyword::Dialect),
    ("DR", Keyword::Dr),
    ("ELSE", Keyword::Else),
    ("ERROR", Keyword::Error),
    ("EXCEPTION", Keyword::Exception),
    ("FAR", Keyword::Far),
    ("FORMAT", Keyword::Format),
    ("FPU", Keyword::Fpu),
    ("HEX", Keyword::Hex),
    ("IF", Keyword::If),
    ("IMMEDIATE", Keyword::Immediate),
    ("ISSET", Keyword::Isset),
    ("LIMIT", Keyword::Limit),
    ("LOCK", Keyword::Lock),
    ("LOG", Keyword::Log),
    ("MACRO", Keyword::Macro),
    ("MEMORY", Keyword::Memory),
    ("MM", Keyword::Mm),
    ("MOD", Keyword::Mod),
    ("MODIFIES", Keyword::Modifies),
    ("MRM", Keyword::Mrm),
    ("NONE", Keyword::None),
    ("NOT", Keyword::Not),
    ("OCT", Keyword::Oct),
    ("OPCODE", Keyword::Opcode),
    ("OR", Keyword::Or),
    ("PARAM", Keyword::Param),
    ("POP", Keyword::Pop),
    ("PREFIX", Keyword::Prefix),
    ("PUSH", Keyword::Push),
    ("READS", Keyword::Reads),
    ("REG", Keyword::Reg),
    ("REP", Keyword::Rep),
    ("RM", Keyword::Rm),
    ("SEG", Keyword::Seg),
    ("SET", Keyword::Set),
    ("SIGNED", Keyword::Signed),
    ("SILENT", Keyword::Silent),
    ("SREG", Keyword::Sreg),
    ("ST", Keyword::St),
    ("STACK", Keyword::Stack),
    ("STRING", Keyword::String),
    ("TR", Keyword::Tr),
    ("UD", Keyword::Ud),
    ("UNKNOWN", Keyword::Unknown),
    ("UNSET", Keyword::Unset),
    ("UNSIGNED", Keyword::Unsigned),
    ("VALUE", Keyword::Value),
    ("VALUETYPE", Keyword::Valuetype),
    ("WAIT", Keyword::Wait),
    ("WARNING", Keyword::Warning),
    ("WRITES", Keyword::Writes),
    ("XMM", Keyword::Xmm),
    ("XOR", Keyword::Xor),
];

impl Keyword {
    /// `name` must already be upper case.
    pub fn lookup(name: &str) -> Option<Keyword> {
        KEYWORDS
            .binary_search_by(|(k, _)| (*k).cmp(name))
            .ok()
            .map(|i| KEYWORDS[i].1)
    }

    pub fn as_str(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, k)| *k == self)
            .map(|(s, _)| *s)
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Assign,
    EqEq,
    NotEq,
    Bang,
    Gt,
    Lt,
    Ge,
    Le,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl Punct {
    pub fn as_str(self) -> &'static str {
        match self {
            Punct::Semicolon => ";",
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBrace => "{",
            Punct::RBrace => "}",
            Punct::Comma => ",",
            Punct::Assign => "=",
            Punct::EqEq => "==",
            Punct::NotEq => "!=",
            Punct::Bang => "!",
            Punct::Gt => ">",
            Punct::Lt => "<",
            Punct::Ge => ">=",
            Punct::Le => "<=",
            Punct::Shl => "<<",
            Punct::Shr => ">>",
            Punct::Amp => "&",
            Punct::Pipe => "|",
            Punct::Caret => "^",
            Punct::Tilde => "~",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Literal(Value),
    /// Non-reserved word, upper-cased.
    Ident(String),
    Keyword(Keyword),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32) -> Self {
        Self { kind, line }
    }

    pub fn is_punct(&self, p: Punct) -> bool {
        self.kind == TokenKind::Punct(p)
    }

    pub fn is_keyword(&self, k: Keyword) -> bool {
        self.kind == TokenKind::Keyword(k)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Literal(Value::Text(s)) => write!(f, "\"{s}\""),
            TokenKind::Literal(v) => write!(f, "{v}"),
            TokenKind::Ident(s) => f.write_str(s),
            TokenKind::Keyword(k) => f.write_str(k.as_str()),
            TokenKind::Punct(p) => f.write_str(p.as_str()),
            TokenKind::Eof => f.write_str("end of statement"),
        }
    }
}

/// Cursor over a finite token list. Reading past the end yields an Eof sentinel.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        let line = tokens.last().map(|t| t.line).unwrap_or(0);
        Self { tokens, pos: 0, eof: Token::new(TokenKind::Eof, line) }
    }

    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    pub fn next_token(&mut self) -> Token {
        let t = self.peek().clone();
        self.discard(1);
        t
    }

    pub fn discard(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.tokens.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn line(&self) -> u32 {
        self.peek().line
    }

    pub fn remaining(&self) -> &[Token] {
        &self.tokens[self.pos..]
    }

    pub fn eat_punct(&mut self, p: Punct) -> bool {
        if self.peek().is_punct(p) {
            self.discard(1);
            true
        } else {
            false
        }
    }

    pub fn eat_keyword(&mut self, k: Keyword) -> bool {
        if self.peek().is_keyword(k) {
            self.discard(1);
            true
        } else {
            false
        }
    }

    pub fn expect_punct(&mut self, p: Punct) -> Result<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(p.as_str()))
        }
    }

    pub fn expect_keyword(&mut self, k: Keyword) -> Result<()> {
        if self.eat_keyword(k) {
            Ok(())
        } else {
            Err(self.unexpected(k.as_str()))
        }
    }

    pub fn expect_eof(&self) -> Result<()> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of statement"))
        }
    }

    pub fn unexpected(&self, wanted: &str) -> Error {
        Error::syntax(self.line(), format!("expected {wanted}, found `{}`", self.peek()))
    }

    /// Cut out the balanced `( ... )` group at the cursor and return its inside
    /// as a fresh stream. The cursor ends up just past the closing parenthesis.
    pub fn take_group(&mut self) -> Result<TokenStream> {
        if !self.peek().is_punct(Punct::LParen) {
            return Err(self.unexpected("("));
        }
        let start = self.pos + 1;
        let mut depth = 0usize;
        for i in self.pos..self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = self.tokens[start..i].to_vec();
                        self.pos = i + 1;
                        return Ok(TokenStream::new(inner));
                    }
                }
                _ => {}
            }
        }
        Err(Error::syntax(self.line(), "unbalanced parenthesis"))
    }

    /// Split the rest of the stream at top-level commas.
    pub fn split_commas(&mut self) -> Vec<TokenStream> {
        let mut parts = Vec::new();
        let mut cur = Vec::new();
        let mut depth = 0usize;
        while !self.is_eof() {
            let t = self.next_token();
            match t.kind {
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => depth = depth.saturating_sub(1),
                TokenKind::Punct(Punct::Comma) if depth == 0 => {
                    parts.push(TokenStream::new(std::mem::take(&mut cur)));
                    continue;
                }
                _ => {}
            }
            cur.push(t);
        }
        if !cur.is_empty() || !parts.is_empty() {
            parts.push(TokenStream::new(cur));
        }
        parts
    }
}
