use crate::value::EvalError;

/// Diagnostics raised while lexing, preprocessing and parsing.
///
/// Whether an error ends the run depends on where it surfaces: the block loop
/// propagates preprocessor errors to the driver, while errors raised by the
/// statement parser only abort the statement that produced them.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("line {line}: lexical error: {message}")]
    Lex { line: u32, message: String },
    #[error("line {line}: syntax error: {message}")]
    Syntax { line: u32, message: String },
    #[error("line {line}: {message}")]
    Semantic { line: u32, message: String },
    #[error("line {line}: {source}")]
    Eval {
        line: u32,
        #[source]
        source: EvalError,
    },
    #[error("line {line}: error: {message}")]
    User { line: u32, message: String },
}

impl Error {
    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        Error::Lex { line, message: message.into() }
    }

    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        Error::Syntax { line, message: message.into() }
    }

    pub fn semantic(line: u32, message: impl Into<String>) -> Self {
        Error::Semantic { line, message: message.into() }
    }

    pub fn eval(line: u32, source: EvalError) -> Self {
        Error::Eval { line, source }
    }

    pub fn line(&self) -> u32 {
        match self {
            Error::Lex { line, .. }
            | Error::Syntax { line, .. }
            | Error::Semantic { line, .. }
            | Error::Eval { line, .. }
            | Error::User { line, .. } => *line,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
