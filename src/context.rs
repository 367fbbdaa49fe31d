use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockReader};
use crate::error::{Error, Result};
use crate::lexer::CharSource;
use crate::opcode::OpcodeSpec;
use crate::value::Value;

/// Named values visible to `value()`, `isset()` and friends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Defines {
    values: BTreeMap<String, Value>,
}

impl Defines {
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOpcode {
    Silent,
    Ud,
    Exception,
}

impl fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnknownOpcode::Silent => "silent",
            UnknownOpcode::Ud => "ud",
            UnknownOpcode::Exception => "exception",
        })
    }
}

/// Global settings collected from directives. `None` means never set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub opcode_limit: Option<u64>,
    pub unknown_opcode: Option<UnknownOpcode>,
    pub dialect: Option<String>,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub level: LogLevel,
    pub line: u32,
    pub text: String,
}

/// A stored macro body. Expansion clones the blocks, the stored copy is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    /// Upper-cased parameter names.
    pub params: Vec<String>,
    pub body: Vec<Block>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Nested macro invocations allowed before the run is aborted.
    pub max_expansion_depth: usize,
    pub build_tree: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_expansion_depth: 64,
            build_tree: true,
        }
    }
}

/// All state the preprocessor and parser share while reading one source.
pub struct Context<S> {
    pub options: CompileOptions,
    pub defines: Defines,
    pub macros: HashMap<String, Macro>,
    pub opcodes: Vec<OpcodeSpec>,
    pub settings: Settings,
    pub messages: Vec<Message>,
    pub errors: Vec<Error>,
    reader: BlockReader<S>,
    unput: Option<Block>,
    expansions: Vec<VecDeque<Block>>,
}

impl<S: CharSource> Context<S> {
    pub fn new(src: S, options: CompileOptions) -> Self {
        Self {
            options,
            defines: Defines::default(),
            macros: HashMap::new(),
            opcodes: Vec::new(),
            settings: Settings::default(),
            messages: Vec::new(),
            errors: Vec::new(),
            reader: BlockReader::new(src),
            unput: None,
            expansions: Vec::new(),
        }
    }

    /// Next block to process: the pushed-back block, else the innermost macro
    /// expansion, else the input. An exhausted expansion yields `None` without
    /// falling through to the input.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        if let Some(b) = self.unput.take() {
            return Ok(Some(b));
        }
        if let Some(frame) = self.expansions.last_mut() {
            return Ok(frame.pop_front());
        }
        self.reader.next_block()
    }

    pub fn unput_block(&mut self, block: Block) {
        assert!(self.unput.is_none(), "a block is already pushed back");
        self.unput = Some(block);
    }

    pub fn expansion_depth(&self) -> usize {
        self.expansions.len()
    }

    pub(crate) fn push_expansion(&mut self, blocks: Vec<Block>) {
        self.expansions.push(blocks.into());
    }

    pub(crate) fn pop_expansion(&mut self) {
        self.expansions.pop();
    }

    pub fn record_error(&mut self, e: Error) {
        tracing::error!("{e}");
        self.errors.push(e);
    }

    pub fn message(&mut self, level: LogLevel, line: u32, text: impl Into<String>) {
        let text = text.into();
        match level {
            LogLevel::Info => tracing::info!("line {line}: {text}"),
            LogLevel::Warning => tracing::warn!("line {line}: {text}"),
            LogLevel::Error => tracing::error!("line {line}: {text}"),
        }
        self.messages.push(Message { level, line, text });
    }

    pub fn warn(&mut self, line: u32, text: impl Into<String>) {
        self.message(LogLevel::Warning, line, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::StrSource;

    #[test]
    fn expansion_frames_shadow_input() {
        let mut ctx = Context::new(StrSource::new("log 1; log 2;"), CompileOptions::default());
        let first = ctx.next_block().unwrap().unwrap();
        ctx.push_expansion(vec![first.clone()]);
        assert_eq!(ctx.next_block().unwrap(), Some(first));
        assert_eq!(ctx.next_block().unwrap(), None);
        ctx.pop_expansion();
        assert_eq!(ctx.next_block().unwrap().map(|b| b.len()), Some(3));
        assert_eq!(ctx.next_block().unwrap(), None);
    }

    #[test]
    fn unput_replays_once() {
        let mut ctx = Context::new(StrSource::new("log 1;"), CompileOptions::default());
        let b = ctx.next_block().unwrap().unwrap();
        ctx.unput_block(b.clone());
        assert_eq!(ctx.next_block().unwrap(), Some(b));
        assert_eq!(ctx.next_block().unwrap(), None);
    }

    #[test]
    #[should_panic(expected = "already pushed back")]
    fn double_unput_is_a_bug() {
        let mut ctx = Context::new(StrSource::new(""), CompileOptions::default());
        ctx.unput_block(Vec::new());
        ctx.unput_block(Vec::new());
    }
}
