pub mod block;
pub mod compiler;
pub mod context;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod macros;
pub mod opcode;
pub mod parser;
pub mod preproc;
pub mod token;
pub mod tree;
pub mod value;

pub use compiler::{compile, compile_reader, compile_str, Compilation};
pub use context::{CompileOptions, LogLevel, Message, Settings, UnknownOpcode};
pub use error::{Error, Result};
pub use opcode::{ByteSpec, OpcodeSpec, Operand, SpecKind};
pub use tree::{EncodingTree, NodeId, NodeKind, TreeError};
pub use value::Value;
