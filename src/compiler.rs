use std::io::Read;

use crate::context::{CompileOptions, Context, Defines, Message, Settings, UnknownOpcode};
use crate::error::Error;
use crate::lexer::{CharSource, ReaderSource, StrSource};
use crate::opcode::{compare_encoding, compare_name, OpcodeSpec};
use crate::tree::{EncodingTree, TreeError};

/// Everything produced by one run over a source.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Prefixes and opcodes in canonical encoding order. Tree leaves index into this.
    pub opcodes: Vec<OpcodeSpec>,
    pub tree: EncodingTree,
    pub settings: Settings,
    /// 0 means unlimited.
    pub opcode_limit: u64,
    pub unknown_opcode: UnknownOpcode,
    pub defines: Defines,
    pub messages: Vec<Message>,
    pub errors: Vec<Error>,
    pub tree_errors: Vec<TreeError>,
    /// Set when processing stopped early on a fatal error.
    pub aborted: bool,
}

impl Compilation {
    /// The table and tree are only meaningful when this holds.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.tree_errors.is_empty()
    }

    pub fn opcodes_by_name(&self) -> Vec<&OpcodeSpec> {
        let mut v: Vec<&OpcodeSpec> = self.opcodes.iter().collect();
        v.sort_by(|a, b| compare_name(a, b));
        v
    }

    pub fn error_count(&self) -> usize {
        self.errors.len() + self.tree_errors.len()
    }
}

pub fn compile<S: CharSource>(src: S, options: CompileOptions) -> Compilation {
    let build_tree = options.build_tree;
    let mut ctx = Context::new(src, options);

    let aborted = match ctx.run() {
        Ok(()) => false,
        Err(e) => {
            ctx.record_error(e);
            true
        }
    };

    let opcode_limit = match ctx.settings.opcode_limit {
        Some(n) => n,
        None => {
            ctx.warn(0, "opcode limit not set, using none");
            0
        }
    };
    let unknown_opcode = match ctx.settings.unknown_opcode {
        Some(p) => p,
        None => {
            ctx.warn(0, "unknown opcode policy not set, using ud");
            UnknownOpcode::Ud
        }
    };

    let mut opcodes = std::mem::take(&mut ctx.opcodes);
    opcodes.sort_by(compare_encoding);

    let (tree, tree_errors) = if build_tree && !aborted {
        EncodingTree::build(&opcodes)
    } else {
        (EncodingTree::new(), Vec::new())
    };

    tracing::info!(
        opcodes = opcodes.len(),
        errors = ctx.errors.len(),
        tree_errors = tree_errors.len(),
        "compilation finished"
    );

    Compilation {
        opcodes,
        tree,
        settings: ctx.settings,
        opcode_limit,
        unknown_opcode,
        defines: ctx.defines,
        messages: ctx.messages,
        errors: ctx.errors,
        tree_errors,
        aborted,
    }
}

pub fn compile_str(text: &str) -> Compilation {
    compile(StrSource::new(text), CompileOptions::default())
}

pub fn compile_reader<R: Read>(reader: R, options: CompileOptions) -> Compilation {
    compile(ReaderSource::new(reader), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogLevel;
    use crate::tree::NodeKind;

    #[test]
    fn defaults_are_applied_with_warnings() {
        let c = compile_str("opcode \"NOP\" (code 0x90);");
        assert!(c.is_ok());
        assert_eq!(c.opcode_limit, 0);
        assert_eq!(c.unknown_opcode, UnknownOpcode::Ud);
        assert_eq!(c.messages.iter().filter(|m| m.level == LogLevel::Warning).count(), 2);
    }

    #[test]
    fn table_is_sorted_and_tree_indexes_it() {
        let c = compile_str(
            "opcode limit none; unknown opcode silent; \
             opcode \"B\" (code 0x91); opcode \"A\" (code 0x90);",
        );
        assert_eq!(c.opcodes[0].name, "A");
        let id = c.tree.lookup(&[0x91]).unwrap();
        assert_eq!(c.tree.node(id).kind, NodeKind::Leaf(1));
        assert_eq!(c.opcodes_by_name()[1].name, "B");
    }

    #[test]
    fn fatal_error_skips_tree() {
        let c = compile_str("opcode \"NOP\" (code 0x90); macro \"missing\" ();");
        assert!(c.aborted);
        assert!(!c.is_ok());
        assert!(c.tree.is_empty());
    }

    #[test]
    fn reader_source() {
        let c = compile_reader("opcode \"NOP\" (code 0x90);".as_bytes(), CompileOptions::default());
        assert_eq!(c.opcodes.len(), 1);
    }
}
