use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;

use opcc_rs::context::Settings;
use opcc_rs::tree::TreeSummary;
use opcc_rs::{Compilation, OpcodeSpec, SpecKind, UnknownOpcode};

/// Open a source for streaming into the compiler. An empty file is a valid, empty source.
pub fn open_source(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Encoding,
    Name,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report<'a> {
    pub ok: bool,
    pub opcode_limit: u64,
    pub unknown_opcode: UnknownOpcode,
    pub settings: &'a Settings,
    pub tree: TreeSummary,
    pub errors: Vec<String>,
    pub opcodes: Vec<&'a OpcodeSpec>,
}

pub fn ordered(c: &Compilation, order: Order) -> Vec<&OpcodeSpec> {
    match order {
        Order::Encoding => c.opcodes.iter().collect(),
        Order::Name => c.opcodes_by_name(),
    }
}

pub fn build_report(c: &Compilation, order: Order) -> Report<'_> {
    Report {
        ok: c.is_ok(),
        opcode_limit: c.opcode_limit,
        unknown_opcode: c.unknown_opcode,
        settings: &c.settings,
        tree: c.tree.summary(),
        errors: c
            .errors
            .iter()
            .map(|e| e.to_string())
            .chain(c.tree_errors.iter().map(|e| e.to_string()))
            .collect(),
        opcodes: ordered(c, order),
    }
}

/// One line per spec: kind, name, encoding, then the description if any.
pub fn render_text(c: &Compilation, order: Order) -> String {
    let mut out = String::new();
    for s in ordered(c, order) {
        let kind = match s.kind {
            SpecKind::Prefix => "prefix",
            SpecKind::Opcode => "opcode",
        };
        let _ = write!(out, "{kind:<6} {:<12} {}", s.name, s.encoding_string());
        if let Some(d) = &s.description {
            let _ = write!(out, "  ; {d}");
        }
        out.push('\n');
    }
    let t = c.tree.summary();
    let _ = writeln!(
        out,
        "{} specs, {} nodes ({} leaves, {} prefixes), limit {}, unknown opcode {}",
        c.opcodes.len(),
        t.nodes,
        t.leaves,
        t.prefixes,
        c.opcode_limit,
        c.unknown_opcode
    );
    out
}
