use std::fmt;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::opcode::{ByteSpec, OpcodeSpec, SpecKind};

/// One bit per child slot.
pub type Occupancy = BitArr!(for 256, in u64, Lsb0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Unclassified,
    /// Opcode table index.
    Leaf(usize),
    /// Prefix table index. May also carry children for mandatory-prefix encodings.
    Prefix(usize),
    /// Branches on a literal byte.
    Linear,
    /// Mod/reg/rm byte followed by a literal suffix that selects the opcode.
    MrmLinear,
    /// Branches on every combined mod/reg/rm value the specs allow.
    ModRegRm,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Unclassified => f.write_str("unclassified"),
            NodeKind::Leaf(i) => write!(f, "leaf #{i}"),
            NodeKind::Prefix(i) => write!(f, "prefix #{i}"),
            NodeKind::Linear => f.write_str("linear"),
            NodeKind::MrmLinear => f.write_str("mrm-linear"),
            NodeKind::ModRegRm => f.write_str("mod/reg/rm"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("{name}: encoding entry {index}: {reason}")]
    Shape { name: String, index: usize, reason: &'static str },
    #[error("{name}: encoding overlaps at [{path}]: node is {existing}, wanted {wanted}")]
    Overlap {
        name: String,
        index: usize,
        existing: NodeKind,
        wanted: NodeKind,
        path: String,
    },
}

/// Child slots, allocated on the first insert so leaves stay small.
type ChildTable = Box<[Option<NodeId>; 256]>;

#[derive(Debug, Clone)]
pub struct EncodingNode {
    pub kind: NodeKind,
    children: Option<ChildTable>,
}

impl EncodingNode {
    fn new() -> Self {
        Self { kind: NodeKind::Unclassified, children: None }
    }

    pub fn child(&self, byte: u8) -> Option<NodeId> {
        self.children.as_ref().and_then(|t| t[usize::from(byte)])
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn children(&self) -> impl Iterator<Item = (u8, NodeId)> + '_ {
        self.children
            .iter()
            .flat_map(|t| t.iter().enumerate())
            .filter_map(|(b, &c)| c.map(|c| (b as u8, c)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub nodes: usize,
    pub leaves: usize,
    pub prefixes: usize,
    pub linear: usize,
    pub mrm_linear: usize,
    pub mod_reg_rm: usize,
}

/// Byte trie over all encodings. Nodes live in an arena and are addressed by
/// `NodeId`; the root is always node 0.
#[derive(Debug, Clone)]
pub struct EncodingTree {
    nodes: Vec<EncodingNode>,
}

impl Default for EncodingTree {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_path(path: &[u8]) -> String {
    path.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

impl EncodingTree {
    pub fn new() -> Self {
        Self { nodes: vec![EncodingNode::new()] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].kind == NodeKind::Unclassified
    }

    pub fn node(&self, id: NodeId) -> &EncodingNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &EncodingNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Follow `bytes` from the root.
    pub fn lookup(&self, bytes: &[u8]) -> Option<NodeId> {
        bytes.iter().try_fold(self.root(), |id, &b| self.node(id).child(b))
    }

    pub fn occupancy(&self, id: NodeId) -> Occupancy {
        let mut occ = bitarr![u64, Lsb0; 0; 256];
        for (b, _) in self.node(id).children() {
            occ.set(usize::from(b), true);
        }
        occ
    }

    pub fn summary(&self) -> TreeSummary {
        let mut s = TreeSummary { nodes: self.nodes.len(), ..TreeSummary::default() };
        for n in &self.nodes {
            match n.kind {
                NodeKind::Unclassified => {}
                NodeKind::Leaf(_) => s.leaves += 1,
                NodeKind::Prefix(_) => s.prefixes += 1,
                NodeKind::Linear => s.linear += 1,
                NodeKind::MrmLinear => s.mrm_linear += 1,
                NodeKind::ModRegRm => s.mod_reg_rm += 1,
            }
        }
        s
    }

    /// Build the trie from a canonically ordered table. Specs that are
    /// malformed or overlap an earlier one are reported and skipped.
    pub fn build(specs: &[OpcodeSpec]) -> (EncodingTree, Vec<TreeError>) {
        let mut tree = EncodingTree::new();
        let mut errors = Vec::new();
        for (index, spec) in specs.iter().enumerate() {
            let r = validate(spec).and_then(|()| tree.insert(index, spec));
            if let Err(e) = r {
                tracing::error!("{e}");
                errors.push(e);
            }
        }
        tracing::debug!(nodes = tree.len(), errors = errors.len(), "encoding tree built");
        (tree, errors)
    }

    /// Insert one spec. On overlap the insertion stops at the first conflict;
    /// nodes already classified for this spec stay as they are.
    pub fn insert(&mut self, index: usize, spec: &OpcodeSpec) -> Result<(), TreeError> {
        let mut path = Vec::new();
        self.insert_at(self.root(), index, spec, 0, &mut path)
    }

    fn child_or_insert(&mut self, id: NodeId, byte: u8) -> NodeId {
        if let Some(c) = self.node(id).child(byte) {
            return c;
        }
        let c = NodeId(self.nodes.len() as u32);
        self.nodes.push(EncodingNode::new());
        let table = self.nodes[id.index()].children.get_or_insert_with(|| Box::new([None; 256]));
        table[usize::from(byte)] = Some(c);
        c
    }

    fn classify(
        &mut self,
        id: NodeId,
        wanted: NodeKind,
        spec: &OpcodeSpec,
        index: usize,
        path: &[u8],
    ) -> Result<(), TreeError> {
        let existing = self.node(id).kind;
        let kind = match (existing, wanted) {
            (NodeKind::Unclassified, w) => w,
            (e, w) if e == w => e,
            (NodeKind::Prefix(_), NodeKind::Linear) => existing,
            (NodeKind::Linear, NodeKind::Prefix(_)) => wanted,
            _ => {
                return Err(TreeError::Overlap {
                    name: spec.name.clone(),
                    index,
                    existing,
                    wanted,
                    path: hex_path(path),
                })
            }
        };
        self.nodes[id.index()].kind = kind;
        Ok(())
    }

    fn insert_at(
        &mut self,
        id: NodeId,
        index: usize,
        spec: &OpcodeSpec,
        cursor: usize,
        path: &mut Vec<u8>,
    ) -> Result<(), TreeError> {
        match spec.bytes.get(cursor) {
            None | Some(ByteSpec::Immediate(_)) => {
                let end = match spec.kind {
                    SpecKind::Opcode => NodeKind::Leaf(index),
                    SpecKind::Prefix => NodeKind::Prefix(index),
                };
                self.classify(id, end, spec, index, path)
            }
            Some(ByteSpec::Literal { values, .. }) => {
                self.classify(id, NodeKind::Linear, spec, index, path)?;
                self.fan_out(id, values.iter().copied(), index, spec, cursor + 1, path)
            }
            Some(ByteSpec::ModRegRm) => {
                let escape = match spec.bytes.get(cursor + 1) {
                    Some(ByteSpec::Literal { values, .. })
                        if cursor + 2 == spec.bytes.len() && !spec.has_constraints() =>
                    {
                        Some(values)
                    }
                    _ => None,
                };
                if let Some(values) = escape {
                    self.classify(id, NodeKind::MrmLinear, spec, index, path)?;
                    return self.fan_out(id, values.iter().copied(), index, spec, cursor + 2, path);
                }

                self.classify(id, NodeKind::ModRegRm, spec, index, path)?;
                let allowed = |mask: u8, v: u8| mask == 0 || mask & (1 << v) != 0;
                let bytes = (0..4u8)
                    .filter(|&m| spec.mod_constraint.allows(m))
                    .flat_map(|m| (0..8u8).map(move |r| (m, r)))
                    .filter(|&(_, r)| allowed(spec.reg_mask, r))
                    .flat_map(|(m, r)| (0..8u8).map(move |rm| (m, r, rm)))
                    .filter(|&(_, _, rm)| allowed(spec.rm_mask, rm))
                    .map(|(m, r, rm)| (m << 6) | (r << 3) | rm);
                self.fan_out(id, bytes, index, spec, cursor + 1, path)
            }
        }
    }

    fn fan_out(
        &mut self,
        id: NodeId,
        bytes: impl Iterator<Item = u8>,
        index: usize,
        spec: &OpcodeSpec,
        cursor: usize,
        path: &mut Vec<u8>,
    ) -> Result<(), TreeError> {
        for b in bytes {
            let child = self.child_or_insert(id, b);
            path.push(b);
            let r = self.insert_at(child, index, spec, cursor, path);
            path.pop();
            r?;
        }
        Ok(())
    }
}

/// Encodings must read: literal bytes, an optional `mrm` with an optional
/// literal suffix, then at most two immediates.
pub fn validate(spec: &OpcodeSpec) -> Result<(), TreeError> {
    let shape = |index: usize, reason: &'static str| TreeError::Shape { name: spec.name.clone(), index, reason };

    #[derive(PartialEq)]
    enum Phase {
        Opcode,
        Mrm,
        Suffix,
        Immediate,
    }

    match spec.bytes.first() {
        None => return Err(shape(0, "no encoding bytes")),
        Some(b) if !b.is_literal() => return Err(shape(0, "encoding must start with a literal byte")),
        Some(_) => {}
    }

    let mut phase = Phase::Opcode;
    let mut immediates = 0;
    for (i, b) in spec.bytes.iter().enumerate() {
        match b {
            ByteSpec::Literal { .. } => match phase {
                Phase::Opcode | Phase::Suffix => {}
                Phase::Mrm => phase = Phase::Suffix,
                Phase::Immediate => return Err(shape(i, "literal byte after an immediate")),
            },
            ByteSpec::ModRegRm => {
                if phase != Phase::Opcode {
                    return Err(shape(i, "`mrm` must follow the opcode bytes"));
                }
                phase = Phase::Mrm;
            }
            ByteSpec::Immediate(_) => {
                immediates += 1;
                if immediates > 2 {
                    return Err(shape(i, "more than two immediates"));
                }
                phase = Phase::Immediate;
            }
        }
    }
    Ok(())
}
