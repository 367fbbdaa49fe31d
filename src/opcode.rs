use std::cmp::Ordering;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecKind {
    Prefix,
    Opcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImmediateKind {
    Byte,
    SignedByte,
    Word,
    SignedWord,
    Dword,
    SignedDword,
    Qword,
    SignedQword,
    FarPointer,
    Float32,
    Float64,
    Float80,
}

impl ImmediateKind {
    pub fn from_bits(bits: u64, signed: bool) -> Option<Self> {
        Some(match (bits, signed) {
            (8, false) => ImmediateKind::Byte,
            (8, true) => ImmediateKind::SignedByte,
            (16, false) => ImmediateKind::Word,
            (16, true) => ImmediateKind::SignedWord,
            (32, false) => ImmediateKind::Dword,
            (32, true) => ImmediateKind::SignedDword,
            (64, false) => ImmediateKind::Qword,
            (64, true) => ImmediateKind::SignedQword,
            _ => return None,
        })
    }
}

/// One position in an encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteSpec {
    /// Sorted, de-duplicated, never empty. `bind` names the matched value.
    Literal { values: Vec<u8>, bind: Option<String> },
    ModRegRm,
    Immediate(ImmediateKind),
}

impl ByteSpec {
    pub fn literal(values: Vec<u8>) -> Self {
        ByteSpec::Literal { values, bind: None }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ByteSpec::Literal { .. })
    }
}

impl fmt::Display for ByteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSpec::Literal { values, bind } => {
                if let Some(b) = bind {
                    write!(f, "{}=", b.to_lowercase())?;
                }
                let first = values.first().copied().unwrap_or(0);
                let last = values.last().copied().unwrap_or(0);
                let contiguous = usize::from(last - first) + 1 == values.len();
                if values.len() > 1 && contiguous {
                    write!(f, "{first:#04x}-{last:#04x}")
                } else {
                    let parts: Vec<String> = values.iter().map(|v| format!("{v:#04x}")).collect();
                    f.write_str(&parts.join(","))
                }
            }
            ByteSpec::ModRegRm => f.write_str("mrm"),
            ByteSpec::Immediate(k) => write!(f, "immediate({k:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ModConstraint {
    #[default]
    Any,
    /// mod == 3
    Register,
    /// mod != 3
    Memory,
}

impl ModConstraint {
    pub fn allows(self, m: u8) -> bool {
        match self {
            ModConstraint::Any => true,
            ModConstraint::Register => m == 3,
            ModConstraint::Memory => m != 3,
        }
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags: u16 {
const CF = 1 << 0; // Carry
const PF = 1 << 2; // Parity
const AF = 1 << 4; // Auxiliary carry
const ZF = 1 << 6; // Zero
const SF = 1 << 7; // Sign
const TF = 1 << 8; // Trap
const IF = 1 << 9; // Interrupt enable
const DF = 1 << 10; // Direction
const OF = 1 << 11; // Overflow
}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegReg {
    Es,
    Cs,
    Ss,
    Ds,
    Fs,
    Gs,
}

impl SegReg {
    pub const ALL: [SegReg; 6] = [SegReg::Es, SegReg::Cs, SegReg::Ss, SegReg::Ds, SegReg::Fs, SegReg::Gs];

    pub fn from_name(name: &str) -> Option<SegReg> {
        Some(match name {
            "ES" => SegReg::Es,
            "CS" => SegReg::Cs,
            "SS" => SegReg::Ss,
            "DS" => SegReg::Ds,
            "FS" => SegReg::Fs,
            "GS" => SegReg::Gs,
            _ => return None,
        })
    }

    pub fn from_index(i: u64) -> Option<SegReg> {
        usize::try_from(i).ok().and_then(|i| Self::ALL.get(i).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterClass {
    /// General register picked by the mod/reg/rm reg field.
    Reg,
    /// Register or memory picked by the rm field.
    Rm,
    Sreg,
    Cr,
    Dr,
    Tr,
}

/// Register index for st()/mm()/xmm() operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegSelect {
    Index(u8),
    RegField,
    RmField,
    /// A name bound by `NAME=` in the code clause.
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrTerm {
    Register(String),
    Displacement(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Value(u64),
    /// Fixed register by name, e.g. AL or DX.
    Fixed(String),
    Flag(Flags),
    Register { class: RegisterClass, width: u16 },
    Memory { width: u16, address: Vec<AddrTerm> },
    FarMemory { width: u16, segment: SegReg, address: Vec<AddrTerm> },
    St(RegSelect),
    Mm(RegSelect),
    Xmm(RegSelect),
    Constant(Vec<u64>),
}

impl Operand {
    pub fn selector(&self) -> Option<&RegSelect> {
        match self {
            Operand::St(s) | Operand::Mm(s) | Operand::Xmm(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackDirection {
    Push,
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEffect {
    pub direction: StackDirection,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepCondition {
    pub flag: Flags,
    pub negate: bool,
}

/// One prefix or opcode definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeSpec {
    pub kind: SpecKind,
    pub name: String,
    pub bytes: Vec<ByteSpec>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub dest: Option<Operand>,
    pub params: Vec<Option<Operand>>,
    pub reads: Vec<Operand>,
    pub writes: Vec<Operand>,
    pub modifies: Vec<Operand>,
    pub stack: Option<StackEffect>,
    pub fpu_stack: Option<StackEffect>,
    pub flags_read: Flags,
    pub flags_written: Flags,
    pub flags_modified: Flags,
    pub mod_constraint: ModConstraint,
    /// Allowed reg field values, bit n for value n. Zero means any.
    pub reg_mask: u8,
    /// Allowed rm field values, bit n for value n. Zero means any.
    pub rm_mask: u8,
    // prefix-only
    pub segment: Option<SegReg>,
    pub wait: bool,
    pub lock: bool,
    pub rep: Option<RepCondition>,
    pub line: u32,
}

impl OpcodeSpec {
    pub fn new(kind: SpecKind, name: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            name: name.into(),
            bytes: Vec::new(),
            description: None,
            comment: None,
            dest: None,
            params: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            modifies: Vec::new(),
            stack: None,
            fpu_stack: None,
            flags_read: Flags::empty(),
            flags_written: Flags::empty(),
            flags_modified: Flags::empty(),
            mod_constraint: ModConstraint::Any,
            reg_mask: 0,
            rm_mask: 0,
            segment: None,
            wait: false,
            lock: false,
            rep: None,
            line,
        }
    }

    pub fn has_mrm(&self) -> bool {
        self.bytes.iter().any(|b| matches!(b, ByteSpec::ModRegRm))
    }

    pub fn has_constraints(&self) -> bool {
        self.mod_constraint != ModConstraint::Any || self.reg_mask != 0 || self.rm_mask != 0
    }

    /// Space-separated `code` clause rendering, e.g. `0x0f 0x01 mrm`.
    pub fn encoding_string(&self) -> String {
        self.bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyEntry<'a> {
    Byte(&'a [u8]),
    ModRegRm,
}

fn encoding_key(spec: &OpcodeSpec) -> Vec<KeyEntry<'_>> {
    spec.bytes
        .iter()
        .filter_map(|b| match b {
            ByteSpec::Literal { values, .. } => Some(KeyEntry::Byte(values)),
            ByteSpec::ModRegRm => Some(KeyEntry::ModRegRm),
            ByteSpec::Immediate(_) => None,
        })
        .collect()
}

/// Canonical table order: literal bytes (mrm sorting after any byte value,
/// immediates ignored), then mod constraint, reg mask and rm mask.
pub fn compare_encoding(a: &OpcodeSpec, b: &OpcodeSpec) -> Ordering {
    encoding_key(a)
        .cmp(&encoding_key(b))
        .then(a.mod_constraint.cmp(&b.mod_constraint))
        .then(a.reg_mask.cmp(&b.reg_mask))
        .then(a.rm_mask.cmp(&b.rm_mask))
}

pub fn compare_name(a: &OpcodeSpec, b: &OpcodeSpec) -> Ordering {
    a.name.cmp(&b.name).then_with(|| compare_encoding(a, b))
}
