use std::collections::BTreeSet;

use crate::context::{Defines, LogLevel, UnknownOpcode};
use crate::error::{Error, Result};
use crate::eval::{bare_name, Evaluator};
use crate::opcode::{
    AddrTerm, ByteSpec, Flags, ImmediateKind, ModConstraint, OpcodeSpec, Operand, RegSelect,
    RegisterClass, RepCondition, SegReg, SpecKind, StackDirection, StackEffect,
};
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Set { name: String, value: Value },
    Unset { name: String },
    Log { level: LogLevel, text: String },
    Comment(String),
    Dialect(String),
    OpcodeLimit(u64),
    UnknownOpcode(UnknownOpcode),
    Spec(OpcodeSpec),
}

/// Parse one `;`-terminated block. Conditionals and macros are handled by the
/// preprocessor and never reach here.
pub fn parse_statement(block: &[Token], defines: &Defines) -> Result<Statement> {
    let line = block.first().map(|t| t.line).unwrap_or(0);
    let body = match block.split_last() {
        Some((last, rest)) if last.is_punct(Punct::Semicolon) => rest,
        _ => return Err(Error::syntax(line, "statement must end with `;`")),
    };
    let mut ts = TokenStream::new(body.to_vec());
    let p = Parser { eval: Evaluator::new(defines) };

    let t = ts.next_token();
    let stmt = match t.kind {
        TokenKind::Keyword(Keyword::Set) => {
            let name = p.name(&mut ts)?;
            ts.eat_punct(Punct::Assign);
            let value = p.eval.evaluate(&mut ts)?;
            Statement::Set { name, value }
        }
        TokenKind::Keyword(Keyword::Unset) => {
            let name = p.name(&mut ts)?;
            ts.expect_eof()?;
            Statement::Unset { name }
        }
        TokenKind::Keyword(k @ (Keyword::Log | Keyword::Warning | Keyword::Error)) => {
            let level = match k {
                Keyword::Log => LogLevel::Info,
                Keyword::Warning => LogLevel::Warning,
                _ => LogLevel::Error,
            };
            let text = p.eval.evaluate(&mut ts)?.to_string();
            Statement::Log { level, text }
        }
        TokenKind::Keyword(Keyword::Comment) => Statement::Comment(p.eval.evaluate(&mut ts)?.to_string()),
        TokenKind::Keyword(Keyword::Dialect) => Statement::Dialect(p.eval.evaluate(&mut ts)?.to_string()),
        TokenKind::Keyword(Keyword::Opcode) if ts.peek().is_keyword(Keyword::Limit) => {
            ts.discard(1);
            let limit = match p.eval.evaluate(&mut ts)? {
                Value::None => 0,
                v if v.is_numeric() => v.to_unsigned(),
                v => {
                    return Err(Error::semantic(
                        line,
                        format!("opcode limit must be numeric, got {}", v.value_type().name()),
                    ))
                }
            };
            Statement::OpcodeLimit(limit)
        }
        TokenKind::Keyword(Keyword::Unknown) => {
            ts.expect_keyword(Keyword::Opcode)?;
            let policy = match ts.next_token().kind {
                TokenKind::Keyword(Keyword::Silent) => UnknownOpcode::Silent,
                TokenKind::Keyword(Keyword::Ud) => UnknownOpcode::Ud,
                TokenKind::Keyword(Keyword::Exception) => UnknownOpcode::Exception,
                _ => return Err(Error::syntax(line, "expected `silent`, `ud` or `exception`")),
            };
            ts.expect_eof()?;
            Statement::UnknownOpcode(policy)
        }
        TokenKind::Keyword(Keyword::Opcode) => Statement::Spec(p.spec(SpecKind::Opcode, line, &mut ts)?),
        TokenKind::Keyword(Keyword::Prefix) => Statement::Spec(p.spec(SpecKind::Prefix, line, &mut ts)?),
        _ => return Err(Error::syntax(line, format!("unknown statement `{t}`"))),
    };
    Ok(stmt)
}

struct Parser<'a> {
    eval: Evaluator<'a>,
}

fn u8_field(line: u32, v: u64, max: u64, what: &str) -> Result<u8> {
    if v > max {
        return Err(Error::semantic(line, format!("{what} {v:#x} out of range (max {max:#x})")));
    }
    Ok(v as u8)
}

fn flag_of(t: &Token) -> Option<Flags> {
    match &t.kind {
        TokenKind::Literal(Value::Text(_)) => None,
        _ => bare_name(t).and_then(|n| Flags::from_name(&n)),
    }
}

impl Parser<'_> {
    fn name(&self, ts: &mut TokenStream) -> Result<String> {
        let name = bare_name(ts.peek()).ok_or_else(|| ts.unexpected("name"))?;
        ts.discard(1);
        Ok(name)
    }

    fn unsigned(&self, ts: &mut TokenStream) -> Result<u64> {
        let line = ts.line();
        let v = self.eval.evaluate(ts)?;
        if !v.is_numeric() {
            return Err(Error::semantic(
                line,
                format!("expected a number, got {}", v.value_type().name()),
            ));
        }
        Ok(v.to_unsigned())
    }

    fn width(&self, ts: &mut TokenStream) -> Result<u16> {
        let line = ts.line();
        let w = self.unsigned(ts)?;
        u16::try_from(w).map_err(|_| Error::semantic(line, format!("operand width {w} too large")))
    }

    fn spec(&self, kind: SpecKind, line: u32, ts: &mut TokenStream) -> Result<OpcodeSpec> {
        let name = match &ts.peek().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                ts.discard(1);
                s
            }
            _ => self.eval.parse_primary(ts)?.to_string(),
        };
        if name.is_empty() {
            return Err(Error::syntax(line, "opcode name is empty"));
        }

        let mut spec = OpcodeSpec::new(kind, name, line);
        let mut have_code = false;
        while !ts.is_eof() {
            let mut clause = ts.take_group()?;
            self.clause(&mut spec, &mut have_code, &mut clause)?;
        }

        if !spec.has_mrm() && spec.has_constraints() {
            return Err(Error::semantic(
                line,
                format!("{}: mod/reg/rm constraints without `mrm`", spec.name),
            ));
        }
        check_bindings(&spec)?;
        Ok(spec)
    }

    fn clause(&self, spec: &mut OpcodeSpec, have_code: &mut bool, ts: &mut TokenStream) -> Result<()> {
        let line = ts.line();
        let head = ts.next_token();
        let TokenKind::Keyword(k) = head.kind else {
            return Err(Error::syntax(line, format!("unknown clause `{head}`")));
        };

        let prefix_only = matches!(k, Keyword::Seg | Keyword::Wait | Keyword::Lock | Keyword::Rep);
        let opcode_only = matches!(
            k,
            Keyword::Reads
                | Keyword::Writes
                | Keyword::Modifies
                | Keyword::Stack
                | Keyword::Fpu
                | Keyword::Dest
                | Keyword::Param
        );
        if (prefix_only && spec.kind != SpecKind::Prefix) || (opcode_only && spec.kind != SpecKind::Opcode) {
            return Err(Error::semantic(
                line,
                format!("`{}` clause not allowed on {}", k.as_str().to_lowercase(), spec.name),
            ));
        }

        match k {
            Keyword::Desc => spec.description = Some(self.eval.evaluate(ts)?.to_string()),
            Keyword::Comment => spec.comment = Some(self.eval.evaluate(ts)?.to_string()),
            Keyword::Seg => {
                ts.expect_punct(Punct::Assign)?;
                let seg = match ts.peek().kind {
                    TokenKind::Literal(Value::Unsigned(i)) => SegReg::from_index(i),
                    _ => bare_name(ts.peek()).and_then(|n| SegReg::from_name(&n.to_uppercase())),
                };
                spec.segment = Some(seg.ok_or_else(|| ts.unexpected("segment register"))?);
                ts.discard(1);
                ts.expect_eof()?;
            }
            Keyword::Wait | Keyword::Lock => {
                ts.expect_punct(Punct::Assign)?;
                let on = self.eval.evaluate(ts)?.to_bool();
                if k == Keyword::Wait {
                    spec.wait = on;
                } else {
                    spec.lock = on;
                }
            }
            Keyword::Rep => {
                ts.expect_punct(Punct::Assign)?;
                let negate = ts.eat_punct(Punct::Bang) || ts.eat_keyword(Keyword::Not);
                let flag = flag_of(ts.peek()).ok_or_else(|| ts.unexpected("flag name"))?;
                ts.discard(1);
                ts.expect_eof()?;
                spec.rep = Some(RepCondition { flag, negate });
            }
            Keyword::Reads | Keyword::Writes | Keyword::Modifies => {
                let ops = self.operand_list(ts)?;
                let flags = ops.iter().fold(Flags::empty(), |acc, op| match op {
                    Operand::Flag(f) => acc | *f,
                    _ => acc,
                });
                let (list, set) = match k {
                    Keyword::Reads => (&mut spec.reads, &mut spec.flags_read),
                    Keyword::Writes => (&mut spec.writes, &mut spec.flags_written),
                    _ => (&mut spec.modifies, &mut spec.flags_modified),
                };
                list.extend(ops);
                *set |= flags;
            }
            Keyword::Stack => {
                let effect = self.stack_effect(ts)?;
                if spec.stack.replace(effect).is_some() {
                    return Err(Error::semantic(line, "duplicate `stack` clause"));
                }
            }
            Keyword::Fpu => {
                ts.expect_keyword(Keyword::Stack)?;
                let effect = self.stack_effect(ts)?;
                if spec.fpu_stack.replace(effect).is_some() {
                    return Err(Error::semantic(line, "duplicate `fpu stack` clause"));
                }
            }
            Keyword::Dest => {
                ts.expect_punct(Punct::Assign)?;
                spec.dest = Some(self.operand(ts)?);
            }
            Keyword::Param => {
                let index = if ts.peek().is_punct(Punct::LParen) {
                    let mut group = ts.take_group()?;
                    Some(self.unsigned(&mut group)? as usize)
                } else {
                    None
                };
                ts.expect_punct(Punct::Assign)?;
                let op = self.operand(ts)?;
                match index {
                    None => spec.params.push(Some(op)),
                    Some(i) => {
                        if spec.params.len() <= i {
                            spec.params.resize(i + 1, None);
                        }
                        if spec.params[i].replace(op).is_some() {
                            return Err(Error::semantic(line, format!("param({i}) given twice")));
                        }
                    }
                }
            }
            Keyword::Code => {
                if *have_code {
                    return Err(Error::semantic(line, format!("{}: second `code` clause", spec.name)));
                }
                *have_code = true;
                self.code(spec, ts)?;
            }
            _ => return Err(Error::syntax(line, format!("unknown clause `{head}`"))),
        }
        Ok(())
    }

    fn stack_effect(&self, ts: &mut TokenStream) -> Result<StackEffect> {
        let direction = if ts.eat_keyword(Keyword::Push) {
            StackDirection::Push
        } else if ts.eat_keyword(Keyword::Pop) {
            StackDirection::Pop
        } else {
            return Err(ts.unexpected("`push` or `pop`"));
        };
        Ok(StackEffect { direction, operands: self.operand_list(ts)? })
    }

    fn operand_list(&self, ts: &mut TokenStream) -> Result<Vec<Operand>> {
        ts.split_commas()
            .into_iter()
            .map(|mut part| self.operand(&mut part))
            .collect()
    }

    fn operand(&self, ts: &mut TokenStream) -> Result<Operand> {
        let line = ts.line();
        let t = ts.peek().clone();
        let op = match &t.kind {
            TokenKind::Literal(_) | TokenKind::Punct(Punct::LParen) => {
                return Ok(Operand::Value(self.unsigned(ts)?));
            }
            TokenKind::Ident(name) => {
                ts.discard(1);
                match Flags::from_name(name) {
                    Some(f) => Operand::Flag(f),
                    None => Operand::Fixed(name.clone()),
                }
            }
            TokenKind::Keyword(Keyword::If) => {
                ts.discard(1);
                Operand::Flag(Flags::IF)
            }
            TokenKind::Keyword(
                k @ (Keyword::Reg | Keyword::Rm | Keyword::Sreg | Keyword::Cr | Keyword::Dr | Keyword::Tr),
            ) => {
                let class = match k {
                    Keyword::Reg => RegisterClass::Reg,
                    Keyword::Rm => RegisterClass::Rm,
                    Keyword::Sreg => RegisterClass::Sreg,
                    Keyword::Cr => RegisterClass::Cr,
                    Keyword::Dr => RegisterClass::Dr,
                    _ => RegisterClass::Tr,
                };
                ts.discard(1);
                let width = self.width(&mut ts.take_group()?)?;
                Operand::Register { class, width }
            }
            TokenKind::Keyword(Keyword::Memory) => {
                ts.discard(1);
                let mut parts = ts.take_group()?.split_commas().into_iter();
                let width = match parts.next() {
                    Some(mut w) => self.width(&mut w)?,
                    None => return Err(Error::syntax(line, "memory operand needs a width")),
                };
                let address = match parts.next() {
                    Some(mut a) => self.address(&mut a)?,
                    None => Vec::new(),
                };
                if parts.next().is_some() {
                    return Err(Error::syntax(line, "memory(width[, address]) takes at most two arguments"));
                }
                Operand::Memory { width, address }
            }
            TokenKind::Keyword(Keyword::Far) => {
                ts.discard(1);
                ts.expect_keyword(Keyword::Memory)?;
                let mut parts = ts.take_group()?.split_commas();
                if parts.len() != 3 {
                    return Err(Error::syntax(line, "far memory(width, segment, address) takes three arguments"));
                }
                let width = self.width(&mut parts[0])?;
                let segment = bare_name(parts[1].peek())
                    .and_then(|n| SegReg::from_name(&n.to_uppercase()))
                    .ok_or_else(|| parts[1].unexpected("segment register"))?;
                parts[1].discard(1);
                parts[1].expect_eof()?;
                let address = self.address(&mut parts[2])?;
                Operand::FarMemory { width, segment, address }
            }
            TokenKind::Keyword(k @ (Keyword::St | Keyword::Mm | Keyword::Xmm)) => {
                let k = *k;
                ts.discard(1);
                let sel = self.selector(&mut ts.take_group()?)?;
                match k {
                    Keyword::St => Operand::St(sel),
                    Keyword::Mm => Operand::Mm(sel),
                    _ => Operand::Xmm(sel),
                }
            }
            TokenKind::Keyword(Keyword::Constant) => {
                ts.discard(1);
                let values = ts
                    .take_group()?
                    .split_commas()
                    .into_iter()
                    .map(|mut v| self.unsigned(&mut v))
                    .collect::<Result<Vec<_>>>()?;
                Operand::Constant(values)
            }
            _ => return Err(ts.unexpected("operand")),
        };
        ts.expect_eof()?;
        Ok(op)
    }

    fn selector(&self, ts: &mut TokenStream) -> Result<RegSelect> {
        let line = ts.line();
        let sel = match &ts.peek().kind {
            TokenKind::Keyword(Keyword::Reg) if ts.peek_at(1).is_eof() => RegSelect::RegField,
            TokenKind::Keyword(Keyword::Rm) if ts.peek_at(1).is_eof() => RegSelect::RmField,
            TokenKind::Ident(n) if ts.peek_at(1).is_eof() => RegSelect::Var(n.clone()),
            _ => return Ok(RegSelect::Index(u8_field(line, self.unsigned(ts)?, 0xff, "register index")?)),
        };
        ts.discard(1);
        Ok(sel)
    }

    fn address(&self, ts: &mut TokenStream) -> Result<Vec<AddrTerm>> {
        let mut terms = Vec::new();
        loop {
            match &ts.peek().kind {
                TokenKind::Ident(r) => {
                    terms.push(AddrTerm::Register(r.clone()));
                    ts.discard(1);
                }
                _ => {
                    let v = self.eval.parse_primary(ts)?;
                    terms.push(AddrTerm::Displacement(v.to_unsigned()));
                }
            }
            if !ts.eat_punct(Punct::Plus) {
                break;
            }
        }
        ts.expect_eof()?;
        Ok(terms)
    }

    fn code(&self, spec: &mut OpcodeSpec, ts: &mut TokenStream) -> Result<()> {
        let prefix = spec.kind == SpecKind::Prefix;
        let spec_name = spec.name.clone();
        while !ts.is_eof() {
            let line = ts.line();
            let t = ts.peek().clone();
            let not_on_prefix = |what: &str| {
                Error::semantic(line, format!("{spec_name}: `{what}` not allowed in a prefix encoding"))
            };
            match &t.kind {
                TokenKind::Keyword(Keyword::Mrm) => {
                    if prefix {
                        return Err(not_on_prefix("mrm"));
                    }
                    if spec.has_mrm() {
                        return Err(Error::semantic(line, "`mrm` given twice"));
                    }
                    ts.discard(1);
                    spec.bytes.push(ByteSpec::ModRegRm);
                }
                TokenKind::Keyword(k @ (Keyword::Reg | Keyword::Rm)) if ts.peek_at(1).is_punct(Punct::LParen) => {
                    if prefix {
                        return Err(not_on_prefix(k.as_str()));
                    }
                    let is_reg = *k == Keyword::Reg;
                    ts.discard(1);
                    let mut mask = 0u8;
                    for mut v in ts.take_group()?.split_commas() {
                        let n = u8_field(line, self.unsigned(&mut v)?, 7, "field value")?;
                        mask |= 1 << n;
                    }
                    if is_reg {
                        spec.reg_mask |= mask;
                    } else {
                        spec.rm_mask |= mask;
                    }
                }
                TokenKind::Keyword(Keyword::Mod) => {
                    if prefix {
                        return Err(not_on_prefix("mod"));
                    }
                    ts.discard(1);
                    let mut group = ts.take_group()?;
                    let negate = group.eat_punct(Punct::Bang) || group.eat_keyword(Keyword::Not);
                    if self.unsigned(&mut group)? != 3 {
                        return Err(Error::semantic(line, "only mod(3) and mod(!3) are supported"));
                    }
                    spec.mod_constraint = if negate { ModConstraint::Memory } else { ModConstraint::Register };
                }
                TokenKind::Keyword(Keyword::Immediate) => {
                    if prefix {
                        return Err(not_on_prefix("immediate"));
                    }
                    ts.discard(1);
                    let kind = immediate_kind(&mut ts.take_group()?)?;
                    spec.bytes.push(ByteSpec::Immediate(kind));
                }
                TokenKind::Ident(_) | TokenKind::Keyword(Keyword::Reg)
                    if ts.peek_at(1).is_punct(Punct::Assign) =>
                {
                    let name = match &t.kind {
                        TokenKind::Ident(n) if n.len() == 1 => n.clone(),
                        TokenKind::Keyword(_) => "REG".to_string(),
                        _ => {
                            return Err(Error::syntax(
                                line,
                                format!("binding name `{t}` must be one letter or `reg`"),
                            ))
                        }
                    };
                    ts.discard(2);
                    let values = self.byte_entry(ts)?;
                    spec.bytes.push(ByteSpec::Literal { values, bind: Some(name) });
                }
                TokenKind::Literal(_) | TokenKind::Punct(Punct::LParen) => {
                    let values = self.byte_entry(ts)?;
                    spec.bytes.push(ByteSpec::literal(values));
                }
                _ => return Err(ts.unexpected("encoding byte, `mrm`, constraint or immediate")),
            }
        }
        Ok(())
    }

    /// `N`, `N-M`, `N,M-O,...` or `(expr)`, as a sorted set.
    fn byte_entry(&self, ts: &mut TokenStream) -> Result<Vec<u8>> {
        let line = ts.line();
        if ts.peek().is_punct(Punct::LParen) {
            let v = self.unsigned(&mut ts.take_group()?)?;
            return Ok(vec![u8_field(line, v, 0xff, "byte value")?]);
        }

        let mut set = BTreeSet::new();
        loop {
            let lo = self.byte_literal(ts)?;
            if ts.eat_punct(Punct::Minus) {
                let hi = self.byte_literal(ts)?;
                if hi < lo {
                    return Err(Error::semantic(line, format!("empty byte range {lo:#04x}-{hi:#04x}")));
                }
                set.extend(lo..=hi);
            } else {
                set.insert(lo);
            }
            if !ts.eat_punct(Punct::Comma) {
                break;
            }
        }
        Ok(set.into_iter().collect())
    }

    fn byte_literal(&self, ts: &mut TokenStream) -> Result<u8> {
        let line = ts.line();
        match ts.peek().kind {
            TokenKind::Literal(Value::Unsigned(v)) => {
                ts.discard(1);
                u8_field(line, v, 0xff, "byte value")
            }
            _ => Err(ts.unexpected("byte value")),
        }
    }
}

fn immediate_kind(ts: &mut TokenStream) -> Result<ImmediateKind> {
    let line = ts.line();
    let signed = ts.eat_keyword(Keyword::Signed);
    let kind = match ts.next_token().kind {
        TokenKind::Keyword(Keyword::Far) if !signed => match ts.next_token().kind {
            TokenKind::Ident(n) if n == "POINTER" => Some(ImmediateKind::FarPointer),
            _ => None,
        },
        TokenKind::Literal(Value::Unsigned(bits)) => ImmediateKind::from_bits(bits, signed),
        TokenKind::Ident(n) => match n.as_str() {
            "BYTE" => ImmediateKind::from_bits(8, signed),
            "WORD" => ImmediateKind::from_bits(16, signed),
            "DWORD" => ImmediateKind::from_bits(32, signed),
            "QWORD" => ImmediateKind::from_bits(64, signed),
            "FLOAT32" if !signed => Some(ImmediateKind::Float32),
            "FLOAT64" if !signed => Some(ImmediateKind::Float64),
            "FLOAT80" if !signed => Some(ImmediateKind::Float80),
            _ => None,
        },
        _ => None,
    };
    let kind = kind.ok_or_else(|| Error::syntax(line, "unknown immediate kind"))?;
    ts.expect_eof()?;
    Ok(kind)
}

fn check_bindings(spec: &OpcodeSpec) -> Result<()> {
    let bound: Vec<&str> = spec
        .bytes
        .iter()
        .filter_map(|b| match b {
            ByteSpec::Literal { bind: Some(n), .. } => Some(n.as_str()),
            _ => None,
        })
        .collect();

    let stacks = [&spec.stack, &spec.fpu_stack];
    let operands = spec
        .dest
        .iter()
        .chain(spec.params.iter().flatten())
        .chain(&spec.reads)
        .chain(&spec.writes)
        .chain(&spec.modifies)
        .chain(stacks.into_iter().flatten().flat_map(|s| &s.operands));
    for op in operands {
        if let Some(RegSelect::Var(v)) = op.selector() {
            if !bound.contains(&v.as_str()) {
                return Err(Error::semantic(
                    spec.line,
                    format!("{}: `{}` is not bound in the code clause", spec.name, v.to_lowercase()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<Statement> {
        parse_statement(&tokenize(text).unwrap(), &Defines::default())
    }

    fn spec(text: &str) -> OpcodeSpec {
        match parse(text).unwrap() {
            Statement::Spec(s) => s,
            other => panic!("expected a spec, got {other:?}"),
        }
    }

    #[test]
    fn directives() {
        assert_eq!(
            parse("set \"x\" = 5;").unwrap(),
            Statement::Set { name: "x".into(), value: Value::Unsigned(5) }
        );
        assert_eq!(parse("unset x;").unwrap(), Statement::Unset { name: "X".into() });
        assert_eq!(parse("opcode limit none;").unwrap(), Statement::OpcodeLimit(0));
        assert_eq!(parse("opcode limit 0x100;").unwrap(), Statement::OpcodeLimit(256));
        assert_eq!(
            parse("unknown opcode exception;").unwrap(),
            Statement::UnknownOpcode(UnknownOpcode::Exception)
        );
        assert!(parse("unknown opcode maybe;").is_err());
        assert!(parse("frobnicate;").is_err());
    }

    #[test]
    fn code_clause_bytes_and_bindings() {
        let s = spec("opcode \"PUSH\" (code r=0x50-0x57) (reads reg(16));");
        assert_eq!(
            s.bytes,
            vec![ByteSpec::Literal { values: (0x50..=0x57).collect(), bind: Some("R".into()) }]
        );
        let s = spec("opcode \"X\" (code 0x0f 0x10,0x12-0x13 mrm immediate(signed byte));");
        assert_eq!(s.bytes[1], ByteSpec::literal(vec![0x10, 0x12, 0x13]));
        assert_eq!(s.bytes[3], ByteSpec::Immediate(ImmediateKind::SignedByte));
    }

    #[test]
    fn constraints() {
        let s = spec("opcode \"SLDT\" (code 0x0f 0x00 mrm reg(0) mod(!3)) (dest = rm(16));");
        assert_eq!(s.reg_mask, 0b1);
        assert_eq!(s.mod_constraint, ModConstraint::Memory);
        assert_eq!(s.dest, Some(Operand::Register { class: RegisterClass::Rm, width: 16 }));
        assert!(parse("opcode \"X\" (code 0x0f reg(1));").is_err());
        assert!(parse("opcode \"X\" (code 0x0f mrm reg(8));").is_err());
        assert!(parse("opcode \"X\" (code 0x100);").is_err());
        assert!(parse("opcode \"X\" (code 0x90) (code 0x91);").is_err());
    }

    #[test]
    fn operands_and_flags() {
        let s = spec(
            "opcode \"ADC\" (code 0x14 immediate(byte)) (dest = al) (param = 8) \
             (reads al, cf) (writes al) (modifies of, sf, zf, af, pf, cf);",
        );
        assert_eq!(s.dest, Some(Operand::Fixed("AL".into())));
        assert_eq!(s.params, vec![Some(Operand::Value(8))]);
        assert_eq!(s.flags_read, Flags::CF);
        assert_eq!(
            s.flags_modified,
            Flags::OF | Flags::SF | Flags::ZF | Flags::AF | Flags::PF | Flags::CF
        );
    }

    #[test]
    fn sparse_params_and_memory() {
        let s = spec(
            "opcode \"X\" (code 0xd8 mrm) (param(1) = memory(32, bx + si + 4)) \
             (stack push far memory(32, ss, sp));",
        );
        assert_eq!(s.params.len(), 2);
        assert_eq!(s.params[0], None);
        assert_eq!(
            s.params[1],
            Some(Operand::Memory {
                width: 32,
                address: vec![
                    AddrTerm::Register("BX".into()),
                    AddrTerm::Register("SI".into()),
                    AddrTerm::Displacement(4),
                ],
            })
        );
        let stack = s.stack.unwrap();
        assert_eq!(stack.direction, StackDirection::Push);
        assert!(matches!(stack.operands[0], Operand::FarMemory { segment: SegReg::Ss, .. }));
    }

    #[test]
    fn selectors_need_bindings() {
        let s = spec("opcode \"FLD\" (code 0xd9 i=0xc0-0xc7) (param = st(i));");
        assert_eq!(s.params[0], Some(Operand::St(RegSelect::Var("I".into()))));
        assert!(parse("opcode \"FLD\" (code 0xd9 0xc0-0xc7) (param = st(i));").is_err());
        let s = spec("opcode \"MOVQ\" (code 0x0f 0x6f mrm) (dest = mm(reg)) (param = mm(rm));");
        assert_eq!(s.dest, Some(Operand::Mm(RegSelect::RegField)));
    }

    #[test]
    fn prefix_clauses() {
        let s = spec("prefix \"REPNE\" (code 0xf2) (rep = !zf);");
        assert_eq!(s.rep, Some(RepCondition { flag: Flags::ZF, negate: true }));
        let s = spec("prefix \"ES\" (code 0x26) (seg = es);");
        assert_eq!(s.segment, Some(SegReg::Es));
        assert!(parse("prefix \"LOCK\" (code 0xf0) (reads al);").is_err());
        assert!(parse("prefix \"P\" (code 0xf0 mrm);").is_err());
        assert!(parse("opcode \"X\" (code 0x90) (lock = 1);").is_err());
    }
}
