use crate::block::{is_closing, opens_body, terminator, Block};
use crate::context::{Context, Macro};
use crate::error::{Error, Result};
use crate::eval::{bare_name, Evaluator};
use crate::lexer::CharSource;
use crate::token::{Keyword, Punct, Token, TokenKind, TokenStream};
use crate::value::Value;

fn param_name(t: &Token) -> Option<String> {
    match &t.kind {
        TokenKind::Ident(n) if n.len() == 1 => Some(n.clone()),
        TokenKind::Keyword(Keyword::Reg) => Some("REG".to_string()),
        _ => None,
    }
}

fn is_macro_definition(block: &[Token]) -> bool {
    block.first().is_some_and(|t| t.is_keyword(Keyword::Set))
        && block.get(1).is_some_and(|t| t.is_keyword(Keyword::Macro))
}

/// Replace every `value ( P )` whose `P` is a parameter with the argument as a literal.
pub fn substitute(block: &[Token], params: &[String], args: &[Value]) -> Block {
    let mut out = Vec::with_capacity(block.len());
    let mut i = 0;
    while i < block.len() {
        let arg = match block.get(i..i + 4) {
            Some([v, l, p, r])
                if v.is_keyword(Keyword::Value)
                    && l.is_punct(Punct::LParen)
                    && r.is_punct(Punct::RParen) =>
            {
                param_name(p)
                    .and_then(|n| params.iter().position(|q| *q == n))
                    .map(|idx| args[idx].clone())
            }
            _ => None,
        };
        match arg {
            Some(v) => {
                out.push(Token::new(TokenKind::Literal(v), block[i].line));
                i += 4;
            }
            None => {
                out.push(block[i].clone());
                i += 1;
            }
        }
    }
    out
}

impl<S: CharSource> Context<S> {
    /// `set macro NAME (p, ...) {` followed by body blocks up to `} macro`.
    pub(crate) fn define_macro(&mut self, block: Block, suppress: bool) -> Result<()> {
        let line = block.first().map(|t| t.line).unwrap_or(0);
        let mut ts = TokenStream::new(block);
        ts.discard(2);
        let name = bare_name(ts.peek()).ok_or_else(|| ts.unexpected("macro name"))?;
        ts.discard(1);

        let mut params = Vec::new();
        for part in ts.take_group()?.split_commas() {
            let p = match part.remaining() {
                [t] => param_name(t),
                _ => None,
            }
            .ok_or_else(|| {
                Error::semantic(line, format!("macro {name}: parameters must be single letters or `reg`"))
            })?;
            if params.contains(&p) {
                return Err(Error::semantic(
                    line,
                    format!("macro {name}: parameter `{}` repeated", p.to_lowercase()),
                ));
            }
            params.push(p);
        }
        ts.expect_punct(Punct::LBrace)?;
        ts.expect_eof()?;

        let mut body = Vec::new();
        let mut depth = 1usize;
        loop {
            let Some(b) = self.next_block()? else {
                return Err(Error::syntax(line, format!("macro {name}: missing `}} macro`")));
            };
            if is_macro_definition(&b) {
                let inner = b.first().map(|t| t.line).unwrap_or(line);
                return Err(Error::semantic(inner, format!("macro {name}: macro definitions cannot nest")));
            }
            if is_closing(&b) {
                depth -= 1;
                if depth == 0 {
                    if terminator(&b) != Some(Keyword::Macro) {
                        return Err(Error::syntax(b[0].line, format!("macro {name}: expected `}} macro`")));
                    }
                    break;
                }
            } else if opens_body(&b) {
                depth += 1;
            }
            body.push(b);
        }

        if suppress {
            return Ok(());
        }
        if self.macros.contains_key(&name) {
            return Err(Error::semantic(line, format!("macro {name} is already defined")));
        }
        tracing::debug!(line, %name, params = params.len(), blocks = body.len(), "macro defined");
        self.macros.insert(name.clone(), Macro { name, params, body, line });
        Ok(())
    }

    /// `macro NAME (arg, ...);` expands the body in place.
    pub(crate) fn invoke_macro(&mut self, block: Block) -> Result<()> {
        let line = block.first().map(|t| t.line).unwrap_or(0);
        let mut ts = TokenStream::new(block);
        ts.discard(1);
        let name = bare_name(ts.peek()).ok_or_else(|| ts.unexpected("macro name"))?;
        ts.discard(1);

        let eval = Evaluator::new(&self.defines);
        let args = ts
            .take_group()?
            .split_commas()
            .into_iter()
            .map(|mut a| eval.evaluate(&mut a))
            .collect::<Result<Vec<_>>>()?;
        ts.expect_punct(Punct::Semicolon)?;
        ts.expect_eof()?;

        let Some(m) = self.macros.get(&name) else {
            return Err(Error::semantic(line, format!("macro {name} is not defined")));
        };
        if m.params.len() != args.len() {
            return Err(Error::semantic(
                line,
                format!("macro {name} takes {} arguments, {} given", m.params.len(), args.len()),
            ));
        }
        if self.expansion_depth() >= self.options.max_expansion_depth {
            return Err(Error::semantic(
                line,
                format!("macro {name}: expansion nested deeper than {}", self.options.max_expansion_depth),
            ));
        }

        let expanded: Vec<Block> = m.body.iter().map(|b| substitute(b, &m.params, &args)).collect();
        tracing::debug!(line, %name, depth = self.expansion_depth() + 1, "macro expand");

        self.push_expansion(expanded);
        let result = self.run();
        self.pop_expansion();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompileOptions;
    use crate::lexer::{tokenize, StrSource};

    fn run(text: &str) -> (Context<StrSource<'_>>, Result<()>) {
        let mut ctx = Context::new(StrSource::new(text), CompileOptions::default());
        let r = ctx.run();
        (ctx, r)
    }

    #[test]
    fn substitution_only_touches_parameters() {
        let block = tokenize("set value(a) value(b) + value(\"a\");").unwrap();
        let out = substitute(&block, &["A".to_string()], &[Value::Unsigned(7)]);
        assert_eq!(out.len(), block.len() - 3);
        assert_eq!(out[1].kind, TokenKind::Literal(Value::Unsigned(7)));
        assert!(out[2].is_keyword(Keyword::Value));
    }

    #[test]
    fn define_and_invoke() {
        let (ctx, r) = run(
            "set macro \"alu\" (n, reg) { opcode format(\"OP\", value(n)) (code value(reg)); } macro; \
             macro \"alu\" (1, 0x10); macro \"alu\" (2, 0x20);",
        );
        r.unwrap();
        assert_eq!(ctx.opcodes.len(), 2);
        assert_eq!(ctx.opcodes[1].name, "OP2");
        assert_eq!(ctx.macros["alu"].body[0].len(), 18);
    }

    #[test]
    fn nested_definition_is_fatal() {
        let (_, r) = run("set macro \"a\" () { set macro \"b\" () { } macro; } macro;");
        assert!(matches!(r, Err(Error::Semantic { .. })));
    }

    #[test]
    fn argument_count_must_match() {
        let (_, r) = run("set macro \"m\" (a) { log value(a); } macro; macro \"m\" (1, 2);");
        assert!(matches!(r, Err(Error::Semantic { .. })));
    }

    #[test]
    fn repeated_parameter_and_redefinition() {
        let (_, r) = run("set macro \"m\" (a, a) { } macro;");
        assert!(matches!(r, Err(Error::Semantic { .. })));
        let (_, r) = run("set macro \"m\" () { } macro; set macro \"m\" () { } macro;");
        assert!(matches!(r, Err(Error::Semantic { .. })));
    }

    #[test]
    fn self_invocation_hits_depth_cap() {
        let (ctx, r) = run("set macro \"m\" () { macro \"m\" (); } macro; macro \"m\" ();");
        assert!(matches!(r, Err(Error::Semantic { .. })));
        assert_eq!(ctx.expansion_depth(), 0);
    }
}
