use crate::block::{is_closing, opens_body, terminator, Block};
use crate::context::{Context, LogLevel, Message};
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::lexer::CharSource;
use crate::parser::{parse_statement, Statement};
use crate::token::{Keyword, Token, TokenStream};

fn line_of(block: &[Token]) -> u32 {
    block.first().map(|t| t.line).unwrap_or(0)
}

fn starts_with(block: &[Token], k: Keyword) -> bool {
    block.first().is_some_and(|t| t.is_keyword(k))
}

impl<S: CharSource> Context<S> {
    /// Process every block of the current source until it is exhausted.
    ///
    /// Returns the first fatal error; statement-level failures are recorded
    /// in `errors` and processing carries on.
    pub fn run(&mut self) -> Result<()> {
        while let Some(block) = self.next_block()? {
            self.process_block(block, false)?;
        }
        Ok(())
    }

    /// Dispatch one block. With `suppress` set the block is still read in
    /// full, including any bodies it opens, but has no effect.
    pub fn process_block(&mut self, block: Block, suppress: bool) -> Result<()> {
        let line = line_of(&block);
        tracing::trace!(line, len = block.len(), suppress, "block");

        if is_closing(&block) {
            return Err(Error::syntax(line, "unexpected `}`"));
        }
        if starts_with(&block, Keyword::If) {
            return self.conditional(block, suppress);
        }
        if starts_with(&block, Keyword::Else) {
            return Err(Error::syntax(line, "`else` without `if`"));
        }
        if starts_with(&block, Keyword::Set) && block.get(1).is_some_and(|t| t.is_keyword(Keyword::Macro)) {
            return self.define_macro(block, suppress);
        }
        if starts_with(&block, Keyword::Macro) {
            if suppress {
                return Ok(());
            }
            return self.invoke_macro(block);
        }
        if opens_body(&block) {
            return Err(Error::syntax(line, "unexpected `{`"));
        }
        if !suppress {
            self.execute(&block);
        }
        Ok(())
    }

    fn conditional(&mut self, block: Block, suppress: bool) -> Result<()> {
        let line = line_of(&block);
        let mut ts = TokenStream::new(block);
        ts.discard(1);
        let cond = Evaluator::new(&self.defines).parse_expression(&mut ts)?.to_bool();
        tracing::debug!(line, cond, suppress, "if");

        let rest = ts.remaining().to_vec();
        if rest.is_empty() {
            return Err(Error::syntax(line, "`if` without a statement or `{`"));
        }
        let closed = self.branch(rest, suppress || !cond, line)?;
        if closed {
            return Ok(());
        }

        let Some(next) = self.next_block()? else {
            return Ok(());
        };
        if !starts_with(&next, Keyword::Else) {
            self.unput_block(next);
            return Ok(());
        }
        let else_line = line_of(&next);
        let rest = next[1..].to_vec();
        if rest.is_empty() {
            return Err(Error::syntax(else_line, "`else` without a statement or `{`"));
        }
        self.branch(rest, suppress || cond, else_line)?;
        Ok(())
    }

    /// Run one branch of a conditional. `tokens` is either a lone `{`, which
    /// opens a body, or a complete statement. Returns true when the branch
    /// ended with `} if`, which also closes the whole conditional.
    fn branch(&mut self, tokens: Block, suppress: bool, line: u32) -> Result<bool> {
        if tokens.len() == 1 && opens_body(&tokens) {
            let close = self.body(suppress, line)?;
            return match terminator(&close) {
                Some(Keyword::If) => Ok(true),
                Some(_) => Err(Error::syntax(line_of(&close), "expected `} if`, found `} macro`")),
                None => Ok(false),
            };
        }
        self.process_block(tokens, suppress)?;
        Ok(false)
    }

    /// Process blocks up to the matching closing block and return it.
    fn body(&mut self, suppress: bool, line: u32) -> Result<Block> {
        loop {
            let Some(block) = self.next_block()? else {
                return Err(Error::syntax(line, "unterminated `{`, missing `}`"));
            };
            if is_closing(&block) {
                return Ok(block);
            }
            self.process_block(block, suppress)?;
        }
    }

    fn execute(&mut self, block: &[Token]) {
        match parse_statement(block, &self.defines) {
            Ok(stmt) => self.apply(stmt, line_of(block)),
            Err(e) => self.record_error(e),
        }
    }

    fn apply(&mut self, stmt: Statement, line: u32) {
        match stmt {
            Statement::Set { name, value } => {
                tracing::debug!(line, %name, %value, "set");
                self.defines.set(name, value);
            }
            Statement::Unset { name } => {
                if self.defines.unset(&name).is_none() {
                    tracing::debug!(line, %name, "unset of a name that was not set");
                }
            }
            Statement::Log { level: LogLevel::Error, text } => {
                self.messages.push(Message { level: LogLevel::Error, line, text: text.clone() });
                self.record_error(Error::User { line, message: text });
            }
            Statement::Log { level, text } => self.message(level, line, text),
            Statement::Comment(text) => self.settings.comments.push(text),
            Statement::Dialect(d) => {
                if let Some(old) = self.settings.dialect.as_ref().filter(|old| **old != d) {
                    let text = format!("dialect changed from \"{old}\" to \"{d}\"");
                    self.warn(line, text);
                }
                self.settings.dialect = Some(d);
            }
            Statement::OpcodeLimit(n) => {
                if let Some(old) = self.settings.opcode_limit.filter(|old| *old != n) {
                    self.warn(line, format!("opcode limit changed from {old} to {n}"));
                }
                self.settings.opcode_limit = Some(n);
            }
            Statement::UnknownOpcode(p) => {
                if let Some(old) = self.settings.unknown_opcode.filter(|old| *old != p) {
                    self.warn(line, format!("unknown opcode policy changed from {old} to {p}"));
                }
                self.settings.unknown_opcode = Some(p);
            }
            Statement::Spec(spec) => {
                tracing::debug!(line, name = %spec.name, encoding = %spec.encoding_string(), "spec");
                self.opcodes.push(spec);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::{CompileOptions, Context};
    use crate::lexer::StrSource;
    use crate::value::Value;

    fn run(text: &str) -> Context<StrSource<'_>> {
        let mut ctx = Context::new(StrSource::new(text), CompileOptions::default());
        ctx.run().unwrap();
        ctx
    }

    #[test]
    fn braced_if_else() {
        let ctx = run("set \"a\" 1; if value(\"a\") == 1 { set \"b\" 1; } else { set \"c\" 1; } if");
        assert!(ctx.defines.contains("b"));
        assert!(!ctx.defines.contains("c"));
    }

    #[test]
    fn braceless_if_replays_next_block() {
        let ctx = run("if 0 set \"a\" 1; set \"b\" 2;");
        assert!(!ctx.defines.contains("a"));
        assert_eq!(ctx.defines.get("b"), Some(&Value::Unsigned(2)));
    }

    #[test]
    fn else_if_chain() {
        let ctx = run("set \"n\" 2; if value(\"n\") == 1 set \"r\" \"one\"; \
                       else if value(\"n\") == 2 set \"r\" \"two\"; \
                       else set \"r\" \"many\";");
        assert_eq!(ctx.defines.get("r"), Some(&Value::Text("two".into())));
    }

    #[test]
    fn suppressed_branch_is_still_read() {
        let ctx = run("if false { if true { set \"x\" 1; } if opcode \"NOP\" (code 0x90); } if log 1;");
        assert!(!ctx.defines.contains("x"));
        assert!(ctx.opcodes.is_empty());
        assert_eq!(ctx.messages.len(), 1);
    }

    #[test]
    fn conflicting_settings_warn_and_last_wins() {
        let ctx = run("opcode limit 10; opcode limit 20; opcode limit 20;");
        assert_eq!(ctx.settings.opcode_limit, Some(20));
        assert_eq!(ctx.messages.len(), 1);
        assert!(ctx.errors.is_empty());
    }
}
