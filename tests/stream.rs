use std::io::{self, Read};

use opcc_rs::{compile_reader, CompileOptions, Error};

/// Serves `data` up to `fail_at`, then fails every read.
struct FailingReader {
    data: &'static [u8],
    pos: usize,
    fail_at: usize,
}

impl FailingReader {
    fn new(data: &'static str, fail_at: usize) -> Self {
        Self { data: data.as_bytes(), pos: 0, fail_at }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.fail_at {
            return Err(io::Error::new(io::ErrorKind::Other, "device unplugged"));
        }
        let end = self.fail_at.min(self.data.len()).min(self.pos + buf.len());
        let n = end - self.pos;
        buf[..n].copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(n)
    }
}

const SOURCE: &str = "opcode \"NOP\" (code 0x90);\nopcode \"INT3\" (code 0xcc);";

#[test]
fn read_error_between_statements_ends_input() {
    let cut = SOURCE.find('\n').unwrap() + 1;
    let c = compile_reader(FailingReader::new(SOURCE, cut), CompileOptions::default());
    assert!(c.is_ok());
    assert!(!c.aborted);
    assert_eq!(c.opcodes.len(), 1);
    assert_eq!(c.opcodes[0].name, "NOP");
}

#[test]
fn read_error_inside_statement_is_missing_semicolon() {
    let cut = SOURCE.find("(code 0xcc").unwrap();
    let c = compile_reader(FailingReader::new(SOURCE, cut), CompileOptions::default());
    assert!(c.aborted);
    assert_eq!(c.opcodes.len(), 1);
    assert_eq!(c.errors.len(), 1);
    let e = &c.errors[0];
    assert!(matches!(e, Error::Syntax { message, .. } if message.contains("missing `;`")));
    assert_eq!(e.line(), 2);
}

#[test]
fn whole_stream_without_errors() {
    let c = compile_reader(FailingReader::new(SOURCE, SOURCE.len() + 1), CompileOptions::default());
    assert!(c.is_ok());
    assert_eq!(c.opcodes.len(), 2);
}
