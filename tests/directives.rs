use opcc_rs::{compile_str, Error, LogLevel, UnknownOpcode, Value};

fn infos(c: &opcc_rs::Compilation) -> Vec<&str> {
    c.messages
        .iter()
        .filter(|m| m.level == LogLevel::Info)
        .map(|m| m.text.as_str())
        .collect()
}

#[test]
fn define_round_trip() {
    let c = compile_str("set \"x\" 5; log value(\"x\"); unset \"x\"; log isset(\"x\");");
    assert_eq!(infos(&c), vec!["5", "false"]);
    assert!(c.defines.get("x").is_none());
}

#[test]
fn formatting_builtins() {
    let c = compile_str(
        "set \"w\" 16; log format(\"r\", value(\"w\")); log hex(value(\"w\")); log valuetype(\"w\");",
    );
    assert_eq!(infos(&c), vec!["r16", "0x10", "unsigned"]);
}

#[test]
fn settings_last_write_wins() {
    let c = compile_str(
        "unknown opcode silent; unknown opcode exception; dialect \"a\"; dialect \"b\"; \
         comment \"one\"; comment \"two\"; opcode limit 4;",
    );
    assert_eq!(c.unknown_opcode, UnknownOpcode::Exception);
    assert_eq!(c.settings.dialect.as_deref(), Some("b"));
    assert_eq!(c.settings.comments, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(c.opcode_limit, 4);
    assert!(c.is_ok());
    assert_eq!(c.messages.iter().filter(|m| m.level == LogLevel::Warning).count(), 2);
}

#[test]
fn error_directive_fails_the_run_but_continues() {
    let c = compile_str("error \"boom\"; set \"after\" 1; opcode limit none; unknown opcode ud;");
    assert!(!c.is_ok());
    assert!(!c.aborted);
    assert!(matches!(&c.errors[0], Error::User { message, .. } if message == "boom"));
    assert_eq!(c.defines.get("after"), Some(&Value::Unsigned(1)));
}

#[test]
fn bad_statement_is_skipped() {
    let c = compile_str("opcode \"A\" (code 0x100); opcode \"B\" (code 0x90);");
    assert_eq!(c.errors.len(), 1);
    assert!(!c.aborted);
    assert_eq!(c.opcodes.len(), 1);
    assert_eq!(c.opcodes[0].name, "B");
}

#[test]
fn lexical_error_is_fatal() {
    let c = compile_str("set \"x\" 1; set \"y\" 0x; set \"z\" 1;");
    assert!(c.aborted);
    assert!(matches!(c.errors[0], Error::Lex { .. }));
    assert!(c.defines.contains("x"));
    assert!(!c.defines.contains("z"));
}
