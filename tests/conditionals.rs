use opcc_rs::{compile_str, LogLevel};

fn infos(src: &str) -> Vec<String> {
    compile_str(src)
        .messages
        .into_iter()
        .filter(|m| m.level == LogLevel::Info)
        .map(|m| m.text)
        .collect()
}

#[test]
fn false_branch_has_no_effect() {
    assert_eq!(infos("if false { set \"y\" 1; } if log isset(\"y\");"), vec!["false"]);
}

#[test]
fn both_branches_are_read() {
    let src = "if 1 { log \"then\"; } else { log \"else\"; set \"z\" 1; } if log isset(\"z\");";
    assert_eq!(infos(src), vec!["then", "false"]);
}

#[test]
fn nested_braceless_if() {
    let src = "set \"a\" 1; if value(\"a\") if 0 log \"inner\"; else log \"inner-else\"; log \"done\";";
    assert_eq!(infos(src), vec!["inner-else", "done"]);
}

#[test]
fn suppressed_if_still_consumes_its_else() {
    let src = "if 0 { if 1 log \"a\"; else log \"b\"; } if log \"c\";";
    assert_eq!(infos(src), vec!["c"]);
}

#[test]
fn conditional_definitions() {
    let c = compile_str(
        "set \"x64\" true; \
         if value(\"x64\") { opcode \"SYSCALL\" (code 0x0f 0x05); } \
         else { opcode \"LOADALL\" (code 0x0f 0x05); } if",
    );
    assert_eq!(c.opcodes.len(), 1);
    assert_eq!(c.opcodes[0].name, "SYSCALL");
}

#[test]
fn unterminated_body_is_fatal() {
    let c = compile_str("if 1 { log 1;");
    assert!(c.aborted);
}

#[test]
fn stray_else_is_fatal() {
    let c = compile_str("log 1; else log 2;");
    assert!(c.aborted);
}
