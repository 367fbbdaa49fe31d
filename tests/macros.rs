use opcc_rs::context::{CompileOptions, Context};
use opcc_rs::lexer::StrSource;
use opcc_rs::{compile_str, LogLevel};

#[test]
fn expansion_is_parameter_hygienic() {
    let src = "set macro \"m\" (a) { log value(a); } macro; macro \"m\" (5); macro \"m\" (6);";
    let mut ctx = Context::new(StrSource::new(src), CompileOptions::default());
    ctx.run().unwrap();
    let logs: Vec<&str> = ctx.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(logs, vec!["5", "6"]);
    // stored body still refers to the parameter
    let body = &ctx.macros["m"].body[0];
    assert_eq!(body.len(), 6);
    assert!(body[1].is_keyword(opcc_rs::token::Keyword::Value));
}

#[test]
fn arguments_use_current_defines() {
    let c = compile_str(
        "set \"base\" 0x40; \
         set macro \"inc\" (r) { opcode format(\"INC\", value(r)) (code (value(\"base\") + value(r))); } macro; \
         macro \"inc\" (0); set \"base\" 0x48; macro \"inc\" (1);",
    );
    let names: Vec<(&str, String)> = c.opcodes.iter().map(|s| (s.name.as_str(), s.encoding_string())).collect();
    assert_eq!(names, vec![("INC0", "0x40".to_string()), ("INC1", "0x49".to_string())]);
}

#[test]
fn macros_nest_through_invocation() {
    let c = compile_str(
        "set macro \"inner\" (x) { log value(x); } macro; \
         set macro \"outer\" (y) { macro \"inner\" (value(y) + 1); macro \"inner\" (value(y) + 2); } macro; \
         macro \"outer\" (10);",
    );
    let logs: Vec<&str> = c
        .messages
        .iter()
        .filter(|m| m.level == LogLevel::Info)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(logs, vec!["11", "12"]);
}

#[test]
fn conditionals_inside_macro_bodies() {
    let c = compile_str(
        "set macro \"pick\" (a) { if value(a) == 1 { log \"one\"; } else { log \"other\"; } if } macro; \
         macro \"pick\" (1); macro \"pick\" (2);",
    );
    let logs: Vec<&str> = c
        .messages
        .iter()
        .filter(|m| m.level == LogLevel::Info)
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(logs, vec!["one", "other"]);
}

#[test]
fn macro_defined_in_false_branch_is_not_registered() {
    let c = compile_str("if 0 { set macro \"m\" () { log 1; } macro; } if macro \"m\" ();");
    assert!(c.aborted);
}

#[test]
fn recursion_is_stopped() {
    let mut ctx = Context::new(
        StrSource::new("set macro \"r\" () { macro \"r\" (); } macro; macro \"r\" ();"),
        CompileOptions { max_expansion_depth: 8, ..CompileOptions::default() },
    );
    assert!(matches!(ctx.run(), Err(opcc_rs::Error::Semantic { .. })));
}
