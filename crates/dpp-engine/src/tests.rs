//! Scenario tests for the dpp engine
//!
//! Each test drives the public `Engine` API with a small PHP-flavoured
//! source and checks the complete output text.

use super::*;
use dpp_core::{ConditionalMode, EngineConfig};
use pretty_assertions::assert_eq;

fn process(source: &str) -> Result<String> {
    Engine::new().process_string(source)
}

/// Text without directive comments passes through untouched
#[test]
fn test_identity_without_directives() {
    let sources = [
        "",
        "plain text",
        "<?php\n// a line comment\necho \"# not a comment\";\n/* block\n   comment */\n",
        "# just a remark\n#pragma once\n#DEFINE_NOTHING\r\n\ttabbed\r\n",
        "$s = 'unterminated;\n$t = \"#define X \\\"1\\\"\";\n",
    ];
    for source in sources {
        assert_eq!(process(source).unwrap(), source);
    }
}

/// `#define` gates output but never rewrites body text
#[test]
fn test_no_macro_substitution() {
    let source = "#define X \"v\"\nX marks the spot, X again\n#ifdef X\nX\n#endif";
    assert_eq!(process(source).unwrap(), "\nX marks the spot, X again\n\nX\n");
}

#[test]
fn test_redefinition_fails() {
    let err = process("#define X \"1\"\n#define X \"2\"").unwrap_err();
    assert!(matches!(err, Error::NoRedefine(ref name) if name == "X"));
    assert_eq!(err.to_string(), "'X' cannot be redefined.");
}

#[test]
fn test_ifdef_defined_and_undefined() {
    assert_eq!(
        process("#define A \"1\"\n#ifdef A\nkept\n#endif").unwrap(),
        "\n\nkept\n"
    );
    assert_eq!(process("#ifdef A\ndropped\n#endif").unwrap(), "");
}

#[test]
fn test_if_false_emits_else_branch() {
    assert_eq!(
        process("#if 1==2\nthen\n#else\nelse\n#endif").unwrap(),
        "\nelse\n"
    );
}

#[test]
fn test_include_is_verbatim() {
    let child = "#define FROM_CHILD \"1\"\n#ifdef NOPE\nhidden?\n#endif\n";
    let reader = MemoryReader::new().with_file("child.txt", child);
    let mut engine = Engine::new().with_reader(reader);

    let out = engine
        .process_string("before\n#include \"child.txt\"\nafter")
        .unwrap();
    assert_eq!(out, format!("before\n{}\nafter", child));
    assert!(!engine.macros().contains("FROM_CHILD"));
}

#[test]
fn test_processing_resolved_output_is_noop() {
    let source = "<?php\n#define DEBUG \"1\"\n#ifdef DEBUG\nlog();\n#else\nquiet();\n#endif\nrun();";
    let once = process(source).unwrap();
    let twice = process(&once).unwrap();
    assert_eq!(once, "<?php\n\n\nlog();\n\nrun();");
    assert_eq!(twice, once);
}

#[test]
fn test_concrete_scenario() {
    assert_eq!(
        process("A\n#define X \"1\"\nB\n#ifdef X\nC\n#endif\nD").unwrap(),
        "A\n\nB\n\nC\n\nD"
    );
}

#[test]
fn test_same_engine_reused() {
    let mut engine = Engine::new();
    let source = "#define X \"1\"\n#ifdef X\nx\n#endif";
    assert_eq!(engine.process_string(source).unwrap(), "\n\nx\n");
    // Macros and output start fresh on every call
    assert_eq!(engine.process_string(source).unwrap(), "\n\nx\n");
}

#[test]
fn test_ambient_constants_drive_conditionals() {
    let mut constants = ConstantTable::new();
    constants.define("PHP_MAJOR", "8");
    let config = EngineConfig {
        conditional_mode: ConditionalMode::Nested,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(&config).with_constants(constants.clone());

    let source = "#if PHP_MAJOR >= 8\nmodern\n#elif PHP_MAJOR == 7\nlegacy\n#else\nancient\n#endif";
    assert_eq!(engine.process_string(source).unwrap(), "\nmodern\n");

    // Flat mode: `#else` flips the single flag that `#elif` just set
    let mut flat = Engine::new().with_constants(constants);
    assert_eq!(flat.process_string(source).unwrap(), "\nmodern\n\nancient\n");
}

#[test]
fn test_nested_mode_through_engine() {
    let config = EngineConfig {
        conditional_mode: ConditionalMode::Nested,
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(&config);
    let source = "#ifdef A\n#ifdef B\nab\n#endif\na\n#endif\nend";
    assert_eq!(engine.process_string(source).unwrap(), "\nend");

    let mut flat = Engine::new();
    assert_eq!(flat.process_string(source).unwrap(), "\na\n\nend");
}

#[test]
fn test_block_and_slash_comments_are_not_directives() {
    let source = "/* #define X \"1\" */\n// #ifdef X\n#ifdef X\nx\n#endif";
    assert_eq!(process(source).unwrap(), "/* #define X \"1\" */\n// #ifdef X\n");
}

/// Directive-looking lines inside a multi-line literal are string text
#[test]
fn test_multiline_literals_hide_directives() {
    let source = "echo \"first\n#ifdef NOPE\nsecond\";\ntail";
    assert_eq!(process(source).unwrap(), source);

    let source = "#ifdef NOPE\n$s = \"\n#endif\n\";\n#endif\nafter";
    assert_eq!(process(source).unwrap(), "\nafter");

    let source = "$html = <<<HTML\n#define X\nHTML;\n#ifdef X\nx\n#endif";
    assert_eq!(process(source).unwrap(), "$html = <<<HTML\n#define X\nHTML;\n");
}

/// An `#if` nested too deeply to evaluate is treated as false
#[test]
fn test_deeply_nested_if_fails_closed() {
    let depth = 3000;
    let source = format!(
        "#if {}1{}\nhidden\n#endif\nshown",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    assert_eq!(process(&source).unwrap(), "\nshown");

    let source = "#if ((((1))))\nvisible\n#endif";
    assert_eq!(process(source).unwrap(), "\nvisible\n");
}
