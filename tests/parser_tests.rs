// tests/parser_tests.rs

use flux_syntax::ast::{walk, Expression, Node, Package, Statement, Visitor};
use flux_syntax::codec::{binary, check_encodable, json};
use flux_syntax::{parse, parse_with_config, ErrorCode, ParserConfig};

// ---
// Basic Shapes
// ---

#[test]
fn test_parse_variable_assignment() {
    let pkg = parse("a = 1");
    assert_eq!(pkg.package, "main");
    assert_eq!(pkg.files.len(), 1);
    let body = &pkg.files[0].body;
    assert_eq!(body.len(), 1);
    let Statement::Variable(assign) = &body[0] else {
        panic!("expected a variable assignment, got {:?}", body[0]);
    };
    assert_eq!(assign.id.name, "a");
    assert!(matches!(&assign.init, Expression::Integer(lit) if lit.value == 1));
    assert!(!pkg.has_errors());
}

#[test]
fn test_parse_full_query() {
    let source = r#"package example

import "strings"
import c "contrib/x"

option task = {name: "t", every: 1h}

data = from(bucket: "telegraf/autogen")
    |> range(start: -5m, stop: now())
    |> filter(fn: (r) => r._measurement == "cpu" and r.cpu != "cpu-total")
    |> map(fn: (r) => ({r with label: if r._value > 90.0 then "hot" else "ok"}))

threshold = 2019-08-01T00:00:00Z
pattern = /^host-\d+$/
"#;
    let pkg = parse(source);
    assert!(!pkg.has_errors(), "{:?}", pkg.errors());
    assert_eq!(pkg.package, "example");
    let file = &pkg.files[0];
    assert_eq!(file.imports.len(), 2);
    assert_eq!(file.body.len(), 4);
    assert!(matches!(file.body[0], Statement::Option(_)));
    let Statement::Variable(data) = &file.body[1] else {
        panic!("expected data assignment");
    };
    assert!(matches!(data.init, Expression::PipeExpr(_)));
}

#[test]
fn test_parse_with_comments() {
    let pkg = parse("// leading comment\na = 1 // trailing\n// done");
    assert!(!pkg.has_errors());
    assert_eq!(pkg.files[0].body.len(), 1);
}

#[test]
fn test_string_shapes() {
    let pkg = parse("s = \"plain\"\nt = \"x${s}y\"");
    let body = &pkg.files[0].body;
    let Statement::Variable(s) = &body[0] else {
        panic!("expected assignment");
    };
    assert!(matches!(&s.init, Expression::StringLit(lit) if lit.value == "plain"));
    let Statement::Variable(t) = &body[1] else {
        panic!("expected assignment");
    };
    assert!(matches!(&t.init, Expression::StringExpr(e) if e.parts.len() == 3));
}

// ---
// Error Recovery
// ---

#[test]
fn test_unclosed_brace_is_embedded() {
    let pkg = parse("{");
    assert!(pkg.has_errors());
    let errors = pkg.errors();
    assert_eq!(errors[0].message, "expected RBRACE, got EOF");
}

#[test]
fn test_garbage_never_fails() {
    let inputs = [
        "",
        "   ",
        "@",
        "a = ",
        "((((",
        "))))",
        "\"unterminated",
        "/unterminated",
        "f(x: )",
        "x = [1, 2,,]",
        "if then else",
        "builtin",
        "testcase",
        "option",
        "import",
        "package 1",
        "1 + * 2",
        "a |> |> b",
        "${x}",
        "µ",
    ];
    for input in inputs {
        let pkg = parse(input);
        assert_eq!(pkg.files.len(), 1, "input {:?}", input);
    }
}

#[test]
fn test_errors_are_sorted_by_position() {
    let pkg = parse("a = )\nb = 1\nc = ]");
    let errors = pkg.errors();
    assert!(errors.len() >= 2);
    for pair in errors.windows(2) {
        assert!(pair[0].location.start <= pair[1].location.start);
    }
    assert_eq!(errors[0].location.start.line, 1);
    assert_eq!(errors.last().map(|e| e.location.start.line), Some(3));
}

#[test]
fn test_deep_nesting_is_a_diagnostic() {
    let source = format!("x = {}1{}", "[".repeat(200), "]".repeat(200));
    let pkg = parse(&source);
    let errors = pkg.errors();
    assert!(errors.iter().any(|e| e.message == "program is too deeply nested"));
}

// ---
// Configuration
// ---

#[test]
fn test_config_file_name_and_nesting() {
    let config = ParserConfig::default()
        .with_file_name("a.flux")
        .with_max_nesting(4);
    let pkg = parse_with_config("x = ((((((1))))))", &config);
    let errors = pkg.errors();
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .all(|e| e.location.file.as_deref() == Some("a.flux")));
}

// ---
// Package Operations
// ---

#[test]
fn test_merge_same_package() {
    let mut a = parse("package p\nx = 1");
    let b = parse("package p\ny = 2");
    a.merge(b).unwrap();
    assert_eq!(a.files.len(), 2);
}

#[test]
fn test_merge_mismatched_package() {
    let mut a = parse("x = 1");
    let err = a.merge(parse("package other\ny = 2")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(a.files.len(), 1);
}

#[test]
fn test_node_count_and_visitor() {
    let pkg = parse("a = 1");
    assert_eq!(pkg.node_count(), 5);

    struct Names(Vec<&'static str>);
    impl<'a> Visitor<'a> for Names {
        fn visit(&mut self, node: Node<'a>) -> bool {
            self.0.push(node.type_name());
            true
        }
    }
    let mut names = Names(Vec::new());
    walk(&mut names, Node::Package(&pkg));
    assert_eq!(
        names.0,
        vec!["Package", "File", "VariableAssignment", "Identifier", "IntegerLiteral"]
    );
}

// ---
// Nesting Limits
// ---

const TOO_DEEP: &str = "program is too deeply nested";

fn too_deep(pkg: &Package) -> bool {
    pkg.errors().iter().any(|e| e.message == TOO_DEEP)
}

fn assert_encodable(pkg: &Package) {
    check_encodable(pkg).unwrap();
    json::to_vec(pkg).unwrap();
    let bytes = binary::encode(pkg).unwrap();
    assert_eq!(&binary::decode(&bytes).unwrap(), pkg);
}

fn sum(terms: usize) -> String {
    format!("a = {}", vec!["1"; terms].join(" + "))
}

fn chains(links: usize) -> Vec<String> {
    vec![
        sum(links + 1),
        format!("from(bucket: \"b\"){}", " |> f()".repeat(links)),
        format!("a = r{}", ".x".repeat(links)),
        format!("a = t{}", " and t".repeat(links)),
        format!("a = t{}", " or t".repeat(links)),
        format!("a = x{}", "[0]".repeat(links)),
        format!("a = f{}", "()".repeat(links)),
        format!("a = 1{}", " * 2 ^ 3 - 4".repeat(links)),
    ]
}

#[test]
fn test_short_chains_are_clean() {
    for source in chains(100) {
        let pkg = parse(&source);
        assert!(!pkg.has_errors(), "{:?}", pkg.errors());
        assert_eq!(pkg.files[0].body.len(), 1);
        assert_encodable(&pkg);
    }
}

#[test]
fn test_long_chains_are_a_diagnostic() {
    for links in [600, 20_000] {
        for source in chains(links) {
            let pkg = parse(&source);
            assert!(too_deep(&pkg), "{} links: {:?}", links, pkg.errors());
            assert_eq!(pkg.files[0].body.len(), 1);
            assert_encodable(&pkg);
        }
    }
}

#[test]
fn test_chain_after_too_deep_keeps_parsing() {
    let source = format!("from(bucket: \"b\"){}\nb = 2", " |> f()".repeat(600));
    let pkg = parse(&source);
    let body = &pkg.files[0].body;
    assert_eq!(body.len(), 2);
    assert!(matches!(&body[1], Statement::Variable(v) if v.id.name == "b"));
    let errors = pkg.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].location.start.line, 1);
}

#[test]
fn test_sum_budget_edge() {
    let clean: Vec<bool> = (200..=300).map(|terms| !parse(&sum(terms)).has_errors()).collect();
    let edge = clean.iter().position(|ok| !ok).expect("300 terms should not fit");
    assert!(edge > 0, "200 terms should fit");
    assert!(clean[edge..].iter().all(|ok| !ok));

    let widest = parse(&sum(200 + edge - 1));
    assert!(!widest.has_errors());
    assert_encodable(&widest);
    let over = parse(&sum(200 + edge));
    assert!(too_deep(&over));
    assert_encodable(&over);
}

#[test]
fn test_huge_sum_is_bounded() {
    let pkg = parse(&sum(200_000));
    assert!(too_deep(&pkg));
    assert!(pkg.node_count() < 600);
    check_encodable(&pkg).unwrap();
}

#[test]
fn test_deep_interpolation_is_a_diagnostic() {
    let levels = 10_000;
    let source = format!("a = {}x{}", "\"${".repeat(levels), "}\"".repeat(levels));
    let pkg = parse(&source);
    assert_eq!(pkg.files[0].body.len(), 1);
    assert!(too_deep(&pkg));
    assert_encodable(&pkg);
}

#[test]
fn test_noncharacter_does_not_end_input() {
    let pkg = parse("a = 1\n\u{FFFF}\nb = 2");
    let body = &pkg.files[0].body;
    assert_eq!(body.len(), 3);
    assert!(matches!(&body[2], Statement::Variable(v) if v.id.name == "b"));
    let errors = pkg.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.starts_with("invalid character"), "{}", errors[0]);
    assert_eq!(errors[0].location.start.line, 2);
}
