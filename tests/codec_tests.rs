// tests/codec_tests.rs

use flux_syntax::ast::{BaseNode, ExprStmt, Expression, File, IntegerLit, Package, ParenExpr, Statement};
use flux_syntax::codec::{binary, json, MAX_DEPTH};
use flux_syntax::{parse, ErrorCode};

const QUERIES: &[&str] = &[
    "a = 1",
    "package p\nimport \"strings\"\nx = strings.title(v: \"abc\")",
    "from(bucket: \"b\")\n    |> range(start: -1h)\n    |> filter(fn: (r) => r._value >= 0.5 or not exists r.tag)",
    "f = (a, b=2, tables=<-) => { c = a * b ^ 2 % 3\n return tables |> map(fn: (r) => ({r with c})) }",
    "d = [\"k\": [1, 2], \"j\": []]\ne = [:]\ng = if d then 1.25 else -7",
    "s = \"x = ${1 + 2}, y = ${\"nested\"}\"\nt = 2020-02-29T12:30:00.5-03:00\nu = 1y2mo3w4d5h6m7s8ms9us10ns",
    "option now = () => 2019-01-01\nbuiltin fill : (<-tables: [A], ?column: string, value: B) => [A] where A: Record, B: Basic",
    "testcase t extends \"flux/x\" { option now = () => 2019-01-01 }",
    "re = /a\\/b[0-9]+/\nok = \"a\" =~ re and \"b\" !~ re",
    // Syntax errors are part of the tree and survive both formats.
    "a = )\n}\nb = 99999999999999999999\nc = 1x",
];

fn stack_heavy(f: impl FnOnce() + Send + 'static) {
    std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

fn nested_parens(levels: usize) -> Package {
    let mut expr = Expression::Integer(IntegerLit {
        base: BaseNode::default(),
        value: 1,
    });
    for _ in 0..levels {
        expr = Expression::Paren(Box::new(ParenExpr {
            base: BaseNode::default(),
            expression: expr,
        }));
    }
    let mut pkg = Package::new("main");
    pkg.files.push(File {
        body: vec![Statement::Expr(Box::new(ExprStmt {
            base: BaseNode::default(),
            expression: expr,
        }))],
        ..File::default()
    });
    pkg
}

// ---
// Round Trips
// ---

#[test]
fn test_json_round_trip() {
    for query in QUERIES {
        let pkg = parse(query);
        let bytes = json::to_vec(&pkg).unwrap();
        assert_eq!(json::from_slice(&bytes).unwrap(), pkg, "query {:?}", query);
        let pretty = json::to_vec_pretty(&pkg).unwrap();
        assert_eq!(json::from_slice(&pretty).unwrap(), pkg, "query {:?}", query);
    }
}

#[test]
fn test_binary_round_trip() {
    for query in QUERIES {
        let pkg = parse(query);
        let bytes = binary::encode(&pkg).unwrap();
        assert_eq!(binary::decode(&bytes).unwrap(), pkg, "query {:?}", query);
    }
}

#[test]
fn test_cross_format() {
    for query in QUERIES {
        let pkg = parse(query);
        let from_json = json::from_slice(&json::to_vec(&pkg).unwrap()).unwrap();
        let from_binary = binary::decode(&binary::encode(&from_json).unwrap()).unwrap();
        assert_eq!(from_binary, pkg);
    }
}

#[test]
fn test_errors_survive_round_trip() {
    let pkg = parse(QUERIES[QUERIES.len() - 1]);
    let errors = pkg.errors();
    assert!(errors.len() >= 3);
    let decoded = binary::decode(&binary::encode(&pkg).unwrap()).unwrap();
    assert_eq!(decoded.errors(), errors);
}

#[test]
fn test_deep_tree_within_limit() {
    stack_heavy(|| {
        let pkg = nested_parens(MAX_DEPTH - 8);
        let bytes = json::to_vec(&pkg).unwrap();
        assert_eq!(json::from_slice(&bytes).unwrap(), pkg);
        let bytes = binary::encode(&pkg).unwrap();
        assert_eq!(binary::decode(&bytes).unwrap(), pkg);
    });
}

// ---
// Failures
// ---

#[test]
fn test_too_deep_tree_is_not_encodable() {
    stack_heavy(|| {
        let pkg = nested_parens(MAX_DEPTH);
        let err = json::to_vec(&pkg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Serialization);
        assert!(err.message().contains("maximum depth"));
        assert_eq!(binary::encode(&pkg).unwrap_err().code(), ErrorCode::Serialization);
    });
}

#[test]
fn test_json_errors_carry_position() {
    let err = json::from_slice(b"{\"type\": \"Package\",\n \"package\": 5}").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Deserialization);
    assert!(err.message().contains("line 2"), "{}", err);
}

#[test]
fn test_json_truncations_fail() {
    let bytes = json::to_vec(&parse(QUERIES[2])).unwrap();
    for len in (0..bytes.len()).step_by(7) {
        assert!(json::from_slice(&bytes[..len]).is_err(), "prefix of length {}", len);
    }
}

#[test]
fn test_binary_garbage_fails() {
    let inputs: [&[u8]; 5] = [b"", b"FLXB", b"FLXB\x01", b"FLXB\x01\xff\xff\xff", b"{\"type\":\"Package\"}"];
    for input in inputs {
        let err = binary::decode(input).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Deserialization, "input {:?}", input);
    }
}

#[test]
fn test_binary_bit_flips_never_panic() {
    let bytes = binary::encode(&parse(QUERIES[3])).unwrap();
    for i in 0..bytes.len() {
        for bit in [0x01u8, 0x80] {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= bit;
            // Either outcome is fine as long as decoding returns.
            let _ = binary::decode(&corrupt);
        }
    }
}

#[test]
fn test_json_wrong_shape_fails() {
    let bytes = json::to_vec(&parse("a = 1")).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let wrong = text.replace("\"IntegerLiteral\"", "\"NoSuchLiteral\"");
    let err = json::from_slice(wrong.as_bytes()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Deserialization);
}
