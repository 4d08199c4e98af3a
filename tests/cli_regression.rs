// Regression tests for the `flux-syntax` binary.
// Requires: assert_cmd, predicates, tempfile in [dev-dependencies]

use std::fs;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};
use tempfile::TempDir;

fn flux() -> Command {
    let mut cmd = Command::cargo_bin("flux-syntax").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn cli_parse_prints_json_ast() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "ok.flux", b"a = 1\n");
    flux()
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("\"type\":\"Package\"").and(contains("\"VariableAssignment\"")));
}

#[test]
fn cli_parse_reports_embedded_errors_with_miette() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "bad.flux", b"a = {\n");
    flux()
        .arg("parse")
        .arg(&file)
        .assert()
        .success()
        .stdout(contains("expected RBRACE, got EOF"))
        .stderr(contains("flux::syntax").and(contains("1 syntax error(s)")));
}

#[test]
fn cli_check_directory() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.flux", b"x = 1\n");
    write(&dir, "nested/b.flux", b"y = )\n");
    write(&dir, "notes.txt", b"}}}}\n");
    flux()
        .arg("check")
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(
            contains("b.flux:1:5")
                .and(contains("invalid expression"))
                .and(contains("checked 2 files"))
                .and(contains("notes.txt").not()),
        );
}

#[test]
fn cli_check_clean_file() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "ok.flux", b"f = (x) => x * 2\n");
    flux()
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stderr(contains("ok: checked 1 file, found 0 syntax errors"));
}

#[test]
fn cli_encode_then_decode() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "q.flux", b"from(bucket: \"b\") |> range(start: -1h)\n");
    let out = dir.path().join("q.bin");
    flux()
        .arg("encode")
        .arg(&file)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    let bytes = fs::read(&out).unwrap();
    assert_eq!(&bytes[..4], b"FLXB");

    flux()
        .arg("decode")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("\"PipeExpression\"").and(contains("\"range\"")));
}

#[test]
fn cli_decode_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "junk.bin", b"not an ast");
    flux()
        .arg("decode")
        .arg(&file)
        .assert()
        .failure()
        .stderr(contains("flux::deserialization").and(contains("magic")));
}

#[test]
fn cli_from_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let source = write(&dir, "q.flux", b"a = (\n");
    let output = flux().arg("parse").arg(&source).output().unwrap();
    assert!(output.status.success());
    let json = write(&dir, "q.json", &output.stdout);

    flux()
        .arg("from-json")
        .arg(&json)
        .assert()
        .failure()
        .stdout(contains("package main: 1 file(s)").and(contains("error @")));
}

#[test]
fn cli_from_json_rejects_malformed() {
    let dir = TempDir::new().unwrap();
    let json = write(&dir, "bad.json", b"{\"type\": ");
    flux()
        .arg("from-json")
        .arg(&json)
        .assert()
        .failure()
        .stderr(contains("could not decode").and(contains("flux::deserialization")));
}

#[test]
fn cli_missing_file() {
    flux()
        .arg("parse")
        .arg("/definitely/not/here.flux")
        .assert()
        .failure()
        .stderr(contains("could not read"));
}
