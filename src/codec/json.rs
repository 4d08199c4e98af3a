//! JSON encoding of the AST.
//!
//! Every node is an object tagged with its `"type"`; base fields sit inline.
//!
//! ```json
//! {"type":"VariableAssignment","location":{...},"id":{"type":"Identifier",...},"init":{...}}
//! ```

use log::debug;
use serde::Deserialize;

use super::{check_encodable, MAX_DEPTH};
use crate::ast::Package;
use crate::diagnostics::FluxError;

/// Each node adds at most three levels of JSON nesting (node object, child
/// array, dictionary item), plus a few for the innermost location.
const MAX_JSON_NESTING: usize = 3 * MAX_DEPTH + 8;

pub fn to_vec(pkg: &Package) -> Result<Vec<u8>, FluxError> {
    check_encodable(pkg)?;
    let bytes = serde_json::to_vec(pkg).map_err(|e| FluxError::serialization(e.to_string()))?;
    debug!("encoded package {} as {} bytes of JSON", pkg.package, bytes.len());
    Ok(bytes)
}

pub fn to_vec_pretty(pkg: &Package) -> Result<Vec<u8>, FluxError> {
    check_encodable(pkg)?;
    serde_json::to_vec_pretty(pkg).map_err(|e| FluxError::serialization(e.to_string()))
}

/// Decodes a package. Nothing partial is ever returned.
pub fn from_slice(bytes: &[u8]) -> Result<Package, FluxError> {
    check_nesting(bytes)?;

    let mut de = serde_json::Deserializer::from_slice(bytes);
    // Nesting is bounded by `check_nesting`; serde_json's own limit of 128 is
    // below what a legitimately deep tree needs.
    de.disable_recursion_limit();
    let pkg = Package::deserialize(&mut de).map_err(|e| FluxError::deserialization(e.to_string()))?;
    de.end().map_err(|e| FluxError::deserialization(e.to_string()))?;

    check_encodable(&pkg).map_err(|e| FluxError::deserialization(e.message()))?;
    debug!("decoded package {} from {} bytes of JSON", pkg.package, bytes.len());
    Ok(pkg)
}

/// Rejects documents nested deeper than any encodable tree before decoding.
fn check_nesting(bytes: &[u8]) -> Result<(), FluxError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > MAX_JSON_NESTING {
                    return Err(FluxError::deserialization(format!(
                        "JSON nesting exceeds maximum depth of {} at byte {}",
                        MAX_JSON_NESTING, offset
                    )));
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorCode;
    use crate::parse;

    #[test]
    fn test_round_trip() {
        let pkg = parse("a = 1\nb = \"x ${a}\" + string(v: 2.5)");
        let bytes = to_vec(&pkg).unwrap();
        assert_eq!(from_slice(&bytes).unwrap(), pkg);
    }

    #[test]
    fn test_json_shape() {
        let bytes = to_vec(&parse("a = 1")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Package");
        assert_eq!(value["package"], "main");
        let stmt = &value["files"][0]["body"][0];
        assert_eq!(stmt["type"], "VariableAssignment");
        assert_eq!(stmt["id"]["name"], "a");
        assert_eq!(stmt["init"]["type"], "IntegerLiteral");
        assert_eq!(stmt["init"]["value"], "1");
        assert_eq!(stmt["location"]["start"]["line"], 1);
    }

    #[test]
    fn test_malformed_input() {
        for input in [&b""[..], b"{", b"[]", b"{\"type\":\"Nope\"}", b"null", b"{\"package\":\"main\",\"files\":[]} x"] {
            let err = from_slice(input).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Deserialization, "input {:?}", input);
        }
    }

    #[test]
    fn test_excessive_nesting_is_rejected_before_decoding() {
        let doc = format!("{}{}", "[".repeat(MAX_JSON_NESTING + 1), "]".repeat(MAX_JSON_NESTING + 1));
        let err = from_slice(doc.as_bytes()).unwrap_err();
        assert!(err.message().contains("maximum depth"));
    }

    #[test]
    fn test_brackets_inside_strings_do_not_count() {
        let text = "[".repeat(MAX_JSON_NESTING + 1);
        assert!(check_nesting(format!("{{\"s\":\"{}\"}}", text).as_bytes()).is_ok());
    }
}
