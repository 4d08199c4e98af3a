//! Serialized forms of a parsed package.
//!
//! - [`json`]: the tagged JSON document consumed by other Flux tooling.
//! - [`binary`]: a compact tag/varint encoding of the same tree.
//!
//! Both encoders reject trees they could not decode again: nesting deeper than
//! [`MAX_DEPTH`] nodes, or float literals that are not finite.

use crate::ast::{walk, Node, Package, Visitor};
use crate::diagnostics::FluxError;

pub mod binary;
pub mod json;

/// Deepest node nesting either format will encode or decode.
pub const MAX_DEPTH: usize = 512;

struct Encodable {
    depth: usize,
    error: Option<FluxError>,
}

impl<'a> Visitor<'a> for Encodable {
    fn visit(&mut self, node: Node<'a>) -> bool {
        self.depth += 1;
        if self.error.is_some() {
            return false;
        }
        if self.depth > MAX_DEPTH {
            self.error = Some(FluxError::serialization(format!(
                "AST nesting exceeds maximum depth of {}",
                MAX_DEPTH
            )));
            return false;
        }
        if let Node::FloatLit(lit) = node {
            if !lit.value.is_finite() {
                self.error = Some(FluxError::serialization(format!(
                    "float literal at {} is not finite: {}",
                    lit.base.location, lit.value
                )));
                return false;
            }
        }
        true
    }

    fn done(&mut self, _node: Node<'a>) {
        self.depth -= 1;
    }
}

/// Checks that `pkg` is within the limits both encoders share.
pub fn check_encodable(pkg: &Package) -> Result<(), FluxError> {
    let mut check = Encodable {
        depth: 0,
        error: None,
    };
    walk(&mut check, Node::Package(pkg));
    match check.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BaseNode, Expression, FloatLit, Statement};
    use crate::diagnostics::ErrorCode;
    use crate::parse;

    #[test]
    fn test_parsed_package_is_encodable() {
        assert!(check_encodable(&parse("a = (1 + 2) * x.y")).is_ok());
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let mut pkg = parse("a = 1.5");
        if let Statement::Variable(assign) = &mut pkg.files[0].body[0] {
            assign.init = Expression::Float(FloatLit {
                base: BaseNode::default(),
                value: f64::NAN,
            });
        }
        let err = check_encodable(&pkg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Serialization);
        assert!(err.message().contains("not finite"));
    }
}
