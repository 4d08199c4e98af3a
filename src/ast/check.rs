//! Collects the syntax errors embedded in a parsed package.

use super::walk::{walk, Node, Visitor};
use super::Package;
use crate::diagnostics::ParseDiagnostic;

struct ErrorCollector {
    diagnostics: Vec<ParseDiagnostic>,
}

impl<'a> Visitor<'a> for ErrorCollector {
    fn visit(&mut self, node: Node<'a>) -> bool {
        let base = node.base();
        for message in &base.errors {
            self.diagnostics.push(ParseDiagnostic {
                location: base.location.clone(),
                message: message.clone(),
            });
        }
        true
    }
}

/// Returns every error recorded on any node of `pkg`, ordered by position.
pub fn check(pkg: &Package) -> Vec<ParseDiagnostic> {
    let mut collector = ErrorCollector {
        diagnostics: Vec::new(),
    };
    walk(&mut collector, Node::Package(pkg));
    let mut diagnostics = collector.diagnostics;
    // Stable: errors on an enclosing node stay ahead of errors on its children.
    diagnostics.sort_by(|a, b| {
        (&a.location.file, a.location.start).cmp(&(&b.location.file, b.location.start))
    });
    diagnostics
}

/// Returns true as soon as any node carries an error.
pub fn has_errors(pkg: &Package) -> bool {
    struct Any(bool);
    impl<'a> Visitor<'a> for Any {
        fn visit(&mut self, node: Node<'a>) -> bool {
            if !node.base().errors.is_empty() {
                self.0 = true;
            }
            !self.0
        }
    }
    let mut any = Any(false);
    walk(&mut any, Node::Package(pkg));
    any.0
}
