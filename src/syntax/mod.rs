//! Flux source text to AST.
//!
//! [`parse`] always returns a package. Syntax errors are embedded in the nodes
//! where they were found; collect them with [`crate::ast::check::check`].

use log::debug;

use crate::ast::{BaseNode, File, Package};
use crate::config::ParserConfig;

pub mod parser;
pub mod scanner;
pub mod token;

pub use parser::Parser;

/// Package name used when a file has no `package` clause.
pub const DEFAULT_PACKAGE: &str = "main";

/// Parses `source` with the default configuration.
///
/// # Examples
///
/// ```rust
/// use flux_syntax::syntax::parse;
/// let pkg = parse("a = 1");
/// assert_eq!(pkg.package, "main");
/// assert_eq!(pkg.files[0].body.len(), 1);
/// assert!(!pkg.has_errors());
/// ```
pub fn parse(source: &str) -> Package {
    parse_with_config(source, &ParserConfig::default())
}

pub fn parse_with_config(source: &str, config: &ParserConfig) -> Package {
    let file = parse_file(source, config);
    let package = file
        .package
        .as_ref()
        .map(|clause| clause.name.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PACKAGE.to_string());
    debug!(
        "parsed {} bytes into {} statement(s) of package {}",
        source.len(),
        file.body.len(),
        package
    );
    let pkg = Package {
        base: BaseNode::default(),
        path: String::new(),
        package,
        files: vec![file],
    };
    debug_assert!(crate::codec::check_encodable(&pkg).is_ok(), "parsed tree exceeds codec limits");
    pkg
}

/// Parses a single file without wrapping it in a package.
pub fn parse_file(source: &str, config: &ParserConfig) -> File {
    Parser::new(source, config).parse_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_from_clause() {
        assert_eq!(parse("package foo\na = 1").package, "foo");
        assert_eq!(parse("a = 1").package, DEFAULT_PACKAGE);
        assert_eq!(parse("package").package, DEFAULT_PACKAGE);
    }

    #[test]
    fn test_file_name_is_recorded() {
        let config = ParserConfig::default().with_file_name("query.flux");
        let pkg = parse_with_config("a = 1", &config);
        let file = &pkg.files[0];
        assert_eq!(file.name, "query.flux");
        assert_eq!(file.base.location.file.as_deref(), Some("query.flux"));
    }

    #[test]
    fn test_garbage_still_parses() {
        for src in ["", "{", "\"", "@@@", "a = (", "|> |>", "1 +", "x = [1, 2"] {
            let pkg = parse(src);
            assert_eq!(pkg.files.len(), 1, "source {:?}", src);
        }
        assert!(parse("{").has_errors());
    }
}
