//! Parser and AST codecs for the Flux query language.
//!
//! - [`parse`] turns source text into an [`ast::Package`]. It never fails;
//!   syntax errors are embedded in the tree and collected with
//!   [`Package::errors`].
//! - [`codec::json`] and [`codec::binary`] serialize a package and read it
//!   back, rejecting malformed input with a [`FluxError`].
//! - [`ffi`] exposes both through a C ABI with explicit handle ownership, and
//!   [`binding::AstPkg`] wraps that ABI in an RAII type.
//!
//! ```rust
//! use flux_syntax::{codec::json, parse};
//!
//! let pkg = parse("a = 1");
//! assert!(!pkg.has_errors());
//! let bytes = json::to_vec(&pkg).unwrap();
//! assert_eq!(json::from_slice(&bytes).unwrap(), pkg);
//! ```

pub use crate::ast::Package;
pub use crate::config::ParserConfig;
pub use crate::diagnostics::{ErrorCode, FluxError, ParseDiagnostic};
pub use crate::syntax::{parse, parse_with_config};

pub mod ast;
pub mod binding;
pub mod cli;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod ffi;
pub mod syntax;
