//! Error and diagnostic types for the Flux parse/serialize service.
//!
//! Two kinds of failure exist and they never mix:
//!
//! - [`FluxError`] is a call failure. A deserializer rejected its input, a
//!   serializer met a tree it cannot encode, or a caller passed an invalid
//!   argument across the C boundary. It carries a category ([`ErrorCode`]) and
//!   a message that stands on its own in a log line.
//! - [`ParseDiagnostic`] is a problem in the *source* that was parsed. The parse
//!   call still succeeds; the diagnostic lives inside the returned package and is
//!   collected with [`crate::ast::check::check`].

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Position, SourceLocation};

// ============================================================================
// ERROR CATEGORIES
// ============================================================================

/// The fixed error taxonomy shared by the Rust API and the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Unexpected state inside the service, including caught panics.
    Internal,
    /// A caller supplied a null handle, bad pointer, or mismatched package.
    InvalidArgument,
    /// A well-typed tree could not be encoded.
    Serialization,
    /// JSON or binary input was not a valid encoding of the AST.
    Deserialization,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "Internal",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::Serialization => "SerializationError",
            ErrorCode::Deserialization => "DeserializationError",
        }
    }

    /// The numeric code reported by `flux_error_code`.
    pub fn as_c_int(&self) -> i32 {
        match self {
            ErrorCode::Internal => 1,
            ErrorCode::InvalidArgument => 2,
            ErrorCode::Serialization => 3,
            ErrorCode::Deserialization => 4,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CALL FAILURES
// ============================================================================

/// A failure of a parse, serialize, or handle call.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum FluxError {
    #[error("internal error: {message}")]
    #[diagnostic(code(flux::internal))]
    Internal { message: String },

    #[error("invalid argument: {message}")]
    #[diagnostic(code(flux::invalid_argument))]
    InvalidArgument { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(flux::serialization),
        help("the AST is inconsistent; it was most likely built or edited by hand")
    )]
    Serialization { message: String },

    #[error("deserialization error: {message}")]
    #[diagnostic(
        code(flux::deserialization),
        help("the input must be an AST produced by `flux-syntax parse` or `flux-syntax encode`")
    )]
    Deserialization { message: String },
}

impl FluxError {
    pub fn internal(message: impl Into<String>) -> Self {
        FluxError::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        FluxError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        FluxError::Serialization {
            message: message.into(),
        }
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        FluxError::Deserialization {
            message: message.into(),
        }
    }

    /// Rebuilds an error from its category and bare message.
    pub fn from_parts(code: ErrorCode, message: impl Into<String>) -> Self {
        match code {
            ErrorCode::Internal => Self::internal(message),
            ErrorCode::InvalidArgument => Self::invalid_argument(message),
            ErrorCode::Serialization => Self::serialization(message),
            ErrorCode::Deserialization => Self::deserialization(message),
        }
    }

    /// Returns the category of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            FluxError::Internal { .. } => ErrorCode::Internal,
            FluxError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            FluxError::Serialization { .. } => ErrorCode::Serialization,
            FluxError::Deserialization { .. } => ErrorCode::Deserialization,
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            FluxError::Internal { message }
            | FluxError::InvalidArgument { message }
            | FluxError::Serialization { message }
            | FluxError::Deserialization { message } => message,
        }
    }

    /// Prefixes the message with `context`, keeping the category.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        let message = format!("{}: {}", context, self.message());
        Self::from_parts(self.code(), message)
    }
}

// ============================================================================
// SOURCE DIAGNOSTICS
// ============================================================================

/// A syntax error recorded inside a parsed package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub location: SourceLocation,
    pub message: String,
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error @{}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseDiagnostic {}

/// All diagnostics of one source file, renderable through miette.
#[derive(Debug, Error)]
#[error("{name}: {count} syntax error(s)", count = .labels.len())]
pub struct SyntaxReport {
    name: String,
    src: NamedSource<String>,
    labels: Vec<LabeledSpan>,
}

impl SyntaxReport {
    pub fn new(name: impl Into<String>, source: impl Into<String>, diagnostics: &[ParseDiagnostic]) -> Self {
        let name = name.into();
        let source = source.into();
        let labels = diagnostics
            .iter()
            .map(|d| LabeledSpan::new_with_span(Some(d.message.clone()), source_span(&source, &d.location)))
            .collect();
        Self {
            src: NamedSource::new(name.clone(), source),
            name,
            labels,
        }
    }
}

impl Diagnostic for SyntaxReport {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new("flux::syntax"))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(self.labels.iter().cloned()))
    }
}

// ============================================================================
// POSITION CONVERSION
// ============================================================================

/// Converts a 1-based line/column position into a byte offset within `source`.
///
/// Positions past the end of a line clamp to the line end; positions past the
/// end of the text clamp to `source.len()`.
pub fn byte_offset(source: &str, pos: Position) -> usize {
    let mut line_start = 0;
    for _ in 1..pos.line.max(1) {
        match source[line_start..].find('\n') {
            Some(nl) => line_start += nl + 1,
            None => return source.len(),
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map_or(source.len(), |nl| line_start + nl);
    source[line_start..line_end]
        .char_indices()
        .nth(pos.column.saturating_sub(1) as usize)
        .map_or(line_end, |(i, _)| line_start + i)
}

/// The byte span of `location` within `source`, at least one byte wide when the
/// source allows it.
pub fn source_span(source: &str, location: &SourceLocation) -> SourceSpan {
    let start = byte_offset(source, location.start);
    let end = byte_offset(source, location.end).max(start);
    let len = if end > start {
        end - start
    } else {
        source[start..].chars().next().map_or(0, char::len_utf8)
    };
    SourceSpan::new(start.into(), len)
}
