//! Parser configuration.

/// Default limit on expression nesting before the parser stops descending.
pub const DEFAULT_MAX_NESTING: usize = 64;

/// Largest accepted nesting limit. Trees the parser builds under it always
/// fit within [`crate::codec::MAX_DEPTH`].
pub const MAX_NESTING: usize = 120;

/// Options that shape a single parse.
///
/// # Examples
///
/// ```rust
/// use flux_syntax::config::ParserConfig;
/// let config = ParserConfig::default().with_file_name("query.flux").with_max_nesting(16);
/// assert_eq!(config.file_name.as_deref(), Some("query.flux"));
/// assert_eq!(config.max_nesting, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Recorded as `File.name` and in every node location when set.
    pub file_name: Option<String>,
    /// Expressions nested deeper than this become bad expressions. Each link
    /// of an operator or postfix chain counts as a quarter level and each
    /// pipe stage as half a level.
    /// Values above [`MAX_NESTING`] are treated as [`MAX_NESTING`].
    pub max_nesting: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            file_name: None,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl ParserConfig {
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting.clamp(1, MAX_NESTING);
        self
    }
}
