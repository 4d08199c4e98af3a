//! Tokens produced by the scanner.

use crate::ast::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Illegal,
    Eof,

    Ident,
    Int,
    Float,
    String,
    Regex,
    Time,
    Duration,
    PipeReceive,

    // Keywords
    And,
    Or,
    Not,
    Exists,
    Import,
    Package,
    Return,
    Option,
    Builtin,
    TestCase,
    Extends,
    If,
    Then,
    Else,
    With,

    // Operators
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    RegexEq,
    RegexNeq,
    Assign,
    Arrow,
    PipeForward,

    // Delimiters
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
}

impl TokenKind {
    /// The upper-case name used in parser error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
            TokenKind::Ident => "IDENT",
            TokenKind::Int => "INT",
            TokenKind::Float => "FLOAT",
            TokenKind::String => "STRING",
            TokenKind::Regex => "REGEX",
            TokenKind::Time => "TIME",
            TokenKind::Duration => "DURATION",
            TokenKind::PipeReceive => "PIPE_RECEIVE",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Exists => "EXISTS",
            TokenKind::Import => "IMPORT",
            TokenKind::Package => "PACKAGE",
            TokenKind::Return => "RETURN",
            TokenKind::Option => "OPTION",
            TokenKind::Builtin => "BUILTIN",
            TokenKind::TestCase => "TESTCASE",
            TokenKind::Extends => "EXTENDS",
            TokenKind::If => "IF",
            TokenKind::Then => "THEN",
            TokenKind::Else => "ELSE",
            TokenKind::With => "WITH",
            TokenKind::Add => "ADD",
            TokenKind::Sub => "SUB",
            TokenKind::Mul => "MUL",
            TokenKind::Div => "DIV",
            TokenKind::Mod => "MOD",
            TokenKind::Pow => "POW",
            TokenKind::Eq => "EQ",
            TokenKind::Neq => "NEQ",
            TokenKind::Lt => "LT",
            TokenKind::Lte => "LTE",
            TokenKind::Gt => "GT",
            TokenKind::Gte => "GTE",
            TokenKind::RegexEq => "REGEXEQ",
            TokenKind::RegexNeq => "REGEXNEQ",
            TokenKind::Assign => "ASSIGN",
            TokenKind::Arrow => "ARROW",
            TokenKind::PipeForward => "PIPE_FORWARD",
            TokenKind::LParen => "LPAREN",
            TokenKind::RParen => "RPAREN",
            TokenKind::LBrack => "LBRACK",
            TokenKind::RBrack => "RBRACK",
            TokenKind::LBrace => "LBRACE",
            TokenKind::RBrace => "RBRACE",
            TokenKind::Comma => "COMMA",
            TokenKind::Dot => "DOT",
            TokenKind::Colon => "COLON",
            TokenKind::Question => "QUESTION_MARK",
        }
    }

    /// Maps a scanned word to its keyword kind, or `Ident`.
    pub fn keyword_or_ident(word: &str) -> TokenKind {
        match word {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "exists" => TokenKind::Exists,
            "import" => TokenKind::Import,
            "package" => TokenKind::Package,
            "return" => TokenKind::Return,
            "option" => TokenKind::Option,
            "builtin" => TokenKind::Builtin,
            "testcase" => TokenKind::TestCase,
            "extends" => TokenKind::Extends,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "else" => TokenKind::Else,
            "with" => TokenKind::With,
            _ => TokenKind::Ident,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A scanned token with both byte offsets and line/column positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    pub start_pos: Position,
    pub end_pos: Position,
}
