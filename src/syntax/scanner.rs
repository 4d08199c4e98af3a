//! Lexical scanner for Flux source code.
//!
//! The scanner converts source text into tokens, handling:
//! - Identifiers and keywords
//! - Integer, float, duration and date-time literals
//! - String literals, including nested `${...}` interpolations
//! - Regular expression literals (only where the parser asks for them)
//! - `//` line comments
//! - All operators and punctuation
//!
//! The scanner never fails. Text it cannot tokenize becomes an
//! [`TokenKind::Illegal`] token and the parser reports it.

use crate::ast::Position;

use super::token::{Token, TokenKind};

/// What an open quote or `${` inside a string token is waiting to close.
#[derive(Debug, Clone, Copy)]
enum Nesting {
    String,
    /// Interpolation body with its count of open braces.
    Interpolation(usize),
}

/// Scanner state; cheap to clone for lookahead.
#[derive(Debug, Clone)]
pub struct Scanner<'src> {
    src: &'src str,
    /// Byte offset at which scanning stops.
    limit: usize,
    /// Byte offset of `ch`.
    offset: usize,
    /// Current character, `None` at the end of the window.
    ch: Option<char>,
    line: u32,
    column: u32,
}

impl<'src> Scanner<'src> {
    /// Create a scanner over the whole of `src`.
    pub fn new(src: &'src str) -> Self {
        Self::with_window(src, 0, src.len(), Position::new(1, 1))
    }

    /// Create a scanner over `src[start..limit]`, where `start` sits at `pos`.
    ///
    /// Token offsets and positions stay relative to the full `src`.
    pub fn with_window(src: &'src str, start: usize, limit: usize, pos: Position) -> Self {
        let limit = limit.min(src.len());
        let start = start.min(limit);
        let mut scanner = Self {
            src,
            limit,
            offset: start,
            ch: None,
            line: pos.line,
            column: pos.column,
        };
        scanner.ch = scanner.char_at(start);
        scanner
    }

    /// Reposition the scanner at a token boundary it has already passed.
    pub fn reset(&mut self, offset: usize, pos: Position) {
        self.offset = offset.min(self.limit);
        self.line = pos.line;
        self.column = pos.column;
        self.ch = self.char_at(self.offset);
    }

    /// Byte offset of the next unscanned character.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.src.get(offset..self.limit)?.chars().next()
    }

    /// Advance to the next character.
    fn next(&mut self) {
        let Some(ch) = self.ch else { return };
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.offset += ch.len_utf8();
        self.ch = self.char_at(self.offset);
    }

    fn peek(&self) -> Option<char> {
        self.char_at(self.offset + self.ch?.len_utf8())
    }

    fn at(&self, pred: impl FnOnce(char) -> bool) -> bool {
        self.ch.is_some_and(pred)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.ch {
                Some(' ' | '\t' | '\n' | '\r') => self.next(),
                Some('/') if self.peek() == Some('/') => {
                    while !matches!(self.ch, Some('\n') | None) {
                        self.next();
                    }
                }
                _ => return,
            }
        }
    }

    /// Scan the next token. A leading `/` is read as a regex literal only
    /// when `regex_allowed` is set.
    pub fn scan(&mut self, regex_allowed: bool) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.offset;
        let start_pos = self.position();

        let kind = match self.ch {
            None => TokenKind::Eof,
            Some(c) if c.is_alphabetic() || c == '_' => self.scan_identifier(),
            Some(c) if c.is_ascii_digit() => self.scan_number(),
            Some('.') if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                self.next();
                self.scan_digits();
                TokenKind::Float
            }
            Some('"') => self.scan_string(),
            Some('/') if regex_allowed => self.scan_regex(),
            Some(c) => self.scan_operator(c),
        };

        Token {
            kind,
            text: self.src[start..self.offset].to_string(),
            start,
            end: self.offset,
            start_pos,
            end_pos: self.position(),
        }
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.offset;
        while self.at(|c| c.is_alphanumeric() || c == '_') {
            self.next();
        }
        TokenKind::keyword_or_ident(&self.src[start..self.offset])
    }

    fn scan_digits(&mut self) -> usize {
        let mut count = 0;
        while self.at(|c| c.is_ascii_digit()) {
            self.next();
            count += 1;
        }
        count
    }

    /// Integers, floats, durations (`1h30m`) and date-times (`2019-01-01T00:00:00Z`).
    fn scan_number(&mut self) -> TokenKind {
        let digits = self.scan_digits();
        let digit_next = self.peek().is_some_and(|c| c.is_ascii_digit());

        if self.ch == Some('.') && digit_next {
            self.next();
            self.scan_digits();
            return TokenKind::Float;
        }

        if digits == 4 && self.ch == Some('-') && digit_next {
            return self.scan_date_time();
        }

        if self.at(is_unit_start) {
            while self.at(is_unit_start) {
                while self.at(is_unit_start) {
                    self.next();
                }
                if self.scan_digits() == 0 {
                    break;
                }
            }
            return TokenKind::Duration;
        }

        TokenKind::Int
    }

    fn scan_date_time(&mut self) -> TokenKind {
        // Date part: -MM-DD
        while self.at(|c| c == '-' || c.is_ascii_digit()) {
            self.next();
        }
        if self.ch != Some('T') {
            return TokenKind::Time;
        }
        self.next();
        while self.at(|c| c == ':' || c == '.' || c.is_ascii_digit()) {
            self.next();
        }
        match self.ch {
            Some('Z') => self.next(),
            Some('+' | '-') if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                self.next();
                while self.at(|c| c == ':' || c.is_ascii_digit()) {
                    self.next();
                }
            }
            _ => {}
        }
        TokenKind::Time
    }

    /// Consumes a string literal including its quotes. Unterminated strings
    /// become `Illegal`.
    fn scan_string(&mut self) -> TokenKind {
        // Opening quote
        self.next();
        if self.scan_nested(Nesting::String) {
            TokenKind::String
        } else {
            TokenKind::Illegal
        }
    }

    /// Skips an interpolation body that starts just after `${`, stopping after
    /// its closing brace. Returns false if the input ends first.
    pub fn skip_interpolation(&mut self) -> bool {
        self.scan_nested(Nesting::Interpolation(1))
    }

    /// Scans until `open` is closed. Strings inside interpolations and
    /// interpolations inside strings nest to any depth.
    fn scan_nested(&mut self, open: Nesting) -> bool {
        let mut stack = vec![open];
        while let Some(top) = stack.last_mut() {
            let Some(ch) = self.ch else { return false };
            match top {
                Nesting::String => match ch {
                    '\\' => {
                        self.next();
                        self.next();
                    }
                    '"' => {
                        self.next();
                        stack.pop();
                    }
                    '$' if self.peek() == Some('{') => {
                        self.next();
                        self.next();
                        stack.push(Nesting::Interpolation(1));
                    }
                    _ => self.next(),
                },
                Nesting::Interpolation(braces) => match ch {
                    '"' => {
                        self.next();
                        stack.push(Nesting::String);
                    }
                    '{' => {
                        *braces += 1;
                        self.next();
                    }
                    '}' => {
                        *braces -= 1;
                        let closed = *braces == 0;
                        self.next();
                        if closed {
                            stack.pop();
                        }
                    }
                    _ => self.next(),
                },
            }
        }
        true
    }

    fn scan_regex(&mut self) -> TokenKind {
        // Opening slash
        self.next();
        loop {
            match self.ch {
                None | Some('\n') => return TokenKind::Illegal,
                Some('\\') => {
                    self.next();
                    if self.ch != Some('\n') {
                        self.next();
                    }
                }
                Some('/') => {
                    self.next();
                    return TokenKind::Regex;
                }
                _ => self.next(),
            }
        }
    }

    fn scan_operator(&mut self, ch: char) -> TokenKind {
        self.next();
        match ch {
            '+' => TokenKind::Add,
            '-' => TokenKind::Sub,
            '*' => TokenKind::Mul,
            '/' => TokenKind::Div,
            '%' => TokenKind::Mod,
            '^' => TokenKind::Pow,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBrack,
            ']' => TokenKind::RBrack,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '=' => match self.ch {
                Some('=') => self.then(TokenKind::Eq),
                Some('~') => self.then(TokenKind::RegexEq),
                Some('>') => self.then(TokenKind::Arrow),
                _ => TokenKind::Assign,
            },
            '!' => match self.ch {
                Some('=') => self.then(TokenKind::Neq),
                Some('~') => self.then(TokenKind::RegexNeq),
                _ => TokenKind::Illegal,
            },
            '<' => match self.ch {
                Some('=') => self.then(TokenKind::Lte),
                Some('-') => self.then(TokenKind::PipeReceive),
                _ => TokenKind::Lt,
            },
            '>' => match self.ch {
                Some('=') => self.then(TokenKind::Gte),
                _ => TokenKind::Gt,
            },
            '|' => match self.ch {
                Some('>') => self.then(TokenKind::PipeForward),
                _ => TokenKind::Illegal,
            },
            _ => TokenKind::Illegal,
        }
    }

    /// Consume the second character of a two-character operator.
    fn then(&mut self, kind: TokenKind) -> TokenKind {
        self.next();
        kind
    }
}

fn is_unit_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == 'µ'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let tok = scanner.scan(false);
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("a = 1"),
            vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Int]
        );
    }

    #[test]
    fn test_keywords_and_operators() {
        assert_eq!(
            kinds("if not x then y else z |> f() <- =~ !~ => <= >="),
            vec![
                TokenKind::If,
                TokenKind::Not,
                TokenKind::Ident,
                TokenKind::Then,
                TokenKind::Ident,
                TokenKind::Else,
                TokenKind::Ident,
                TokenKind::PipeForward,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::PipeReceive,
                TokenKind::RegexEq,
                TokenKind::RegexNeq,
                TokenKind::Arrow,
                TokenKind::Lte,
                TokenKind::Gte,
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(kinds("12 1.5 .5"), vec![TokenKind::Int, TokenKind::Float, TokenKind::Float]);
        assert_eq!(kinds("1h30m 5µs"), vec![TokenKind::Duration, TokenKind::Duration]);
        assert_eq!(
            kinds("2019-01-01 2019-01-01T10:00:00.5Z 2019-01-01T10:00:00+07:00"),
            vec![TokenKind::Time, TokenKind::Time, TokenKind::Time]
        );
    }

    #[test]
    fn test_string_with_nested_interpolation() {
        let mut scanner = Scanner::new(r#""a ${ "b${c}" } d" x"#);
        let tok = scanner.scan(false);
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.text, r#""a ${ "b${c}" } d""#);
        assert_eq!(scanner.scan(false).kind, TokenKind::Ident);
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let mut scanner = Scanner::new("\"abc");
        assert_eq!(scanner.scan(false).kind, TokenKind::Illegal);
        assert_eq!(scanner.scan(false).kind, TokenKind::Eof);
    }

    #[test]
    fn test_regex_only_when_allowed() {
        let mut scanner = Scanner::new(r"/a\/b/");
        assert_eq!(scanner.scan(false).kind, TokenKind::Div);
        scanner.reset(0, Position::new(1, 1));
        let tok = scanner.scan(true);
        assert_eq!(tok.kind, TokenKind::Regex);
        assert_eq!(tok.text, r"/a\/b/");
    }

    #[test]
    fn test_comments_and_positions() {
        let mut scanner = Scanner::new("// header\n  x");
        let tok = scanner.scan(false);
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.start_pos, Position::new(2, 3));
        assert_eq!(tok.end_pos, Position::new(2, 4));
        assert_eq!(tok.start, 12);
    }

    #[test]
    fn test_window_stops_at_limit() {
        let src = "abc + def";
        let mut scanner = Scanner::with_window(src, 0, 3, Position::new(1, 1));
        assert_eq!(scanner.scan(false).kind, TokenKind::Ident);
        assert_eq!(scanner.scan(false).kind, TokenKind::Eof);
    }

    #[test]
    fn test_noncharacter_is_not_end_of_input() {
        let mut scanner = Scanner::new("a \u{FFFF} b");
        assert_eq!(scanner.scan(false).kind, TokenKind::Ident);
        let tok = scanner.scan(false);
        assert_eq!(tok.kind, TokenKind::Illegal);
        assert_eq!(tok.text, "\u{FFFF}");
        assert_eq!(scanner.scan(false).kind, TokenKind::Ident);
        assert_eq!(scanner.scan(false).kind, TokenKind::Eof);
    }

    #[test]
    fn test_deeply_nested_interpolation_scans_in_one_token() {
        let levels = 100_000;
        let src = format!("{}x{}", "\"${".repeat(levels), "}\"".repeat(levels));
        let mut scanner = Scanner::new(&src);
        let tok = scanner.scan(false);
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.end, src.len());

        let unclosed = &src[..src.len() - 1];
        let mut scanner = Scanner::new(unclosed);
        assert_eq!(scanner.scan(false).kind, TokenKind::Illegal);
    }
}
