//! Flux Parser - recursive descent with error recovery.
//!
//! Converts Flux source code into an AST [`File`] with source location tracking.
//! The parser never fails: anything it cannot make sense of is kept in the tree
//! as a bad statement or bad expression, and every problem is recorded in the
//! `errors` of the node where it was found.

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::ast::*;
use crate::config::{ParserConfig, MAX_NESTING};

use super::scanner::Scanner;
use super::token::{Token, TokenKind};

/// Units accepted in duration literals.
const DURATION_UNITS: &[&str] = &["y", "mo", "w", "d", "h", "m", "s", "ms", "us", "µs", "ns"];

const TOO_DEEP: &str = "program is too deeply nested";

/// Tree levels charged for one nesting level: the nested node plus the
/// wrappers (`Block`, statement, `Property`, ...) above the next one.
const LEVEL_COST: usize = 4;

/// Metadata stamped on every parsed file.
pub const FILE_METADATA: &str = "parser-type=rust";

/// A byte offset paired with its line/column position.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Mark {
    offset: usize,
    pos: Position,
}

impl Mark {
    /// Steps over one character of `src`, returning it.
    fn bump(&mut self, src: &str) -> Option<char> {
        let ch = src[self.offset..].chars().next()?;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(ch)
    }
}

/// An expression already parsed by the caller, threaded into the precedence
/// levels so parsing can continue as if it had just been read as a primary.
type Seed = Option<(Mark, Expression)>;

pub struct Parser<'src> {
    src: &'src str,
    scanner: Scanner<'src>,
    lookahead: VecDeque<Token>,
    /// End of the last consumed token.
    last_end: Mark,
    consumed: usize,
    /// Tree levels above the node being parsed.
    depth: usize,
    /// Deepest level reached since the last [`Parser::measured`] call.
    high: usize,
    limit: usize,
    config: ParserConfig,
}

impl<'src> Parser<'src> {
    pub fn new(src: &'src str, config: &ParserConfig) -> Self {
        Self::with_window(src, 0, src.len(), Position::new(1, 1), config, 0)
    }

    /// A parser over `src[start..end]` whose first character sits at `pos`.
    fn with_window(
        src: &'src str,
        start: usize,
        end: usize,
        pos: Position,
        config: &ParserConfig,
        depth: usize,
    ) -> Self {
        Self {
            src,
            scanner: Scanner::with_window(src, start, end, pos),
            lookahead: VecDeque::new(),
            last_end: Mark { offset: start, pos },
            consumed: 0,
            depth,
            high: depth,
            limit: config.max_nesting.min(MAX_NESTING) * LEVEL_COST,
            config: config.clone(),
        }
    }

    // ========================================================================
    // TOKEN STREAM
    // ========================================================================

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            let tok = self.scanner.scan(false);
            self.lookahead.push_back(tok);
        }
    }

    fn peek(&mut self) -> &Token {
        self.fill(0);
        &self.lookahead[0]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    fn peek_nth_kind(&mut self, n: usize) -> TokenKind {
        self.fill(n);
        self.lookahead[n].kind
    }

    /// Peeks in operand position, where a `/` starts a regex literal.
    fn peek_operand(&mut self) -> &Token {
        self.fill(0);
        if self.lookahead[0].kind == TokenKind::Div {
            let (start, pos) = (self.lookahead[0].start, self.lookahead[0].start_pos);
            self.lookahead.clear();
            self.scanner.reset(start, pos);
            let tok = self.scanner.scan(true);
            self.lookahead.push_back(tok);
        }
        &self.lookahead[0]
    }

    fn consume(&mut self) -> Token {
        let tok = match self.lookahead.pop_front() {
            Some(tok) => tok,
            None => self.scanner.scan(false),
        };
        if tok.kind != TokenKind::Eof {
            self.last_end = Mark {
                offset: tok.end,
                pos: tok.end_pos,
            };
            self.consumed += 1;
        }
        tok
    }

    /// Consumes a token of `kind`, or records why it could not.
    fn expect(&mut self, kind: TokenKind, errors: &mut Vec<String>) -> bool {
        if self.peek_kind() == kind {
            self.consume();
            true
        } else {
            let message = self.unexpected(kind);
            errors.push(message);
            false
        }
    }

    fn unexpected(&mut self, expected: TokenKind) -> String {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Eof => format!("expected {}, got EOF", expected),
            got => format!(
                "expected {}, got {} ({}) at {}:{}",
                expected, got, tok.text, tok.start_pos.line, tok.start_pos.column
            ),
        }
    }

    // ========================================================================
    // LOCATIONS
    // ========================================================================

    /// Marks the start of the next token.
    fn mark(&mut self) -> Mark {
        let tok = self.peek();
        Mark {
            offset: tok.start,
            pos: tok.start_pos,
        }
    }

    fn seed_mark(&mut self, seed: &Seed) -> Mark {
        match seed {
            Some((mark, _)) => *mark,
            None => self.mark(),
        }
    }

    /// The location from `start` to the end of the last consumed token.
    fn location(&self, start: Mark) -> SourceLocation {
        let end = if self.last_end.offset >= start.offset {
            self.last_end
        } else {
            start
        };
        self.span_location(start, end)
    }

    fn span_location(&self, start: Mark, end: Mark) -> SourceLocation {
        SourceLocation {
            file: self.config.file_name.clone(),
            start: start.pos,
            end: end.pos,
            source: Some(self.src[start.offset..end.offset].to_string()),
        }
    }

    fn base(&self, start: Mark, errors: Vec<String>) -> BaseNode {
        BaseNode {
            location: self.location(start),
            errors,
        }
    }

    // ========================================================================
    // FILES AND STATEMENTS
    // ========================================================================

    pub fn parse_file(&mut self) -> File {
        let start = self.last_end;
        let package = if self.peek_kind() == TokenKind::Package {
            Some(self.parse_package_clause())
        } else {
            None
        };
        let mut imports = Vec::new();
        while self.peek_kind() == TokenKind::Import {
            imports.push(self.parse_import_declaration());
        }
        let body = self.parse_statement_list(TokenKind::Eof);
        File {
            base: BaseNode::new(self.location(start)),
            name: self.config.file_name.clone().unwrap_or_default(),
            metadata: FILE_METADATA.to_string(),
            package,
            imports,
            body,
        }
    }

    fn parse_package_clause(&mut self) -> PackageClause {
        let mark = self.mark();
        self.consume();
        let name = self.parse_identifier();
        PackageClause {
            base: self.base(mark, Vec::new()),
            name,
        }
    }

    fn parse_import_declaration(&mut self) -> ImportDeclaration {
        let mark = self.mark();
        self.consume();
        let alias = if self.peek_kind() == TokenKind::Ident {
            Some(self.parse_identifier())
        } else {
            None
        };
        let path = self.parse_string_literal();
        ImportDeclaration {
            base: self.base(mark, Vec::new()),
            alias,
            path,
        }
    }

    fn parse_statement_list(&mut self, terminator: TokenKind) -> Vec<Statement> {
        let mut body = Vec::new();
        loop {
            let kind = self.peek_kind();
            if kind == terminator || kind == TokenKind::Eof {
                break;
            }
            let before = self.consumed;
            body.push(self.parse_statement());
            if self.consumed == before {
                body.push(self.parse_bad_statement());
            }
        }
        body
    }

    fn parse_statement(&mut self) -> Statement {
        match self.peek_kind() {
            TokenKind::Ident => self.parse_ident_statement(),
            TokenKind::Option => self.parse_option_statement(),
            TokenKind::Builtin => self.parse_builtin_statement(),
            TokenKind::TestCase => self.parse_testcase_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Int
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Regex
            | TokenKind::Div
            | TokenKind::Time
            | TokenKind::Duration
            | TokenKind::PipeReceive
            | TokenKind::LParen
            | TokenKind::LBrack
            | TokenKind::LBrace
            | TokenKind::Add
            | TokenKind::Sub
            | TokenKind::Not
            | TokenKind::Exists
            | TokenKind::If
            | TokenKind::Illegal => self.parse_expression_statement(),
            _ => self.parse_bad_statement(),
        }
    }

    fn parse_bad_statement(&mut self) -> Statement {
        let mark = self.mark();
        let tok = self.consume();
        let location = self.location(mark);
        let message = format!("invalid statement @{}: {}", span(&location), tok.text);
        Statement::Bad(Box::new(BadStmt {
            base: BaseNode {
                location,
                errors: vec![message],
            },
            text: tok.text,
        }))
    }

    fn parse_expression_statement(&mut self) -> Statement {
        let mark = self.mark();
        let expression = self.parse_expression();
        Statement::Expr(Box::new(ExprStmt {
            base: self.base(mark, Vec::new()),
            expression,
        }))
    }

    /// `ident = expr`, or an expression statement that starts with an identifier.
    fn parse_ident_statement(&mut self) -> Statement {
        let mark = self.mark();
        let id = self.parse_identifier();
        if self.peek_kind() == TokenKind::Assign {
            self.consume();
            let init = self.parse_expression();
            return Statement::Variable(Box::new(VariableAssgn {
                base: self.base(mark, Vec::new()),
                id,
                init,
            }));
        }
        let mut seed = Some((mark, Expression::Identifier(id)));
        let expression = self.parse_expression_seeded(&mut seed);
        Statement::Expr(Box::new(ExprStmt {
            base: self.base(mark, Vec::new()),
            expression,
        }))
    }

    fn parse_option_statement(&mut self) -> Statement {
        let mark = self.mark();
        self.consume();
        let assignment = self.parse_option_assignment();
        Statement::Option(Box::new(OptionStmt {
            base: self.base(mark, Vec::new()),
            assignment,
        }))
    }

    fn parse_option_assignment(&mut self) -> Assignment {
        let mark = self.mark();
        let id = self.parse_identifier();
        let mut errors = Vec::new();
        if self.peek_kind() == TokenKind::Dot {
            self.consume();
            let property = self.parse_identifier();
            let member = MemberExpr {
                base: self.base(mark, Vec::new()),
                object: Expression::Identifier(id),
                property: PropertyKey::Identifier(property),
            };
            self.expect(TokenKind::Assign, &mut errors);
            let init = self.parse_expression();
            return Assignment::Member(Box::new(MemberAssgn {
                base: self.base(mark, errors),
                member,
                init,
            }));
        }
        self.expect(TokenKind::Assign, &mut errors);
        let init = self.parse_expression();
        Assignment::Variable(Box::new(VariableAssgn {
            base: self.base(mark, errors),
            id,
            init,
        }))
    }

    fn parse_builtin_statement(&mut self) -> Statement {
        let mark = self.mark();
        self.consume();
        let id = self.parse_identifier();
        let mut errors = Vec::new();
        self.expect(TokenKind::Colon, &mut errors);
        let ty = self.parse_type_expression();
        Statement::Builtin(Box::new(BuiltinStmt {
            base: self.base(mark, errors),
            id,
            ty,
        }))
    }

    fn parse_testcase_statement(&mut self) -> Statement {
        let mark = self.mark();
        self.consume();
        let id = self.parse_identifier();
        let extends = if self.peek_kind() == TokenKind::Extends {
            self.consume();
            Some(self.parse_string_literal())
        } else {
            None
        };
        let block = self.parse_block();
        Statement::TestCase(Box::new(TestCaseStmt {
            base: self.base(mark, Vec::new()),
            id,
            extends,
            block,
        }))
    }

    fn parse_return_statement(&mut self) -> Statement {
        let mark = self.mark();
        self.consume();
        let argument = self.parse_expression();
        Statement::Return(Box::new(ReturnStmt {
            base: self.base(mark, Vec::new()),
            argument,
        }))
    }

    fn parse_block(&mut self) -> Block {
        let mark = self.mark();
        let mut errors = Vec::new();
        if !self.enter() {
            self.skip_nested();
            errors.push(TOO_DEEP.to_string());
            return Block {
                base: self.base(mark, errors),
                body: Vec::new(),
            };
        }
        if !self.expect(TokenKind::LBrace, &mut errors) {
            self.leave();
            return Block {
                base: self.base(mark, errors),
                body: Vec::new(),
            };
        }
        let body = self.parse_statement_list(TokenKind::RBrace);
        self.leave();
        self.expect(TokenKind::RBrace, &mut errors);
        Block {
            base: self.base(mark, errors),
            body,
        }
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    pub fn parse_expression(&mut self) -> Expression {
        self.parse_expression_seeded(&mut None)
    }

    fn parse_expression_seeded(&mut self, seed: &mut Seed) -> Expression {
        if !self.enter() {
            let mut bad = self.too_deep();
            if let (Some((_, expr)), Expression::Bad(b)) = (seed.take(), &mut bad) {
                b.expression = Some(expr);
            }
            return bad;
        }
        let expr = self.parse_logical_or(seed);
        self.leave();
        expr
    }

    /// Runs `f` one nesting level deeper, or gives up if the limit is reached.
    fn descend(&mut self, f: impl FnOnce(&mut Self) -> Expression) -> Expression {
        if !self.enter() {
            return self.too_deep();
        }
        let expr = f(self);
        self.leave();
        expr
    }

    fn too_deep(&mut self) -> Expression {
        let mark = self.mark();
        self.skip_nested();
        self.nesting_error(mark)
    }

    /// A bad expression spanning from `mark` to the last consumed token.
    fn nesting_error(&self, mark: Mark) -> Expression {
        let location = self.location(mark);
        let text = location.source.clone().unwrap_or_default();
        Expression::Bad(Box::new(BadExpr {
            base: BaseNode {
                location,
                errors: vec![TOO_DEEP.to_string()],
            },
            text,
            expression: None,
        }))
    }

    // ========================================================================
    // NESTING BUDGET
    // ========================================================================
    //
    // `depth`, `high` and `limit` count tree levels. Entering a nested
    // construct costs LEVEL_COST. A chain link is charged against the
    // measured height of everything already in the chain, since each new
    // link sits above all of it.

    /// Enters one nesting level, or returns false when it would not fit.
    fn enter(&mut self) -> bool {
        if self.depth + LEVEL_COST > self.limit {
            return false;
        }
        self.depth += LEVEL_COST;
        self.high = self.high.max(self.depth);
        true
    }

    fn leave(&mut self) {
        self.depth -= LEVEL_COST;
    }

    /// Runs `f`, also returning how many levels its result reaches below the
    /// current depth.
    fn measured<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (T, usize) {
        let outer = std::mem::replace(&mut self.high, self.depth);
        let value = f(self);
        let height = self.high - self.depth;
        self.high = self.high.max(outer);
        (value, height)
    }

    /// Height of a chain after adding a link of `cost` levels over operands
    /// of heights `left` and `right`, or `None` if that no longer fits.
    fn link(&mut self, left: usize, right: usize, cost: usize) -> Option<usize> {
        let height = left.max(right) + cost;
        if self.depth + height > self.limit {
            return None;
        }
        self.high = self.high.max(self.depth + height);
        Some(height)
    }

    /// Skips one operand: a balanced bracketed group or a single token.
    fn skip_nested(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::LParen | TokenKind::LBrack | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace | TokenKind::Comma
                    if depth == 0 =>
                {
                    return
                }
                TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            self.consume();
            if depth == 0 {
                return;
            }
        }
    }

    fn parse_logical_or(&mut self, seed: &mut Seed) -> Expression {
        self.parse_logical_level(seed, Self::parse_logical_and, TokenKind::Or, LogicalOperator::Or)
    }

    fn parse_logical_and(&mut self, seed: &mut Seed) -> Expression {
        self.parse_logical_level(seed, Self::parse_unary_logical, TokenKind::And, LogicalOperator::And)
    }

    fn parse_logical_level(
        &mut self,
        seed: &mut Seed,
        operand: fn(&mut Self, &mut Seed) -> Expression,
        token: TokenKind,
        operator: LogicalOperator,
    ) -> Expression {
        let mark = self.seed_mark(seed);
        let (mut left, mut height) = self.measured(|p| operand(p, seed));
        let mut overflow = false;
        while self.peek_kind() == token {
            self.consume();
            let (right, right_height) = self.measured(|p| operand(p, &mut None));
            if overflow {
                continue;
            }
            match self.link(height, right_height, 1) {
                Some(h) => {
                    height = h;
                    left = Expression::Logical(Box::new(LogicalExpr {
                        base: self.base(mark, Vec::new()),
                        operator,
                        left,
                        right,
                    }));
                }
                None => overflow = true,
            }
        }
        if overflow {
            return self.nesting_error(mark);
        }
        left
    }

    fn parse_unary_logical(&mut self, seed: &mut Seed) -> Expression {
        if seed.is_none() {
            let operator = match self.peek_kind() {
                TokenKind::Not => Some(Operator::Not),
                TokenKind::Exists => Some(Operator::Exists),
                _ => None,
            };
            if let Some(operator) = operator {
                let mark = self.mark();
                self.consume();
                let argument = self.descend(|p| p.parse_unary_logical(&mut None));
                return Expression::Unary(Box::new(UnaryExpr {
                    base: self.base(mark, Vec::new()),
                    operator,
                    argument,
                }));
            }
        }
        self.parse_comparison(seed)
    }

    fn parse_comparison(&mut self, seed: &mut Seed) -> Expression {
        self.parse_binary_level(seed, Self::parse_additive, comparison_operator)
    }

    fn parse_additive(&mut self, seed: &mut Seed) -> Expression {
        self.parse_binary_level(seed, Self::parse_multiplicative, additive_operator)
    }

    fn parse_multiplicative(&mut self, seed: &mut Seed) -> Expression {
        self.parse_binary_level(seed, Self::parse_exponent, multiplicative_operator)
    }

    fn parse_exponent(&mut self, seed: &mut Seed) -> Expression {
        self.parse_binary_level(seed, Self::parse_unary, exponent_operator)
    }

    /// One left-associative precedence level.
    fn parse_binary_level(
        &mut self,
        seed: &mut Seed,
        operand: fn(&mut Self, &mut Seed) -> Expression,
        operator: fn(TokenKind) -> Option<Operator>,
    ) -> Expression {
        let mark = self.seed_mark(seed);
        let (mut left, mut height) = self.measured(|p| operand(p, seed));
        let mut overflow = false;
        while let Some(op) = operator(self.peek_kind()) {
            self.consume();
            let (right, right_height) = self.measured(|p| operand(p, &mut None));
            if overflow {
                continue;
            }
            match self.link(height, right_height, 1) {
                Some(h) => {
                    height = h;
                    left = Expression::Binary(Box::new(BinaryExpr {
                        base: self.base(mark, Vec::new()),
                        operator: op,
                        left,
                        right,
                    }));
                }
                None => overflow = true,
            }
        }
        if overflow {
            return self.nesting_error(mark);
        }
        left
    }

    fn parse_unary(&mut self, seed: &mut Seed) -> Expression {
        if seed.is_none() {
            let operator = match self.peek_kind() {
                TokenKind::Add => Some(Operator::Addition),
                TokenKind::Sub => Some(Operator::Subtraction),
                _ => None,
            };
            if let Some(operator) = operator {
                let mark = self.mark();
                self.consume();
                let argument = self.descend(|p| p.parse_unary(&mut None));
                return Expression::Unary(Box::new(UnaryExpr {
                    base: self.base(mark, Vec::new()),
                    operator,
                    argument,
                }));
            }
        }
        self.parse_pipe(seed)
    }

    fn parse_pipe(&mut self, seed: &mut Seed) -> Expression {
        let mark = self.seed_mark(seed);
        let (mut argument, mut height) = self.measured(|p| p.parse_postfix(seed));
        let mut overflow = false;
        while self.peek_kind() == TokenKind::PipeForward {
            self.consume();
            let (destination, destination_height) = self.measured(|p| p.parse_postfix(&mut None));
            if overflow {
                continue;
            }
            // Two levels: the pipe and a call wrapped around a non-call destination.
            let Some(h) = self.link(height, destination_height, 2) else {
                overflow = true;
                continue;
            };
            height = h;
            let call = match destination {
                Expression::Call(call) => *call,
                other => CallExpr {
                    base: BaseNode {
                        location: other.base().location.clone(),
                        errors: vec!["pipe destination must be a function call".to_string()],
                    },
                    callee: other,
                    arguments: Vec::new(),
                },
            };
            argument = Expression::PipeExpr(Box::new(PipeExpr {
                base: self.base(mark, Vec::new()),
                argument,
                call,
            }));
        }
        if overflow {
            return self.nesting_error(mark);
        }
        argument
    }

    fn parse_postfix(&mut self, seed: &mut Seed) -> Expression {
        let mark = self.seed_mark(seed);
        // A seed is the identifier that opened the statement.
        let (mut expr, mut height) = match seed.take() {
            Some((_, expr)) => (expr, 0),
            None => self.measured(Self::parse_primary),
        };
        let mut overflow = false;
        loop {
            // Past the limit, discarded links only span themselves.
            let at = if overflow { self.mark() } else { mark };
            let (next, right) = match self.peek_kind() {
                TokenKind::Dot => self.measured(|p| p.parse_dot_member(at, expr)),
                TokenKind::LBrack => self.measured(|p| p.parse_index(at, expr)),
                TokenKind::LParen => self.measured(|p| Expression::Call(Box::new(p.parse_call(at, expr)))),
                _ => break,
            };
            let linked = if overflow { None } else { self.link(height, right, 1) };
            match linked {
                Some(h) => {
                    height = h;
                    expr = next;
                }
                None => {
                    // Keep consuming the chain without growing the tree.
                    overflow = true;
                    expr = placeholder();
                }
            }
        }
        if overflow {
            return self.nesting_error(mark);
        }
        expr
    }

    fn parse_dot_member(&mut self, mark: Mark, object: Expression) -> Expression {
        self.consume();
        let property = self.parse_identifier();
        Expression::Member(Box::new(MemberExpr {
            base: self.base(mark, Vec::new()),
            object,
            property: PropertyKey::Identifier(property),
        }))
    }

    /// `a[expr]`; a string literal index is member access.
    fn parse_index(&mut self, mark: Mark, array: Expression) -> Expression {
        self.consume();
        let mut errors = Vec::new();
        let index = self.parse_expression();
        self.expect(TokenKind::RBrack, &mut errors);
        match index {
            Expression::StringLit(lit) => Expression::Member(Box::new(MemberExpr {
                base: self.base(mark, errors),
                object: array,
                property: PropertyKey::StringLit(lit),
            })),
            index => Expression::Index(Box::new(IndexExpr {
                base: self.base(mark, errors),
                array,
                index,
            })),
        }
    }

    /// Call arguments are gathered into a single object expression.
    fn parse_call(&mut self, mark: Mark, callee: Expression) -> CallExpr {
        self.consume();
        let mut errors = Vec::new();
        let args_mark = self.mark();
        let properties = self.parse_property_list(TokenKind::RParen, TokenKind::Colon);
        let arguments = if properties.is_empty() {
            Vec::new()
        } else {
            vec![Expression::Object(Box::new(ObjectExpr {
                base: self.base(args_mark, Vec::new()),
                with: None,
                properties,
            }))]
        };
        self.expect(TokenKind::RParen, &mut errors);
        CallExpr {
            base: self.base(mark, errors),
            callee,
            arguments,
        }
    }

    fn parse_primary(&mut self) -> Expression {
        match self.peek_operand().kind {
            TokenKind::Ident => Expression::Identifier(self.parse_identifier()),
            TokenKind::Int => self.parse_int_literal(),
            TokenKind::Float => self.parse_float_literal(),
            TokenKind::String => self.parse_string_expression(),
            TokenKind::Regex => self.parse_regexp_literal(),
            TokenKind::Time => self.parse_date_time_literal(),
            TokenKind::Duration => self.parse_duration_literal(),
            TokenKind::PipeReceive => self.parse_pipe_literal(),
            TokenKind::LBrack => self.parse_array_or_dict(),
            TokenKind::LBrace => self.parse_object_expression(),
            TokenKind::LParen => self.parse_paren_or_function(),
            TokenKind::If => self.parse_conditional(),
            _ => self.parse_bad_expression(),
        }
    }

    fn parse_bad_expression(&mut self) -> Expression {
        let mark = self.mark();
        let (kind, text) = {
            let tok = self.peek();
            (tok.kind, tok.text.clone())
        };
        let closer = matches!(
            kind,
            TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace | TokenKind::Comma | TokenKind::Eof
        );
        if !closer {
            self.consume();
        }
        let location = self.location(mark);
        let message = match kind {
            TokenKind::Illegal => illegal_message(&text),
            TokenKind::Eof => format!("invalid expression @{}: EOF", span(&location)),
            _ => format!("invalid expression @{}: {}", span(&location), text),
        };
        Expression::Bad(Box::new(BadExpr {
            base: BaseNode {
                location,
                errors: vec![message],
            },
            text,
            expression: None,
        }))
    }

    fn parse_conditional(&mut self) -> Expression {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let test = self.parse_expression();
        self.expect(TokenKind::Then, &mut errors);
        let consequent = self.parse_expression();
        self.expect(TokenKind::Else, &mut errors);
        let alternate = self.parse_expression();
        Expression::Conditional(Box::new(ConditionalExpr {
            base: self.base(mark, errors),
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_paren_or_function(&mut self) -> Expression {
        if self.is_function_literal() {
            return self.parse_function_expression();
        }
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let expression = self.parse_expression();
        self.expect(TokenKind::RParen, &mut errors);
        Expression::Paren(Box::new(ParenExpr {
            base: self.base(mark, errors),
            expression,
        }))
    }

    /// Looks past the balanced parenthesis group at the cursor for `=>`.
    fn is_function_literal(&mut self) -> bool {
        let (start, pos) = {
            let tok = self.peek();
            (tok.start, tok.start_pos)
        };
        let mut scanner = self.scanner.clone();
        scanner.reset(start, pos);
        let mut depth = 0usize;
        loop {
            match scanner.scan(false).kind {
                TokenKind::Eof => return false,
                TokenKind::LParen | TokenKind::LBrack | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return scanner.scan(false).kind == TokenKind::Arrow;
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_function_expression(&mut self) -> Expression {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let params = self.parse_property_list(TokenKind::RParen, TokenKind::Assign);
        self.expect(TokenKind::RParen, &mut errors);
        self.expect(TokenKind::Arrow, &mut errors);
        let body = if self.peek_kind() == TokenKind::LBrace {
            FunctionBody::Block(self.parse_block())
        } else {
            FunctionBody::Expr(self.parse_expression())
        };
        Expression::Function(Box::new(FunctionExpr {
            base: self.base(mark, errors),
            params,
            body,
        }))
    }

    fn parse_object_expression(&mut self) -> Expression {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let with = if self.peek_kind() == TokenKind::Ident && self.peek_nth_kind(1) == TokenKind::With {
            let id = self.parse_identifier();
            self.consume();
            Some(id)
        } else {
            None
        };
        let properties = self.parse_property_list(TokenKind::RBrace, TokenKind::Colon);
        self.expect(TokenKind::RBrace, &mut errors);
        Expression::Object(Box::new(ObjectExpr {
            base: self.base(mark, errors),
            with,
            properties,
        }))
    }

    /// `[a, b]`, `[k: v, ...]` or the empty dictionary `[:]`.
    fn parse_array_or_dict(&mut self) -> Expression {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();

        if self.peek_kind() == TokenKind::Colon && self.peek_nth_kind(1) == TokenKind::RBrack {
            self.consume();
            self.consume();
            return Expression::Dict(Box::new(DictExpr {
                base: self.base(mark, errors),
                elements: Vec::new(),
            }));
        }
        if self.peek_kind() == TokenKind::RBrack {
            self.consume();
            return Expression::Array(Box::new(ArrayExpr {
                base: self.base(mark, errors),
                elements: Vec::new(),
            }));
        }

        let first = self.parse_expression();
        if self.peek_kind() == TokenKind::Colon {
            self.consume();
            let val = self.parse_expression();
            let mut elements = vec![DictItem { key: first, val }];
            while self.peek_kind() == TokenKind::Comma {
                self.consume();
                if self.peek_kind() == TokenKind::RBrack {
                    break;
                }
                let key = self.parse_expression();
                self.expect(TokenKind::Colon, &mut errors);
                let val = self.parse_expression();
                elements.push(DictItem { key, val });
            }
            self.expect(TokenKind::RBrack, &mut errors);
            return Expression::Dict(Box::new(DictExpr {
                base: self.base(mark, errors),
                elements,
            }));
        }

        let mut elements = vec![first];
        while self.peek_kind() == TokenKind::Comma {
            self.consume();
            if self.peek_kind() == TokenKind::RBrack {
                break;
            }
            elements.push(self.parse_expression());
        }
        self.expect(TokenKind::RBrack, &mut errors);
        Expression::Array(Box::new(ArrayExpr {
            base: self.base(mark, errors),
            elements,
        }))
    }

    // ========================================================================
    // PROPERTIES
    // ========================================================================

    /// Comma-separated properties up to (not including) `terminator`.
    /// `separator` sits between key and value: `:` in objects, `=` in parameters.
    fn parse_property_list(&mut self, terminator: TokenKind, separator: TokenKind) -> Vec<Property> {
        let mut properties = Vec::new();
        loop {
            let kind = self.peek_kind();
            if kind == terminator || kind == TokenKind::Eof {
                break;
            }
            let mut property = self.parse_property(separator);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.consume();
                }
                k if k == terminator || k == TokenKind::Eof => {}
                _ => {
                    let message = self.unexpected(TokenKind::Comma);
                    property.base.errors.push(message);
                }
            }
            properties.push(property);
        }
        properties
    }

    fn parse_property(&mut self, separator: TokenKind) -> Property {
        let mark = self.mark();
        let mut errors = Vec::new();
        let key = match self.peek_kind() {
            TokenKind::Ident => PropertyKey::Identifier(self.parse_identifier()),
            TokenKind::String => PropertyKey::StringLit(self.parse_string_literal()),
            _ => {
                let tok = self.consume();
                errors.push(format!("unexpected token for property key: {} ({})", tok.kind, tok.text));
                PropertyKey::Identifier(Identifier {
                    base: BaseNode::new(self.location(mark)),
                    name: String::new(),
                })
            }
        };
        let value = if self.peek_kind() == separator {
            self.consume();
            Some(self.parse_expression())
        } else {
            None
        };
        Property {
            base: self.base(mark, errors),
            key,
            value,
        }
    }

    fn parse_identifier(&mut self) -> Identifier {
        let mark = self.mark();
        let mut errors = Vec::new();
        let name = if self.peek_kind() == TokenKind::Ident {
            self.consume().text
        } else {
            errors.push(self.unexpected(TokenKind::Ident));
            String::new()
        };
        Identifier {
            base: self.base(mark, errors),
            name,
        }
    }

    // ========================================================================
    // LITERALS
    // ========================================================================

    fn parse_int_literal(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let value = match tok.text.parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                errors.push(format!("invalid integer literal \"{}\": {}", tok.text, e));
                0
            }
        };
        Expression::Integer(IntegerLit {
            base: self.base(mark, errors),
            value,
        })
    }

    fn parse_float_literal(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let value = match tok.text.parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            Ok(_) => {
                errors.push(format!("invalid float literal \"{}\": value out of range", tok.text));
                0.0
            }
            Err(e) => {
                errors.push(format!("invalid float literal \"{}\": {}", tok.text, e));
                0.0
            }
        };
        Expression::Float(FloatLit {
            base: self.base(mark, errors),
            value,
        })
    }

    fn parse_duration_literal(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let values = parse_duration_values(&tok.text, &mut errors);
        Expression::Duration(DurationLit {
            base: self.base(mark, errors),
            values,
        })
    }

    fn parse_date_time_literal(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let value = parse_date_time(&tok.text).unwrap_or_else(|e| {
            errors.push(e);
            DateTime::<FixedOffset>::default()
        });
        Expression::DateTime(DateTimeLit {
            base: self.base(mark, errors),
            value,
        })
    }

    fn parse_regexp_literal(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let value = tok.text[1..tok.text.len() - 1].replace("\\/", "/");
        if let Err(e) = regex::Regex::new(&value) {
            errors.push(format!("invalid regex literal: {}", e));
        }
        Expression::Regexp(RegexpLit {
            base: self.base(mark, errors),
            value,
        })
    }

    fn parse_pipe_literal(&mut self) -> Expression {
        let mark = self.mark();
        self.consume();
        Expression::PipeLit(PipeLit {
            base: self.base(mark, Vec::new()),
        })
    }

    /// A string where a plain literal is required (import paths, keys, `extends`).
    fn parse_string_literal(&mut self) -> StringLit {
        if self.peek_kind() != TokenKind::String {
            let mark = self.mark();
            let errors = vec![self.unexpected(TokenKind::String)];
            return StringLit {
                base: self.base(mark, errors),
                value: String::new(),
            };
        }
        match self.parse_string_expression() {
            Expression::StringLit(lit) => lit,
            other => StringLit {
                base: BaseNode {
                    location: other.base().location.clone(),
                    errors: vec!["string interpolation is not allowed here".to_string()],
                },
                value: String::new(),
            },
        }
    }

    /// A string token becomes a `StringLiteral`, or a `StringExpression` when
    /// it contains `${...}` interpolations.
    fn parse_string_expression(&mut self) -> Expression {
        let mark = self.mark();
        let tok = self.consume();
        let mut errors = Vec::new();
        let (parts, interpolated) = self.parse_string_parts(&tok, &mut errors);
        let base = self.base(mark, errors);
        if interpolated {
            return Expression::StringExpr(Box::new(StringExpr { base, parts }));
        }
        let value = match parts.into_iter().next() {
            Some(StringExprPart::Text(text)) => text.value,
            _ => String::new(),
        };
        Expression::StringLit(StringLit { base, value })
    }

    fn parse_string_parts(&mut self, tok: &Token, errors: &mut Vec<String>) -> (Vec<StringExprPart>, bool) {
        let src = self.src;
        let end = tok.end - 1;
        let mut cursor = Mark {
            offset: tok.start + 1,
            pos: Position::new(tok.start_pos.line, tok.start_pos.column + 1),
        };
        let mut text_start = cursor;
        let mut bytes: Vec<u8> = Vec::new();
        let mut parts = Vec::new();
        let mut interpolated = false;

        while cursor.offset < end {
            let rest = &src[cursor.offset..end];
            if rest.starts_with("${") {
                if cursor.offset > text_start.offset {
                    parts.push(self.text_part(text_start, cursor, &mut bytes, errors));
                }
                interpolated = true;
                let part_start = cursor;
                cursor.bump(src);
                cursor.bump(src);
                let (part, after) = self.interpolated_part(part_start, cursor, end);
                parts.push(part);
                cursor = after;
                text_start = cursor;
                continue;
            }

            let Some(ch) = cursor.bump(src) else { break };
            if ch != '\\' {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                continue;
            }
            match cursor.bump(src) {
                Some('n') => bytes.push(b'\n'),
                Some('r') => bytes.push(b'\r'),
                Some('t') => bytes.push(b'\t'),
                Some('\\') => bytes.push(b'\\'),
                Some('"') => bytes.push(b'"'),
                Some('$') => bytes.push(b'$'),
                Some('x') => {
                    let hex = src.get(cursor.offset..cursor.offset + 2).filter(|_| cursor.offset + 2 <= end);
                    match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                        Some(byte) => {
                            bytes.push(byte);
                            cursor.bump(src);
                            cursor.bump(src);
                        }
                        None => errors.push("invalid byte escape: expected two hex digits after \\x".to_string()),
                    }
                }
                Some(other) => {
                    errors.push(format!("invalid escape sequence \\{}", other));
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => errors.push("invalid escape sequence at end of string".to_string()),
            }
        }
        if cursor.offset > text_start.offset || !interpolated {
            parts.push(self.text_part(text_start, cursor, &mut bytes, errors));
        }
        (parts, interpolated)
    }

    fn text_part(
        &self,
        start: Mark,
        end: Mark,
        bytes: &mut Vec<u8>,
        errors: &mut Vec<String>,
    ) -> StringExprPart {
        let value = match String::from_utf8(std::mem::take(bytes)) {
            Ok(value) => value,
            Err(e) => {
                errors.push("invalid UTF-8 sequence in string literal".to_string());
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        StringExprPart::Text(TextPart {
            base: BaseNode::new(self.span_location(start, end)),
            value,
        })
    }

    /// Parses the expression between `${` (ending at `body`) and its closing
    /// brace with a parser over just that range. Also returns the position
    /// just after the closing brace.
    fn interpolated_part(&mut self, start: Mark, body: Mark, limit: usize) -> (StringExprPart, Mark) {
        let mut errors = Vec::new();
        let mut scanner = Scanner::with_window(self.src, body.offset, limit, body.pos);
        let closed = scanner.skip_interpolation();
        let (body_end, after) = if closed {
            let after = Mark {
                offset: scanner.offset(),
                pos: scanner.position(),
            };
            // The closing brace is one byte and one column wide.
            let body_end = Mark {
                offset: after.offset - 1,
                pos: Position::new(after.pos.line, after.pos.column.saturating_sub(1)),
            };
            (body_end, after)
        } else {
            errors.push("string interpolation not terminated".to_string());
            let after = Mark {
                offset: scanner.offset(),
                pos: scanner.position(),
            };
            (after, after)
        };

        let mut sub = Parser::with_window(self.src, body.offset, body_end.offset, body.pos, &self.config, self.depth);
        let expression = sub.parse_expression();
        if sub.peek_kind() != TokenKind::Eof {
            errors.push(sub.unexpected(TokenKind::RBrace));
        }
        self.high = self.high.max(sub.high);

        let part = StringExprPart::Interpolated(InterpolatedPart {
            base: BaseNode {
                location: self.span_location(start, after),
                errors,
            },
            expression,
        });
        (part, after)
    }

    // ========================================================================
    // TYPE EXPRESSIONS
    // ========================================================================

    fn parse_type_expression(&mut self) -> TypeExpression {
        let mark = self.mark();
        let monotype = self.parse_monotype();
        let mut constraints = Vec::new();
        if self.peek_kind() == TokenKind::Ident && self.peek().text == "where" {
            self.consume();
            loop {
                constraints.push(self.parse_type_constraint());
                if self.peek_kind() != TokenKind::Comma {
                    break;
                }
                self.consume();
            }
        }
        TypeExpression {
            base: self.base(mark, Vec::new()),
            monotype,
            constraints,
        }
    }

    fn parse_type_constraint(&mut self) -> TypeConstraint {
        let mark = self.mark();
        let mut errors = Vec::new();
        let tvar = self.parse_identifier();
        self.expect(TokenKind::Colon, &mut errors);
        let mut kinds = vec![self.parse_identifier()];
        while self.peek_kind() == TokenKind::Add {
            self.consume();
            kinds.push(self.parse_identifier());
        }
        TypeConstraint {
            base: self.base(mark, errors),
            tvar,
            kinds,
        }
    }

    fn parse_monotype(&mut self) -> MonoType {
        if !self.enter() {
            let mark = self.mark();
            self.skip_nested();
            return self.bad_type(mark, TOO_DEEP.to_string());
        }
        let monotype = match self.peek_kind() {
            TokenKind::Ident => self.parse_named_type(),
            TokenKind::LBrack => self.parse_array_or_dict_type(),
            TokenKind::LBrace => self.parse_record_type(),
            TokenKind::LParen => self.parse_function_type(),
            _ => {
                let mark = self.mark();
                let (kind, text) = {
                    let tok = self.peek();
                    (tok.kind, tok.text.clone())
                };
                if !matches!(
                    kind,
                    TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace | TokenKind::Comma | TokenKind::Eof
                ) {
                    self.consume();
                }
                let shown = if kind == TokenKind::Eof { "EOF".to_string() } else { text };
                let message = format!("invalid type expression @{}: {}", span(&self.location(mark)), shown);
                self.bad_type(mark, message)
            }
        };
        self.leave();
        monotype
    }

    fn bad_type(&self, mark: Mark, message: String) -> MonoType {
        let location = self.location(mark);
        MonoType::Basic(NamedType {
            base: BaseNode {
                location: location.clone(),
                errors: vec![message],
            },
            name: Identifier {
                base: BaseNode::new(location),
                name: String::new(),
            },
        })
    }

    /// A single upper-case letter is a type variable; anything else is named.
    fn parse_named_type(&mut self) -> MonoType {
        let name = self.parse_identifier();
        let base = BaseNode::new(name.base.location.clone());
        let mut chars = name.name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => MonoType::Tvar(TvarType { base, name }),
            _ => MonoType::Basic(NamedType { base, name }),
        }
    }

    fn parse_array_or_dict_type(&mut self) -> MonoType {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let element = self.parse_monotype();
        if self.peek_kind() == TokenKind::Colon {
            self.consume();
            let val = self.parse_monotype();
            self.expect(TokenKind::RBrack, &mut errors);
            return MonoType::Dict(Box::new(DictType {
                base: self.base(mark, errors),
                key: element,
                val,
            }));
        }
        self.expect(TokenKind::RBrack, &mut errors);
        MonoType::Array(Box::new(ArrayType {
            base: self.base(mark, errors),
            element,
        }))
    }

    fn parse_record_type(&mut self) -> MonoType {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let tvar = if self.peek_kind() == TokenKind::Ident && self.peek_nth_kind(1) == TokenKind::With {
            let id = self.parse_identifier();
            self.consume();
            Some(id)
        } else {
            None
        };
        let mut properties = Vec::new();
        loop {
            if matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
                break;
            }
            let before = self.consumed;
            let property_mark = self.mark();
            let mut property_errors = Vec::new();
            let name = self.parse_identifier();
            self.expect(TokenKind::Colon, &mut property_errors);
            let monotype = self.parse_monotype();
            self.list_separator(TokenKind::RBrace, &mut property_errors, before);
            properties.push(PropertyType {
                base: self.base(property_mark, property_errors),
                name,
                monotype,
            });
        }
        self.expect(TokenKind::RBrace, &mut errors);
        MonoType::Record(RecordType {
            base: self.base(mark, errors),
            tvar,
            properties,
        })
    }

    fn parse_function_type(&mut self) -> MonoType {
        let mark = self.mark();
        let mut errors = Vec::new();
        self.consume();
        let mut parameters = Vec::new();
        loop {
            if matches!(self.peek_kind(), TokenKind::RParen | TokenKind::Eof) {
                break;
            }
            parameters.push(self.parse_parameter_type());
        }
        self.expect(TokenKind::RParen, &mut errors);
        self.expect(TokenKind::Arrow, &mut errors);
        let monotype = self.parse_monotype();
        MonoType::Function(Box::new(FunctionType {
            base: self.base(mark, errors),
            parameters,
            monotype,
        }))
    }

    /// `name: T`, `?name: T` or `<-name: T`.
    fn parse_parameter_type(&mut self) -> ParameterType {
        let before = self.consumed;
        let mark = self.mark();
        let mut errors = Vec::new();
        match self.peek_kind() {
            TokenKind::Question => {
                self.consume();
                let name = self.parse_identifier();
                self.expect(TokenKind::Colon, &mut errors);
                let monotype = self.parse_monotype();
                self.list_separator(TokenKind::RParen, &mut errors, before);
                ParameterType::Optional(NamedParam {
                    base: self.base(mark, errors),
                    name,
                    monotype,
                })
            }
            TokenKind::PipeReceive => {
                self.consume();
                let name = if self.peek_kind() == TokenKind::Ident {
                    Some(self.parse_identifier())
                } else {
                    None
                };
                self.expect(TokenKind::Colon, &mut errors);
                let monotype = self.parse_monotype();
                self.list_separator(TokenKind::RParen, &mut errors, before);
                ParameterType::Pipe(PipeParam {
                    base: self.base(mark, errors),
                    name,
                    monotype,
                })
            }
            _ => {
                let name = self.parse_identifier();
                self.expect(TokenKind::Colon, &mut errors);
                let monotype = self.parse_monotype();
                self.list_separator(TokenKind::RParen, &mut errors, before);
                ParameterType::Required(NamedParam {
                    base: self.base(mark, errors),
                    name,
                    monotype,
                })
            }
        }
    }

    /// Consumes the comma after a list item. If the item consumed nothing at
    /// all, the offending token is skipped so the list always advances.
    fn list_separator(&mut self, terminator: TokenKind, errors: &mut Vec<String>, before: usize) {
        let kind = self.peek_kind();
        if kind == TokenKind::Comma {
            self.consume();
        } else if kind != terminator && kind != TokenKind::Eof {
            let message = self.unexpected(TokenKind::Comma);
            errors.push(message);
            if self.consumed == before {
                self.consume();
            }
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn comparison_operator(kind: TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Eq => Some(Operator::Equal),
        TokenKind::Neq => Some(Operator::NotEqual),
        TokenKind::Lt => Some(Operator::LessThan),
        TokenKind::Lte => Some(Operator::LessThanEqual),
        TokenKind::Gt => Some(Operator::GreaterThan),
        TokenKind::Gte => Some(Operator::GreaterThanEqual),
        TokenKind::RegexEq => Some(Operator::RegexpMatch),
        TokenKind::RegexNeq => Some(Operator::NotRegexpMatch),
        _ => None,
    }
}

fn additive_operator(kind: TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Add => Some(Operator::Addition),
        TokenKind::Sub => Some(Operator::Subtraction),
        _ => None,
    }
}

fn multiplicative_operator(kind: TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Mul => Some(Operator::Multiplication),
        TokenKind::Div => Some(Operator::Division),
        TokenKind::Mod => Some(Operator::Modulo),
        _ => None,
    }
}

fn exponent_operator(kind: TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Pow => Some(Operator::Power),
        _ => None,
    }
}

/// `l:c-l:c`, without the file name.
/// A cheap stand-in while the rest of an over-deep chain is consumed.
fn placeholder() -> Expression {
    Expression::Identifier(Identifier {
        base: BaseNode::default(),
        name: String::new(),
    })
}

fn span(location: &SourceLocation) -> String {
    format!(
        "{}:{}-{}:{}",
        location.start.line, location.start.column, location.end.line, location.end.column
    )
}

fn illegal_message(text: &str) -> String {
    if text.starts_with('"') {
        "string literal not terminated".to_string()
    } else if text.starts_with('/') {
        "regex literal not terminated".to_string()
    } else {
        format!("invalid character {:?}", text)
    }
}

/// Splits `1h30m` into its magnitude/unit pairs.
fn parse_duration_values(text: &str, errors: &mut Vec<String>) -> Vec<Duration> {
    let mut values = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let unit_end = rest[digits..]
            .find(|c: char| c.is_ascii_digit())
            .map_or(rest.len(), |i| digits + i);
        let (magnitude, unit) = (&rest[..digits], &rest[digits..unit_end]);
        rest = &rest[unit_end..];

        let magnitude = match magnitude.parse::<i64>() {
            Ok(m) => m,
            Err(e) => {
                errors.push(format!("invalid duration magnitude \"{}\": {}", magnitude, e));
                0
            }
        };
        if !DURATION_UNITS.contains(&unit) {
            errors.push(format!("invalid duration unit \"{}\"", unit));
        }
        values.push(Duration {
            magnitude,
            unit: unit.to_string(),
        });
    }
    values
}

/// RFC 3339, or a bare `YYYY-MM-DD` meaning midnight UTC.
fn parse_date_time(text: &str) -> Result<DateTime<FixedOffset>, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("invalid date time literal \"{}\": {}", text, e);
    if text.contains('T') {
        return DateTime::parse_from_rfc3339(text).map_err(|e| invalid(&e));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| invalid(&e))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| invalid(&"time out of range"))?;
    Ok(Utc.from_utc_datetime(&midnight).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_body(src: &str) -> Vec<Statement> {
        Parser::new(src, &ParserConfig::default()).parse_file().body
    }

    fn parse_expr(src: &str) -> Expression {
        match parse_body(src).into_iter().next() {
            Some(Statement::Expr(stmt)) => stmt.expression,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_assignment() {
        let body = parse_body("a = 1");
        assert_eq!(body.len(), 1);
        let Statement::Variable(assign) = &body[0] else {
            panic!("expected assignment");
        };
        assert_eq!(assign.id.name, "a");
        assert!(matches!(&assign.init, Expression::Integer(lit) if lit.value == 1));
        assert_eq!(assign.base.location.source.as_deref(), Some("a = 1"));
        assert_eq!(assign.base.location.end, Position::new(1, 6));
    }

    #[test]
    fn test_precedence() {
        let Expression::Binary(add) = parse_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(add.operator, Operator::Addition);
        assert!(matches!(&add.right, Expression::Binary(mul) if mul.operator == Operator::Multiplication));

        let Expression::Logical(or) = parse_expr("a and b or c") else {
            panic!("expected logical");
        };
        assert_eq!(or.operator, LogicalOperator::Or);
        assert!(matches!(&or.left, Expression::Logical(and) if and.operator == LogicalOperator::And));
    }

    #[test]
    fn test_ident_statement_continues_expression() {
        let Expression::Binary(bin) = parse_expr("x + 1") else {
            panic!("expected binary");
        };
        assert!(matches!(&bin.left, Expression::Identifier(id) if id.name == "x"));
        assert_eq!(bin.base.location.source.as_deref(), Some("x + 1"));
    }

    #[test]
    fn test_pipe_and_call_arguments() {
        let Expression::PipeExpr(pipe) = parse_expr("from(bucket: \"b\") |> range(start: -1h)") else {
            panic!("expected pipe");
        };
        assert!(matches!(&pipe.argument, Expression::Call(_)));
        assert!(matches!(&pipe.call.callee, Expression::Identifier(id) if id.name == "range"));
        let Expression::Object(args) = &pipe.call.arguments[0] else {
            panic!("expected object arguments");
        };
        assert_eq!(args.properties[0].key.name(), "start");
        assert!(matches!(&args.properties[0].value, Some(Expression::Unary(_))));
    }

    #[test]
    fn test_pipe_into_non_call_is_an_error() {
        let Expression::PipeExpr(pipe) = parse_expr("a |> b") else {
            panic!("expected pipe");
        };
        assert_eq!(pipe.call.base.errors, vec!["pipe destination must be a function call"]);
    }

    #[test]
    fn test_function_literals() {
        let Expression::Function(f) = parse_expr("(r, n=1, tables=<-) => r.x + n") else {
            panic!("expected function");
        };
        assert_eq!(f.params.len(), 3);
        assert!(f.params[0].value.is_none());
        assert!(matches!(&f.params[2].value, Some(Expression::PipeLit(_))));
        assert!(matches!(f.body, FunctionBody::Expr(Expression::Binary(_))));

        let Expression::Function(f) = parse_expr("() => { return 1 }") else {
            panic!("expected function");
        };
        let FunctionBody::Block(block) = &f.body else {
            panic!("expected block body");
        };
        assert!(matches!(block.body[0], Statement::Return(_)));
    }

    #[test]
    fn test_paren_is_not_a_function() {
        assert!(matches!(parse_expr("(1 + 2) * 3"), Expression::Binary(_)));
    }

    #[test]
    fn test_member_and_index() {
        let Expression::Member(m) = parse_expr("r[\"_value\"]") else {
            panic!("expected member");
        };
        assert_eq!(m.property.name(), "_value");
        assert!(matches!(parse_expr("a[0]"), Expression::Index(_)));
        let Expression::Member(m) = parse_expr("r.host") else {
            panic!("expected member");
        };
        assert_eq!(m.property.name(), "host");
    }

    #[test]
    fn test_collections() {
        assert!(matches!(parse_expr("[1, 2, 3]"), Expression::Array(a) if a.elements.len() == 3));
        assert!(matches!(parse_expr("[:]"), Expression::Dict(d) if d.elements.is_empty()));
        assert!(matches!(parse_expr("[\"a\": 1, \"b\": 2]"), Expression::Dict(d) if d.elements.len() == 2));
        let Expression::Object(o) = parse_expr("{r with x: 1, y}") else {
            panic!("expected object");
        };
        assert_eq!(o.with.as_ref().map(|w| w.name.as_str()), Some("r"));
        assert_eq!(o.properties.len(), 2);
        assert!(o.properties[1].value.is_none());
    }

    #[test]
    fn test_regex_versus_division() {
        let Expression::Binary(div) = parse_expr("a / b") else {
            panic!("expected division");
        };
        assert_eq!(div.operator, Operator::Division);

        let Expression::Binary(m) = parse_expr("r =~ /^a\\/b$/") else {
            panic!("expected match");
        };
        assert_eq!(m.operator, Operator::RegexpMatch);
        assert!(matches!(&m.right, Expression::Regexp(re) if re.value == "^a/b$"));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(parse_expr("1.5"), Expression::Float(f) if f.value == 1.5));
        let Expression::Duration(d) = parse_expr("1h30m") else {
            panic!("expected duration");
        };
        assert_eq!(
            d.values,
            vec![
                Duration { magnitude: 1, unit: "h".into() },
                Duration { magnitude: 30, unit: "m".into() },
            ]
        );
        let Expression::DateTime(t) = parse_expr("2019-01-01") else {
            panic!("expected datetime");
        };
        assert_eq!(t.value.to_rfc3339(), "2019-01-01T00:00:00+00:00");
        assert!(matches!(parse_expr("2019-01-01T10:00:00+07:00"), Expression::DateTime(_)));
    }

    #[test]
    fn test_literal_errors() {
        let Expression::Integer(i) = parse_expr("99999999999999999999") else {
            panic!("expected integer");
        };
        assert!(i.base.errors[0].starts_with("invalid integer literal"));
        let Expression::Duration(d) = parse_expr("1x") else {
            panic!("expected duration");
        };
        assert_eq!(d.base.errors, vec!["invalid duration unit \"x\""]);
        let Expression::Binary(m) = parse_expr("x =~ /(/") else {
            panic!("expected match");
        };
        let Expression::Regexp(re) = &m.right else {
            panic!("expected regex");
        };
        assert!(re.base.errors[0].starts_with("invalid regex literal"));
    }

    #[test]
    fn test_string_escapes_and_interpolation() {
        let Expression::StringLit(s) = parse_expr(r#""a\tb\"c\x41""#) else {
            panic!("expected string literal");
        };
        assert_eq!(s.value, "a\tb\"cA");

        let Expression::StringExpr(s) = parse_expr(r#""n = ${r.n + 1}!""#) else {
            panic!("expected string expression");
        };
        assert_eq!(s.parts.len(), 3);
        let StringExprPart::Interpolated(part) = &s.parts[1] else {
            panic!("expected interpolation");
        };
        assert!(matches!(&part.expression, Expression::Binary(_)));
        assert_eq!(part.expression.base().location.start, Position::new(1, 8));
        assert_eq!(part.expression.base().location.source.as_deref(), Some("r.n + 1"));
    }

    #[test]
    fn test_statements() {
        let body = parse_body(
            "option now = () => 2019-01-01\noption task.every = 1h\nbuiltin f : (x: A, ?y: int, <-tables: [A]) => [A] where A: Record\ntestcase t extends \"pkg\" { a = 1 }\n",
        );
        assert_eq!(body.len(), 4);
        let Statement::Option(opt) = &body[1] else {
            panic!("expected option");
        };
        assert!(matches!(&opt.assignment, Assignment::Member(_)));
        let Statement::Builtin(b) = &body[2] else {
            panic!("expected builtin");
        };
        assert!(b.base.errors.is_empty());
        let MonoType::Function(f) = &b.ty.monotype else {
            panic!("expected function type");
        };
        assert_eq!(f.parameters.len(), 3);
        assert!(matches!(f.parameters[1], ParameterType::Optional(_)));
        assert!(matches!(f.parameters[2], ParameterType::Pipe(_)));
        assert_eq!(b.ty.constraints[0].kinds[0].name, "Record");
        let Statement::TestCase(tc) = &body[3] else {
            panic!("expected testcase");
        };
        assert_eq!(tc.extends.as_ref().map(|e| e.value.as_str()), Some("pkg"));
        assert_eq!(tc.block.body.len(), 1);
    }

    #[test]
    fn test_package_and_imports() {
        let file = Parser::new("package foo\nimport \"array\"\nimport s \"strings\"\n", &ParserConfig::default()).parse_file();
        assert_eq!(file.package.map(|p| p.name.name), Some("foo".to_string()));
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.imports[1].alias.as_ref().map(|a| a.name.as_str()), Some("s"));
        assert_eq!(file.imports[1].path.value, "strings");
        assert_eq!(file.metadata, FILE_METADATA);
    }

    #[test]
    fn test_recovery_always_progresses() {
        let body = parse_body(") ] } , = => @");
        assert!(!body.is_empty());
        for stmt in &body {
            assert!(!stmt.base().errors.is_empty() || matches!(stmt, Statement::Expr(_)));
        }
    }

    #[test]
    fn test_bad_statement_message() {
        let body = parse_body("}");
        let Statement::Bad(bad) = &body[0] else {
            panic!("expected bad statement");
        };
        assert_eq!(bad.base.errors, vec!["invalid statement @1:1-1:2: }"]);
    }

    #[test]
    fn test_unclosed_brace() {
        let Expression::Object(o) = parse_expr("{") else {
            panic!("expected object");
        };
        assert_eq!(o.base.errors, vec!["expected RBRACE, got EOF"]);
    }

    #[test]
    fn test_nesting_limit() {
        let config = ParserConfig::default().with_max_nesting(8);
        let src = format!("x = {}1{}", "(".repeat(20), ")".repeat(20));
        let file = Parser::new(&src, &config).parse_file();
        assert_eq!(file.body.len(), 1);
        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains(TOO_DEEP));
    }
}
