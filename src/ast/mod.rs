//! AST module for the Flux language
//!
//! This module provides the Abstract Syntax Tree types produced by the parser
//! and consumed by the codecs. Every node carries a [`BaseNode`] with its source
//! location and any syntax errors recorded while building it, so a package can
//! be returned even when the source is malformed.
//!
//! The serde derives define the JSON wire format: each node is an object tagged
//! with a `"type"` field, base fields are flattened into the node, and integer
//! literal values travel as decimal strings.

// ============================================================================
// IMPORTS
// ============================================================================

use chrono::{DateTime, FixedOffset};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{FluxError, ParseDiagnostic};

pub mod check;
pub mod walk;

pub use walk::{walk, Node, Visitor};

// ============================================================================
// LOCATIONS
// ============================================================================

/// A 1-based line/column position. Columns count characters, not bytes.
///
/// # Examples
///
/// ```rust
/// use flux_syntax::ast::Position;
/// let pos = Position::new(1, 5);
/// assert_eq!(pos.line, 1);
/// assert_eq!(pos.column, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

/// The region of source text a node was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub start: Position,
    pub end: Position,
    /// The exact source text covered by the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SourceLocation {
    /// Returns true when the location has no usable extent.
    pub fn is_empty(&self) -> bool {
        self.start == self.end && self.source.as_deref().map_or(true, str::is_empty)
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}@", file)?;
        }
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

/// Fields shared by every node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseNode {
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BaseNode {
    pub fn new(location: SourceLocation) -> Self {
        Self {
            location,
            errors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.location.is_empty()
    }
}

// ============================================================================
// PACKAGES AND FILES
// ============================================================================

/// The root of a parsed program: one or more files sharing a package name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Package")]
pub struct Package {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(default)]
    pub path: String,
    pub package: String,
    pub files: Vec<File>,
}

impl Package {
    /// Creates an empty package with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseNode::default(),
            path: String::new(),
            package: name.into(),
            files: Vec::new(),
        }
    }

    /// Appends the files of `other` to this package.
    ///
    /// Both packages must declare the same package name; `other` is consumed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flux_syntax::parse;
    /// let mut a = parse("x = 1");
    /// let b = parse("y = 2");
    /// a.merge(b).unwrap();
    /// assert_eq!(a.files.len(), 2);
    /// ```
    pub fn merge(&mut self, other: Package) -> Result<(), FluxError> {
        if self.package != other.package {
            return Err(FluxError::invalid_argument(format!(
                "cannot merge package \"{}\" into package \"{}\"",
                other.package, self.package
            )));
        }
        self.files.extend(other.files);
        Ok(())
    }

    /// Returns every error embedded in the package, in source order.
    pub fn errors(&self) -> Vec<ParseDiagnostic> {
        check::check(self)
    }

    /// Returns true if any node in the package carries a syntax error.
    pub fn has_errors(&self) -> bool {
        check::has_errors(self)
    }

    /// Counts every node reachable from the package, the package included.
    pub fn node_count(&self) -> usize {
        struct Counter(usize);
        impl<'a> Visitor<'a> for Counter {
            fn visit(&mut self, _node: Node<'a>) -> bool {
                self.0 += 1;
                true
            }
        }
        let mut counter = Counter(0);
        walk(&mut counter, Node::Package(self));
        counter.0
    }
}

/// A single source file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "File")]
pub struct File {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub package: Option<PackageClause>,
    #[serde(default)]
    pub imports: Vec<ImportDeclaration>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "PackageClause")]
pub struct PackageClause {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ImportDeclaration")]
pub struct ImportDeclaration {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(rename = "as", default)]
    pub alias: Option<Identifier>,
    pub path: StringLit,
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    #[serde(rename = "ExpressionStatement")]
    Expr(Box<ExprStmt>),
    #[serde(rename = "VariableAssignment")]
    Variable(Box<VariableAssgn>),
    #[serde(rename = "OptionStatement")]
    Option(Box<OptionStmt>),
    #[serde(rename = "ReturnStatement")]
    Return(Box<ReturnStmt>),
    #[serde(rename = "BadStatement")]
    Bad(Box<BadStmt>),
    #[serde(rename = "TestCaseStatement")]
    TestCase(Box<TestCaseStmt>),
    #[serde(rename = "BuiltinStatement")]
    Builtin(Box<BuiltinStmt>),
}

impl Statement {
    pub fn base(&self) -> &BaseNode {
        match self {
            Statement::Expr(s) => &s.base,
            Statement::Variable(s) => &s.base,
            Statement::Option(s) => &s.base,
            Statement::Return(s) => &s.base,
            Statement::Bad(s) => &s.base,
            Statement::TestCase(s) => &s.base,
            Statement::Builtin(s) => &s.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableAssgn {
    #[serde(flatten)]
    pub base: BaseNode,
    pub id: Identifier,
    pub init: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAssgn {
    #[serde(flatten)]
    pub base: BaseNode,
    pub member: MemberExpr,
    pub init: Expression,
}

/// The target of an `option` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Assignment {
    #[serde(rename = "VariableAssignment")]
    Variable(Box<VariableAssgn>),
    #[serde(rename = "MemberAssignment")]
    Member(Box<MemberAssgn>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub argument: Expression,
}

/// A statement the parser could not make sense of, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub id: Identifier,
    #[serde(default)]
    pub extends: Option<StringLit>,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltinStmt {
    #[serde(flatten)]
    pub base: BaseNode,
    pub id: Identifier,
    pub ty: TypeExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    pub base: BaseNode,
    pub body: Vec<Statement>,
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    #[serde(rename = "Identifier")]
    Identifier(Identifier),
    #[serde(rename = "ArrayExpression")]
    Array(Box<ArrayExpr>),
    #[serde(rename = "DictExpression")]
    Dict(Box<DictExpr>),
    #[serde(rename = "FunctionExpression")]
    Function(Box<FunctionExpr>),
    #[serde(rename = "LogicalExpression")]
    Logical(Box<LogicalExpr>),
    #[serde(rename = "ObjectExpression")]
    Object(Box<ObjectExpr>),
    #[serde(rename = "MemberExpression")]
    Member(Box<MemberExpr>),
    #[serde(rename = "IndexExpression")]
    Index(Box<IndexExpr>),
    #[serde(rename = "BinaryExpression")]
    Binary(Box<BinaryExpr>),
    #[serde(rename = "UnaryExpression")]
    Unary(Box<UnaryExpr>),
    #[serde(rename = "PipeExpression")]
    PipeExpr(Box<PipeExpr>),
    #[serde(rename = "CallExpression")]
    Call(Box<CallExpr>),
    #[serde(rename = "ConditionalExpression")]
    Conditional(Box<ConditionalExpr>),
    #[serde(rename = "StringExpression")]
    StringExpr(Box<StringExpr>),
    #[serde(rename = "ParenExpression")]
    Paren(Box<ParenExpr>),

    #[serde(rename = "IntegerLiteral")]
    Integer(IntegerLit),
    #[serde(rename = "UnsignedIntegerLiteral")]
    Uint(UintLit),
    #[serde(rename = "FloatLiteral")]
    Float(FloatLit),
    #[serde(rename = "StringLiteral")]
    StringLit(StringLit),
    #[serde(rename = "DurationLiteral")]
    Duration(DurationLit),
    #[serde(rename = "DateTimeLiteral")]
    DateTime(DateTimeLit),
    #[serde(rename = "RegexpLiteral")]
    Regexp(RegexpLit),
    #[serde(rename = "PipeLiteral")]
    PipeLit(PipeLit),

    #[serde(rename = "BadExpression")]
    Bad(Box<BadExpr>),
}

impl Expression {
    pub fn base(&self) -> &BaseNode {
        match self {
            Expression::Identifier(e) => &e.base,
            Expression::Array(e) => &e.base,
            Expression::Dict(e) => &e.base,
            Expression::Function(e) => &e.base,
            Expression::Logical(e) => &e.base,
            Expression::Object(e) => &e.base,
            Expression::Member(e) => &e.base,
            Expression::Index(e) => &e.base,
            Expression::Binary(e) => &e.base,
            Expression::Unary(e) => &e.base,
            Expression::PipeExpr(e) => &e.base,
            Expression::Call(e) => &e.base,
            Expression::Conditional(e) => &e.base,
            Expression::StringExpr(e) => &e.base,
            Expression::Paren(e) => &e.base,
            Expression::Integer(e) => &e.base,
            Expression::Uint(e) => &e.base,
            Expression::Float(e) => &e.base,
            Expression::StringLit(e) => &e.base,
            Expression::Duration(e) => &e.base,
            Expression::DateTime(e) => &e.base,
            Expression::Regexp(e) => &e.base,
            Expression::PipeLit(e) => &e.base,
            Expression::Bad(e) => &e.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseNode {
        match self {
            Expression::Identifier(e) => &mut e.base,
            Expression::Array(e) => &mut e.base,
            Expression::Dict(e) => &mut e.base,
            Expression::Function(e) => &mut e.base,
            Expression::Logical(e) => &mut e.base,
            Expression::Object(e) => &mut e.base,
            Expression::Member(e) => &mut e.base,
            Expression::Index(e) => &mut e.base,
            Expression::Binary(e) => &mut e.base,
            Expression::Unary(e) => &mut e.base,
            Expression::PipeExpr(e) => &mut e.base,
            Expression::Call(e) => &mut e.base,
            Expression::Conditional(e) => &mut e.base,
            Expression::StringExpr(e) => &mut e.base,
            Expression::Paren(e) => &mut e.base,
            Expression::Integer(e) => &mut e.base,
            Expression::Uint(e) => &mut e.base,
            Expression::Float(e) => &mut e.base,
            Expression::StringLit(e) => &mut e.base,
            Expression::Duration(e) => &mut e.base,
            Expression::DateTime(e) => &mut e.base,
            Expression::Regexp(e) => &mut e.base,
            Expression::PipeLit(e) => &mut e.base,
            Expression::Bad(e) => &mut e.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictItem {
    pub key: Expression,
    pub val: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub elements: Vec<DictItem>,
}

/// Either a block of statements or a single expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    Expr(Expression),
}

impl Serialize for FunctionBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct TaggedBlock<'a> {
            r#type: &'static str,
            #[serde(flatten)]
            block: &'a Block,
        }

        match self {
            FunctionBody::Block(block) => TaggedBlock {
                r#type: "Block",
                block,
            }
            .serialize(serializer),
            FunctionBody::Expr(expr) => expr.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FunctionBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_block = value.get("type").and_then(serde_json::Value::as_str) == Some("Block");
        let body = if is_block {
            Block::deserialize(value).map(FunctionBody::Block)
        } else {
            Expression::deserialize(value).map(FunctionBody::Expr)
        };
        body.map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub params: Vec<Property>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub operator: LogicalOperator,
    pub left: Expression,
    pub right: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(default)]
    pub with: Option<Identifier>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub object: Expression,
    pub property: PropertyKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub array: Expression,
    pub index: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub operator: Operator,
    pub left: Expression,
    pub right: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub operator: Operator,
    pub argument: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub argument: Expression,
    pub call: CallExpr,
}

/// A function call. Named arguments are carried as a single object expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub callee: Expression,
    #[serde(default)]
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub test: Expression,
    pub consequent: Expression,
    pub alternate: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub parts: Vec<StringExprPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StringExprPart {
    #[serde(rename = "TextPart")]
    Text(TextPart),
    #[serde(rename = "InterpolatedPart")]
    Interpolated(InterpolatedPart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(flatten)]
    pub base: BaseNode,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedPart {
    #[serde(flatten)]
    pub base: BaseNode,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParenExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadExpr {
    #[serde(flatten)]
    pub base: BaseNode,
    pub text: String,
    #[serde(default)]
    pub expression: Option<Expression>,
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PropertyKey {
    #[serde(rename = "Identifier")]
    Identifier(Identifier),
    #[serde(rename = "StringLiteral")]
    StringLit(StringLit),
}

impl PropertyKey {
    pub fn base(&self) -> &BaseNode {
        match self {
            PropertyKey::Identifier(id) => &id.base,
            PropertyKey::StringLit(lit) => &lit.base,
        }
    }

    /// The key as written, without quoting.
    pub fn name(&self) -> &str {
        match self {
            PropertyKey::Identifier(id) => &id.name,
            PropertyKey::StringLit(lit) => &lit.value,
        }
    }
}

/// A `key: value` pair; the value is absent for shorthand properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(flatten)]
    pub base: BaseNode,
    pub key: PropertyKey,
    #[serde(default)]
    pub value: Option<Expression>,
}

// ============================================================================
// LITERALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerLit {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(with = "as_string")]
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UintLit {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(with = "as_string")]
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatLit {
    #[serde(flatten)]
    pub base: BaseNode,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringLit {
    #[serde(flatten)]
    pub base: BaseNode,
    pub value: String,
}

/// One `magnitude unit` pair of a duration literal, e.g. `1h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub magnitude: i64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationLit {
    #[serde(flatten)]
    pub base: BaseNode,
    pub values: Vec<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeLit {
    #[serde(flatten)]
    pub base: BaseNode,
    pub value: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexpLit {
    #[serde(flatten)]
    pub base: BaseNode,
    pub value: String,
}

/// The `<-` placeholder for a piped-in parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeLit {
    #[serde(flatten)]
    pub base: BaseNode,
}

// ============================================================================
// OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "*")]
    Multiplication,
    #[serde(rename = "/")]
    Division,
    #[serde(rename = "%")]
    Modulo,
    #[serde(rename = "^")]
    Power,
    #[serde(rename = "+")]
    Addition,
    #[serde(rename = "-")]
    Subtraction,
    #[serde(rename = "<=")]
    LessThanEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterThanEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "startswith")]
    StartsWith,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not")]
    Not,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not empty")]
    NotEmpty,
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "=~")]
    RegexpMatch,
    #[serde(rename = "!~")]
    NotRegexpMatch,
}

impl Operator {
    /// The source spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Multiplication => "*",
            Operator::Division => "/",
            Operator::Modulo => "%",
            Operator::Power => "^",
            Operator::Addition => "+",
            Operator::Subtraction => "-",
            Operator::LessThanEqual => "<=",
            Operator::LessThan => "<",
            Operator::GreaterThanEqual => ">=",
            Operator::GreaterThan => ">",
            Operator::StartsWith => "startswith",
            Operator::In => "in",
            Operator::Not => "not",
            Operator::Exists => "exists",
            Operator::NotEmpty => "not empty",
            Operator::Empty => "empty",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::RegexpMatch => "=~",
            Operator::NotRegexpMatch => "!~",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "and",
            LogicalOperator::Or => "or",
        }
    }
}

// ============================================================================
// TYPE EXPRESSIONS
// ============================================================================

/// The declared type of a `builtin` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeExpression {
    #[serde(flatten)]
    pub base: BaseNode,
    pub monotype: MonoType,
    #[serde(default)]
    pub constraints: Vec<TypeConstraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonoType {
    #[serde(rename = "TvarMonoType")]
    Tvar(TvarType),
    #[serde(rename = "NamedType")]
    Basic(NamedType),
    #[serde(rename = "ArrayMonoType")]
    Array(Box<ArrayType>),
    #[serde(rename = "DictMonoType")]
    Dict(Box<DictType>),
    #[serde(rename = "RecordMonoType")]
    Record(RecordType),
    #[serde(rename = "FunctionMonoType")]
    Function(Box<FunctionType>),
}

impl MonoType {
    pub fn base(&self) -> &BaseNode {
        match self {
            MonoType::Tvar(t) => &t.base,
            MonoType::Basic(t) => &t.base,
            MonoType::Array(t) => &t.base,
            MonoType::Dict(t) => &t.base,
            MonoType::Record(t) => &t.base,
            MonoType::Function(t) => &t.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvarType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub element: MonoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub key: MonoType,
    pub val: MonoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(default)]
    pub tvar: Option<Identifier>,
    pub properties: Vec<PropertyType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: Identifier,
    pub monotype: MonoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionType {
    #[serde(flatten)]
    pub base: BaseNode,
    pub parameters: Vec<ParameterType>,
    pub monotype: MonoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterType {
    Required(NamedParam),
    Optional(NamedParam),
    Pipe(PipeParam),
}

impl ParameterType {
    pub fn base(&self) -> &BaseNode {
        match self {
            ParameterType::Required(p) | ParameterType::Optional(p) => &p.base,
            ParameterType::Pipe(p) => &p.base,
        }
    }

    pub fn monotype(&self) -> &MonoType {
        match self {
            ParameterType::Required(p) | ParameterType::Optional(p) => &p.monotype,
            ParameterType::Pipe(p) => &p.monotype,
        }
    }
}

/// `name: T` or, when optional, `?name: T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParam {
    #[serde(flatten)]
    pub base: BaseNode,
    pub name: Identifier,
    pub monotype: MonoType,
}

/// `<-name: T`; the name may be omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeParam {
    #[serde(flatten)]
    pub base: BaseNode,
    #[serde(default)]
    pub name: Option<Identifier>,
    pub monotype: MonoType,
}

/// `where A: Addable + Comparable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConstraint {
    #[serde(flatten)]
    pub base: BaseNode,
    pub tvar: Identifier,
    pub kinds: Vec<Identifier>,
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Encodes integers as decimal strings so 64-bit values survive JSON readers
/// that only have doubles.
mod as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse::<T>()
            .map_err(|e| de::Error::custom(format!("invalid integer literal \"{}\": {}", text, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Identifier {
        Identifier {
            base: BaseNode::default(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_merge_rejects_different_package_names() {
        let mut main = Package::new("main");
        let other = Package::new("other");
        let err = main.merge(other).unwrap_err();
        assert!(err.to_string().contains("cannot merge package"));
    }

    #[test]
    fn test_property_key_name() {
        let key = PropertyKey::Identifier(ident("host"));
        assert_eq!(key.name(), "host");
        let key = PropertyKey::StringLit(StringLit {
            base: BaseNode::default(),
            value: "_measurement".into(),
        });
        assert_eq!(key.name(), "_measurement");
    }

    #[test]
    fn test_integer_literal_serializes_as_string() {
        let lit = Expression::Integer(IntegerLit {
            base: BaseNode::default(),
            value: 42,
        });
        let json = serde_json::to_value(&lit).unwrap();
        assert_eq!(json["type"], "IntegerLiteral");
        assert_eq!(json["value"], "42");
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_function_body_block_is_tagged() {
        let body = FunctionBody::Block(Block {
            base: BaseNode::default(),
            body: vec![],
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "Block");
        let back: FunctionBody = serde_json::from_value(json).unwrap();
        assert_eq!(back, body);
    }

    #[test]
    fn test_location_display() {
        let loc = SourceLocation {
            file: None,
            start: Position::new(1, 1),
            end: Position::new(1, 6),
            source: Some("a = 1".into()),
        };
        assert_eq!(loc.to_string(), "1:1-1:6");
    }
}
