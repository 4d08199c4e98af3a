//! Compact binary encoding of the AST.
//!
//! # Format Overview
//!
//! 1. Magic number (4 bytes): `FLXB`
//! 2. Version (1 byte): currently `1`
//! 3. Payload: the package, field by field in declaration order
//!
//! Within the payload:
//! - unsigned integers and lengths are LEB128 varints
//! - signed integers are zigzag varints
//! - floats are little-endian IEEE-754 doubles
//! - strings are a length followed by UTF-8 bytes
//! - each enum value starts with a one-byte variant tag
//! - an `Option` starts with a presence byte (`0` or `1`)
//! - date-times are RFC 3339 strings
//!
//! Decoding checks everything: truncation, bad tags, bad UTF-8, lengths that
//! claim more than the remaining input, nesting beyond [`MAX_DEPTH`], and
//! trailing bytes. Errors carry the byte offset where decoding stopped.

use chrono::{DateTime, FixedOffset};
use log::debug;

use super::{check_encodable, MAX_DEPTH};
use crate::ast::*;
use crate::diagnostics::FluxError;

pub const MAGIC: &[u8; 4] = b"FLXB";
pub const VERSION: u8 = 1;

// ============================================================================
// PUBLIC API
// ============================================================================

pub fn encode(pkg: &Package) -> Result<Vec<u8>, FluxError> {
    check_encodable(pkg)?;
    let mut w = BinWriter::new();
    w.bytes(MAGIC);
    w.u8(VERSION);
    pkg.encode(&mut w);
    let bytes = w.finish();
    debug!("encoded package {} as {} binary bytes", pkg.package, bytes.len());
    Ok(bytes)
}

/// Decodes a package. Nothing partial is ever returned.
pub fn decode(bytes: &[u8]) -> Result<Package, FluxError> {
    let mut r = BinReader::new(bytes);
    let magic = r.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(r.error_at(0, "not a binary Flux AST: bad magic number"));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(r.error_at(MAGIC.len(), format!("unsupported binary AST version {}", version)));
    }
    let pkg = Package::decode(&mut r)?;
    r.finish()?;
    debug!("decoded package {} from {} binary bytes", pkg.package, bytes.len());
    Ok(pkg)
}

// ============================================================================
// WRITER AND READER
// ============================================================================

/// Output buffer for the binary encoding.
#[derive(Debug, Default)]
pub struct BinWriter {
    buf: Vec<u8>,
}

impl BinWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn zigzag(&mut self, v: i64) {
        self.varint(((v << 1) ^ (v >> 63)) as u64);
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn str(&mut self, v: &str) {
        self.varint(v.len() as u64);
        self.bytes(v.as_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Most elements a decoded list reserves room for before reading them.
const PREALLOC_LIMIT: usize = 4096;

/// Cursor over binary input with nesting accounting.
#[derive(Debug)]
pub struct BinReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> BinReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    fn error_at(&self, offset: usize, message: impl std::fmt::Display) -> FluxError {
        FluxError::deserialization(format!("{} at byte {}", message, offset))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FluxError> {
        if n > self.remaining() {
            return Err(self.error_at(self.pos, "unexpected end of input"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, FluxError> {
        Ok(self.take(1)?[0])
    }

    pub fn varint(&mut self) -> Result<u64, FluxError> {
        let start = self.pos;
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            let bits = u64::from(byte & 0x7f);
            if shift == 63 && bits > 1 {
                break;
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.error_at(start, "varint overflows 64 bits"))
    }

    pub fn zigzag(&mut self) -> Result<i64, FluxError> {
        let v = self.varint()?;
        Ok((v >> 1) as i64 ^ -((v & 1) as i64))
    }

    pub fn f64(&mut self) -> Result<f64, FluxError> {
        let mut le = [0u8; 8];
        le.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(le))
    }

    /// A length or element count, which can never exceed the bytes left.
    pub fn length(&mut self) -> Result<usize, FluxError> {
        let start = self.pos;
        let n = self.varint()?;
        if n > self.remaining() as u64 {
            return Err(self.error_at(
                start,
                format!("length {} exceeds the {} remaining bytes", n, self.remaining()),
            ));
        }
        Ok(n as usize)
    }

    pub fn str(&mut self) -> Result<String, FluxError> {
        let n = self.length()?;
        let start = self.pos;
        let raw = self.take(n)?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|e| self.error_at(start, format!("invalid UTF-8 in string: {}", e)))
    }

    /// Reads a variant tag, returning it with its offset for error reporting.
    fn tag(&mut self) -> Result<(u8, usize), FluxError> {
        let at = self.pos;
        Ok((self.u8()?, at))
    }

    fn enter(&mut self) -> Result<(), FluxError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error_at(
                self.pos,
                format!("AST nesting exceeds maximum depth of {}", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn finish(&self) -> Result<(), FluxError> {
        if self.remaining() > 0 {
            return Err(self.error_at(
                self.pos,
                format!("{} trailing bytes after package", self.remaining()),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Types with a binary encoding.
pub trait Encode {
    fn encode(&self, w: &mut BinWriter);
}

/// Types that can be read back from their binary encoding.
pub trait Decode: Sized {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError>;
}

impl Encode for u32 {
    fn encode(&self, w: &mut BinWriter) {
        w.varint(u64::from(*self));
    }
}

impl Decode for u32 {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        let at = r.pos;
        let v = r.varint()?;
        u32::try_from(v).map_err(|_| r.error_at(at, format!("value {} out of range for u32", v)))
    }
}

impl Encode for u64 {
    fn encode(&self, w: &mut BinWriter) {
        w.varint(*self);
    }
}

impl Decode for u64 {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        r.varint()
    }
}

impl Encode for i64 {
    fn encode(&self, w: &mut BinWriter) {
        w.zigzag(*self);
    }
}

impl Decode for i64 {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        r.zigzag()
    }
}

impl Encode for f64 {
    fn encode(&self, w: &mut BinWriter) {
        w.f64(*self);
    }
}

impl Decode for f64 {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        let at = r.pos;
        let v = r.f64()?;
        if !v.is_finite() {
            return Err(r.error_at(at, format!("float literal is not finite: {}", v)));
        }
        Ok(v)
    }
}

impl Encode for String {
    fn encode(&self, w: &mut BinWriter) {
        w.str(self);
    }
}

impl Decode for String {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        r.str()
    }
}

impl Encode for DateTime<FixedOffset> {
    fn encode(&self, w: &mut BinWriter) {
        w.str(&self.to_rfc3339());
    }
}

impl Decode for DateTime<FixedOffset> {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        let at = r.pos;
        let text = r.str()?;
        DateTime::parse_from_rfc3339(&text)
            .map_err(|e| r.error_at(at, format!("invalid date time \"{}\": {}", text, e)))
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, w: &mut BinWriter) {
        match self {
            None => w.u8(0),
            Some(v) => {
                w.u8(1);
                v.encode(w);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        match r.tag()? {
            (0, _) => Ok(None),
            (1, _) => Ok(Some(T::decode(r)?)),
            (tag, at) => Err(r.error_at(at, format!("invalid option marker {}", tag))),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut BinWriter) {
        w.varint(self.len() as u64);
        for item in self {
            item.encode(w);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        let n = r.length()?;
        // `n` is only bounded by the input size, not by `n * size_of::<T>()`.
        let mut items = Vec::with_capacity(n.min(PREALLOC_LIMIT));
        for _ in 0..n {
            items.push(T::decode(r)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for Box<T> {
    fn encode(&self, w: &mut BinWriter) {
        (**self).encode(w);
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
        T::decode(r).map(Box::new)
    }
}

// ============================================================================
// AST IMPLEMENTATIONS
// ============================================================================

/// Plain records: fields in order, no nesting accounting.
macro_rules! record {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl Encode for $ty {
            fn encode(&self, w: &mut BinWriter) {
                $(self.$field.encode(w);)*
            }
        }

        impl Decode for $ty {
            fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
                Ok($ty { $($field: Decode::decode(r)?,)* })
            }
        }
    };
}

/// AST nodes: like records, but each one counts towards the depth limit.
macro_rules! node {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl Encode for $ty {
            fn encode(&self, w: &mut BinWriter) {
                $(self.$field.encode(w);)*
            }
        }

        impl Decode for $ty {
            fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
                r.enter()?;
                let node = $ty { $($field: Decode::decode(r)?,)* };
                r.leave();
                Ok(node)
            }
        }
    };
}

/// Enums whose variants each wrap one value.
macro_rules! tagged {
    ($ty:ident { $($tag:literal => $variant:ident),* $(,)? }) => {
        impl Encode for $ty {
            fn encode(&self, w: &mut BinWriter) {
                match self {
                    $($ty::$variant(inner) => {
                        w.u8($tag);
                        inner.encode(w);
                    })*
                }
            }
        }

        impl Decode for $ty {
            fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
                match r.tag()? {
                    $(($tag, _) => Ok($ty::$variant(Decode::decode(r)?)),)*
                    (tag, at) => Err(r.error_at(at, format!("unknown {} tag {}", stringify!($ty), tag))),
                }
            }
        }
    };
}

/// Fieldless enums.
macro_rules! unit_tagged {
    ($ty:ident { $($tag:literal => $variant:ident),* $(,)? }) => {
        impl Encode for $ty {
            fn encode(&self, w: &mut BinWriter) {
                w.u8(match self {
                    $($ty::$variant => $tag,)*
                });
            }
        }

        impl Decode for $ty {
            fn decode(r: &mut BinReader<'_>) -> Result<Self, FluxError> {
                match r.tag()? {
                    $(($tag, _) => Ok($ty::$variant),)*
                    (tag, at) => Err(r.error_at(at, format!("unknown {} tag {}", stringify!($ty), tag))),
                }
            }
        }
    };
}

record!(Position { line, column });
record!(SourceLocation { file, start, end, source });
record!(BaseNode { location, errors });
record!(Duration { magnitude, unit });
record!(DictItem { key, val });

node!(Package { base, path, package, files });
node!(File { base, name, metadata, package, imports, body });
node!(PackageClause { base, name });
node!(ImportDeclaration { base, alias, path });

node!(ExprStmt { base, expression });
node!(VariableAssgn { base, id, init });
node!(MemberAssgn { base, member, init });
node!(OptionStmt { base, assignment });
node!(ReturnStmt { base, argument });
node!(BadStmt { base, text });
node!(TestCaseStmt { base, id, extends, block });
node!(BuiltinStmt { base, id, ty });
node!(Block { base, body });

node!(Identifier { base, name });
node!(ArrayExpr { base, elements });
node!(DictExpr { base, elements });
node!(FunctionExpr { base, params, body });
node!(LogicalExpr { base, operator, left, right });
node!(ObjectExpr { base, with, properties });
node!(MemberExpr { base, object, property });
node!(IndexExpr { base, array, index });
node!(BinaryExpr { base, operator, left, right });
node!(UnaryExpr { base, operator, argument });
node!(PipeExpr { base, argument, call });
node!(CallExpr { base, callee, arguments });
node!(ConditionalExpr { base, test, consequent, alternate });
node!(StringExpr { base, parts });
node!(TextPart { base, value });
node!(InterpolatedPart { base, expression });
node!(ParenExpr { base, expression });
node!(BadExpr { base, text, expression });
node!(Property { base, key, value });

node!(IntegerLit { base, value });
node!(UintLit { base, value });
node!(FloatLit { base, value });
node!(StringLit { base, value });
node!(DurationLit { base, values });
node!(DateTimeLit { base, value });
node!(RegexpLit { base, value });
node!(PipeLit { base });

node!(TypeExpression { base, monotype, constraints });
node!(TvarType { base, name });
node!(NamedType { base, name });
node!(ArrayType { base, element });
node!(DictType { base, key, val });
node!(RecordType { base, tvar, properties });
node!(PropertyType { base, name, monotype });
node!(FunctionType { base, parameters, monotype });
node!(NamedParam { base, name, monotype });
node!(PipeParam { base, name, monotype });
node!(TypeConstraint { base, tvar, kinds });

tagged!(Statement {
    0 => Expr,
    1 => Variable,
    2 => Option,
    3 => Return,
    4 => Bad,
    5 => TestCase,
    6 => Builtin,
});

tagged!(Assignment {
    0 => Variable,
    1 => Member,
});

tagged!(Expression {
    0 => Identifier,
    1 => Array,
    2 => Dict,
    3 => Function,
    4 => Logical,
    5 => Object,
    6 => Member,
    7 => Index,
    8 => Binary,
    9 => Unary,
    10 => PipeExpr,
    11 => Call,
    12 => Conditional,
    13 => StringExpr,
    14 => Paren,
    15 => Integer,
    16 => Uint,
    17 => Float,
    18 => StringLit,
    19 => Duration,
    20 => DateTime,
    21 => Regexp,
    22 => PipeLit,
    23 => Bad,
});

tagged!(FunctionBody {
    0 => Block,
    1 => Expr,
});

tagged!(PropertyKey {
    0 => Identifier,
    1 => StringLit,
});

tagged!(StringExprPart {
    0 => Text,
    1 => Interpolated,
});

tagged!(MonoType {
    0 => Tvar,
    1 => Basic,
    2 => Array,
    3 => Dict,
    4 => Record,
    5 => Function,
});

tagged!(ParameterType {
    0 => Required,
    1 => Optional,
    2 => Pipe,
});

unit_tagged!(Operator {
    0 => Multiplication,
    1 => Division,
    2 => Modulo,
    3 => Power,
    4 => Addition,
    5 => Subtraction,
    6 => LessThanEqual,
    7 => LessThan,
    8 => GreaterThanEqual,
    9 => GreaterThan,
    10 => StartsWith,
    11 => In,
    12 => Not,
    13 => Exists,
    14 => NotEmpty,
    15 => Empty,
    16 => Equal,
    17 => NotEqual,
    18 => RegexpMatch,
    19 => NotRegexpMatch,
});

unit_tagged!(LogicalOperator {
    0 => And,
    1 => Or,
});
