//! Crate-level error types for polywasm-core.
//!
//! Decoding, linking and execution fail with three disjoint error types. [`Error`] wraps all
//! three for operations that span more than one phase.

use thiserror::Error;

use crate::model::{ExternalKind, ValType};

/// Structural or static problems in a module binary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("malformed varuint{bits} at offset {offset}")]
    BadUnsigned { bits: u8, offset: usize },

    #[error("malformed varint{bits} at offset {offset}")]
    BadSigned { bits: u8, offset: usize },

    #[error("64-bit variable-length integers are not supported (offset {offset})")]
    Unsupported64BitInteger { offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("bad magic number")]
    BadMagic,

    #[error("unsupported version {found:#x}")]
    BadVersion { found: u32 },

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },

    #[error("out-of-order section: id {id} after {previous} at offset {offset}")]
    OutOfOrderSection { id: u8, previous: u8, offset: usize },

    #[error("read past end of section {id}: ended at {offset}, expected {end}")]
    ReadPastEndOfSection { id: u8, end: usize, offset: usize },

    #[error("invalid value type {tag:#x} at offset {offset}")]
    InvalidValueType { tag: i8, offset: usize },

    #[error("invalid block type {tag:#x} at offset {offset}")]
    InvalidBlockType { tag: i8, offset: usize },

    #[error("invalid element type {tag:#x} at offset {offset}")]
    InvalidElemType { tag: i8, offset: usize },

    #[error("invalid external kind {kind} at offset {offset}")]
    InvalidExternalKind { kind: u8, offset: usize },

    #[error("malformed module at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },

    #[error("at most one {what} is allowed (offset {offset})")]
    TooMany { what: &'static str, offset: usize },

    #[error("{what} index must be zero, found {index} at offset {offset}")]
    NonZeroIndex {
        what: &'static str,
        index: u32,
        offset: usize,
    },

    #[error("{space} index {index} out of range at offset {offset}")]
    IndexOutOfRange {
        space: &'static str,
        index: u32,
        offset: usize,
    },

    #[error("{functions} function declarations but {bodies} code bodies")]
    FunctionCodeMismatch { functions: usize, bodies: usize },

    #[error("duplicate export name {name:?}")]
    DuplicateExport { name: String },

    #[error("unsupported opcode {opcode:#04x} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },

    #[error("type mismatch at offset {offset}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ValType,
        found: ValType,
        offset: usize,
    },

    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: usize },

    #[error("operand access outside current block at offset {offset}")]
    OutsideCurrentBlock { offset: usize },

    #[error("block at offset {offset} ended with {found} operands, expected {expected}")]
    BlockArity {
        expected: usize,
        found: usize,
        offset: usize,
    },

    #[error("else without matching if at offset {offset}")]
    ElseWithoutIf { offset: usize },

    #[error("if with a result requires an else arm (offset {offset})")]
    IfWithoutElse { offset: usize },

    #[error("branch depth {depth} too large at offset {offset}")]
    BranchDepth { depth: u32, offset: usize },

    #[error("br_table targets disagree on result type at offset {offset}")]
    BranchTableArity { offset: usize },

    #[error("global {index} is immutable (offset {offset})")]
    ImmutableGlobal { index: u32, offset: usize },

    #[error("alignment 2^{align} exceeds access width {width} at offset {offset}")]
    BadAlignment { align: u32, width: u32, offset: usize },

    #[error("{what} exceeds configured limit {limit} at offset {offset}")]
    LimitExceeded {
        what: &'static str,
        limit: u64,
        offset: usize,
    },
}

/// Failures while resolving a module's imports or laying out a new instance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("missing import module {module:?}")]
    MissingModule { module: String },

    #[error("missing import {module}.{name}")]
    MissingImport { module: String, name: String },

    #[error("import {module}.{name}: expected {expected}, found {found}")]
    KindMismatch {
        module: String,
        name: String,
        expected: ExternalKind,
        found: ExternalKind,
    },

    #[error("import {module}.{name}: signature {found:?} does not match {expected:?}")]
    SignatureMismatch {
        module: String,
        name: String,
        expected: String,
        found: String,
    },

    #[error("import {module}.{name}: i64 cannot cross the host boundary")]
    I64AtBoundary { module: String, name: String },

    #[error("import {module}.{name}: handle belongs to a different store")]
    ForeignHandle { module: String, name: String },

    #[error("import {module}.{name}: mutable globals cannot be imported")]
    MutableGlobalImport { module: String, name: String },

    #[error("import {module}.{name}: {what} {detail}")]
    Limits {
        module: String,
        name: String,
        what: &'static str,
        detail: String,
    },

    #[error("{kind} segment at offset {offset} with length {len} exceeds size {size}")]
    SegmentOutOfBounds {
        kind: &'static str,
        offset: u32,
        len: u32,
        size: u64,
    },

    #[error("export {name:?}: {reason}")]
    UnrepresentableExport { name: String, reason: &'static str },

    #[error("{what} exceeds store limit {limit}")]
    StoreLimit { what: &'static str, limit: u64 },
}

/// Runtime failures raised while executing compiled code or crossing the host boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("integer divide by zero")]
    IntegerDivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("out of bounds memory access: {len} bytes at {addr}")]
    MemoryOutOfBounds { addr: u64, len: u32 },

    #[error("table index {index} out of bounds (size {size})")]
    TableOutOfBounds { index: u32, size: u32 },

    #[error("uninitialized table element {index}")]
    UninitializedElement { index: u32 },

    #[error("indirect call signature mismatch: expected {expected:?}, found {found:?}")]
    IndirectCallTypeMismatch { expected: String, found: String },

    #[error("call stack exhausted at depth {depth}")]
    CallStackExhausted { depth: usize },

    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index}: expected {expected}")]
    ArgumentType { index: usize, expected: ValType },

    #[error("i64 values cannot cross the host boundary")]
    I64AtBoundary,

    #[error("host function result does not match signature")]
    UnexpectedHostResult,

    #[error("host function failed: {0}")]
    Host(String),

    #[error("invalid {what} handle")]
    BadHandle { what: &'static str },

    #[error("operand type confusion: expected {expected}")]
    OperandType { expected: ValType },
}

/// Misuse of a Memory or Table object from the host side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("initial size {initial} exceeds maximum {maximum}")]
    InvalidLimits { initial: u32, maximum: u64 },

    #[error("cannot grow from {current} by {delta} (maximum {maximum})")]
    GrowOutOfRange {
        current: u32,
        delta: u32,
        maximum: u64,
    },

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: u32, len: u32 },

    #[error("only typed functions can be stored in a table")]
    UntypedFunction,

    #[error("invalid {what} handle")]
    BadHandle { what: &'static str },
}

/// Any failure from compile + instantiate + start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Trap(#[from] Trap),
}
