//! Core WASM MVP type definitions: value types, function types, limits, table/memory/global types,
//! import/export descriptors, and index aliases.

use std::fmt;

pub type TypeIdx = u32;
pub type FuncIdx = u32;
pub type TableIdx = u32;
pub type MemIdx = u32;
pub type GlobalIdx = u32;

/// Value type (MVP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValType {
    #[default]
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub const ALL: [ValType; 4] = [ValType::I32, ValType::I64, ValType::F32, ValType::F64];

    /// Index of this type's slot lane.
    pub const fn lane(self) -> usize {
        match self {
            ValType::I32 => 0,
            ValType::I64 => 1,
            ValType::F32 => 2,
            ValType::F64 => 3,
        }
    }

    /// One-letter code used in signature strings.
    pub const fn sig_char(self) -> char {
        match self {
            ValType::I32 => 'i',
            ValType::I64 => 'l',
            ValType::F32 => 'f',
            ValType::F64 => 'd',
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        })
    }
}

/// Result type of a block, loop or if.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockType {
    #[default]
    Empty,
    Value(ValType),
}

impl BlockType {
    pub fn result(self) -> Option<ValType> {
        match self {
            BlockType::Empty => None,
            BlockType::Value(t) => Some(t),
        }
    }
}

impl From<Option<ValType>> for BlockType {
    fn from(t: Option<ValType>) -> Self {
        t.map_or(BlockType::Empty, BlockType::Value)
    }
}

/// Runtime value. For floats, store the raw IEEE-754 bits (preserve NaN payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
}

impl Value {
    /// The zero value locals start with.
    pub const fn zero(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0),
            ValType::F64 => Value::F64(0),
        }
    }

    pub const fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn f32(v: f32) -> Self {
        Value::F32(v.to_bits())
    }

    pub fn f64(v: f64) -> Self {
        Value::F64(v.to_bits())
    }
}

/// Function type: params and results. Result arity is capped at one when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: impl Into<Vec<ValType>>, results: impl Into<Vec<ValType>>) -> Self {
        Self {
            params: params.into(),
            results: results.into(),
        }
    }

    pub fn result(&self) -> Option<ValType> {
        self.results.first().copied()
    }

    /// Compact signature string, e.g. `ii-i` for `(i32, i32) -> i32` and `-` for `() -> ()`.
    pub fn signature(&self) -> String {
        let mut s: String = self.params.iter().map(|t| t.sig_char()).collect();
        s.push('-');
        s.extend(self.results.iter().map(|t| t.sig_char()));
        s
    }

    pub fn mentions_i64(&self) -> bool {
        self.params
            .iter()
            .chain(self.results.iter())
            .any(|t| *t == ValType::I64)
    }
}

/// Min/max limits for tables/memories (units: elements for tables, pages (64KiB) for memories).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub const fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }
}

/// Element type of a table. MVP supports only function references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefType {
    #[default]
    FuncRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableType {
    pub elem: RefType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryType {
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub val_type: ValType,
    pub mutable: bool,
}

impl GlobalType {
    pub const fn new(val_type: ValType, mutable: bool) -> Self {
        Self { val_type, mutable }
    }
}

/// Kind tag shared by imports and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExternalKind::Function => "function",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    Func(TypeIdx),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternalKind {
        match self {
            ImportDesc::Func(_) => ExternalKind::Function,
            ImportDesc::Table(_) => ExternalKind::Table,
            ImportDesc::Memory(_) => ExternalKind::Memory,
            ImportDesc::Global(_) => ExternalKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDesc {
    Func(FuncIdx),
    Table(TableIdx),
    Memory(MemIdx),
    Global(GlobalIdx),
}

impl ExportDesc {
    pub fn kind(&self) -> ExternalKind {
        match self {
            ExportDesc::Func(_) => ExternalKind::Function,
            ExportDesc::Table(_) => ExternalKind::Table,
            ExportDesc::Memory(_) => ExternalKind::Memory,
            ExportDesc::Global(_) => ExternalKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_strings() {
        let add = FuncType::new([ValType::I32, ValType::I32], [ValType::I32]);
        assert_eq!(add.signature(), "ii-i");
        assert_eq!(FuncType::default().signature(), "-");
        let mixed = FuncType::new([ValType::F32, ValType::I64], [ValType::F64]);
        assert_eq!(mixed.signature(), "fl-d");
        assert!(mixed.mentions_i64());
        assert!(!add.mentions_i64());
    }

    #[test]
    fn lanes_are_distinct() {
        let lanes: Vec<usize> = ValType::ALL.iter().map(|t| t.lane()).collect();
        assert_eq!(lanes, vec![0, 1, 2, 3]);
    }
}
