//! Public model surface.

pub mod module;
pub mod types;

pub(crate) use module::ModuleData;
pub use module::{
    ConstExpr, DataSegment, ElementSegment, ExportDescriptor, Global, ImportDescriptor, Module,
};
pub use types::{
    BlockType, Export, ExportDesc, ExternalKind, FuncIdx, FuncType, GlobalIdx, GlobalType, Import,
    ImportDesc, Limits, MemIdx, MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType, Value,
};
