//! The decoded, compiled, immutable module: declarations, segments and function bodies.

use std::sync::Arc;

use super::types::{
    Export, ExternalKind, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc,
    MemoryType, TableType, TypeIdx, ValType,
};
use crate::binary::sections;
use crate::compile::CompiledFunction;
use crate::config::Config;
use crate::error::DecodeError;

/// Constant initializer for globals and segment offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstExpr {
    I32(i32),
    F32(u32),
    F64(u64),
    /// Value of an imported global.
    GlobalGet(GlobalIdx),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// Active element segment for table 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub offset: ConstExpr,
    pub init: Vec<FuncIdx>,
}

/// Active data segment for memory 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub offset: ConstExpr,
    pub init: Vec<u8>,
}

/// `{ module, name, kind }` for each import, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescriptor<'a> {
    pub module: &'a str,
    pub name: &'a str,
    pub kind: ExternalKind,
}

/// `{ name, kind }` for each export, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDescriptor<'a> {
    pub name: &'a str,
    pub kind: ExternalKind,
}

/// Section contents as read off the wire, before and while function bodies are compiled.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModuleData {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices for each defined (non-imported) function, in module order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,
    pub elements: Vec<ElementSegment>,
    /// One per defined function (length equals `func_type_indices.len()`).
    pub functions: Vec<Arc<CompiledFunction>>,
    pub data: Vec<DataSegment>,

    // Import counts and types, kept in step by `push_import`.
    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
    pub imported_func_types: Vec<TypeIdx>,
    pub imported_global_types: Vec<GlobalType>,
}

impl ModuleData {
    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs + self.func_type_indices.len() as u32
    }
    pub fn total_tables(&self) -> u32 {
        self.imported_tables + self.tables.len() as u32
    }
    pub fn total_memories(&self) -> u32 {
        self.imported_memories + self.memories.len() as u32
    }
    pub fn total_globals(&self) -> u32 {
        self.imported_globals + self.globals.len() as u32
    }

    /// Record an import and extend the index space of its kind.
    pub fn push_import(&mut self, import: Import) {
        match import.desc {
            ImportDesc::Func(t) => {
                self.imported_funcs += 1;
                self.imported_func_types.push(t);
            }
            ImportDesc::Table(_) => self.imported_tables += 1,
            ImportDesc::Memory(_) => self.imported_memories += 1,
            ImportDesc::Global(g) => {
                self.imported_globals += 1;
                self.imported_global_types.push(g);
            }
        }
        self.imports.push(import);
    }

    /// Type index of a function in the function index space (imports first).
    pub fn func_type_idx(&self, idx: FuncIdx) -> Option<TypeIdx> {
        if idx < self.imported_funcs {
            self.imported_func_types.get(idx as usize).copied()
        } else {
            self.func_type_indices
                .get((idx - self.imported_funcs) as usize)
                .copied()
        }
    }

    pub fn func_type(&self, idx: FuncIdx) -> Option<&FuncType> {
        self.func_type_idx(idx)
            .and_then(|t| self.types.get(t as usize))
    }

    pub fn global_type(&self, idx: GlobalIdx) -> Option<GlobalType> {
        if idx < self.imported_globals {
            self.imported_global_types.get(idx as usize).copied()
        } else {
            self.globals
                .get((idx - self.imported_globals) as usize)
                .map(|g| g.ty)
        }
    }
}

/// A decoded and compiled module. Cheap to clone; immutable after construction.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) data: Arc<ModuleData>,
}

impl Module {
    /// Decode, validate and compile a module binary.
    pub fn new(config: &Config, bytes: &[u8]) -> Result<Self, DecodeError> {
        let data = sections::decode_module(config, bytes)?;
        Ok(Self {
            data: Arc::new(data),
        })
    }

    pub fn types(&self) -> &[FuncType] {
        &self.data.types
    }

    /// Import descriptors in declaration order.
    pub fn imports(&self) -> impl Iterator<Item = ImportDescriptor<'_>> + '_ {
        self.data.imports.iter().map(|imp| ImportDescriptor {
            module: &imp.module,
            name: &imp.name,
            kind: imp.desc.kind(),
        })
    }

    /// Export descriptors in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = ExportDescriptor<'_>> + '_ {
        self.data.exports.iter().map(|ex| ExportDescriptor {
            name: &ex.name,
            kind: ex.desc.kind(),
        })
    }

    pub fn import_decls(&self) -> &[Import] {
        &self.data.imports
    }

    pub fn export_decls(&self) -> &[Export] {
        &self.data.exports
    }

    pub fn tables(&self) -> &[TableType] {
        &self.data.tables
    }

    pub fn memories(&self) -> &[MemoryType] {
        &self.data.memories
    }

    pub fn globals(&self) -> &[Global] {
        &self.data.globals
    }

    pub fn start(&self) -> Option<FuncIdx> {
        self.data.start
    }

    pub fn elements(&self) -> &[ElementSegment] {
        &self.data.elements
    }

    pub fn data_segments(&self) -> &[DataSegment] {
        &self.data.data
    }

    /// Compiled bodies of the defined functions, in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &CompiledFunction> + '_ {
        self.data.functions.iter().map(|f| f.as_ref())
    }

    /// Signature of a function in the function index space.
    pub fn func_type(&self, idx: FuncIdx) -> Option<&FuncType> {
        self.data.func_type(idx)
    }

    /// Result type of the function with this index, if it has one.
    pub fn func_result(&self, idx: FuncIdx) -> Option<ValType> {
        self.func_type(idx).and_then(FuncType::result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Limits;

    fn import(name: &str, desc: ImportDesc) -> Import {
        Import {
            module: "env".into(),
            name: name.into(),
            desc,
        }
    }

    #[test]
    fn imported_types_index_ahead_of_definitions() {
        let mut m = ModuleData::default();
        let i32_const = GlobalType::new(ValType::I32, false);
        let f64_const = GlobalType::new(ValType::F64, false);
        m.push_import(import("a", ImportDesc::Func(2)));
        m.push_import(import("g", ImportDesc::Global(i32_const)));
        let mem = MemoryType {
            limits: Limits::new(1, None),
        };
        m.push_import(import("m", ImportDesc::Memory(mem)));
        m.push_import(import("b", ImportDesc::Func(0)));
        m.func_type_indices = vec![1];
        m.globals.push(Global {
            ty: f64_const,
            init: ConstExpr::F64(0),
        });

        assert_eq!(m.imported_funcs, 2);
        assert_eq!(m.imported_globals, 1);
        assert_eq!(m.imported_memories, 1);
        assert_eq!(m.imports.len(), 4);

        assert_eq!(m.func_type_idx(0), Some(2));
        assert_eq!(m.func_type_idx(1), Some(0));
        assert_eq!(m.func_type_idx(2), Some(1));
        assert_eq!(m.func_type_idx(3), None);
        assert_eq!(m.global_type(0), Some(i32_const));
        assert_eq!(m.global_type(1), Some(f64_const));
        assert_eq!(m.global_type(2), None);
    }
}
