//! Module-level validation for WASM MVP.
//!
//! Index-space and cross-section checks run by the section decoder as each entry is read, so every
//! failure carries the offset of the entry that caused it. Instruction typing lives in the function
//! body compiler.

use std::collections::HashSet;

use crate::binary::Result;
use crate::error::DecodeError;
use crate::model::{
    ConstExpr, ExportDesc, FuncIdx, FuncType, ModuleData, TypeIdx, ValType,
};

/// Maximum number of tables or memories a module may have, imports included.
const MAX_TABLES: u32 = 1;
const MAX_MEMORIES: u32 = 1;

pub(crate) fn type_index(m: &ModuleData, idx: TypeIdx, offset: usize) -> Result<&FuncType> {
    m.types.get(idx as usize).ok_or(DecodeError::IndexOutOfRange {
        space: "type",
        index: idx,
        offset,
    })
}

pub(crate) fn func_index(m: &ModuleData, idx: FuncIdx, offset: usize) -> Result<&FuncType> {
    m.func_type(idx).ok_or(DecodeError::IndexOutOfRange {
        space: "function",
        index: idx,
        offset,
    })
}

/// At most one table and one memory across imports and definitions.
pub(crate) fn singletons(m: &ModuleData, offset: usize) -> Result<()> {
    if m.total_tables() > MAX_TABLES {
        return Err(DecodeError::TooMany {
            what: "table",
            offset,
        });
    }
    if m.total_memories() > MAX_MEMORIES {
        return Err(DecodeError::TooMany {
            what: "memory",
            offset,
        });
    }
    Ok(())
}

/// Type of a constant initializer. `get_global` may only name an imported global.
pub(crate) fn const_expr_type(m: &ModuleData, expr: ConstExpr, offset: usize) -> Result<ValType> {
    Ok(match expr {
        ConstExpr::I32(_) => ValType::I32,
        ConstExpr::F32(_) => ValType::F32,
        ConstExpr::F64(_) => ValType::F64,
        ConstExpr::GlobalGet(idx) => {
            if idx >= m.imported_globals {
                return Err(DecodeError::IndexOutOfRange {
                    space: "imported global",
                    index: idx,
                    offset,
                });
            }
            m.global_type(idx)
                .map(|g| g.val_type)
                .ok_or(DecodeError::IndexOutOfRange {
                    space: "global",
                    index: idx,
                    offset,
                })?
        }
    })
}

pub(crate) fn const_expr(
    m: &ModuleData,
    expr: ConstExpr,
    expected: ValType,
    offset: usize,
) -> Result<()> {
    let found = const_expr_type(m, expr, offset)?;
    if found != expected {
        return Err(DecodeError::TypeMismatch {
            expected,
            found,
            offset,
        });
    }
    Ok(())
}

pub(crate) fn export(
    m: &ModuleData,
    desc: ExportDesc,
    names: &mut HashSet<String>,
    name: &str,
    offset: usize,
) -> Result<()> {
    if !names.insert(name.to_owned()) {
        return Err(DecodeError::DuplicateExport {
            name: name.to_owned(),
        });
    }
    let (space, index, len) = match desc {
        ExportDesc::Func(i) => ("function", i, m.total_funcs()),
        ExportDesc::Table(i) => ("table", i, m.total_tables()),
        ExportDesc::Memory(i) => ("memory", i, m.total_memories()),
        ExportDesc::Global(i) => ("global", i, m.total_globals()),
    };
    if index >= len {
        return Err(DecodeError::IndexOutOfRange {
            space,
            index,
            offset,
        });
    }
    Ok(())
}

pub(crate) fn start(m: &ModuleData, idx: FuncIdx, offset: usize) -> Result<()> {
    let ty = func_index(m, idx, offset)?;
    if !ty.params.is_empty() || !ty.results.is_empty() {
        return Err(DecodeError::Malformed {
            offset,
            msg: "start function must have type [] -> []",
        });
    }
    Ok(())
}

/// Segment target index must be zero and the target must exist.
pub(crate) fn segment_target(
    what: &'static str,
    space: &'static str,
    index: u32,
    available: u32,
    offset: usize,
) -> Result<()> {
    if index != 0 {
        return Err(DecodeError::NonZeroIndex {
            what,
            index,
            offset,
        });
    }
    if available == 0 {
        return Err(DecodeError::IndexOutOfRange {
            space,
            index,
            offset,
        });
    }
    Ok(())
}

/// Every declared function got a body.
pub(crate) fn function_bodies(m: &ModuleData) -> Result<()> {
    let functions = m.func_type_indices.len();
    let bodies = m.functions.len();
    if functions != bodies {
        return Err(DecodeError::FunctionCodeMismatch { functions, bodies });
    }
    Ok(())
}
