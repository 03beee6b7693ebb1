//! Type tags: value types, block types, element types and external kinds.
//! Tags are varint7 values; the single-byte encodings are `0x7F` for i32 down to `0x40` for void.

use super::{cursor::Cursor, leb128, Result};
use crate::error::DecodeError;
use crate::model::{BlockType, ExternalKind, RefType, ValType};

pub const I32: i8 = -0x01;
pub const I64: i8 = -0x02;
pub const F32: i8 = -0x03;
pub const F64: i8 = -0x04;
pub const ANYFUNC: i8 = -0x10;
pub const FUNC: i8 = -0x20;
pub const VOID: i8 = -0x40;

fn val_type_from_tag(tag: i8) -> Option<ValType> {
    Some(match tag {
        I32 => ValType::I32,
        I64 => ValType::I64,
        F32 => ValType::F32,
        F64 => ValType::F64,
        _ => return None,
    })
}

pub fn read_value_type(cur: &mut Cursor) -> Result<ValType> {
    let offset = cur.offset();
    let tag = leb128::read_varint7(cur)?;
    val_type_from_tag(tag).ok_or(DecodeError::InvalidValueType { tag, offset })
}

pub fn read_block_type(cur: &mut Cursor) -> Result<BlockType> {
    let offset = cur.offset();
    let tag = leb128::read_varint7(cur)?;
    if tag == VOID {
        return Ok(BlockType::Empty);
    }
    val_type_from_tag(tag)
        .map(BlockType::Value)
        .ok_or(DecodeError::InvalidBlockType { tag, offset })
}

pub fn read_elem_type(cur: &mut Cursor) -> Result<RefType> {
    let offset = cur.offset();
    match leb128::read_varint7(cur)? {
        ANYFUNC => Ok(RefType::FuncRef),
        tag => Err(DecodeError::InvalidElemType { tag, offset }),
    }
}

pub fn read_external_kind(cur: &mut Cursor) -> Result<ExternalKind> {
    let offset = cur.offset();
    Ok(match cur.read_u8()? {
        0 => ExternalKind::Function,
        1 => ExternalKind::Table,
        2 => ExternalKind::Memory,
        3 => ExternalKind::Global,
        kind => return Err(DecodeError::InvalidExternalKind { kind, offset }),
    })
}
