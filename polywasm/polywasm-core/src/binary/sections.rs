//! WASM MVP sections: ids, headers, payload decoders, and the top-level module decoder.
//!
//! Sections are read in strictly ascending id order. Each per-section parser runs on the main cursor;
//! afterwards the cursor must not have passed the declared end of the section, and anything short of it
//! is padding.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{
    cursor::Cursor,
    leb128,
    reader::{read_len_prefixed_bytes, read_name, read_vec},
    types::{read_elem_type, read_external_kind, read_value_type, FUNC},
    Result, MAGIC, VERSION,
};
use crate::compile::{self, opcodes::op};
use crate::config::{Config, MAX_PAGES};
use crate::error::DecodeError;
use crate::model::{
    ConstExpr, DataSegment, ElementSegment, Export, ExportDesc, ExternalKind, FuncType, Global,
    GlobalType, Import, ImportDesc, Limits, MemoryType, ModuleData, TableType, TypeIdx, ValType,
};
use crate::validate;

/// Standard section identifiers in the WASM binary format (MVP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            _ => return None,
        })
    }
}

/// Header describing a section's id, payload length, and the payload start offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

impl SectionHeader {
    /// Absolute offset one past the payload.
    pub fn end(&self) -> usize {
        self.payload_offset + self.payload_len as usize
    }
}

/// Read a section header: id (varuint7) + payload_len (varuint32).
pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let offset = cur.offset();
    let id_byte = leb128::read_varuint7(cur)?;
    let id = SectionId::from_byte(id_byte).ok_or(DecodeError::UnknownSection {
        id: id_byte,
        offset,
    })?;
    let payload_len = leb128::read_varuint32(cur)?;
    let payload_offset = cur.offset();
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset,
    })
}

/* ---------- Decoding helpers ---------- */

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let offset = cur.offset();
    let has_max = leb128::read_varuint1(cur)?;
    let min = leb128::read_varuint32(cur)?;
    let max = if has_max {
        Some(leb128::read_varuint32(cur)?)
    } else {
        None
    };
    if max.is_some_and(|max| max < min) {
        return Err(DecodeError::Malformed {
            offset,
            msg: "limits maximum below initial",
        });
    }
    Ok(Limits { min, max })
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let offset = cur.offset();
    if leb128::read_varint7(cur)? != FUNC {
        return Err(DecodeError::Malformed {
            offset,
            msg: "expected func type form",
        });
    }
    let params = read_vec(cur, read_value_type)?;
    let results = if leb128::read_varuint1(cur)? {
        vec![read_value_type(cur)?]
    } else {
        Vec::new()
    };
    Ok(FuncType { params, results })
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let elem = read_elem_type(cur)?;
    let limits = read_limits(cur)?;
    Ok(TableType { elem, limits })
}

fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    let offset = cur.offset();
    let limits = read_limits(cur)?;
    if limits.min > MAX_PAGES || limits.max.is_some_and(|max| max > MAX_PAGES) {
        return Err(DecodeError::LimitExceeded {
            what: "memory pages",
            limit: u64::from(MAX_PAGES),
            offset,
        });
    }
    Ok(MemoryType { limits })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_value_type(cur)?;
    let mutable = leb128::read_varuint1(cur)?;
    Ok(GlobalType { val_type, mutable })
}

/// Read an initializer expression: one constant or `get_global`, then `end`.
fn read_const_expr(cur: &mut Cursor) -> Result<ConstExpr> {
    let offset = cur.offset();
    let expr = match cur.read_u8()? {
        op::I32_CONST => ConstExpr::I32(leb128::read_varint32(cur)?),
        op::I64_CONST => {
            leb128::read_varint64(cur)?;
            return Err(DecodeError::Unsupported64BitInteger { offset });
        }
        op::F32_CONST => ConstExpr::F32(cur.read_u32()?),
        op::F64_CONST => ConstExpr::F64(cur.read_u64()?),
        op::GET_GLOBAL => ConstExpr::GlobalGet(leb128::read_varuint32(cur)?),
        _ => {
            return Err(DecodeError::Malformed {
                offset,
                msg: "unsupported initializer expression",
            })
        }
    };
    if cur.read_u8()? != op::END {
        return Err(DecodeError::Malformed {
            offset,
            msg: "initializer expression must end after one instruction",
        });
    }
    Ok(expr)
}

/* ---------- Section readers ---------- */

fn read_type_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    m.types = read_vec(cur, read_func_type)?;
    Ok(())
}

fn read_import_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    m.imports.reserve(count.min(cur.remaining()));
    for _ in 0..count {
        let offset = cur.offset();
        let module = read_name(cur)?;
        let name = read_name(cur)?;
        let desc = match read_external_kind(cur)? {
            ExternalKind::Function => {
                let type_idx = leb128::read_varuint32(cur)?;
                validate::type_index(m, type_idx, offset)?;
                ImportDesc::Func(type_idx)
            }
            ExternalKind::Table => ImportDesc::Table(read_table_type(cur)?),
            ExternalKind::Memory => ImportDesc::Memory(read_memory_type(cur)?),
            ExternalKind::Global => ImportDesc::Global(read_global_type(cur)?),
        };
        m.push_import(Import { module, name, desc });
        validate::singletons(m, offset)?;
    }
    Ok(())
}

fn read_function_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let indices: Vec<(usize, TypeIdx)> =
        read_vec(cur, |c| Ok((c.offset(), leb128::read_varuint32(c)?)))?;
    for &(offset, idx) in &indices {
        validate::type_index(m, idx, offset)?;
    }
    m.func_type_indices = indices.into_iter().map(|(_, idx)| idx).collect();
    Ok(())
}

fn read_table_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let offset = cur.offset();
    m.tables = read_vec(cur, read_table_type)?;
    validate::singletons(m, offset)
}

fn read_memory_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let offset = cur.offset();
    m.memories = read_vec(cur, read_memory_type)?;
    validate::singletons(m, offset)
}

fn read_global_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    m.globals.reserve(count.min(cur.remaining()));
    for _ in 0..count {
        let ty = read_global_type(cur)?;
        let offset = cur.offset();
        let init = read_const_expr(cur)?;
        validate::const_expr(m, init, ty.val_type, offset)?;
        m.globals.push(Global { ty, init });
    }
    Ok(())
}

fn read_export_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    let mut names = HashSet::new();
    m.exports.reserve(count.min(cur.remaining()));
    for _ in 0..count {
        let name = read_name(cur)?;
        let offset = cur.offset();
        let kind = read_external_kind(cur)?;
        let index = leb128::read_varuint32(cur)?;
        let desc = match kind {
            ExternalKind::Function => ExportDesc::Func(index),
            ExternalKind::Table => ExportDesc::Table(index),
            ExternalKind::Memory => ExportDesc::Memory(index),
            ExternalKind::Global => ExportDesc::Global(index),
        };
        validate::export(m, desc, &mut names, &name, offset)?;
        m.exports.push(Export { name, desc });
    }
    Ok(())
}

fn read_start_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let offset = cur.offset();
    let idx = leb128::read_varuint32(cur)?;
    validate::start(m, idx, offset)?;
    m.start = Some(idx);
    Ok(())
}

/// Offset expression of a segment; must produce an i32.
fn read_segment_offset(cur: &mut Cursor, m: &ModuleData) -> Result<ConstExpr> {
    let offset = cur.offset();
    let expr = read_const_expr(cur)?;
    validate::const_expr(m, expr, ValType::I32, offset)?;
    Ok(expr)
}

fn read_element_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    for _ in 0..count {
        let at = cur.offset();
        let table = leb128::read_varuint32(cur)?;
        validate::segment_target("element segment table", "table", table, m.total_tables(), at)?;
        let offset = read_segment_offset(cur, m)?;
        let init = read_vec(cur, |c| {
            let at = c.offset();
            let idx = leb128::read_varuint32(c)?;
            validate::func_index(m, idx, at)?;
            Ok(idx)
        })?;
        m.elements.push(ElementSegment { offset, init });
    }
    Ok(())
}

fn read_code_section(config: &Config, cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    if count != m.func_type_indices.len() {
        return Err(DecodeError::FunctionCodeMismatch {
            functions: m.func_type_indices.len(),
            bodies: count,
        });
    }
    let mut functions = Vec::with_capacity(count);
    for (i, &type_idx) in m.func_type_indices.iter().enumerate() {
        let body_size = leb128::read_varuint32(cur)? as usize;
        let mut body = cur.sub_cursor(body_size)?;
        let offset = body.offset();
        let local_decls = read_vec(&mut body, |c| {
            let n = leb128::read_varuint32(c)?;
            Ok((n, read_value_type(c)?))
        })?;
        let ty = validate::type_index(m, type_idx, offset)?;
        let compiled = compile::compile_function(config, m, ty, &local_decls, &mut body)?;
        trace!(
            index = m.imported_funcs as usize + i,
            offset,
            body_size,
            "function body"
        );
        functions.push(Arc::new(compiled));
    }
    m.functions = functions;
    Ok(())
}

fn read_data_section(cur: &mut Cursor, m: &mut ModuleData) -> Result<()> {
    let count = leb128::read_varuint32(cur)? as usize;
    for _ in 0..count {
        let at = cur.offset();
        let memory = leb128::read_varuint32(cur)?;
        validate::segment_target("data segment memory", "memory", memory, m.total_memories(), at)?;
        let offset = read_segment_offset(cur, m)?;
        let init = read_len_prefixed_bytes(cur)?.to_vec();
        m.data.push(DataSegment { offset, init });
    }
    Ok(())
}

/* ---------- Top-level module decoder ---------- */

/// Decode, validate and compile a complete module.
pub(crate) fn decode_module(config: &Config, bytes: &[u8]) -> Result<ModuleData> {
    let mut cur = Cursor::new(bytes);

    if cur.read_u32()? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = cur.read_u32()?;
    if version != VERSION {
        return Err(DecodeError::BadVersion { found: version });
    }

    let mut m = ModuleData::default();
    let mut previous: Option<SectionId> = None;

    while !cur.is_eof() {
        let header_offset = cur.offset();
        let header = read_section_header(&mut cur)?;
        debug!(
            id = header.id as u8,
            len = header.payload_len,
            offset = header.payload_offset,
            "section"
        );

        if header.id == SectionId::Custom {
            cur.skip(header.payload_len as usize)?;
            continue;
        }
        if let Some(prev) = previous {
            if header.id <= prev {
                return Err(DecodeError::OutOfOrderSection {
                    id: header.id as u8,
                    previous: prev as u8,
                    offset: header_offset,
                });
            }
        }
        previous = Some(header.id);

        match header.id {
            SectionId::Type => read_type_section(&mut cur, &mut m)?,
            SectionId::Import => read_import_section(&mut cur, &mut m)?,
            SectionId::Function => read_function_section(&mut cur, &mut m)?,
            SectionId::Table => read_table_section(&mut cur, &mut m)?,
            SectionId::Memory => read_memory_section(&mut cur, &mut m)?,
            SectionId::Global => read_global_section(&mut cur, &mut m)?,
            SectionId::Export => read_export_section(&mut cur, &mut m)?,
            SectionId::Start => read_start_section(&mut cur, &mut m)?,
            SectionId::Element => read_element_section(&mut cur, &mut m)?,
            SectionId::Code => read_code_section(config, &mut cur, &mut m)?,
            SectionId::Data => read_data_section(&mut cur, &mut m)?,
            SectionId::Custom => {}
        }

        let end = header.end();
        let pos = cur.offset();
        if pos > end {
            return Err(DecodeError::ReadPastEndOfSection {
                id: header.id as u8,
                end,
                offset: pos,
            });
        }
        if pos < end {
            warn!(
                id = header.id as u8,
                padding = end - pos,
                "skipping section padding"
            );
            cur.skip(end - pos)?;
        }
    }

    validate::function_bodies(&m)?;

    debug!(
        types = m.types.len(),
        imports = m.imports.len(),
        functions = m.functions.len(),
        globals = m.globals.len(),
        exports = m.exports.len(),
        elements = m.elements.len(),
        data = m.data.len(),
        "decoded module"
    );
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

    fn module(sections: &[&[u8]]) -> Vec<u8> {
        let mut out = HEADER.to_vec();
        for s in sections {
            out.extend_from_slice(s);
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<ModuleData> {
        decode_module(&Config::default(), bytes)
    }

    #[test]
    fn header_ok() {
        // id=Type(1), payload_len=3, then three bytes (ignored)
        let data = [1u8, 0x03, 0xAA, 0xBB, 0xCC];
        let mut c = Cursor::new(&data);
        let h = read_section_header(&mut c).unwrap();
        assert_eq!(h.id, SectionId::Type);
        assert_eq!(h.payload_len, 3);
        assert_eq!(h.payload_offset, 2);
        assert_eq!(h.end(), 5);
    }

    #[test]
    fn empty_module_has_empty_sections() {
        let m = decode(&HEADER).unwrap();
        assert!(m.types.is_empty());
        assert!(m.imports.is_empty());
        assert!(m.functions.is_empty());
        assert_eq!(m.start, None);
    }

    #[test]
    fn bad_magic_and_version() {
        assert_eq!(decode(b"\0asn\x01\0\0\0").unwrap_err(), DecodeError::BadMagic);
        assert_eq!(
            decode(b"\0asm\x0d\0\0\0").unwrap_err(),
            DecodeError::BadVersion { found: 0xd }
        );
        assert!(matches!(decode(b"\0as"), Err(DecodeError::UnexpectedEof { .. })));
    }

    #[test]
    fn unknown_and_out_of_order_sections() {
        assert_eq!(
            decode(&module(&[&[12, 0]])).unwrap_err(),
            DecodeError::UnknownSection { id: 12, offset: 8 }
        );
        // memory (5) then type (1)
        let bytes = module(&[&[5, 1, 0], &[1, 1, 0]]);
        assert_eq!(
            decode(&bytes).unwrap_err(),
            DecodeError::OutOfOrderSection { id: 1, previous: 5, offset: 11 }
        );
        // repeated id is out of order too
        let bytes = module(&[&[1, 1, 0], &[1, 1, 0]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::OutOfOrderSection { id: 1, previous: 1, .. })));
    }

    #[test]
    fn custom_sections_are_skipped_anywhere() {
        let bytes = module(&[&[1, 1, 0], &[0, 3, 1, b'x', 9], &[5, 1, 0]]);
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn padding_is_skipped_and_overrun_is_fatal() {
        // type section with count 0 and two padding bytes
        assert!(decode(&module(&[&[1, 3, 0, 0xEE, 0xEE]])).is_ok());
        // type section declared 1 byte but the entry needs more
        let bytes = module(&[&[1, 1, 1, 0x60, 0, 0]]);
        assert_eq!(
            decode(&bytes).unwrap_err(),
            DecodeError::ReadPastEndOfSection { id: 1, end: 11, offset: 14 }
        );
    }

    #[test]
    fn function_types_with_optional_result() {
        // (i32, i32) -> i32 and () -> ()
        let bytes = module(&[&[1, 10, 2, 0x60, 2, 0x7F, 0x7F, 1, 0x7F, 0x60, 0, 0]]);
        let m = decode(&bytes).unwrap();
        assert_eq!(m.types[0], FuncType::new([ValType::I32, ValType::I32], [ValType::I32]));
        assert_eq!(m.types[1], FuncType::default());
    }

    #[test]
    fn at_most_one_memory() {
        let bytes = module(&[&[5, 5, 2, 0, 1, 0, 1]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::TooMany { what: "memory", .. })));
    }

    #[test]
    fn memory_limits() {
        // max below min
        assert!(matches!(
            decode(&module(&[&[5, 4, 1, 1, 2, 1]])),
            Err(DecodeError::Malformed { .. })
        ));
        // more than 65536 pages
        assert!(matches!(
            decode(&module(&[&[5, 5, 1, 0, 0x81, 0x80, 0x04]])),
            Err(DecodeError::LimitExceeded { what: "memory pages", .. })
        ));
    }

    #[test]
    fn data_segment_needs_memory_zero() {
        // memory section, then data with memory index 1
        let bytes = module(&[&[5, 3, 1, 0, 1], &[11, 7, 1, 1, 0x41, 0, 0x0B, 1, 0xAA]]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::NonZeroIndex { what: "data segment memory", index: 1, .. })
        ));
        let bytes = module(&[&[11, 7, 1, 0, 0x41, 0, 0x0B, 1, 0xAA]]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::IndexOutOfRange { space: "memory", .. })
        ));
        let bytes = module(&[&[5, 3, 1, 0, 1], &[11, 7, 1, 0, 0x41, 4, 0x0B, 1, 0xAA]]);
        let m = decode(&bytes).unwrap();
        assert_eq!(m.data[0], DataSegment { offset: ConstExpr::I32(4), init: vec![0xAA] });
    }

    #[test]
    fn function_and_code_counts_must_agree() {
        // one type, one declared function, no code section
        let bytes = module(&[&[1, 4, 1, 0x60, 0, 0], &[3, 2, 1, 0]]);
        assert_eq!(
            decode(&bytes).unwrap_err(),
            DecodeError::FunctionCodeMismatch { functions: 1, bodies: 0 }
        );
    }

    #[test]
    fn code_section_compiles_bodies() {
        let bytes = module(&[
            &[1, 4, 1, 0x60, 0, 0],
            &[3, 2, 1, 0],
            // one body: size 4, one local run of 2 i32s, end
            &[10, 6, 1, 4, 1, 2, 0x7F, 0x0B],
        ]);
        let m = decode(&bytes).unwrap();
        assert_eq!(m.functions.len(), 1);
        assert_eq!(m.functions[0].locals, vec![ValType::I32, ValType::I32]);
    }

    #[test]
    fn trailing_bytes_in_body_are_tolerated() {
        let bytes = module(&[&[1, 4, 1, 0x60, 0, 0], &[3, 2, 1, 0], &[10, 5, 1, 3, 0, 0x0B, 0x01]]);
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn global_initializers() {
        // global i32 immutable = i32.const 7
        let bytes = module(&[&[6, 6, 1, 0x7F, 0, 0x41, 7, 0x0B]]);
        let m = decode(&bytes).unwrap();
        assert_eq!(m.globals[0].init, ConstExpr::I32(7));
        // f32 global initialized from an i32 constant
        let bytes = module(&[&[6, 6, 1, 0x7D, 0, 0x41, 7, 0x0B]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::TypeMismatch { .. })));
        // i64.const initializer
        let bytes = module(&[&[6, 6, 1, 0x7E, 0, 0x42, 7, 0x0B]]);
        assert!(matches!(decode(&bytes), Err(DecodeError::Unsupported64BitInteger { .. })));
    }

    #[test]
    fn exports_are_checked() {
        // export "f" function 0 with no functions
        let bytes = module(&[&[7, 5, 1, 1, b'f', 0, 0]]);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::IndexOutOfRange { space: "function", index: 0, .. })
        ));
    }
}
