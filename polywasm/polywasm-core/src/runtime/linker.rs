//! Instantiation: resolve imports, allocate definitions, bind exports, apply segments, run start.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    coerce, FuncInstance, GlobalInstance, Instance, Memory, MemoryInstance, ModuleInstance, Store,
    Table, TableInstance,
};
use crate::error::{Error, LinkError, Trap};
use crate::host::{Extern, Func, Imports};
use crate::model::{
    ConstExpr, ExportDesc, FuncType, GlobalType, Import, ImportDesc, Limits, Module, ModuleData,
    ValType, Value,
};
use crate::vm::interpreter;

/// Index spaces under construction, imports first.
#[derive(Default)]
struct Bindings {
    funcs: Vec<usize>,
    tables: Vec<usize>,
    memories: Vec<usize>,
    globals: Vec<usize>,
}

/// Link, allocate and initialize a new instance, then run its start function.
///
/// Everything allocated for the instance is removed from the store again if linking fails before
/// segments are written. After that point the instance is committed: segments may have reached
/// imported tables and memories, so a trapping start function leaves it in place.
pub(crate) fn instantiate(
    store: &mut Store,
    module: &Module,
    imports: &Imports,
) -> Result<Instance, Error> {
    let cp = store.checkpoint();
    let (instance, writes) = match link(store, module, imports) {
        Ok(linked) => linked,
        Err(err) => {
            store.rollback(cp);
            debug!(%err, "instantiation rolled back");
            return Err(err);
        }
    };
    writes.apply(store);
    debug!("segments applied");

    let record = store.instance(instance)?;
    let start = record
        .module
        .start
        .and_then(|idx| record.funcs.get(idx as usize).copied());
    if let Some(addr) = start {
        interpreter::invoke(store, addr, &[])?;
        debug!(addr, "start function returned");
    }
    Ok(Instance(store.stored(instance)))
}

/// Resolve imports, allocate definitions, bind exports and check every segment. Nothing outside
/// the store's newly allocated items is touched.
fn link(
    store: &mut Store,
    module: &Module,
    imports: &Imports,
) -> Result<(usize, SegmentWrites), Error> {
    let data = Arc::clone(&module.data);
    let mut b = Bindings::default();

    for imp in &data.imports {
        resolve_import(store, &data, imp, imports, &mut b)?;
    }
    debug!(count = data.imports.len(), "imports resolved");

    let instance = store.alloc_instance(ModuleInstance::empty(Arc::clone(&data)));

    for code in &data.functions {
        b.funcs.push(store.alloc_func(FuncInstance::Wasm {
            instance,
            code: Arc::clone(code),
        }));
    }
    let cfg = store.config().clone();
    for tt in &data.tables {
        let table = TableInstance::new(tt, cfg.max_table_elements).map_err(|_| {
            LinkError::StoreLimit {
                what: "table elements",
                limit: u64::from(cfg.max_table_elements),
            }
        })?;
        b.tables.push(store.alloc_table(table));
    }
    for mt in &data.memories {
        let mem = MemoryInstance::new(mt, cfg.max_memory_pages).map_err(|_| {
            LinkError::StoreLimit {
                what: "memory pages",
                limit: u64::from(cfg.max_memory_pages),
            }
        })?;
        b.memories.push(store.alloc_memory(mem));
    }
    for g in &data.globals {
        let value = eval_const(store, &b.globals, g.init)?;
        b.globals.push(store.alloc_global(GlobalInstance::new(g.ty, value)));
    }

    let exports = bind_exports(store, &data, &b)?;
    let writes = check_segments(store, &data, &b)?;

    store.instances[instance] = ModuleInstance {
        module: data,
        funcs: b.funcs,
        tables: b.tables,
        memories: b.memories,
        globals: b.globals,
        exports,
    };
    Ok((instance, writes))
}

fn resolve_import(
    store: &mut Store,
    data: &ModuleData,
    imp: &Import,
    imports: &Imports,
    b: &mut Bindings,
) -> Result<(), Error> {
    let ns = imports
        .namespace(&imp.module)
        .ok_or_else(|| LinkError::MissingModule {
            module: imp.module.clone(),
        })?;
    let item = *ns.get(&imp.name).ok_or_else(|| LinkError::MissingImport {
        module: imp.module.clone(),
        name: imp.name.clone(),
    })?;
    if item.kind() != imp.desc.kind() {
        return Err(LinkError::KindMismatch {
            module: imp.module.clone(),
            name: imp.name.clone(),
            expected: imp.desc.kind(),
            found: item.kind(),
        }
        .into());
    }
    let foreign = || LinkError::ForeignHandle {
        module: imp.module.clone(),
        name: imp.name.clone(),
    };

    match (&imp.desc, item) {
        (ImportDesc::Func(type_idx), Extern::Func(f)) => {
            let expected = data
                .types
                .get(*type_idx as usize)
                .ok_or(Trap::BadHandle { what: "type" })?;
            let addr = store.resolve(f.0).ok_or_else(foreign)?;
            b.funcs.push(link_func(store, imp, expected, addr)?);
        }
        (ImportDesc::Global(gt), Extern::Global(x)) => {
            let value = link_global(imp, *gt, x)?;
            b.globals
                .push(store.alloc_global(GlobalInstance::new(*gt, value)));
        }
        (ImportDesc::Memory(mt), Extern::Memory(m)) => {
            let addr = store.resolve(m.0).ok_or_else(foreign)?;
            let mem = store
                .mems
                .get(addr)
                .ok_or(Trap::BadHandle { what: "memory" })?;
            check_limits(imp, "memory pages", mt.limits, mem.size_pages(), mem.max())?;
            b.memories.push(addr);
        }
        (ImportDesc::Table(tt), Extern::Table(t)) => {
            let addr = store.resolve(t.0).ok_or_else(foreign)?;
            let table = store
                .tables
                .get(addr)
                .ok_or(Trap::BadHandle { what: "table" })?;
            check_limits(imp, "table elements", tt.limits, table.size(), table.max())?;
            b.tables.push(addr);
        }
        // Kinds were compared above.
        _ => {}
    }
    Ok(())
}

/// Functions with a known signature link by signature equality and keep their identity. Untyped
/// host callables are bound to the import's signature.
fn link_func(
    store: &mut Store,
    imp: &Import,
    expected: &FuncType,
    addr: usize,
) -> Result<usize, Error> {
    match store.func(addr)?.clone() {
        FuncInstance::Host { ty: None, f: host } => {
            if expected.mentions_i64() {
                return Err(LinkError::I64AtBoundary {
                    module: imp.module.clone(),
                    name: imp.name.clone(),
                }
                .into());
            }
            let bound = FuncInstance::Host {
                ty: Some(expected.clone()),
                f: host,
            };
            Ok(store.alloc_func(bound))
        }
        other => {
            let found = other.ty().map(FuncType::signature).unwrap_or_default();
            let expected = expected.signature();
            if found != expected {
                return Err(LinkError::SignatureMismatch {
                    module: imp.module.clone(),
                    name: imp.name.clone(),
                    expected,
                    found,
                }
                .into());
            }
            Ok(addr)
        }
    }
}

fn link_global(imp: &Import, gt: GlobalType, x: f64) -> Result<Value, LinkError> {
    if gt.mutable {
        return Err(LinkError::MutableGlobalImport {
            module: imp.module.clone(),
            name: imp.name.clone(),
        });
    }
    coerce::to_wasm(x, gt.val_type).map_err(|_| LinkError::I64AtBoundary {
        module: imp.module.clone(),
        name: imp.name.clone(),
    })
}

fn check_limits(
    imp: &Import,
    what: &'static str,
    declared: Limits,
    current: u32,
    host_max: Option<u32>,
) -> Result<(), LinkError> {
    let fail = |detail: String| LinkError::Limits {
        module: imp.module.clone(),
        name: imp.name.clone(),
        what,
        detail,
    };
    if current < declared.min {
        return Err(fail(format!(
            "current size {current} is below the declared minimum {}",
            declared.min
        )));
    }
    if let Some(max) = declared.max {
        match host_max {
            None => return Err(fail(format!("has no maximum but {max} is declared"))),
            Some(host_max) if host_max > max => {
                return Err(fail(format!(
                    "maximum {host_max} exceeds the declared maximum {max}"
                )))
            }
            Some(_) => {}
        }
        if current > max {
            return Err(fail(format!(
                "current size {current} exceeds the declared maximum {max}"
            )));
        }
    }
    Ok(())
}

fn eval_const(store: &Store, globals: &[usize], expr: ConstExpr) -> Result<Value, Trap> {
    Ok(match expr {
        ConstExpr::I32(v) => Value::I32(v),
        ConstExpr::F32(bits) => Value::F32(bits),
        ConstExpr::F64(bits) => Value::F64(bits),
        ConstExpr::GlobalGet(idx) => {
            let addr = globals
                .get(idx as usize)
                .copied()
                .ok_or(Trap::BadHandle { what: "global" })?;
            store.global(addr)?.get()
        }
    })
}

/// Segment offsets are i32 constants read as unsigned.
fn eval_offset(store: &Store, globals: &[usize], expr: ConstExpr) -> Result<u32, Trap> {
    let v = eval_const(store, globals, expr)?;
    v.as_i32().map(|x| x as u32).ok_or(Trap::OperandType {
        expected: ValType::I32,
    })
}

fn bind_exports(
    store: &Store,
    data: &ModuleData,
    b: &Bindings,
) -> Result<HashMap<String, Extern>, Error> {
    let mut out = HashMap::with_capacity(data.exports.len());
    for ex in &data.exports {
        let addr = |space: &[usize], idx: u32, what: &'static str| {
            space
                .get(idx as usize)
                .copied()
                .ok_or(Trap::BadHandle { what })
        };
        let item = match ex.desc {
            ExportDesc::Func(i) => {
                Extern::Func(Func(store.stored(addr(&b.funcs, i, "function")?)))
            }
            ExportDesc::Table(i) => {
                Extern::Table(Table(store.stored(addr(&b.tables, i, "table")?)))
            }
            ExportDesc::Memory(i) => {
                Extern::Memory(Memory(store.stored(addr(&b.memories, i, "memory")?)))
            }
            ExportDesc::Global(i) => {
                let g = store.global(addr(&b.globals, i, "global")?)?;
                if g.ty().mutable {
                    return Err(LinkError::UnrepresentableExport {
                        name: ex.name.clone(),
                        reason: "mutable globals cannot be exported",
                    }
                    .into());
                }
                let v = coerce::to_host(g.get()).map_err(|_| LinkError::UnrepresentableExport {
                    name: ex.name.clone(),
                    reason: "i64 globals cannot be exported",
                })?;
                Extern::Global(v)
            }
        };
        out.insert(ex.name.clone(), item);
    }
    Ok(out)
}

/// Segment contents resolved to store addresses, ready to be written.
#[derive(Default)]
struct SegmentWrites {
    elements: Vec<(usize, u32, Vec<usize>)>,
    data: Vec<(usize, usize, Arc<ModuleData>, usize)>,
}

impl SegmentWrites {
    /// Bounds were checked when the writes were planned.
    fn apply(self, store: &mut Store) {
        for (taddr, offset, faddrs) in self.elements {
            if let Some(table) = store.tables.get_mut(taddr) {
                for (i, faddr) in faddrs.into_iter().enumerate() {
                    let _ = table.set(offset + i as u32, Some(faddr));
                }
            }
        }
        for (maddr, offset, module, seg) in self.data {
            let (Some(mem), Some(seg)) = (store.mems.get_mut(maddr), module.data.get(seg)) else {
                continue;
            };
            if let Some(dst) = mem.data_mut().get_mut(offset..offset + seg.init.len()) {
                dst.copy_from_slice(&seg.init);
            }
        }
    }
}

/// Check every segment against its target, before any of them is written.
fn check_segments(
    store: &Store,
    data: &Arc<ModuleData>,
    b: &Bindings,
) -> Result<SegmentWrites, Error> {
    let mut writes = SegmentWrites::default();
    for seg in &data.elements {
        let offset = eval_offset(store, &b.globals, seg.offset)?;
        let taddr = *b.tables.first().ok_or(Trap::BadHandle { what: "table" })?;
        let size = store
            .tables
            .get(taddr)
            .ok_or(Trap::BadHandle { what: "table" })?
            .size();
        check_segment("element", offset, seg.init.len(), u64::from(size))?;
        let faddrs = seg
            .init
            .iter()
            .map(|fidx| {
                b.funcs
                    .get(*fidx as usize)
                    .copied()
                    .ok_or(Trap::BadHandle { what: "function" })
            })
            .collect::<Result<Vec<_>, _>>()?;
        writes.elements.push((taddr, offset, faddrs));
    }
    for (i, seg) in data.data.iter().enumerate() {
        let offset = eval_offset(store, &b.globals, seg.offset)?;
        let maddr = *b.memories.first().ok_or(Trap::BadHandle { what: "memory" })?;
        let size = store
            .mems
            .get(maddr)
            .ok_or(Trap::BadHandle { what: "memory" })?
            .data()
            .len() as u64;
        check_segment("data", offset, seg.init.len(), size)?;
        writes.data.push((maddr, offset as usize, Arc::clone(data), i));
    }
    Ok(writes)
}

fn check_segment(kind: &'static str, offset: u32, len: usize, size: u64) -> Result<(), LinkError> {
    if u64::from(offset) + len as u64 > size {
        return Err(LinkError::SegmentOutOfBounds {
            kind,
            offset,
            len: len as u32,
            size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PAGE_SIZE;
    use crate::Config;

    fn import() -> Import {
        Import {
            module: "env".into(),
            name: "x".into(),
            desc: ImportDesc::Global(GlobalType::new(ValType::I32, false)),
        }
    }

    #[test]
    fn limits_follow_declared_bounds() {
        let imp = import();
        let declared = Limits::new(2, Some(4));
        assert!(check_limits(&imp, "memory pages", declared, 2, Some(4)).is_ok());
        assert!(check_limits(&imp, "memory pages", declared, 3, Some(3)).is_ok());
        assert!(check_limits(&imp, "memory pages", declared, 1, Some(4)).is_err());
        assert!(check_limits(&imp, "memory pages", declared, 2, None).is_err());
        assert!(check_limits(&imp, "memory pages", declared, 2, Some(5)).is_err());
        assert!(check_limits(&imp, "memory pages", Limits::new(1, None), 7, None).is_ok());
    }

    #[test]
    fn global_imports_are_immutable_and_not_i64() {
        let imp = import();
        assert_eq!(
            link_global(&imp, GlobalType::new(ValType::I32, false), 3.7),
            Ok(Value::I32(3))
        );
        assert!(matches!(
            link_global(&imp, GlobalType::new(ValType::I32, true), 1.0),
            Err(LinkError::MutableGlobalImport { .. })
        ));
        assert!(matches!(
            link_global(&imp, GlobalType::new(ValType::I64, false), 1.0),
            Err(LinkError::I64AtBoundary { .. })
        ));
    }

    #[test]
    fn segment_bounds() {
        assert!(check_segment("data", 0, PAGE_SIZE, PAGE_SIZE as u64).is_ok());
        assert!(check_segment("data", 1, PAGE_SIZE, PAGE_SIZE as u64).is_err());
        assert!(check_segment("element", u32::MAX, 1, 10).is_err());
        assert!(check_segment("element", 10, 0, 10).is_ok());
    }

    fn compile(text: &str) -> Module {
        let bytes = wat::parse_str(text).unwrap();
        Module::new(&Config::default(), &bytes).unwrap()
    }

    #[test]
    fn failed_instantiation_leaves_the_store_untouched() {
        let module = compile(
            r#"(module
                (import "env" "f" (func $f (param i32)))
                (memory 1)
                (table 1 funcref)
                (global i32 (i32.const 1))
                (func (export "g") (call $f (i32.const 0)))
                (data (i32.const 65535) "ab"))"#,
        );
        let mut store = Store::new();
        let before = store.checkpoint();
        let mut imports = Imports::new();
        imports.define("env", "f", Func::wrap(&mut store, |_, _| Ok(None)));
        let allocated = store.checkpoint();
        assert_ne!(before, allocated);

        let err = instantiate(&mut store, &module, &imports).unwrap_err();
        assert!(matches!(
            err,
            Error::Link(LinkError::SegmentOutOfBounds { kind: "data", .. })
        ));
        assert_eq!(store.checkpoint(), allocated);
    }

    #[test]
    fn imports_from_another_store_are_rejected() {
        let module = compile(r#"(module (import "env" "m" (memory 1)))"#);
        let mut other = Store::new();
        let mem = Memory::new(&mut other, 1, None).unwrap();
        let mut imports = Imports::new();
        imports.define("env", "m", mem);

        let mut store = Store::new();
        let before = store.checkpoint();
        let err = instantiate(&mut store, &module, &imports).unwrap_err();
        assert!(matches!(err, Error::Link(LinkError::ForeignHandle { .. })));
        assert_eq!(store.checkpoint(), before);
    }
}
