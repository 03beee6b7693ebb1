//! Function and module instance records, plus the [`Instance`] handle handed to the host.

use std::collections::HashMap;
use std::sync::Arc;

use crate::compile::CompiledFunction;
use crate::host::{Extern, Func, HostFunc};
use crate::model::{FuncType, ModuleData};

use super::store::Stored;
use super::{Memory, Store, Table};

/// A function in the store: compiled wasm code bound to its instance, or a host callable.
#[derive(Clone)]
pub enum FuncInstance {
    Wasm {
        /// Owning module instance (index into `Store::instances`).
        instance: usize,
        code: Arc<CompiledFunction>,
    },
    /// `ty` is `None` for callables created with [`Func::wrap`] that have not been bound to an
    /// import signature yet.
    Host {
        ty: Option<FuncType>,
        f: Arc<HostFunc>,
    },
}

impl FuncInstance {
    pub fn ty(&self) -> Option<&FuncType> {
        match self {
            FuncInstance::Wasm { code, .. } => Some(&code.ty),
            FuncInstance::Host { ty, .. } => ty.as_ref(),
        }
    }
}

impl std::fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncInstance::Wasm { instance, code } => f
                .debug_struct("Wasm")
                .field("instance", instance)
                .field("ty", &code.ty)
                .finish(),
            FuncInstance::Host { ty, .. } => f.debug_struct("Host").field("ty", ty).finish(),
        }
    }
}

/// Store addresses of everything a module instance can reach, in index-space order
/// (imports first), plus its resolved exports.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub(crate) module: Arc<ModuleData>,
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub(crate) exports: HashMap<String, Extern>,
}

impl ModuleInstance {
    /// An instance with nothing bound yet.
    pub(crate) fn empty(module: Arc<ModuleData>) -> Self {
        Self {
            module,
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            exports: HashMap::new(),
        }
    }
}

/// Handle to an instantiated module living in a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instance(pub(crate) Stored);

impl Instance {
    fn record<'s>(&self, store: &'s Store) -> Option<&'s ModuleInstance> {
        store.instance(store.resolve(self.0)?).ok()
    }

    /// Exports in declaration order. Empty for a handle from another store.
    pub fn exports<'s>(&self, store: &'s Store) -> impl Iterator<Item = (&'s str, Extern)> + 's {
        self.record(store).into_iter().flat_map(|inst| {
            inst.module
                .exports
                .iter()
                .filter_map(move |ex| Some((ex.name.as_str(), *inst.exports.get(&ex.name)?)))
        })
    }

    pub fn get_export(&self, store: &Store, name: &str) -> Option<Extern> {
        self.record(store)?.exports.get(name).copied()
    }

    pub fn get_func(&self, store: &Store, name: &str) -> Option<Func> {
        match self.get_export(store, name)? {
            Extern::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn get_memory(&self, store: &Store, name: &str) -> Option<Memory> {
        match self.get_export(store, name)? {
            Extern::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_table(&self, store: &Store, name: &str) -> Option<Table> {
        match self.get_export(store, name)? {
            Extern::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Value of an exported global, as it was when the instance was created.
    pub fn get_global(&self, store: &Store, name: &str) -> Option<f64> {
        match self.get_export(store, name)? {
            Extern::Global(v) => Some(v),
            _ => None,
        }
    }
}
