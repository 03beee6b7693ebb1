//! Host-facing surface: function handles, the capability-tagged [`Extern`] and the [`Imports`] map
//! consulted at instantiation.

pub mod caller;
pub mod func;

use std::collections::HashMap;

pub use caller::Caller;
pub use func::{Func, HostFunc};

use crate::model::ExternalKind;
use crate::runtime::{Instance, Memory, Store, Table};

/// An importable or exported item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extern {
    Func(Func),
    /// Globals cross the boundary as host numbers.
    Global(f64),
    Memory(Memory),
    Table(Table),
}

impl Extern {
    pub fn kind(&self) -> ExternalKind {
        match self {
            Extern::Func(_) => ExternalKind::Function,
            Extern::Global(_) => ExternalKind::Global,
            Extern::Memory(_) => ExternalKind::Memory,
            Extern::Table(_) => ExternalKind::Table,
        }
    }
}

impl From<Func> for Extern {
    fn from(f: Func) -> Self {
        Extern::Func(f)
    }
}

impl From<f64> for Extern {
    fn from(v: f64) -> Self {
        Extern::Global(v)
    }
}

impl From<Memory> for Extern {
    fn from(m: Memory) -> Self {
        Extern::Memory(m)
    }
}

impl From<Table> for Extern {
    fn from(t: Table) -> Self {
        Extern::Table(t)
    }
}

/// Import namespace: module name -> item name -> item.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    modules: HashMap<String, HashMap<String, Extern>>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        item: impl Into<Extern>,
    ) -> &mut Self {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into(), item.into());
        self
    }

    /// Make every export of `instance` importable under `module`.
    pub fn define_instance(
        &mut self,
        module: impl Into<String>,
        store: &Store,
        instance: Instance,
    ) -> &mut Self {
        let ns = self.modules.entry(module.into()).or_default();
        for (name, item) in instance.exports(store) {
            ns.insert(name.to_owned(), item);
        }
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<Extern> {
        self.modules.get(module)?.get(name).copied()
    }

    pub(crate) fn namespace(&self, module: &str) -> Option<&HashMap<String, Extern>> {
        self.modules.get(module)
    }
}
