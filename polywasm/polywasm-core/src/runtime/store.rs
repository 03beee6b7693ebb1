//! Central store for all runtime instances allocated by the engine.
//! Owns function, table, memory, global, and module instances; handles are indices into it tagged
//! with the store's identity.

use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    global::GlobalInstance,
    instances::{FuncInstance, ModuleInstance},
    memory::MemoryInstance,
    table::TableInstance,
};
use crate::config::Config;
use crate::error::{RangeError, Trap};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one [`Store`]. Handles remember the store that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn fresh() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Address of an item inside a particular store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Stored {
    store: StoreId,
    index: usize,
}

/// Lengths of the store's arenas, taken before an instantiation so a failed one can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    funcs: usize,
    tables: usize,
    mems: usize,
    globals: usize,
    instances: usize,
}

#[derive(Debug)]
pub struct Store {
    id: StoreId,
    config: Config,
    pub(crate) funcs: Vec<FuncInstance>,
    pub(crate) tables: Vec<TableInstance>,
    pub(crate) mems: Vec<MemoryInstance>,
    pub(crate) globals: Vec<GlobalInstance>,
    pub(crate) instances: Vec<ModuleInstance>,
    /// Live activations (wasm and host) across host re-entry.
    pub(crate) depth: usize,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            id: StoreId::fresh(),
            config,
            funcs: Vec::new(),
            tables: Vec::new(),
            mems: Vec::new(),
            globals: Vec::new(),
            instances: Vec::new(),
            depth: 0,
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn stored(&self, index: usize) -> Stored {
        Stored {
            store: self.id,
            index,
        }
    }

    /// Arena index of `h`, or `None` if it was allocated by another store.
    pub(crate) fn resolve(&self, h: Stored) -> Option<usize> {
        (h.store == self.id).then_some(h.index)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            funcs: self.funcs.len(),
            tables: self.tables.len(),
            mems: self.mems.len(),
            globals: self.globals.len(),
            instances: self.instances.len(),
        }
    }

    /// Drop everything allocated since `cp`. Nothing outside the store may refer to those items.
    pub(crate) fn rollback(&mut self, cp: Checkpoint) {
        self.funcs.truncate(cp.funcs);
        self.tables.truncate(cp.tables);
        self.mems.truncate(cp.mems);
        self.globals.truncate(cp.globals);
        self.instances.truncate(cp.instances);
    }

    pub(crate) fn alloc_func(&mut self, f: FuncInstance) -> usize {
        self.funcs.push(f);
        self.funcs.len() - 1
    }

    pub(crate) fn alloc_table(&mut self, t: TableInstance) -> usize {
        self.tables.push(t);
        self.tables.len() - 1
    }

    pub(crate) fn alloc_memory(&mut self, m: MemoryInstance) -> usize {
        self.mems.push(m);
        self.mems.len() - 1
    }

    pub(crate) fn alloc_global(&mut self, g: GlobalInstance) -> usize {
        self.globals.push(g);
        self.globals.len() - 1
    }

    pub(crate) fn alloc_instance(&mut self, m: ModuleInstance) -> usize {
        self.instances.push(m);
        self.instances.len() - 1
    }

    pub(crate) fn func(&self, addr: usize) -> Result<&FuncInstance, Trap> {
        self.funcs
            .get(addr)
            .ok_or(Trap::BadHandle { what: "function" })
    }

    pub(crate) fn instance(&self, idx: usize) -> Result<&ModuleInstance, Trap> {
        self.instances
            .get(idx)
            .ok_or(Trap::BadHandle { what: "instance" })
    }

    pub(crate) fn memory(&self, addr: usize) -> Result<&MemoryInstance, RangeError> {
        self.mems
            .get(addr)
            .ok_or(RangeError::BadHandle { what: "memory" })
    }

    pub(crate) fn memory_mut(&mut self, addr: usize) -> Result<&mut MemoryInstance, RangeError> {
        self.mems
            .get_mut(addr)
            .ok_or(RangeError::BadHandle { what: "memory" })
    }

    pub(crate) fn table(&self, addr: usize) -> Result<&TableInstance, RangeError> {
        self.tables
            .get(addr)
            .ok_or(RangeError::BadHandle { what: "table" })
    }

    pub(crate) fn table_mut(&mut self, addr: usize) -> Result<&mut TableInstance, RangeError> {
        self.tables
            .get_mut(addr)
            .ok_or(RangeError::BadHandle { what: "table" })
    }

    pub(crate) fn global(&self, addr: usize) -> Result<&GlobalInstance, Trap> {
        self.globals
            .get(addr)
            .ok_or(Trap::BadHandle { what: "global" })
    }

    pub(crate) fn global_mut(&mut self, addr: usize) -> Result<&mut GlobalInstance, Trap> {
        self.globals
            .get_mut(addr)
            .ok_or(Trap::BadHandle { what: "global" })
    }
}
