//! Context handed to host functions.

use super::{Extern, Func};
use crate::runtime::{Instance, Memory, Store};

/// The store a host function runs in, plus the instance whose code called it.
///
/// Through the store a host function can read and write memories and tables, or call back into
/// exported functions. Calls made that way count toward the store's call depth.
pub struct Caller<'a> {
    store: &'a mut Store,
    instance: Option<usize>,
}

impl<'a> Caller<'a> {
    pub(crate) fn new(store: &'a mut Store, instance: Option<usize>) -> Self {
        Self { store, instance }
    }

    pub fn store(&self) -> &Store {
        self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        self.store
    }

    /// Calling instance, or `None` when the host invoked the function directly.
    pub fn instance(&self) -> Option<Instance> {
        self.instance.map(|i| Instance(self.store.stored(i)))
    }

    /// Export of the calling instance.
    pub fn get_export(&self, name: &str) -> Option<Extern> {
        self.instance()?.get_export(self.store(), name)
    }

    pub fn get_func(&self, name: &str) -> Option<Func> {
        self.instance()?.get_func(self.store(), name)
    }

    pub fn get_memory(&self, name: &str) -> Option<Memory> {
        self.instance()?.get_memory(self.store(), name)
    }
}
