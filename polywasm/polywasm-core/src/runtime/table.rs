//! Function table (MVP funcref only). Slots hold store addresses of functions.

use crate::error::RangeError;
use crate::host::Func;
use crate::model::{Limits, RefType, TableType};

use super::store::Stored;
use super::{FuncInstance, Store};

#[derive(Debug, Clone)]
pub struct TableInstance {
    elems: Vec<Option<usize>>,
    max: Option<u32>,
    limit: u32,
}

impl TableInstance {
    /// Create a table from its limits; `cap` is the configured element ceiling.
    pub fn new(ty: &TableType, cap: u32) -> Result<Self, RangeError> {
        let Limits { min, max } = ty.limits;
        let limit = max.unwrap_or(cap).min(cap);
        if min > limit {
            return Err(RangeError::InvalidLimits {
                initial: min,
                maximum: u64::from(limit),
            });
        }
        let mut elems = Vec::new();
        if elems.try_reserve_exact(min as usize).is_err() {
            return Err(RangeError::GrowOutOfRange {
                current: 0,
                delta: min,
                maximum: u64::from(limit),
            });
        }
        elems.resize(min as usize, None);
        Ok(Self { elems, max, limit })
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// `None` when out of bounds, `Some(None)` for an empty slot.
    pub fn get(&self, idx: u32) -> Option<Option<usize>> {
        self.elems.get(idx as usize).copied()
    }

    pub fn set(&mut self, idx: u32, func: Option<usize>) -> Result<(), RangeError> {
        let len = self.size();
        let slot = self
            .elems
            .get_mut(idx as usize)
            .ok_or(RangeError::IndexOutOfBounds { index: idx, len })?;
        *slot = func;
        Ok(())
    }

    /// Grow by `delta` empty slots and return the previous size. On failure nothing changes.
    pub fn grow(&mut self, delta: u32) -> Result<u32, RangeError> {
        let prev = self.size();
        let err = RangeError::GrowOutOfRange {
            current: prev,
            delta,
            maximum: u64::from(self.limit),
        };
        match prev.checked_add(delta) {
            Some(new) if new <= self.limit => {}
            _ => return Err(err),
        }
        if self.elems.try_reserve_exact(delta as usize).is_err() {
            return Err(err);
        }
        self.elems.resize((prev + delta) as usize, None);
        Ok(prev)
    }
}

/// Host handle to a table living in a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table(pub(crate) Stored);

impl Table {
    /// Allocate a table of `initial` empty slots, growable up to `maximum` (or the store's cap).
    pub fn new(store: &mut Store, initial: u32, maximum: Option<u32>) -> Result<Self, RangeError> {
        if maximum.is_some_and(|max| max < initial) {
            return Err(RangeError::InvalidLimits {
                initial,
                maximum: u64::from(maximum.unwrap_or_default()),
            });
        }
        let ty = TableType {
            elem: RefType::FuncRef,
            limits: Limits::new(initial, maximum),
        };
        let table = TableInstance::new(&ty, store.config().max_table_elements)?;
        let addr = store.alloc_table(table);
        Ok(Self(store.stored(addr)))
    }

    pub(crate) fn addr(&self, store: &Store) -> Result<usize, RangeError> {
        store
            .resolve(self.0)
            .ok_or(RangeError::BadHandle { what: "table" })
    }

    pub fn size(&self, store: &Store) -> Result<u32, RangeError> {
        store.table(self.addr(store)?).map(TableInstance::size)
    }

    pub fn maximum(&self, store: &Store) -> Result<Option<u32>, RangeError> {
        store.table(self.addr(store)?).map(TableInstance::max)
    }

    pub fn get(&self, store: &Store, idx: u32) -> Result<Option<Func>, RangeError> {
        let table = store.table(self.addr(store)?)?;
        table
            .get(idx)
            .map(|slot| slot.map(|addr| Func(store.stored(addr))))
            .ok_or(RangeError::IndexOutOfBounds {
                index: idx,
                len: table.size(),
            })
    }

    /// Store `func` (or clear the slot). Only functions with a known signature can be called
    /// indirectly, so untyped host callables are rejected.
    pub fn set(&self, store: &mut Store, idx: u32, func: Option<Func>) -> Result<(), RangeError> {
        let taddr = self.addr(store)?;
        let faddr = match func {
            Some(f) => {
                let addr = store
                    .resolve(f.0)
                    .ok_or(RangeError::BadHandle { what: "function" })?;
                match store.funcs.get(addr) {
                    None => return Err(RangeError::BadHandle { what: "function" }),
                    Some(FuncInstance::Host { ty: None, .. }) => {
                        return Err(RangeError::UntypedFunction)
                    }
                    Some(_) => Some(addr),
                }
            }
            None => None,
        };
        store.table_mut(taddr)?.set(idx, faddr)
    }

    pub fn grow(&self, store: &mut Store, delta: u32) -> Result<u32, RangeError> {
        let addr = self.addr(store)?;
        store.table_mut(addr)?.grow(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(min: u32, max: Option<u32>) -> TableInstance {
        let ty = TableType { elem: RefType::FuncRef, limits: Limits::new(min, max) };
        TableInstance::new(&ty, 1_000).unwrap()
    }

    #[test]
    fn get_set_bounds() {
        let mut t = table(2, None);
        assert_eq!(t.get(0), Some(None));
        t.set(1, Some(7)).unwrap();
        assert_eq!(t.get(1), Some(Some(7)));
        assert_eq!(t.get(2), None);
        assert_eq!(t.set(2, Some(1)), Err(RangeError::IndexOutOfBounds { index: 2, len: 2 }));
    }

    #[test]
    fn grow_is_all_or_nothing() {
        let mut t = table(1, Some(3));
        assert_eq!(t.grow(2), Ok(1));
        assert_eq!(t.size(), 3);
        assert_eq!(t.get(2), Some(None));
        assert!(t.grow(1).is_err());
        assert!(t.grow(u32::MAX).is_err());
        assert_eq!(t.size(), 3);
    }

    #[test]
    fn untyped_host_functions_cannot_be_stored() {
        let mut store = Store::new();
        let t = Table::new(&mut store, 1, None).unwrap();
        let f = Func::wrap(&mut store, |_, _| Ok(None));
        assert_eq!(t.set(&mut store, 0, Some(f)), Err(RangeError::UntypedFunction));
        assert_eq!(t.get(&store, 0), Ok(None));
        assert_eq!(t.get(&store, 1), Err(RangeError::IndexOutOfBounds { index: 1, len: 1 }));
    }

    #[test]
    fn functions_from_another_store_are_rejected() {
        let mut a = Store::new();
        let mut b = Store::new();
        let t = Table::new(&mut b, 1, None).unwrap();
        let f = Func::new(&mut a, crate::model::FuncType::default(), |_, _| Ok(None));
        Func::new(&mut b, crate::model::FuncType::default(), |_, _| Ok(None));
        assert_eq!(t.set(&mut b, 0, Some(f)), Err(RangeError::BadHandle { what: "function" }));
        assert_eq!(t.size(&a), Err(RangeError::BadHandle { what: "table" }));
        assert_eq!(t.get(&b, 0), Ok(None));
    }
}
