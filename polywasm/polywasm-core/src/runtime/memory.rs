//! Linear memory (MVP, 32-bit index space).
//!
//! [`MemoryInstance`] owns the bytes and implements page-based growth and the bounds-checked
//! little-endian accesses used by compiled code. [`Memory`] is the host-facing handle.

use crate::compile::MemAccess;
use crate::error::{RangeError, Trap};
use crate::model::{Limits, MemoryType};

use super::store::Stored;
use super::Store;

/// WASM page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    buf: Vec<u8>,
    /// Declared maximum, kept for import checks.
    max: Option<u32>,
    /// Effective page cap: the declared maximum clamped by the store's configuration.
    limit: u32,
}

/// Allocate `pages` zeroed pages more, or fail without touching `buf`.
fn reserve_pages(buf: &mut Vec<u8>, pages: u32) -> bool {
    let additional = pages as usize * PAGE_SIZE;
    if buf.try_reserve_exact(additional).is_err() {
        return false;
    }
    buf.resize(buf.len() + additional, 0);
    true
}

impl MemoryInstance {
    /// Create a memory from its limits; `cap` is the configured page ceiling.
    pub fn new(ty: &MemoryType, cap: u32) -> Result<Self, RangeError> {
        let Limits { min, max } = ty.limits;
        let limit = max.unwrap_or(cap).min(cap);
        if min > limit {
            return Err(RangeError::InvalidLimits {
                initial: min,
                maximum: u64::from(limit),
            });
        }
        let mut buf = Vec::new();
        if !reserve_pages(&mut buf, min) {
            return Err(RangeError::GrowOutOfRange {
                current: 0,
                delta: min,
                maximum: u64::from(limit),
            });
        }
        Ok(Self { buf, max, limit })
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Grow by `delta` pages and return the previous size. On failure nothing changes.
    pub fn grow(&mut self, delta: u32) -> Result<u32, RangeError> {
        let prev = self.size_pages();
        let err = RangeError::GrowOutOfRange {
            current: prev,
            delta,
            maximum: u64::from(self.limit),
        };
        match prev.checked_add(delta) {
            Some(new) if new <= self.limit => {}
            _ => return Err(err),
        }
        if !reserve_pages(&mut self.buf, delta) {
            return Err(err);
        }
        Ok(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /* ===== Bounds-checked loads/stores (little-endian) ===== */

    #[inline]
    fn range(&self, addr: u64, len: u32) -> Result<std::ops::Range<usize>, Trap> {
        let oob = Trap::MemoryOutOfBounds { addr, len };
        let end = addr.checked_add(u64::from(len)).ok_or(oob.clone())?;
        if end > self.buf.len() as u64 {
            return Err(oob);
        }
        Ok(addr as usize..end as usize)
    }

    /// Load with the width and extension of `access`.
    pub fn load(&self, access: MemAccess, addr: u64) -> Result<i32, Trap> {
        let r = self.range(addr, access.width())?;
        let b = &self.buf[r];
        Ok(match access {
            MemAccess::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            MemAccess::I32From8S => i32::from(b[0] as i8),
            MemAccess::I32From8U => i32::from(b[0]),
            MemAccess::I32From16S => i32::from(i16::from_le_bytes([b[0], b[1]])),
            MemAccess::I32From16U => i32::from(u16::from_le_bytes([b[0], b[1]])),
        })
    }

    /// Store the low `access.width()` bytes of `value`.
    pub fn store(&mut self, access: MemAccess, addr: u64, value: i32) -> Result<(), Trap> {
        let r = self.range(addr, access.width())?;
        let width = r.len();
        self.buf[r].copy_from_slice(&value.to_le_bytes()[..width]);
        Ok(())
    }
}

/// Host handle to a memory living in a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory(pub(crate) Stored);

impl Memory {
    /// Allocate a memory of `initial` pages, growable up to `maximum` (or the store's page cap).
    pub fn new(store: &mut Store, initial: u32, maximum: Option<u32>) -> Result<Self, RangeError> {
        let ty = MemoryType {
            limits: Limits::new(initial, maximum),
        };
        if maximum.is_some_and(|max| max < initial) {
            return Err(RangeError::InvalidLimits {
                initial,
                maximum: u64::from(maximum.unwrap_or_default()),
            });
        }
        let mem = MemoryInstance::new(&ty, store.config().max_memory_pages)?;
        let addr = store.alloc_memory(mem);
        Ok(Self(store.stored(addr)))
    }

    pub(crate) fn addr(&self, store: &Store) -> Result<usize, RangeError> {
        store
            .resolve(self.0)
            .ok_or(RangeError::BadHandle { what: "memory" })
    }

    /// Current size in pages.
    pub fn size(&self, store: &Store) -> Result<u32, RangeError> {
        store.memory(self.addr(store)?).map(MemoryInstance::size_pages)
    }

    pub fn maximum(&self, store: &Store) -> Result<Option<u32>, RangeError> {
        store.memory(self.addr(store)?).map(MemoryInstance::max)
    }

    pub fn data<'s>(&self, store: &'s Store) -> Result<&'s [u8], RangeError> {
        store.memory(self.addr(store)?).map(MemoryInstance::data)
    }

    pub fn data_mut<'s>(&self, store: &'s mut Store) -> Result<&'s mut [u8], RangeError> {
        let addr = self.addr(store)?;
        store.memory_mut(addr).map(MemoryInstance::data_mut)
    }

    /// Grow by `delta` pages, returning the previous page count.
    pub fn grow(&self, store: &mut Store, delta: u32) -> Result<u32, RangeError> {
        let addr = self.addr(store)?;
        store.memory_mut(addr)?.grow(delta)
    }
}
