//! Runtime store, instances, host-boundary coercion and the linker.

pub mod coerce;
pub mod global;
pub mod instances;
pub(crate) mod linker;
pub mod memory;
pub mod store;
pub mod table;

pub use global::GlobalInstance;
pub use instances::{FuncInstance, Instance, ModuleInstance};
pub use memory::{Memory, MemoryInstance, PAGE_SIZE};
pub use store::{Store, StoreId};
pub use table::{Table, TableInstance};
