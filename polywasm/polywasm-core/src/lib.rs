#![doc = r#"
polywasm-core: WebAssembly MVP decoder, structured compiler and interpreter

This crate provides:
- A section decoder that validates a module binary as it reads it
- A function body compiler from opcodes to a structured, slot-addressed IR
- Instantiation against host imports, with numeric coercion at the host boundary
- Host-visible Memory and Table objects living in a Store

Only the i32 numeric family plus f32/f64 constants is executable; i64 values never cross the host
boundary.
"#]

pub mod binary;
pub mod compile;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
mod validate;
pub mod vm;

pub use config::{Config, MAX_PAGES};
pub use error::{DecodeError, Error, LinkError, RangeError, Trap};
pub use host::{Extern, Func, Imports};
pub use model::{ExternalKind, FuncType, GlobalType, Module, ValType, Value};
pub use runtime::{Instance, Memory, Store, StoreId, Table, PAGE_SIZE};

/// Whether `bytes` decode and compile under the default [`Config`].
pub fn validate(bytes: &[u8]) -> bool {
    validate_with(&Config::default(), bytes)
}

pub fn validate_with(config: &Config, bytes: &[u8]) -> bool {
    Module::new(config, bytes).is_ok()
}

/// Decode, validate and compile a module binary.
pub fn compile(bytes: &[u8]) -> Result<Module, DecodeError> {
    compile_with(&Config::default(), bytes)
}

pub fn compile_with(config: &Config, bytes: &[u8]) -> Result<Module, DecodeError> {
    Module::new(config, bytes)
}

/// Link `module` against `imports` inside `store`, apply its segments and run its start function.
pub fn instantiate(store: &mut Store, module: &Module, imports: &Imports) -> Result<Instance, Error> {
    runtime::linker::instantiate(store, module, imports)
}

/// Compile with the store's configuration, then instantiate.
pub fn instantiate_bytes(
    store: &mut Store,
    bytes: &[u8],
    imports: &Imports,
) -> Result<(Module, Instance), Error> {
    let module = Module::new(store.config(), bytes)?;
    let instance = instantiate(store, &module, imports)?;
    Ok((module, instance))
}
