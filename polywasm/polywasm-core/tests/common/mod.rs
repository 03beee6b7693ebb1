#![allow(dead_code)]

use polywasm_core::{instantiate_bytes, Error, Imports, Instance, Store};

/// Route library events to the test output when RUST_LOG is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn wasm(src: &str) -> Vec<u8> {
    wat::parse_str(src).expect("valid text module")
}

/// Assemble, compile and instantiate `src` in `store`.
pub fn load(store: &mut Store, src: &str, imports: &Imports) -> Result<Instance, Error> {
    init_tracing();
    instantiate_bytes(store, &wasm(src), imports).map(|(_, instance)| instance)
}

/// Call export `name` with host numbers.
pub fn call(store: &mut Store, instance: Instance, name: &str, args: &[f64]) -> Option<f64> {
    let f = instance.get_func(store, name).expect("exported function");
    f.call(store, args).expect("call succeeds")
}

/// Wrap section payloads into a module binary: `[id, len, payload...]` per entry.
pub fn module_bytes(sections: &[(u8, &[u8])]) -> Vec<u8> {
    let mut out = b"\0asm".to_vec();
    out.extend_from_slice(&1u32.to_le_bytes());
    for (id, payload) in sections {
        out.push(*id);
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
    }
    out
}
