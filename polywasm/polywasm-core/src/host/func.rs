use std::sync::Arc;

use super::Caller;
use crate::error::Trap;
use crate::model::{FuncType, ValType, Value};
use crate::runtime::store::Stored;
use crate::runtime::{coerce, FuncInstance, Store};
use crate::vm::interpreter;

/// Host callable. It receives the calling context and host-number arguments, and returns the
/// optional result as a host number.
pub type HostFunc = dyn Fn(Caller<'_>, &[f64]) -> Result<Option<f64>, Trap> + Send + Sync;

/// Handle to a function in a [`Store`]: exported wasm code or a host callable.
///
/// Handles compare equal exactly when they name the same store function, so an export looked up
/// twice yields the same `Func`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Func(pub(crate) Stored);

impl Func {
    /// Wrap a host callable without a signature. It is bound to a signature when it satisfies a
    /// function import.
    pub fn wrap<F>(store: &mut Store, f: F) -> Self
    where
        F: Fn(Caller<'_>, &[f64]) -> Result<Option<f64>, Trap> + Send + Sync + 'static,
    {
        let addr = store.alloc_func(FuncInstance::Host {
            ty: None,
            f: Arc::new(f),
        });
        Self(store.stored(addr))
    }

    /// Wrap a host callable with a fixed signature.
    pub fn new<F>(store: &mut Store, ty: FuncType, f: F) -> Self
    where
        F: Fn(Caller<'_>, &[f64]) -> Result<Option<f64>, Trap> + Send + Sync + 'static,
    {
        let addr = store.alloc_func(FuncInstance::Host {
            ty: Some(ty),
            f: Arc::new(f),
        });
        Self(store.stored(addr))
    }

    pub(crate) fn addr(&self, store: &Store) -> Result<usize, Trap> {
        store
            .resolve(self.0)
            .ok_or(Trap::BadHandle { what: "function" })
    }

    /// Signature, or `None` for an unbound host callable.
    pub fn ty(&self, store: &Store) -> Option<FuncType> {
        store.func(self.addr(store).ok()?).ok()?.ty().cloned()
    }

    /// Call with host numbers. Arguments are coerced to the parameter types; i64 parameters or
    /// results trap before anything runs.
    pub fn call(&self, store: &mut Store, args: &[f64]) -> Result<Option<f64>, Trap> {
        let addr = self.addr(store)?;
        let ty = match store.func(addr)? {
            FuncInstance::Host { ty: None, f } => {
                let f = Arc::clone(f);
                return interpreter::call_untyped(store, &*f, args);
            }
            other => other.ty().cloned().unwrap_or_default(),
        };
        if args.len() != ty.params.len() {
            return Err(Trap::ArgumentCount {
                expected: ty.params.len(),
                found: args.len(),
            });
        }
        if ty.result() == Some(ValType::I64) {
            return Err(Trap::I64AtBoundary);
        }
        let values = args
            .iter()
            .zip(&ty.params)
            .map(|(x, t)| coerce::to_wasm(*x, *t))
            .collect::<Result<Vec<_>, _>>()?;
        interpreter::invoke(store, addr, &values)?
            .map(coerce::to_host)
            .transpose()
    }

    /// Call with typed values; each argument must already have its parameter's type.
    pub fn call_values(&self, store: &mut Store, args: &[Value]) -> Result<Option<Value>, Trap> {
        let addr = self.addr(store)?;
        let ty = store
            .func(addr)?
            .ty()
            .cloned()
            .ok_or(Trap::BadHandle {
                what: "untyped function",
            })?;
        if args.len() != ty.params.len() {
            return Err(Trap::ArgumentCount {
                expected: ty.params.len(),
                found: args.len(),
            });
        }
        for (index, (arg, expected)) in args.iter().zip(&ty.params).enumerate() {
            if arg.ty() != *expected {
                return Err(Trap::ArgumentType {
                    index,
                    expected: *expected,
                });
            }
        }
        interpreter::invoke(store, addr, args)
    }
}
