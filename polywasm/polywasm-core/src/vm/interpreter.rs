//! Interpreter over compiled [`Stmt`] bodies.
//!
//! Execution never recurses on the native stack. Each wasm call pushes an [`Activation`] onto a
//! heap stack, and each block, loop or if arm pushes a [`Region`] onto its activation. Only host
//! functions that call back into wasm start a nested run, and each of those counts toward the
//! store's call depth.

use std::sync::Arc;

use tracing::trace;

use crate::compile::{Body, BranchTarget, CompiledFunction, Slot, Stmt};
use crate::error::Trap;
use crate::host::{Caller, HostFunc};
use crate::model::{FuncType, Value};
use crate::runtime::{coerce, FuncInstance, MemoryInstance, Store, TableInstance};
use crate::vm::frames::CallFrame;

/// An open statement list and the index of the next statement to run.
struct Region {
    body: Body,
    pc: usize,
    label: u32,
    /// Loops restart on `Continue`; other regions are left on `Break`.
    is_loop: bool,
}

/// One wasm function call in progress.
struct Activation {
    instance: usize,
    frame: CallFrame,
    /// Innermost last. Empty once the function has returned.
    regions: Vec<Region>,
    /// Caller slot that receives the result.
    result: Option<Slot>,
}

impl Activation {
    fn enter(&mut self, label: u32, body: &Body, is_loop: bool) {
        self.regions.push(Region {
            body: Arc::clone(body),
            pc: 0,
            label,
            is_loop,
        });
    }

    fn region(&self, label: u32) -> Result<usize, Trap> {
        self.regions
            .iter()
            .rposition(|r| r.label == label)
            .ok_or(Trap::BadHandle { what: "label" })
    }

    /// Follow a branch: move the carried operand, then unwind to the target region.
    fn take(&mut self, target: &BranchTarget) -> Result<(), Trap> {
        match target {
            BranchTarget::Break { label, carry } => {
                if let Some((src, dst)) = carry {
                    let v = self.frame.get(*src)?;
                    self.frame.set(*dst, v)?;
                }
                let at = self.region(*label)?;
                self.regions.truncate(at);
            }
            BranchTarget::Continue { label } => {
                let at = self.region(*label)?;
                self.regions.truncate(at + 1);
                if let Some(r) = self.regions.last_mut() {
                    debug_assert!(r.is_loop);
                    r.pc = 0;
                }
            }
            BranchTarget::Return { value } => self.ret(*value)?,
        }
        Ok(())
    }

    fn ret(&mut self, value: Option<Slot>) -> Result<(), Trap> {
        self.frame.ret = value.map(|s| self.frame.get(s)).transpose()?;
        self.regions.clear();
        Ok(())
    }
}

/// Count one more live activation, or trap if the store's budget is spent.
fn push_depth(store: &mut Store) -> Result<(), Trap> {
    let depth = store.depth;
    if depth >= store.config().max_call_depth {
        return Err(Trap::CallStackExhausted { depth });
    }
    store.depth += 1;
    Ok(())
}

/// Call the function at store address `addr`. `args` must match its parameter types.
///
/// The store's depth is restored on return, so a trap never leaves stale activations counted.
pub(crate) fn invoke(store: &mut Store, addr: usize, args: &[Value]) -> Result<Option<Value>, Trap> {
    let base = store.depth;
    let out = execute(store, addr, args);
    store.depth = base;
    out
}

/// Call a host callable that has no signature, with host numbers in and out.
pub(crate) fn call_untyped(
    store: &mut Store,
    f: &HostFunc,
    args: &[f64],
) -> Result<Option<f64>, Trap> {
    let base = store.depth;
    let out = push_depth(store).and_then(|()| f(Caller::new(store, None), args));
    store.depth = base;
    out
}

fn execute(store: &mut Store, addr: usize, args: &[Value]) -> Result<Option<Value>, Trap> {
    match store.func(addr)?.clone() {
        FuncInstance::Wasm { instance, code } => {
            let mut stack = Vec::new();
            push_activation(store, &mut stack, addr, instance, &code, args, None)?;
            run(store, &mut stack)
        }
        FuncInstance::Host { ty: Some(ty), f } => call_host(store, None, &ty, &*f, args),
        FuncInstance::Host { ty: None, .. } => Err(Trap::BadHandle {
            what: "untyped function",
        }),
    }
}

fn push_activation(
    store: &mut Store,
    stack: &mut Vec<Activation>,
    addr: usize,
    instance: usize,
    code: &CompiledFunction,
    args: &[Value],
    result: Option<Slot>,
) -> Result<(), Trap> {
    push_depth(store)?;
    trace!(addr, depth = store.depth, "call");
    let mut act = Activation {
        instance,
        frame: CallFrame::new(code, args),
        regions: Vec::new(),
        result,
    };
    act.enter(0, &code.body, false);
    stack.push(act);
    Ok(())
}

/// Call a typed host function from wasm (`caller` set) or from the host, coercing at the boundary.
fn call_host(
    store: &mut Store,
    caller: Option<usize>,
    ty: &FuncType,
    f: &HostFunc,
    args: &[Value],
) -> Result<Option<Value>, Trap> {
    push_depth(store)?;
    let host_args = args
        .iter()
        .map(|v| coerce::to_host(*v))
        .collect::<Result<Vec<_>, _>>()?;
    let out = f(Caller::new(store, caller), &host_args)?;
    store.depth -= 1;
    match (ty.result(), out) {
        (Some(t), Some(x)) => coerce::to_wasm(x, t).map(Some),
        (None, None) => Ok(None),
        _ => Err(Trap::UnexpectedHostResult),
    }
}

/// Run until the bottom activation returns.
fn run(store: &mut Store, stack: &mut Vec<Activation>) -> Result<Option<Value>, Trap> {
    loop {
        let act = stack.last_mut().ok_or(Trap::BadHandle { what: "frame" })?;
        let Some(region) = act.regions.last_mut() else {
            let done = stack.pop().ok_or(Trap::BadHandle { what: "frame" })?;
            store.depth -= 1;
            match stack.last_mut() {
                None => return Ok(done.frame.ret),
                Some(caller) => {
                    if let Some(dst) = done.result {
                        let v = done.frame.ret.ok_or(Trap::UnexpectedHostResult)?;
                        caller.frame.set(dst, v)?;
                    }
                }
            }
            continue;
        };
        let body = Arc::clone(&region.body);
        let pc = region.pc;
        region.pc += 1;
        match body.get(pc) {
            Some(stmt) => step(store, stack, stmt)?,
            // Falling off the end leaves a block and exits a loop alike.
            None => {
                act.regions.pop();
            }
        }
    }
}

fn step(store: &mut Store, stack: &mut Vec<Activation>, stmt: &Stmt) -> Result<(), Trap> {
    let act = stack.last_mut().ok_or(Trap::BadHandle { what: "frame" })?;
    let frame = &mut act.frame;
    match stmt {
        Stmt::Unreachable => return Err(Trap::Unreachable),
        Stmt::Block { label, body } => act.enter(*label, body, false),
        Stmt::Loop { label, body } => act.enter(*label, body, true),
        Stmt::If {
            label,
            cond,
            then_body,
            else_body,
        } => {
            let arm = if act.frame.i32(*cond)? != 0 {
                then_body
            } else {
                else_body
            };
            act.enter(*label, arm, false);
        }
        Stmt::Branch(target) => act.take(target)?,
        Stmt::BranchIf { cond, target } => {
            if act.frame.i32(*cond)? != 0 {
                act.take(target)?;
            }
        }
        Stmt::BranchTable {
            index,
            targets,
            default,
        } => {
            let i = act.frame.i32(*index)? as u32 as usize;
            act.take(targets.get(i).unwrap_or(default))?;
        }
        Stmt::Return { value } => act.ret(*value)?,
        Stmt::Call { func, args, result } => {
            let addr = func_addr(store, act.instance, *func)?;
            let args = act.frame.gather(args)?;
            return call(store, stack, addr, &args, *result);
        }
        Stmt::CallIndirect {
            type_idx,
            callee,
            args,
            result,
        } => {
            let index = act.frame.i32(*callee)? as u32;
            let addr = resolve_indirect(store, act.instance, *type_idx, index)?;
            let args = act.frame.gather(args)?;
            return call(store, stack, addr, &args, *result);
        }
        Stmt::Copy { dst, src } => {
            let v = frame.get(*src)?;
            frame.set(*dst, v)?;
        }
        Stmt::Const { dst, value } => frame.set(*dst, *value)?,
        Stmt::GlobalGet { dst, global } => {
            let addr = global_addr(store, act.instance, *global)?;
            let v = store.global(addr)?.get();
            frame.set(*dst, v)?;
        }
        Stmt::GlobalSet { global, src } => {
            let addr = global_addr(store, act.instance, *global)?;
            let v = frame.get(*src)?;
            store.global_mut(addr)?.set(v);
        }
        Stmt::Select {
            dst,
            if_false,
            cond,
        } => {
            if frame.i32(*cond)? == 0 {
                let v = frame.get(*if_false)?;
                frame.set(*dst, v)?;
            }
        }
        Stmt::Unary { op, dst, operand } => {
            let v = op.eval(frame.get(*operand)?)?;
            frame.set(*dst, v)?;
        }
        Stmt::Binary { op, dst, lhs, rhs } => {
            let v = op.eval(frame.get(*lhs)?, frame.get(*rhs)?)?;
            frame.set(*dst, v)?;
        }
        Stmt::Load {
            access,
            offset,
            dst,
            addr,
        } => {
            let ea = effective_address(frame.i32(*addr)?, *offset);
            let v = memory(store, act.instance)?.load(*access, ea)?;
            frame.set(*dst, Value::I32(v))?;
        }
        Stmt::Store {
            access,
            offset,
            addr,
            value,
        } => {
            let ea = effective_address(frame.i32(*addr)?, *offset);
            let v = frame.i32(*value)?;
            memory_mut(store, act.instance)?.store(*access, ea, v)?;
        }
        Stmt::MemorySize { dst } => {
            let pages = memory(store, act.instance)?.size_pages();
            frame.set(*dst, Value::I32(pages as i32))?;
        }
        Stmt::MemoryGrow { dst, delta } => {
            let delta = frame.i32(*delta)? as u32;
            let prev = memory_mut(store, act.instance)?
                .grow(delta)
                .map_or(-1, |p| p as i32);
            frame.set(*dst, Value::I32(prev))?;
        }
    }
    Ok(())
}

/// Wasm callees get a new activation; host callees run to completion here.
fn call(
    store: &mut Store,
    stack: &mut Vec<Activation>,
    addr: usize,
    args: &[Value],
    result: Option<Slot>,
) -> Result<(), Trap> {
    match store.func(addr)?.clone() {
        FuncInstance::Wasm { instance, code } => {
            push_activation(store, stack, addr, instance, &code, args, result)
        }
        FuncInstance::Host { ty: Some(ty), f } => {
            let act = stack.last_mut().ok_or(Trap::BadHandle { what: "frame" })?;
            let out = call_host(store, Some(act.instance), &ty, &*f, args)?;
            if let Some(dst) = result {
                act.frame.set(dst, out.ok_or(Trap::UnexpectedHostResult)?)?;
            }
            Ok(())
        }
        FuncInstance::Host { ty: None, .. } => Err(Trap::BadHandle {
            what: "untyped function",
        }),
    }
}

/* ===== Index space lookups through the current instance ===== */

fn func_addr(store: &Store, instance: usize, idx: u32) -> Result<usize, Trap> {
    store
        .instance(instance)?
        .funcs
        .get(idx as usize)
        .copied()
        .ok_or(Trap::BadHandle { what: "function" })
}

fn global_addr(store: &Store, instance: usize, idx: u32) -> Result<usize, Trap> {
    store
        .instance(instance)?
        .globals
        .get(idx as usize)
        .copied()
        .ok_or(Trap::BadHandle { what: "global" })
}

fn memory_addr(store: &Store, instance: usize) -> Result<usize, Trap> {
    store
        .instance(instance)?
        .memories
        .first()
        .copied()
        .ok_or(Trap::BadHandle { what: "memory" })
}

fn memory(store: &Store, instance: usize) -> Result<&MemoryInstance, Trap> {
    let addr = memory_addr(store, instance)?;
    store
        .mems
        .get(addr)
        .ok_or(Trap::BadHandle { what: "memory" })
}

fn memory_mut(store: &mut Store, instance: usize) -> Result<&mut MemoryInstance, Trap> {
    let addr = memory_addr(store, instance)?;
    store
        .mems
        .get_mut(addr)
        .ok_or(Trap::BadHandle { what: "memory" })
}

fn table(store: &Store, instance: usize) -> Result<&TableInstance, Trap> {
    let addr = store
        .instance(instance)?
        .tables
        .first()
        .copied()
        .ok_or(Trap::BadHandle { what: "table" })?;
    store
        .tables
        .get(addr)
        .ok_or(Trap::BadHandle { what: "table" })
}

/// Look up table 0 slot `index` and check the callee against type `type_idx`.
fn resolve_indirect(store: &Store, instance: usize, type_idx: u32, index: u32) -> Result<usize, Trap> {
    let table = table(store, instance)?;
    let addr = table
        .get(index)
        .ok_or(Trap::TableOutOfBounds {
            index,
            size: table.size(),
        })?
        .ok_or(Trap::UninitializedElement { index })?;
    let expected = store
        .instance(instance)?
        .module
        .types
        .get(type_idx as usize)
        .ok_or(Trap::BadHandle { what: "type" })?;
    match store.func(addr)?.ty() {
        Some(found) if found == expected => Ok(addr),
        found => Err(Trap::IndirectCallTypeMismatch {
            expected: expected.signature(),
            found: found.map(|t| t.signature()).unwrap_or_default(),
        }),
    }
}

/// Base address (read as unsigned) plus the static offset; never wraps.
#[inline]
fn effective_address(base: i32, offset: u32) -> u64 {
    u64::from(base as u32) + u64::from(offset)
}
