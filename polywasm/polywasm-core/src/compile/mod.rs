//! Function body compiler.
//!
//! Turns one function's opcode stream into a tree of structured [`Stmt`]s while checking operand
//! types against a per-frame operand-type stack. Stack temporaries are assigned slots by their height
//! within their value type's lane, so every branch into a frame agrees on where its result lives.

pub mod frames;
pub mod ir;
pub mod numeric;
pub mod opcodes;

use tracing::trace;

use crate::binary::{leb128, types::read_block_type, Cursor, Result};
use crate::config::Config;
use crate::error::DecodeError;
use crate::model::{BlockType, FuncType, ModuleData, ValType, Value};

use frames::{ControlFrame, FrameKind};
pub use ir::{Body, BranchTarget, LaneCounts, MemAccess, Slot, Stmt};
use numeric::NumericOp;
use opcodes::op;

/// A compiled function body plus the slot counts the interpreter must allocate for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub ty: FuncType,
    /// Parameters followed by declared locals.
    pub locals: Vec<ValType>,
    pub body: Body,
    pub local_slots: LaneCounts,
    pub stack_slots: LaneCounts,
}

/// Compile one function body. `cur` must be bounded to the body; the local declarations have
/// already been read as `(count, type)` runs.
pub(crate) fn compile_function(
    config: &Config,
    module: &ModuleData,
    ty: &FuncType,
    local_decls: &[(u32, ValType)],
    cur: &mut Cursor,
) -> Result<CompiledFunction> {
    let offset = cur.offset();
    let declared: u64 = local_decls.iter().map(|(n, _)| u64::from(*n)).sum();
    let total = declared + ty.params.len() as u64;
    if total > u64::from(config.max_function_locals) {
        return Err(DecodeError::LimitExceeded {
            what: "function locals",
            limit: u64::from(config.max_function_locals),
            offset,
        });
    }

    let mut locals = ty.params.clone();
    for &(n, t) in local_decls {
        locals.extend(std::iter::repeat(t).take(n as usize));
    }
    let mut local_slots = LaneCounts::default();
    for t in &locals {
        local_slots[*t] += 1;
    }

    let compiler = FunctionCompiler {
        config,
        module,
        ty,
        locals,
        frames: vec![ControlFrame::new(
            FrameKind::Function,
            ty.result(),
            0,
            LaneCounts::default(),
            offset,
        )],
        max_stack: LaneCounts::default(),
        offset,
    };
    let (locals, body, stack_slots) = compiler.run(cur)?;
    trace!(
        locals = locals.len(),
        stack_slots = ?stack_slots.0,
        stmts = body.len(),
        "compiled function body"
    );
    Ok(CompiledFunction {
        ty: ty.clone(),
        locals,
        body: body.into(),
        local_slots,
        stack_slots,
    })
}

struct FunctionCompiler<'a> {
    config: &'a Config,
    module: &'a ModuleData,
    ty: &'a FuncType,
    locals: Vec<ValType>,
    frames: Vec<ControlFrame>,
    max_stack: LaneCounts,
    /// Offset of the opcode being compiled.
    offset: usize,
}

impl<'a> FunctionCompiler<'a> {
    fn run(mut self, cur: &mut Cursor) -> Result<(Vec<ValType>, Vec<Stmt>, LaneCounts)> {
        loop {
            self.offset = cur.offset();
            let opcode = cur.read_u8()?;
            if opcode == op::END && self.frames.len() == 1 {
                let body = self.end_function()?;
                if !cur.is_eof() {
                    tracing::warn!(
                        offset = cur.offset(),
                        skipped = cur.remaining(),
                        "bytes after final end of function body"
                    );
                }
                return Ok((self.locals, body, self.max_stack));
            }
            self.step(opcode, cur)?;
        }
    }

    fn step(&mut self, opcode: u8, cur: &mut Cursor) -> Result<()> {
        match opcode {
            op::UNREACHABLE => {
                self.emit(Stmt::Unreachable);
                self.top_mut().make_unreachable();
            }
            op::NOP => {}
            op::BLOCK => {
                let bt = read_block_type(cur)?;
                self.open(FrameKind::Block, bt)?;
            }
            op::LOOP => {
                let bt = read_block_type(cur)?;
                self.open(FrameKind::Loop, bt)?;
            }
            op::IF => {
                let bt = read_block_type(cur)?;
                let cond = self.pop_type(ValType::I32)?;
                self.open(FrameKind::If { cond }, bt)?;
            }
            op::ELSE => self.begin_else()?,
            op::END => self.end_block()?,
            op::BR => {
                let depth = leb128::read_varuint32(cur)?;
                let idx = self.frame_index(depth)?;
                let target = self.take_branch_operand(idx)?;
                self.emit(Stmt::Branch(target));
                self.top_mut().make_unreachable();
            }
            op::BR_IF => {
                let depth = leb128::read_varuint32(cur)?;
                let idx = self.frame_index(depth)?;
                let cond = self.pop_type(ValType::I32)?;
                let target = self.take_branch_operand(idx)?;
                // the carried value stays on the stack when the branch is not taken
                if let Some(t) = self.frames[idx].label_type() {
                    self.push(t);
                }
                self.emit(Stmt::BranchIf { cond, target });
            }
            op::BR_TABLE => self.branch_table(cur)?,
            op::RETURN => {
                let value = match self.ty.result() {
                    Some(t) => Some(self.pop_type(t)?),
                    None => None,
                };
                self.emit(Stmt::Return { value });
                self.top_mut().make_unreachable();
            }
            op::CALL => {
                let func = leb128::read_varuint32(cur)?;
                let module = self.module;
                let callee = module.func_type(func).ok_or(DecodeError::IndexOutOfRange {
                    space: "function",
                    index: func,
                    offset: self.offset,
                })?;
                let args = self.pop_args(&callee.params)?;
                let result = callee.result().map(|t| self.push(t));
                self.emit(Stmt::Call { func, args, result });
            }
            op::CALL_INDIRECT => {
                let type_idx = leb128::read_varuint32(cur)?;
                let reserved = cur.read_u8()?;
                if reserved != 0 {
                    return Err(DecodeError::NonZeroIndex {
                        what: "call_indirect table",
                        index: u32::from(reserved),
                        offset: self.offset,
                    });
                }
                if self.module.total_tables() == 0 {
                    return Err(DecodeError::IndexOutOfRange {
                        space: "table",
                        index: 0,
                        offset: self.offset,
                    });
                }
                let module = self.module;
                let callee_ty = module.types.get(type_idx as usize).ok_or(DecodeError::IndexOutOfRange {
                    space: "type",
                    index: type_idx,
                    offset: self.offset,
                })?;
                let callee = self.pop_type(ValType::I32)?;
                let args = self.pop_args(&callee_ty.params)?;
                let result = callee_ty.result().map(|t| self.push(t));
                self.emit(Stmt::CallIndirect {
                    type_idx,
                    callee,
                    args,
                    result,
                });
            }
            op::DROP => {
                self.pop(None)?;
            }
            op::SELECT => {
                let cond = self.pop_type(ValType::I32)?;
                let (t, if_false) = self.pop(None)?;
                let dst = self.pop_type(t)?;
                self.push(t);
                self.emit(Stmt::Select {
                    dst,
                    if_false,
                    cond,
                });
            }
            op::GET_LOCAL => {
                let (idx, t) = self.local(cur)?;
                let dst = self.push(t);
                self.emit(Stmt::Copy {
                    dst,
                    src: Slot::Local(idx),
                });
            }
            op::SET_LOCAL => {
                let (idx, t) = self.local(cur)?;
                let src = self.pop_type(t)?;
                self.emit(Stmt::Copy {
                    dst: Slot::Local(idx),
                    src,
                });
            }
            op::TEE_LOCAL => {
                let (idx, t) = self.local(cur)?;
                let src = self.pop_type(t)?;
                self.push(t);
                self.emit(Stmt::Copy {
                    dst: Slot::Local(idx),
                    src,
                });
            }
            op::GET_GLOBAL => {
                let global = leb128::read_varuint32(cur)?;
                let gt = self.global(global)?;
                let dst = self.push(gt.val_type);
                self.emit(Stmt::GlobalGet { dst, global });
            }
            op::SET_GLOBAL => {
                let global = leb128::read_varuint32(cur)?;
                let gt = self.global(global)?;
                if !gt.mutable {
                    return Err(DecodeError::ImmutableGlobal {
                        index: global,
                        offset: self.offset,
                    });
                }
                let src = self.pop_type(gt.val_type)?;
                self.emit(Stmt::GlobalSet { global, src });
            }
            op::I32_LOAD
            | op::I32_LOAD8_S
            | op::I32_LOAD8_U
            | op::I32_LOAD16_S
            | op::I32_LOAD16_U => {
                let access = match opcode {
                    op::I32_LOAD => MemAccess::I32,
                    op::I32_LOAD8_S => MemAccess::I32From8S,
                    op::I32_LOAD8_U => MemAccess::I32From8U,
                    op::I32_LOAD16_S => MemAccess::I32From16S,
                    _ => MemAccess::I32From16U,
                };
                let offset = self.memarg(cur, access)?;
                let addr = self.pop_type(ValType::I32)?;
                let dst = self.push(ValType::I32);
                self.emit(Stmt::Load {
                    access,
                    offset,
                    dst,
                    addr,
                });
            }
            op::I32_STORE | op::I32_STORE8 | op::I32_STORE16 => {
                let access = match opcode {
                    op::I32_STORE => MemAccess::I32,
                    op::I32_STORE8 => MemAccess::I32From8U,
                    _ => MemAccess::I32From16U,
                };
                let offset = self.memarg(cur, access)?;
                let value = self.pop_type(ValType::I32)?;
                let addr = self.pop_type(ValType::I32)?;
                self.emit(Stmt::Store {
                    access,
                    offset,
                    addr,
                    value,
                });
            }
            op::CURRENT_MEMORY => {
                self.memory_reserved(cur)?;
                let dst = self.push(ValType::I32);
                self.emit(Stmt::MemorySize { dst });
            }
            op::GROW_MEMORY => {
                self.memory_reserved(cur)?;
                let delta = self.pop_type(ValType::I32)?;
                let dst = self.push(ValType::I32);
                self.emit(Stmt::MemoryGrow { dst, delta });
            }
            op::I32_CONST => {
                let v = leb128::read_varint32(cur)?;
                self.constant(Value::I32(v));
            }
            op::I64_CONST => {
                let v = leb128::read_varint64(cur)?;
                self.constant(Value::I64(v));
            }
            op::F32_CONST => {
                let bits = cur.read_u32()?;
                self.constant(Value::F32(bits));
            }
            op::F64_CONST => {
                let bits = cur.read_u64()?;
                self.constant(Value::F64(bits));
            }
            _ => match numeric::decode(opcode) {
                Some(NumericOp::Unary(op)) => {
                    let operand = self.pop_type(op.operand())?;
                    let dst = self.push(op.result());
                    self.emit(Stmt::Unary { op, dst, operand });
                }
                Some(NumericOp::Binary(op)) => {
                    let rhs = self.pop_type(op.operand())?;
                    let lhs = self.pop_type(op.operand())?;
                    let dst = self.push(op.result());
                    self.emit(Stmt::Binary { op, dst, lhs, rhs });
                }
                None => {
                    return Err(DecodeError::UnsupportedOpcode {
                        opcode,
                        offset: self.offset,
                    })
                }
            },
        }
        Ok(())
    }

    /* ---------- operand-type stack ---------- */

    fn top(&self) -> &ControlFrame {
        // the function frame is only popped by `end_function`
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ControlFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn emit(&mut self, stmt: Stmt) {
        self.top_mut().body.push(stmt);
    }

    fn push(&mut self, t: ValType) -> Slot {
        let frame = self.top_mut();
        let slot = frame.next_slot(t);
        frame.types.push(t);
        frame.live[t] += 1;
        let height = frame.height();
        self.max_stack.raise_to(&height);
        slot
    }

    /// Pop one operand, optionally demanding its type. Returns the popped type and its slot.
    fn pop(&mut self, expected: Option<ValType>) -> Result<(ValType, Slot)> {
        let offset = self.offset;
        let frame = self.top_mut();
        match frame.types.pop() {
            Some(t) => {
                frame.live[t] -= 1;
                if let Some(e) = expected {
                    if e != t {
                        return Err(DecodeError::TypeMismatch {
                            expected: e,
                            found: t,
                            offset,
                        });
                    }
                }
                Ok((t, frame.next_slot(t)))
            }
            None if frame.unreachable => {
                // dead code: hand out a placeholder slot of the demanded type
                let t = expected.unwrap_or_default();
                let slot = frame.next_slot(t);
                let mut height = frame.height();
                height[t] += 1;
                self.max_stack.raise_to(&height);
                Ok((t, slot))
            }
            None => {
                if self.frames.iter().any(|f| !f.types.is_empty()) {
                    Err(DecodeError::OutsideCurrentBlock { offset })
                } else {
                    Err(DecodeError::StackUnderflow { offset })
                }
            }
        }
    }

    fn pop_type(&mut self, t: ValType) -> Result<Slot> {
        self.pop(Some(t)).map(|(_, slot)| slot)
    }

    /// Pop call arguments (last parameter on top) and return them in parameter order.
    fn pop_args(&mut self, params: &[ValType]) -> Result<Vec<Slot>> {
        let mut args = params
            .iter()
            .rev()
            .map(|t| self.pop_type(*t))
            .collect::<Result<Vec<_>>>()?;
        args.reverse();
        Ok(args)
    }

    fn constant(&mut self, value: Value) {
        let dst = self.push(value.ty());
        self.emit(Stmt::Const { dst, value });
    }

    /* ---------- control frames ---------- */

    fn open(&mut self, kind: FrameKind, bt: BlockType) -> Result<()> {
        if self.frames.len() > self.config.max_control_depth {
            return Err(DecodeError::LimitExceeded {
                what: "control nesting",
                limit: self.config.max_control_depth as u64,
                offset: self.offset,
            });
        }
        let base = self.top().height();
        let label = self.frames.len() as u32;
        self.frames
            .push(ControlFrame::new(kind, bt.result(), label, base, self.offset));
        Ok(())
    }

    /// Check the operands left in a frame against its declared result.
    fn check_frame_end(&self, frame: &ControlFrame) -> Result<()> {
        let expected = usize::from(frame.result.is_some());
        let found = frame.types.len();
        let arity_ok = if frame.unreachable {
            found <= expected
        } else {
            found == expected
        };
        if !arity_ok {
            return Err(DecodeError::BlockArity {
                expected,
                found,
                offset: self.offset,
            });
        }
        if let (Some(want), Some(&got)) = (frame.result, frame.types.first()) {
            if want != got {
                return Err(DecodeError::TypeMismatch {
                    expected: want,
                    found: got,
                    offset: self.offset,
                });
            }
        }
        Ok(())
    }

    fn begin_else(&mut self) -> Result<()> {
        if !matches!(self.top().kind, FrameKind::If { .. }) {
            return Err(DecodeError::ElseWithoutIf {
                offset: self.offset,
            });
        }
        self.check_frame_end(self.top())?;
        let frame = self.top_mut();
        let then_body = std::mem::take(&mut frame.body);
        if let FrameKind::If { cond } = frame.kind {
            frame.kind = FrameKind::Else { cond, then_body };
        }
        frame.types.clear();
        frame.live = LaneCounts::default();
        frame.unreachable = false;
        Ok(())
    }

    fn end_block(&mut self) -> Result<()> {
        self.check_frame_end(self.top())?;
        let frame = self.frames.pop().ok_or(DecodeError::Malformed {
            offset: self.offset,
            msg: "no open block",
        })?;
        let ControlFrame {
            kind,
            result,
            label,
            body,
            offset,
            ..
        } = frame;
        let stmt = match kind {
            FrameKind::Block => Stmt::Block {
                label,
                body: body.into(),
            },
            FrameKind::Loop => Stmt::Loop {
                label,
                body: body.into(),
            },
            FrameKind::If { cond } => {
                if result.is_some() {
                    return Err(DecodeError::IfWithoutElse { offset });
                }
                Stmt::If {
                    label,
                    cond,
                    then_body: body.into(),
                    else_body: Vec::new().into(),
                }
            }
            FrameKind::Else { cond, then_body } => Stmt::If {
                label,
                cond,
                then_body: then_body.into(),
                else_body: body.into(),
            },
            FrameKind::Function => {
                return Err(DecodeError::Malformed {
                    offset,
                    msg: "function frame closed as a block",
                })
            }
        };
        self.emit(stmt);
        if let Some(t) = result {
            // lands on the frame's output slot
            self.push(t);
        }
        Ok(())
    }

    fn end_function(&mut self) -> Result<Vec<Stmt>> {
        let mut frame = self.frames.pop().ok_or(DecodeError::Malformed {
            offset: self.offset,
            msg: "no open function frame",
        })?;
        self.check_frame_end(&frame)?;
        if !frame.unreachable {
            let value = frame.result.map(|t| frame.output_slot(t));
            frame.body.push(Stmt::Return { value });
        }
        Ok(frame.body)
    }

    /* ---------- branches ---------- */

    /// Index into `frames` of the frame `depth` levels out from the innermost.
    fn frame_index(&self, depth: u32) -> Result<usize> {
        let len = self.frames.len();
        (depth as usize)
            .checked_add(1)
            .and_then(|d| len.checked_sub(d))
            .ok_or(DecodeError::BranchDepth {
                depth,
                offset: self.offset,
            })
    }

    /// Pop the operand a branch to `frames[idx]` carries and build the branch target.
    fn take_branch_operand(&mut self, idx: usize) -> Result<BranchTarget> {
        let carried = match self.frames[idx].label_type() {
            Some(t) => Some(self.pop_type(t)?),
            None => None,
        };
        Ok(self.target(idx, carried))
    }

    fn target(&self, idx: usize, carried: Option<Slot>) -> BranchTarget {
        let frame = &self.frames[idx];
        match frame.kind {
            FrameKind::Function => BranchTarget::Return { value: carried },
            FrameKind::Loop => BranchTarget::Continue { label: frame.label },
            _ => BranchTarget::Break {
                label: frame.label,
                carry: carried
                    .zip(frame.result)
                    .map(|(src, t)| (src, frame.output_slot(t))),
            },
        }
    }

    fn branch_table(&mut self, cur: &mut Cursor) -> Result<()> {
        let depths = crate::binary::reader::read_vec(cur, leb128::read_varuint32)?;
        let default_depth = leb128::read_varuint32(cur)?;
        let default_idx = self.frame_index(default_depth)?;
        let label_type = self.frames[default_idx].label_type();
        let mut indices = Vec::with_capacity(depths.len());
        for depth in depths {
            let idx = self.frame_index(depth)?;
            if self.frames[idx].label_type() != label_type {
                return Err(DecodeError::BranchTableArity {
                    offset: self.offset,
                });
            }
            indices.push(idx);
        }
        let index = self.pop_type(ValType::I32)?;
        let carried = match label_type {
            Some(t) => Some(self.pop_type(t)?),
            None => None,
        };
        let targets = indices
            .into_iter()
            .map(|idx| self.target(idx, carried))
            .collect();
        let default = self.target(default_idx, carried);
        self.emit(Stmt::BranchTable {
            index,
            targets,
            default,
        });
        self.top_mut().make_unreachable();
        Ok(())
    }

    /* ---------- immediates ---------- */

    fn local(&self, cur: &mut Cursor) -> Result<(u32, ValType)> {
        let idx = leb128::read_varuint32(cur)?;
        let t = self
            .locals
            .get(idx as usize)
            .copied()
            .ok_or(DecodeError::IndexOutOfRange {
                space: "local",
                index: idx,
                offset: self.offset,
            })?;
        Ok((idx, t))
    }

    fn global(&self, idx: u32) -> Result<crate::model::GlobalType> {
        self.module
            .global_type(idx)
            .ok_or(DecodeError::IndexOutOfRange {
                space: "global",
                index: idx,
                offset: self.offset,
            })
    }

    fn require_memory(&self) -> Result<()> {
        if self.module.total_memories() == 0 {
            return Err(DecodeError::IndexOutOfRange {
                space: "memory",
                index: 0,
                offset: self.offset,
            });
        }
        Ok(())
    }

    /// Read `align` and `offset`; returns the offset.
    fn memarg(&self, cur: &mut Cursor, access: MemAccess) -> Result<u32> {
        let align = leb128::read_varuint32(cur)?;
        let offset = leb128::read_varuint32(cur)?;
        self.require_memory()?;
        let width = access.width();
        if align >= 32 || (1u32 << align) > width {
            return Err(DecodeError::BadAlignment {
                align,
                width,
                offset: self.offset,
            });
        }
        Ok(offset)
    }

    fn memory_reserved(&self, cur: &mut Cursor) -> Result<()> {
        let reserved = cur.read_u8()?;
        if reserved != 0 {
            return Err(DecodeError::NonZeroIndex {
                what: "memory",
                index: u32::from(reserved),
                offset: self.offset,
            });
        }
        self.require_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalType, Import, ImportDesc, MemoryType, TableType};

    fn i32_i32_to_i32() -> FuncType {
        FuncType::new([ValType::I32, ValType::I32], [ValType::I32])
    }

    fn module_with(types: Vec<FuncType>) -> ModuleData {
        ModuleData {
            func_type_indices: vec![0],
            types,
            ..Default::default()
        }
    }

    fn compile(module: &ModuleData, ty: &FuncType, locals: &[(u32, ValType)], body: &[u8]) -> Result<CompiledFunction> {
        compile_function(&Config::default(), module, ty, locals, &mut Cursor::new(body))
    }

    fn s(lane: ValType, height: u32) -> Slot {
        Slot::Stack { lane, height }
    }

    #[test]
    fn add_compiles_to_straight_line_ir() {
        let ty = i32_i32_to_i32();
        let m = module_with(vec![ty.clone()]);
        let f = compile(&m, &ty, &[], &[0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B]).unwrap();
        let i = ValType::I32;
        assert_eq!(
            f.body.to_vec(),
            vec![
                Stmt::Copy { dst: s(i, 0), src: Slot::Local(0) },
                Stmt::Copy { dst: s(i, 1), src: Slot::Local(1) },
                Stmt::Binary { op: numeric::BinaryOp::I32Add, dst: s(i, 0), lhs: s(i, 0), rhs: s(i, 1) },
                Stmt::Return { value: Some(s(i, 0)) },
            ]
        );
        assert_eq!(f.stack_slots, LaneCounts([2, 0, 0, 0]));
        assert_eq!(f.local_slots, LaneCounts([2, 0, 0, 0]));
    }

    #[test]
    fn lanes_are_counted_per_type() {
        let ty = FuncType::new([], [ValType::F64]);
        let m = module_with(vec![ty.clone()]);
        // i32.const 1; f32.const 0; drop; drop; f64.const 0; end
        let mut body = vec![0x41, 0x01, 0x43, 0, 0, 0, 0, 0x1A, 0x1A, 0x44];
        body.extend_from_slice(&[0; 8]);
        body.push(0x0B);
        let f = compile(&m, &ty, &[(3, ValType::F32)], &body).unwrap();
        assert_eq!(f.stack_slots, LaneCounts([1, 0, 1, 1]));
        assert_eq!(f.local_slots, LaneCounts([0, 0, 3, 0]));
        assert_eq!(f.locals.len(), 3);
    }

    #[test]
    fn block_result_lands_in_output_slot() {
        let ty = FuncType::new([], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // i32.const 7; block i32; i32.const 1; i32.const 2; br 0; end; i32.add; end
        let body = [0x41, 0x07, 0x02, 0x7F, 0x41, 0x01, 0x41, 0x02, 0x0C, 0x00, 0x0B, 0x6A, 0x0B];
        let f = compile(&m, &ty, &[], &body).unwrap();
        let i = ValType::I32;
        match &f.body[1] {
            Stmt::Block { label, body } => {
                assert_eq!(*label, 1);
                assert_eq!(
                    body.last(),
                    Some(&Stmt::Branch(BranchTarget::Break { label: 1, carry: Some((s(i, 2), s(i, 1))) }))
                );
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(
            f.body[2],
            Stmt::Binary { op: numeric::BinaryOp::I32Add, dst: s(i, 0), lhs: s(i, 0), rhs: s(i, 1) }
        );
    }

    #[test]
    fn branch_to_loop_continues_and_to_function_returns() {
        let ty = FuncType::new([], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // loop; br 0; end; i32.const 1; br 0; end
        let body = [0x03, 0x40, 0x0C, 0x00, 0x0B, 0x41, 0x01, 0x0C, 0x00, 0x0B];
        let f = compile(&m, &ty, &[], &body).unwrap();
        assert_eq!(
            f.body[0],
            Stmt::Loop { label: 1, body: vec![Stmt::Branch(BranchTarget::Continue { label: 1 })].into() }
        );
        assert_eq!(
            f.body[2],
            Stmt::Branch(BranchTarget::Return { value: Some(s(ValType::I32, 0)) })
        );
        // final end is unreachable, so no trailing return is emitted
        assert_eq!(f.body.len(), 3);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let ty = FuncType::new([ValType::F32], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // get_local 0 (f32); i32.eqz
        let err = compile(&m, &ty, &[], &[0x20, 0x00, 0x45, 0x0B]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TypeMismatch { expected: ValType::I32, found: ValType::F32, offset: 2 }
        );
    }

    #[test]
    fn underflow_and_cross_block_access_are_distinguished() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        assert_eq!(
            compile(&m, &ty, &[], &[0x1A, 0x0B]).unwrap_err(),
            DecodeError::StackUnderflow { offset: 0 }
        );
        // i32.const 1; block; drop
        assert_eq!(
            compile(&m, &ty, &[], &[0x41, 0x01, 0x02, 0x40, 0x1A, 0x0B, 0x0B]).unwrap_err(),
            DecodeError::OutsideCurrentBlock { offset: 4 }
        );
    }

    #[test]
    fn unbalanced_ends_are_rejected() {
        let ty = FuncType::new([], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // function end without a value
        assert!(matches!(
            compile(&m, &ty, &[], &[0x0B]),
            Err(DecodeError::BlockArity { expected: 1, found: 0, .. })
        ));
        // block leaves an extra operand
        let void = FuncType::default();
        assert!(matches!(
            compile(&m, &void, &[], &[0x02, 0x40, 0x41, 0x00, 0x0B, 0x0B]),
            Err(DecodeError::BlockArity { expected: 0, found: 1, .. })
        ));
    }

    #[test]
    fn else_requires_if_and_if_result_requires_else() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        assert_eq!(
            compile(&m, &ty, &[], &[0x02, 0x40, 0x05, 0x0B, 0x0B]).unwrap_err(),
            DecodeError::ElseWithoutIf { offset: 2 }
        );
        // i32.const 0; if i32; i32.const 1; end; drop
        assert!(matches!(
            compile(&m, &ty, &[], &[0x41, 0x00, 0x04, 0x7F, 0x41, 0x01, 0x0B, 0x1A, 0x0B]),
            Err(DecodeError::IfWithoutElse { offset: 2 })
        ));
    }

    #[test]
    fn if_else_arms_share_output_slot() {
        let ty = FuncType::new([ValType::I32], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // get_local 0; if i32; i32.const 1; else; i32.const 2; end; end
        let body = [0x20, 0x00, 0x04, 0x7F, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0B, 0x0B];
        let f = compile(&m, &ty, &[], &body).unwrap();
        let i = ValType::I32;
        assert_eq!(
            f.body[1],
            Stmt::If {
                label: 1,
                cond: s(i, 0),
                then_body: vec![Stmt::Const { dst: s(i, 0), value: Value::I32(1) }].into(),
                else_body: vec![Stmt::Const { dst: s(i, 0), value: Value::I32(2) }].into(),
            }
        );
        assert_eq!(f.body[2], Stmt::Return { value: Some(s(i, 0)) });
    }

    #[test]
    fn branch_depth_beyond_function_fails() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        assert_eq!(
            compile(&m, &ty, &[], &[0x0C, 0x01, 0x0B]).unwrap_err(),
            DecodeError::BranchDepth { depth: 1, offset: 0 }
        );
    }

    #[test]
    fn br_table_targets_must_agree() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        // block i32; loop; i32.const 0; br_table [0] 1; end; end; drop
        let body = [0x02, 0x7F, 0x03, 0x40, 0x41, 0x00, 0x0E, 0x01, 0x00, 0x01, 0x0B, 0x0B, 0x1A, 0x0B];
        assert!(matches!(
            compile(&m, &ty, &[], &body),
            Err(DecodeError::BranchTableArity { .. })
        ));
    }

    #[test]
    fn code_after_unreachable_is_stack_polymorphic() {
        let ty = FuncType::new([], [ValType::I32]);
        let m = module_with(vec![ty.clone()]);
        // unreachable; i32.add; end
        let f = compile(&m, &ty, &[], &[0x00, 0x6A, 0x0B]).unwrap();
        assert_eq!(f.body.to_vec(), vec![
            Stmt::Unreachable,
            Stmt::Binary {
                op: numeric::BinaryOp::I32Add,
                dst: s(ValType::I32, 0),
                lhs: s(ValType::I32, 0),
                rhs: s(ValType::I32, 0),
            },
        ]);
        assert_eq!(f.stack_slots[ValType::I32], 1);
    }

    #[test]
    fn calls_resolve_through_import_space() {
        let callee = FuncType::new([ValType::I32], [ValType::I32]);
        let mut m = module_with(vec![callee.clone(), FuncType::default()]);
        m.push_import(Import {
            module: "env".into(),
            name: "f".into(),
            desc: ImportDesc::Func(0),
        });
        m.func_type_indices = vec![1];
        let ty = FuncType::default();
        // i32.const 5; call 0; drop; end
        let f = compile(&m, &ty, &[], &[0x41, 0x05, 0x10, 0x00, 0x1A, 0x0B]).unwrap();
        let i = ValType::I32;
        assert_eq!(
            f.body[1],
            Stmt::Call { func: 0, args: vec![s(i, 0)], result: Some(s(i, 0)) }
        );
        assert!(matches!(
            compile(&m, &ty, &[], &[0x10, 0x05, 0x0B]),
            Err(DecodeError::IndexOutOfRange { space: "function", index: 5, .. })
        ));
    }

    #[test]
    fn call_indirect_needs_table_and_zero_reserved_byte() {
        let ty = FuncType::default();
        let mut m = module_with(vec![ty.clone()]);
        let body = [0x41, 0x00, 0x11, 0x00, 0x00, 0x0B];
        assert!(matches!(
            compile(&m, &ty, &[], &body),
            Err(DecodeError::IndexOutOfRange { space: "table", .. })
        ));
        m.tables.push(TableType::default());
        assert!(compile(&m, &ty, &[], &body).is_ok());
        let bad = [0x41, 0x00, 0x11, 0x00, 0x01, 0x0B];
        assert!(matches!(
            compile(&m, &ty, &[], &bad),
            Err(DecodeError::NonZeroIndex { what: "call_indirect table", index: 1, .. })
        ));
    }

    #[test]
    fn globals_and_memory_checks() {
        let ty = FuncType::default();
        let mut m = module_with(vec![ty.clone()]);
        m.globals.push(crate::model::Global {
            ty: GlobalType::new(ValType::I32, false),
            init: crate::model::ConstExpr::I32(0),
        });
        // i32.const 1; set_global 0
        assert!(matches!(
            compile(&m, &ty, &[], &[0x41, 0x01, 0x24, 0x00, 0x0B]),
            Err(DecodeError::ImmutableGlobal { index: 0, .. })
        ));
        // i32.const 0; i32.load align=2 offset=0; drop
        let load = [0x41, 0x00, 0x28, 0x02, 0x00, 0x1A, 0x0B];
        assert!(matches!(
            compile(&m, &ty, &[], &load),
            Err(DecodeError::IndexOutOfRange { space: "memory", .. })
        ));
        m.memories.push(MemoryType::default());
        assert!(compile(&m, &ty, &[], &load).is_ok());
        let misaligned = [0x41, 0x00, 0x28, 0x03, 0x00, 0x1A, 0x0B];
        assert!(matches!(
            compile(&m, &ty, &[], &misaligned),
            Err(DecodeError::BadAlignment { align: 3, width: 4, .. })
        ));
    }

    #[test]
    fn unsupported_and_64_bit_opcodes_fail_loudly() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        // f32.add
        assert_eq!(
            compile(&m, &ty, &[], &[0x92, 0x0B]).unwrap_err(),
            DecodeError::UnsupportedOpcode { opcode: 0x92, offset: 0 }
        );
        // i64.const 1
        assert!(matches!(
            compile(&m, &ty, &[], &[0x42, 0x01, 0x1A, 0x0B]),
            Err(DecodeError::Unsupported64BitInteger { .. })
        ));
    }

    #[test]
    fn local_limit_is_enforced() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        let config = Config::default().with_max_function_locals(4);
        let err = compile_function(&config, &m, &ty, &[(5, ValType::I32)], &mut Cursor::new(&[0x0B])).unwrap_err();
        assert!(matches!(err, DecodeError::LimitExceeded { what: "function locals", .. }));
    }

    #[test]
    fn missing_final_end_is_truncation() {
        let ty = FuncType::default();
        let m = module_with(vec![ty.clone()]);
        assert!(matches!(
            compile(&m, &ty, &[], &[0x01]),
            Err(DecodeError::UnexpectedEof { offset: 1 })
        ));
    }
}
