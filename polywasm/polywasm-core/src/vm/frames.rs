//! Per-call storage for the slots a compiled function addresses.

use crate::compile::{CompiledFunction, Slot};
use crate::error::Trap;
use crate::model::{ValType, Value};

#[derive(Debug)]
pub struct CallFrame {
    locals: Vec<Value>,
    /// Stack temporaries, one vector per value-type lane.
    lanes: [Vec<Value>; 4],
    /// Set by `return` (or a branch to the function frame).
    pub ret: Option<Value>,
}

impl CallFrame {
    /// Parameters take `args`; declared locals and temporaries start at zero.
    pub fn new(code: &CompiledFunction, args: &[Value]) -> Self {
        let locals = code
            .locals
            .iter()
            .enumerate()
            .map(|(i, t)| args.get(i).copied().unwrap_or(Value::zero(*t)))
            .collect();
        let lanes = ValType::ALL.map(|t| vec![Value::zero(t); code.stack_slots[t] as usize]);
        Self {
            locals,
            lanes,
            ret: None,
        }
    }

    #[inline]
    pub fn get(&self, slot: Slot) -> Result<Value, Trap> {
        match slot {
            Slot::Local(i) => self.locals.get(i as usize),
            Slot::Stack { lane, height } => self.lanes[lane.lane()].get(height as usize),
        }
        .copied()
        .ok_or(Trap::BadHandle { what: "slot" })
    }

    #[inline]
    pub fn set(&mut self, slot: Slot, value: Value) -> Result<(), Trap> {
        let cell = match slot {
            Slot::Local(i) => self.locals.get_mut(i as usize),
            Slot::Stack { lane, height } => self.lanes[lane.lane()].get_mut(height as usize),
        }
        .ok_or(Trap::BadHandle { what: "slot" })?;
        *cell = value;
        Ok(())
    }

    #[inline]
    pub fn i32(&self, slot: Slot) -> Result<i32, Trap> {
        self.get(slot)?.as_i32().ok_or(Trap::OperandType {
            expected: ValType::I32,
        })
    }

    pub fn gather(&self, slots: &[Slot]) -> Result<Vec<Value>, Trap> {
        slots.iter().map(|s| self.get(*s)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::LaneCounts;
    use crate::model::FuncType;

    #[test]
    fn slots_start_from_args_and_zero() {
        let code = CompiledFunction {
            ty: FuncType::new([ValType::I32], []),
            locals: vec![ValType::I32, ValType::F64],
            body: Vec::new().into(),
            local_slots: LaneCounts([1, 0, 0, 1]),
            stack_slots: LaneCounts([2, 0, 0, 0]),
        };
        let mut frame = CallFrame::new(&code, &[Value::I32(9)]);
        assert_eq!(frame.get(Slot::Local(0)), Ok(Value::I32(9)));
        assert_eq!(frame.get(Slot::Local(1)), Ok(Value::F64(0)));
        let s1 = Slot::Stack { lane: ValType::I32, height: 1 };
        frame.set(s1, Value::I32(-4)).unwrap();
        assert_eq!(frame.i32(s1), Ok(-4));
        assert!(frame.get(Slot::Stack { lane: ValType::F32, height: 0 }).is_err());
        assert_eq!(frame.i32(Slot::Local(1)), Err(Trap::OperandType { expected: ValType::I32 }));
    }
}
