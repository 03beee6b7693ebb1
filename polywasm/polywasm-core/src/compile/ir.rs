//! Structured intermediate representation produced by the function body compiler.
//!
//! A function body is a tree of [`Stmt`]s. Operands live in slots: one per local, and one per stack
//! height within each value-type lane. Block, loop and if nodes carry the label of the frame they
//! were compiled from; branches name that label.

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use super::numeric::{BinaryOp, UnaryOp};
use crate::model::{FuncIdx, GlobalIdx, TypeIdx, ValType, Value};

/// Per-lane counters, indexed by [`ValType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneCounts(pub [u32; 4]);

impl Index<ValType> for LaneCounts {
    type Output = u32;
    fn index(&self, t: ValType) -> &u32 {
        &self.0[t.lane()]
    }
}

impl IndexMut<ValType> for LaneCounts {
    fn index_mut(&mut self, t: ValType) -> &mut u32 {
        &mut self.0[t.lane()]
    }
}

impl LaneCounts {
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Element-wise sum.
    pub fn plus(&self, other: &LaneCounts) -> LaneCounts {
        let mut out = *self;
        for (o, x) in out.0.iter_mut().zip(other.0) {
            *o += x;
        }
        out
    }

    /// Element-wise max, in place.
    pub fn raise_to(&mut self, other: &LaneCounts) {
        for (o, x) in self.0.iter_mut().zip(other.0) {
            *o = (*o).max(x);
        }
    }
}

/// Storage location of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Parameter or declared local.
    Local(u32),
    /// Stack temporary at `height` within the lane of `lane`.
    Stack { lane: ValType, height: u32 },
}

/// Width and extension of an i32 memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    I32,
    I32From8S,
    I32From8U,
    I32From16S,
    I32From16U,
}

impl MemAccess {
    pub fn width(self) -> u32 {
        match self {
            MemAccess::I32 => 4,
            MemAccess::I32From8S | MemAccess::I32From8U => 1,
            MemAccess::I32From16S | MemAccess::I32From16U => 2,
        }
    }
}

/// Statement list of a function, block, loop or if arm. Shared so the interpreter can hold on to
/// the list it is executing without borrowing the function.
pub type Body = Arc<[Stmt]>;

/// What happens when a branch is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    /// Exit the block/if labelled `label`, first moving `carry.0` into `carry.1`.
    Break {
        label: u32,
        carry: Option<(Slot, Slot)>,
    },
    /// Restart the loop labelled `label`.
    Continue { label: u32 },
    /// Branch to the function frame.
    Return { value: Option<Slot> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Unreachable,
    Block {
        label: u32,
        body: Body,
    },
    Loop {
        label: u32,
        body: Body,
    },
    If {
        label: u32,
        cond: Slot,
        then_body: Body,
        else_body: Body,
    },
    Branch(BranchTarget),
    BranchIf {
        cond: Slot,
        target: BranchTarget,
    },
    BranchTable {
        index: Slot,
        targets: Vec<BranchTarget>,
        default: BranchTarget,
    },
    Return {
        value: Option<Slot>,
    },
    Call {
        func: FuncIdx,
        args: Vec<Slot>,
        result: Option<Slot>,
    },
    CallIndirect {
        type_idx: TypeIdx,
        callee: Slot,
        args: Vec<Slot>,
        result: Option<Slot>,
    },
    Copy {
        dst: Slot,
        src: Slot,
    },
    Const {
        dst: Slot,
        value: Value,
    },
    GlobalGet {
        dst: Slot,
        global: GlobalIdx,
    },
    GlobalSet {
        global: GlobalIdx,
        src: Slot,
    },
    Select {
        dst: Slot,
        if_false: Slot,
        cond: Slot,
    },
    Unary {
        op: UnaryOp,
        dst: Slot,
        operand: Slot,
    },
    Binary {
        op: BinaryOp,
        dst: Slot,
        lhs: Slot,
        rhs: Slot,
    },
    Load {
        access: MemAccess,
        offset: u32,
        dst: Slot,
        addr: Slot,
    },
    Store {
        access: MemAccess,
        offset: u32,
        addr: Slot,
        value: Slot,
    },
    MemorySize {
        dst: Slot,
    },
    MemoryGrow {
        dst: Slot,
        delta: Slot,
    },
}
