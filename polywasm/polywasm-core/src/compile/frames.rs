//! Control frames tracked while compiling one function body.

use super::ir::{LaneCounts, Slot, Stmt};
use crate::model::ValType;

/// Which construct opened a frame. `If` becomes `Else` once its else arm starts.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    Function,
    Block,
    Loop,
    If { cond: Slot },
    Else { cond: Slot, then_body: Vec<Stmt> },
}

#[derive(Debug, Clone)]
pub struct ControlFrame {
    pub kind: FrameKind,
    pub result: Option<ValType>,
    /// Nesting depth at which the frame opened; the function frame is 0.
    pub label: u32,
    /// Operand-type stack of values pushed inside this frame.
    pub types: Vec<ValType>,
    /// Per-lane count of values live below this frame when it opened.
    pub base: LaneCounts,
    /// Per-lane count of entries in `types`.
    pub live: LaneCounts,
    /// Set after `unreachable`, `br`, `br_table` or `return`; pops on an empty stack then yield
    /// placeholders.
    pub unreachable: bool,
    pub body: Vec<Stmt>,
    /// Offset of the opening opcode.
    pub offset: usize,
}

impl ControlFrame {
    pub fn new(kind: FrameKind, result: Option<ValType>, label: u32, base: LaneCounts, offset: usize) -> Self {
        Self {
            kind,
            result,
            label,
            types: Vec::new(),
            base,
            live: LaneCounts::default(),
            unreachable: false,
            body: Vec::new(),
            offset,
        }
    }

    /// Slot the next value of type `t` pushed in this frame will occupy.
    pub fn next_slot(&self, t: ValType) -> Slot {
        Slot::Stack {
            lane: t,
            height: self.base[t] + self.live[t],
        }
    }

    /// Where the frame's result lives once it closes: the bottom of its result lane.
    pub fn output_slot(&self, t: ValType) -> Slot {
        Slot::Stack {
            lane: t,
            height: self.base[t],
        }
    }

    /// Type carried by a branch to this frame. Loops take no branch operands.
    pub fn label_type(&self) -> Option<ValType> {
        match self.kind {
            FrameKind::Loop => None,
            _ => self.result,
        }
    }

    /// Counts of everything live up to and including this frame.
    pub fn height(&self) -> LaneCounts {
        self.base.plus(&self.live)
    }

    pub fn make_unreachable(&mut self) {
        self.unreachable = true;
        self.types.clear();
        self.live = LaneCounts::default();
    }
}
