//! Execution of compiled function bodies.

pub mod frames;
pub mod interpreter;
