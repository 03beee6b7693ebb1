//! Global instance: current value plus its declared type.

use crate::model::{GlobalType, Value};

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    value: Value,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, value: Value) -> Self {
        Self { ty, value }
    }

    pub fn get(&self) -> Value {
        self.value
    }

    /// Only reachable from `set_global`, which the compiler restricts to mutable globals of the
    /// right type.
    pub fn set(&mut self, value: Value) {
        self.value = value;
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }
}
