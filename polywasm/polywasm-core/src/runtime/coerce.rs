//! Conversions between host numbers (`f64`) and wasm values.
//!
//! i32 follows ECMAScript ToInt32 (truncate, wrap modulo 2^32), f32 rounds to nearest single, f64 is
//! the identity. i64 has no lossless host representation and never crosses.

use crate::error::Trap;
use crate::model::{ValType, Value};

const TWO_32: f64 = 4_294_967_296.0;

/// ToInt32: NaN and infinities become 0; everything else truncates and wraps.
pub fn to_int32(x: f64) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    x.trunc().rem_euclid(TWO_32) as u32 as i32
}

/// Host number to a value of type `ty`.
pub fn to_wasm(x: f64, ty: ValType) -> Result<Value, Trap> {
    match ty {
        ValType::I32 => Ok(Value::I32(to_int32(x))),
        ValType::F32 => Ok(Value::f32(x as f32)),
        ValType::F64 => Ok(Value::f64(x)),
        ValType::I64 => Err(Trap::I64AtBoundary),
    }
}

/// Value to host number. i32 is read as signed.
pub fn to_host(v: Value) -> Result<f64, Trap> {
    match v {
        Value::I32(x) => Ok(f64::from(x)),
        Value::F32(bits) => Ok(f64::from(f32::from_bits(bits))),
        Value::F64(bits) => Ok(f64::from_bits(bits)),
        Value::I64(_) => Err(Trap::I64AtBoundary),
    }
}
