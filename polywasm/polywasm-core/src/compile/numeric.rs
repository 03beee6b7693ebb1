//! Numeric operator table.
//!
//! Every numeric opcode maps to a typed [`NumericOp`] carrying its operand and result types and its
//! evaluator. Only the i32 family is present; i64 and float operators slot in as new variants, a
//! [`decode`] entry and an `eval` arm.

use super::opcodes::op;
use crate::error::Trap;
use crate::model::{ValType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    I32Eqz,
    I32Clz,
    I32Ctz,
    I32Popcnt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// Look up a numeric opcode.
pub fn decode(opcode: u8) -> Option<NumericOp> {
    use BinaryOp::*;
    use UnaryOp::*;
    Some(match opcode {
        op::I32_EQZ => NumericOp::Unary(I32Eqz),
        op::I32_CLZ => NumericOp::Unary(I32Clz),
        op::I32_CTZ => NumericOp::Unary(I32Ctz),
        op::I32_POPCNT => NumericOp::Unary(I32Popcnt),

        op::I32_EQ => NumericOp::Binary(I32Eq),
        op::I32_NE => NumericOp::Binary(I32Ne),
        op::I32_LT_S => NumericOp::Binary(I32LtS),
        op::I32_LT_U => NumericOp::Binary(I32LtU),
        op::I32_GT_S => NumericOp::Binary(I32GtS),
        op::I32_GT_U => NumericOp::Binary(I32GtU),
        op::I32_LE_S => NumericOp::Binary(I32LeS),
        op::I32_LE_U => NumericOp::Binary(I32LeU),
        op::I32_GE_S => NumericOp::Binary(I32GeS),
        op::I32_GE_U => NumericOp::Binary(I32GeU),

        op::I32_ADD => NumericOp::Binary(I32Add),
        op::I32_SUB => NumericOp::Binary(I32Sub),
        op::I32_MUL => NumericOp::Binary(I32Mul),
        op::I32_DIV_S => NumericOp::Binary(I32DivS),
        op::I32_DIV_U => NumericOp::Binary(I32DivU),
        op::I32_REM_S => NumericOp::Binary(I32RemS),
        op::I32_REM_U => NumericOp::Binary(I32RemU),
        op::I32_AND => NumericOp::Binary(I32And),
        op::I32_OR => NumericOp::Binary(I32Or),
        op::I32_XOR => NumericOp::Binary(I32Xor),
        op::I32_SHL => NumericOp::Binary(I32Shl),
        op::I32_SHR_S => NumericOp::Binary(I32ShrS),
        op::I32_SHR_U => NumericOp::Binary(I32ShrU),
        op::I32_ROTL => NumericOp::Binary(I32Rotl),
        op::I32_ROTR => NumericOp::Binary(I32Rotr),
        _ => return None,
    })
}

fn i32_operand(v: Value) -> Result<i32, Trap> {
    v.as_i32().ok_or(Trap::OperandType {
        expected: ValType::I32,
    })
}

fn bool_i32(b: bool) -> i32 {
    i32::from(b)
}

impl UnaryOp {
    pub fn operand(self) -> ValType {
        ValType::I32
    }

    pub fn result(self) -> ValType {
        ValType::I32
    }

    pub fn eval(self, v: Value) -> Result<Value, Trap> {
        let x = i32_operand(v)?;
        Ok(Value::I32(match self {
            UnaryOp::I32Eqz => bool_i32(x == 0),
            UnaryOp::I32Clz => x.leading_zeros() as i32,
            UnaryOp::I32Ctz => x.trailing_zeros() as i32,
            UnaryOp::I32Popcnt => x.count_ones() as i32,
        }))
    }
}

impl BinaryOp {
    pub fn operand(self) -> ValType {
        ValType::I32
    }

    pub fn result(self) -> ValType {
        ValType::I32
    }

    pub fn eval(self, lhs: Value, rhs: Value) -> Result<Value, Trap> {
        let a = i32_operand(lhs)?;
        let b = i32_operand(rhs)?;
        let (ua, ub) = (a as u32, b as u32);
        Ok(Value::I32(match self {
            BinaryOp::I32Eq => bool_i32(a == b),
            BinaryOp::I32Ne => bool_i32(a != b),
            BinaryOp::I32LtS => bool_i32(a < b),
            BinaryOp::I32LtU => bool_i32(ua < ub),
            BinaryOp::I32GtS => bool_i32(a > b),
            BinaryOp::I32GtU => bool_i32(ua > ub),
            BinaryOp::I32LeS => bool_i32(a <= b),
            BinaryOp::I32LeU => bool_i32(ua <= ub),
            BinaryOp::I32GeS => bool_i32(a >= b),
            BinaryOp::I32GeU => bool_i32(ua >= ub),

            BinaryOp::I32Add => a.wrapping_add(b),
            BinaryOp::I32Sub => a.wrapping_sub(b),
            BinaryOp::I32Mul => a.wrapping_mul(b),
            BinaryOp::I32DivS => {
                if b == 0 {
                    return Err(Trap::IntegerDivideByZero);
                }
                a.checked_div(b).ok_or(Trap::IntegerOverflow)?
            }
            BinaryOp::I32DivU => {
                if ub == 0 {
                    return Err(Trap::IntegerDivideByZero);
                }
                (ua / ub) as i32
            }
            BinaryOp::I32RemS => {
                if b == 0 {
                    return Err(Trap::IntegerDivideByZero);
                }
                a.wrapping_rem(b)
            }
            BinaryOp::I32RemU => {
                if ub == 0 {
                    return Err(Trap::IntegerDivideByZero);
                }
                (ua % ub) as i32
            }
            BinaryOp::I32And => a & b,
            BinaryOp::I32Or => a | b,
            BinaryOp::I32Xor => a ^ b,
            BinaryOp::I32Shl => a.wrapping_shl(ub),
            BinaryOp::I32ShrS => a.wrapping_shr(ub),
            BinaryOp::I32ShrU => ua.wrapping_shr(ub) as i32,
            BinaryOp::I32Rotl => ua.rotate_left(ub % 32) as i32,
            BinaryOp::I32Rotr => ua.rotate_right(ub % 32) as i32,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, a: i32, b: i32) -> Result<i32, Trap> {
        op.eval(Value::I32(a), Value::I32(b))
            .map(|v| v.as_i32().unwrap())
    }

    #[test]
    fn signed_and_unsigned_comparisons_differ() {
        // -1 is 0xFFFFFFFF when read unsigned
        assert_eq!(bin(BinaryOp::I32LtS, -1, 0), Ok(1));
        assert_eq!(bin(BinaryOp::I32LtU, -1, 0), Ok(0));
        assert_eq!(bin(BinaryOp::I32GtS, -1, 1), Ok(0));
        assert_eq!(bin(BinaryOp::I32GtU, -1, 1), Ok(1));
        assert_eq!(bin(BinaryOp::I32LeS, i32::MIN, 0), Ok(1));
        assert_eq!(bin(BinaryOp::I32LeU, i32::MIN, 0), Ok(0));
        assert_eq!(bin(BinaryOp::I32GeS, 0, -1), Ok(1));
        assert_eq!(bin(BinaryOp::I32GeU, 0, -1), Ok(0));
    }

    #[test]
    fn signed_and_unsigned_division_differ() {
        assert_eq!(bin(BinaryOp::I32DivS, -8, 2), Ok(-4));
        assert_eq!(bin(BinaryOp::I32DivU, -8, 2), Ok(0x7FFF_FFFC));
        assert_eq!(bin(BinaryOp::I32RemS, -7, 2), Ok(-1));
        assert_eq!(bin(BinaryOp::I32RemU, -7, 2), Ok(1));
        assert_eq!(bin(BinaryOp::I32ShrS, -8, 1), Ok(-4));
        assert_eq!(bin(BinaryOp::I32ShrU, -8, 1), Ok(0x7FFF_FFFC));
    }

    #[test]
    fn division_traps() {
        assert_eq!(bin(BinaryOp::I32DivS, 1, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(bin(BinaryOp::I32DivU, 1, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(bin(BinaryOp::I32RemS, 1, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(bin(BinaryOp::I32RemU, 1, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(bin(BinaryOp::I32DivS, i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(bin(BinaryOp::I32RemS, i32::MIN, -1), Ok(0));
    }

    #[test]
    fn wrapping_arithmetic_and_shift_counts() {
        assert_eq!(bin(BinaryOp::I32Add, i32::MAX, 1), Ok(i32::MIN));
        assert_eq!(bin(BinaryOp::I32Add, -1, 1), Ok(0));
        assert_eq!(bin(BinaryOp::I32Mul, 0x10000, 0x10000), Ok(0));
        assert_eq!(bin(BinaryOp::I32Shl, 1, 33), Ok(2));
        assert_eq!(bin(BinaryOp::I32Rotl, 0x8000_0001u32 as i32, 1), Ok(3));
        assert_eq!(bin(BinaryOp::I32Rotr, 3, 1), Ok(0x8000_0001u32 as i32));
    }

    #[test]
    fn unary_bit_counts() {
        assert_eq!(UnaryOp::I32Clz.eval(Value::I32(1)), Ok(Value::I32(31)));
        assert_eq!(UnaryOp::I32Ctz.eval(Value::I32(0)), Ok(Value::I32(32)));
        assert_eq!(UnaryOp::I32Popcnt.eval(Value::I32(-1)), Ok(Value::I32(32)));
        assert_eq!(UnaryOp::I32Eqz.eval(Value::I32(0)), Ok(Value::I32(1)));
    }

    #[test]
    fn table_covers_i32_family_only() {
        assert_eq!(decode(op::I32_ADD), Some(NumericOp::Binary(BinaryOp::I32Add)));
        assert_eq!(decode(op::I32_LT_U), Some(NumericOp::Binary(BinaryOp::I32LtU)));
        // i64.add
        assert_eq!(decode(0x7C), None);
        // f32.add
        assert_eq!(decode(0x92), None);
    }
}
