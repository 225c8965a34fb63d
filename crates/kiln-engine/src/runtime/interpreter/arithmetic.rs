//! Arithmetic, bitwise and comparison opcodes

use std::cmp::Ordering;

use super::frame::Frame;
use super::{OpcodeResult, Vm};
use crate::emit::Opcode;
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};

/// Two operands promoted to a common kind
#[derive(Debug, Clone, Copy)]
enum Operands {
    I32(i32, i32),
    I64(i64, i64),
    F32(f32, f32),
    F64(f64, f64),
}

fn operands(a: &Value, b: &Value, op: Opcode) -> VmResult<Operands> {
    match (a, b) {
        (Value::I32(x), Value::I32(y)) => Ok(Operands::I32(*x, *y)),
        (Value::I32(_) | Value::I64(_), Value::I32(_) | Value::I64(_)) => {
            Ok(Operands::I64(a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0)))
        }
        (Value::F32(x), Value::F32(y)) => Ok(Operands::F32(*x, *y)),
        (Value::F32(_) | Value::F64(_), Value::F32(_) | Value::F64(_)) => {
            Ok(Operands::F64(a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0)))
        }
        _ => Err(VmError::TypeError(format!(
            "'{}' cannot combine {} and {}",
            op,
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

macro_rules! int_binary {
    ($op:expr, $x:expr, $y:expr, $signed:ty, $unsigned:ty) => {{
        let (x, y): ($signed, $signed) = ($x, $y);
        let ovf = || VmError::Overflow($op.name());
        match $op {
            Opcode::Add => x.wrapping_add(y),
            Opcode::Sub => x.wrapping_sub(y),
            Opcode::Mul => x.wrapping_mul(y),
            Opcode::Div | Opcode::Rem if y == 0 => return Err(VmError::DivideByZero),
            Opcode::DivUn | Opcode::RemUn if y == 0 => return Err(VmError::DivideByZero),
            Opcode::Div => x.checked_div(y).ok_or_else(ovf)?,
            Opcode::Rem => x.checked_rem(y).ok_or_else(ovf)?,
            Opcode::DivUn => ((x as $unsigned) / (y as $unsigned)) as $signed,
            Opcode::RemUn => ((x as $unsigned) % (y as $unsigned)) as $signed,
            Opcode::And => x & y,
            Opcode::Or => x | y,
            Opcode::Xor => x ^ y,
            Opcode::AddOvf => x.checked_add(y).ok_or_else(ovf)?,
            Opcode::SubOvf => x.checked_sub(y).ok_or_else(ovf)?,
            Opcode::MulOvf => x.checked_mul(y).ok_or_else(ovf)?,
            Opcode::AddOvfUn => (x as $unsigned).checked_add(y as $unsigned).ok_or_else(ovf)? as $signed,
            Opcode::SubOvfUn => (x as $unsigned).checked_sub(y as $unsigned).ok_or_else(ovf)? as $signed,
            Opcode::MulOvfUn => (x as $unsigned).checked_mul(y as $unsigned).ok_or_else(ovf)? as $signed,
            _ => return Err(VmError::TypeError(format!("'{}' is not an integer operator", $op))),
        }
    }};
}

fn float_binary(op: Opcode, x: f64, y: f64) -> VmResult<f64> {
    match op {
        Opcode::Add => Ok(x + y),
        Opcode::Sub => Ok(x - y),
        Opcode::Mul => Ok(x * y),
        Opcode::Div => Ok(x / y),
        Opcode::Rem => Ok(x % y),
        _ => Err(VmError::TypeError(format!("'{}' does not apply to floats", op))),
    }
}

/// Apply a binary arithmetic or bitwise opcode
pub(super) fn binary(op: Opcode, a: &Value, b: &Value) -> VmResult<Value> {
    Ok(match operands(a, b, op)? {
        Operands::I32(x, y) => Value::I32(int_binary!(op, x, y, i32, u32)),
        Operands::I64(x, y) => Value::I64(int_binary!(op, x, y, i64, u64)),
        Operands::F32(x, y) => Value::F32(float_binary(op, x as f64, y as f64)? as f32),
        Operands::F64(x, y) => Value::F64(float_binary(op, x, y)?),
    })
}

/// Shifts keep the width of the shifted value
fn shift(op: Opcode, value: &Value, amount: &Value) -> VmResult<Value> {
    let n = amount
        .as_i64()
        .ok_or_else(|| VmError::TypeError(format!("shift amount must be an integer, found {}", amount.kind_name())))?
        as u32;
    match (op, value) {
        (Opcode::Shl, Value::I32(x)) => Ok(Value::I32(x.wrapping_shl(n))),
        (Opcode::Shr, Value::I32(x)) => Ok(Value::I32(x.wrapping_shr(n))),
        (Opcode::ShrUn, Value::I32(x)) => Ok(Value::I32((*x as u32).wrapping_shr(n) as i32)),
        (Opcode::Shl, Value::I64(x)) => Ok(Value::I64(x.wrapping_shl(n))),
        (Opcode::Shr, Value::I64(x)) => Ok(Value::I64(x.wrapping_shr(n))),
        (Opcode::ShrUn, Value::I64(x)) => Ok(Value::I64((*x as u64).wrapping_shr(n) as i64)),
        _ => Err(VmError::TypeError(format!("'{}' cannot shift {}", op, value.kind_name()))),
    }
}

/// Order two values; `None` means unordered (a NaN was involved)
fn ordering(a: &Value, b: &Value, unsigned: bool, op: Opcode) -> VmResult<Option<Ordering>> {
    Ok(match operands(a, b, op)? {
        Operands::I32(x, y) if unsigned => Some((x as u32).cmp(&(y as u32))),
        Operands::I32(x, y) => Some(x.cmp(&y)),
        Operands::I64(x, y) if unsigned => Some((x as u64).cmp(&(y as u64))),
        Operands::I64(x, y) => Some(x.cmp(&y)),
        Operands::F32(x, y) => x.partial_cmp(&y),
        Operands::F64(x, y) => x.partial_cmp(&y),
    })
}

/// `ceq` semantics: numeric equality across widths, identity for references
pub(super) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::I32(_) | Value::I64(_), Value::I32(_) | Value::I64(_)) => a.as_i64() == b.as_i64(),
        (Value::F32(_) | Value::F64(_), Value::F32(_) | Value::F64(_)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

/// Evaluate a comparison opcode or the comparison of a conditional branch
pub(super) fn compare(op: Opcode, a: &Value, b: &Value) -> VmResult<bool> {
    use Ordering::*;
    let is_reference = |v: &Value| !matches!(v, Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_));
    match op {
        Opcode::Ceq | Opcode::Beq | Opcode::BeqS => Ok(values_equal(a, b)),
        Opcode::BneUn | Opcode::BneUnS => Ok(!values_equal(a, b)),
        // `x cgt.un null` is the idiomatic non-null test
        Opcode::CgtUn if is_reference(a) || is_reference(b) => Ok(!a.is_null() && b.is_null()),
        _ => {
            let unsigned = matches!(
                op,
                Opcode::CgtUn
                    | Opcode::CltUn
                    | Opcode::BgeUn
                    | Opcode::BgeUnS
                    | Opcode::BgtUn
                    | Opcode::BgtUnS
                    | Opcode::BleUn
                    | Opcode::BleUnS
                    | Opcode::BltUn
                    | Opcode::BltUnS
            );
            let ord = ordering(a, b, unsigned, op)?;
            Ok(match op {
                Opcode::Cgt | Opcode::Bgt | Opcode::BgtS => ord == Some(Greater),
                Opcode::Clt | Opcode::Blt | Opcode::BltS => ord == Some(Less),
                Opcode::Bge | Opcode::BgeS => matches!(ord, Some(Greater | Equal)),
                Opcode::Ble | Opcode::BleS => matches!(ord, Some(Less | Equal)),
                Opcode::CgtUn | Opcode::BgtUn | Opcode::BgtUnS => matches!(ord, Some(Greater) | None),
                Opcode::CltUn | Opcode::BltUn | Opcode::BltUnS => matches!(ord, Some(Less) | None),
                Opcode::BgeUn | Opcode::BgeUnS => matches!(ord, Some(Greater | Equal) | None),
                Opcode::BleUn | Opcode::BleUnS => matches!(ord, Some(Less | Equal) | None),
                _ => return Err(VmError::TypeError(format!("'{}' is not a comparison", op))),
            })
        }
    }
}

impl Vm {
    pub(super) fn exec_arithmetic_ops(&mut self, frame: &mut Frame, op: Opcode) -> VmResult<OpcodeResult> {
        let result = match op {
            Opcode::Neg => match frame.pop()? {
                Value::I32(x) => Value::I32(x.wrapping_neg()),
                Value::I64(x) => Value::I64(x.wrapping_neg()),
                Value::F32(x) => Value::F32(-x),
                Value::F64(x) => Value::F64(-x),
                other => return Err(VmError::TypeError(format!("cannot negate {}", other.kind_name()))),
            },
            Opcode::Not => match frame.pop()? {
                Value::I32(x) => Value::I32(!x),
                Value::I64(x) => Value::I64(!x),
                other => return Err(VmError::TypeError(format!("cannot complement {}", other.kind_name()))),
            },
            Opcode::Ckfinite => {
                let v = frame.pop()?;
                match v.as_f64() {
                    Some(f) if f.is_finite() => v,
                    Some(_) => return Err(VmError::Overflow("ckfinite")),
                    None => return Err(VmError::TypeError(format!("ckfinite on {}", v.kind_name()))),
                }
            }
            Opcode::Shl | Opcode::Shr | Opcode::ShrUn => {
                let amount = frame.pop()?;
                let value = frame.pop()?;
                shift(op, &value, &amount)?
            }
            Opcode::Ceq | Opcode::Cgt | Opcode::CgtUn | Opcode::Clt | Opcode::CltUn => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                Value::I32(compare(op, &a, &b)? as i32)
            }
            _ => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                binary(op, &a, &b)?
            }
        };
        frame.push(result)?;
        Ok(OpcodeResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_wrapping_and_checked() {
        assert_eq!(binary(Opcode::Add, &Value::I32(i32::MAX), &Value::I32(1)).unwrap(), Value::I32(i32::MIN));
        assert_eq!(
            binary(Opcode::AddOvf, &Value::I32(i32::MAX), &Value::I32(1)),
            Err(VmError::Overflow("add.ovf"))
        );
        assert_eq!(
            binary(Opcode::SubOvfUn, &Value::I32(0), &Value::I32(1)),
            Err(VmError::Overflow("sub.ovf.un"))
        );
        assert_eq!(binary(Opcode::Mul, &Value::I32(6), &Value::I64(7)).unwrap(), Value::I64(42));
    }

    #[test]
    fn test_division() {
        assert_eq!(binary(Opcode::Div, &Value::I32(7), &Value::I32(0)), Err(VmError::DivideByZero));
        assert_eq!(binary(Opcode::Rem, &Value::I32(-7), &Value::I32(2)).unwrap(), Value::I32(-1));
        assert_eq!(binary(Opcode::DivUn, &Value::I32(-2), &Value::I32(2)).unwrap(), Value::I32(0x7FFF_FFFF));
        assert_eq!(
            binary(Opcode::Div, &Value::I32(i32::MIN), &Value::I32(-1)),
            Err(VmError::Overflow("div"))
        );
        assert_eq!(binary(Opcode::Div, &Value::F64(1.0), &Value::F64(4.0)).unwrap(), Value::F64(0.25));
    }

    #[test]
    fn test_shifts_keep_width() {
        assert_eq!(shift(Opcode::Shl, &Value::I64(1), &Value::I32(40)).unwrap(), Value::I64(1 << 40));
        assert_eq!(shift(Opcode::ShrUn, &Value::I32(-1), &Value::I32(28)).unwrap(), Value::I32(0xF));
        assert_eq!(shift(Opcode::Shr, &Value::I32(-16), &Value::I32(2)).unwrap(), Value::I32(-4));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(Opcode::Clt, &Value::I32(-1), &Value::I32(0)).unwrap());
        assert!(!compare(Opcode::CltUn, &Value::I32(-1), &Value::I32(0)).unwrap());
        assert!(compare(Opcode::CgtUn, &Value::F64(f64::NAN), &Value::F64(0.0)).unwrap());
        assert!(!compare(Opcode::Cgt, &Value::F64(f64::NAN), &Value::F64(0.0)).unwrap());
        assert!(compare(Opcode::Ceq, &Value::I32(3), &Value::I64(3)).unwrap());
        assert!(compare(Opcode::CgtUn, &Value::string("x"), &Value::Null).unwrap());
        assert!(compare(Opcode::BgeS, &Value::I32(2), &Value::I32(2)).unwrap());
    }
}
