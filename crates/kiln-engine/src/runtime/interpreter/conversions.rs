//! Numeric conversion opcodes

use super::frame::Frame;
use super::{OpcodeResult, Vm};
use crate::emit::Opcode;
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};

/// Conversion source: an integer (with its stack width) or a float
#[derive(Debug, Clone, Copy)]
enum Source {
    Int { value: i64, narrow: bool },
    Float(f64),
}

impl Source {
    fn of(value: &Value, op: Opcode) -> VmResult<Self> {
        match value {
            Value::I32(v) => Ok(Source::Int {
                value: *v as i64,
                narrow: true,
            }),
            Value::I64(v) => Ok(Source::Int {
                value: *v,
                narrow: false,
            }),
            Value::F32(v) => Ok(Source::Float(*v as f64)),
            Value::F64(v) => Ok(Source::Float(*v)),
            other => Err(VmError::TypeError(format!("'{}' cannot convert {}", op, other.kind_name()))),
        }
    }

    /// Unchecked integer view; floats truncate (saturating at the i64 range)
    fn bits(self) -> i64 {
        match self {
            Source::Int { value, .. } => value,
            Source::Float(f) => f as i64,
        }
    }

    /// Integer view with 32-bit sources zero-extended
    fn unsigned_bits(self) -> u64 {
        match self {
            Source::Int { value, narrow: true } => value as i32 as u32 as u64,
            Source::Int { value, .. } => value as u64,
            Source::Float(f) => f as u64,
        }
    }

    /// Checked integer view within `min..=max`
    fn checked(self, min: i128, max: i128, op: Opcode) -> VmResult<i128> {
        let v = match self {
            Source::Int { value, .. } => value as i128,
            Source::Float(f) if f.is_finite() => {
                let t = f.trunc();
                if t < min as f64 || t > max as f64 {
                    return Err(VmError::Overflow(op.name()));
                }
                t as i128
            }
            Source::Float(_) => return Err(VmError::Overflow(op.name())),
        };
        if (min..=max).contains(&v) {
            Ok(v)
        } else {
            Err(VmError::Overflow(op.name()))
        }
    }
}

/// Apply a conversion opcode
pub(super) fn convert(op: Opcode, value: &Value) -> VmResult<Value> {
    let src = Source::of(value, op)?;
    Ok(match op {
        Opcode::ConvI1 => Value::I32(src.bits() as i8 as i32),
        Opcode::ConvI2 => Value::I32(src.bits() as i16 as i32),
        Opcode::ConvI4 => Value::I32(src.bits() as i32),
        Opcode::ConvI8 => Value::I64(src.bits()),
        Opcode::ConvU1 => Value::I32(src.bits() as u8 as i32),
        Opcode::ConvU2 => Value::I32(src.bits() as u16 as i32),
        Opcode::ConvU4 => Value::I32(src.unsigned_bits() as u32 as i32),
        Opcode::ConvU8 => Value::I64(src.unsigned_bits() as i64),
        Opcode::ConvR4 => match src {
            Source::Int { value, .. } => Value::F32(value as f32),
            Source::Float(f) => Value::F32(f as f32),
        },
        Opcode::ConvR8 => match src {
            Source::Int { value, .. } => Value::F64(value as f64),
            Source::Float(f) => Value::F64(f),
        },
        Opcode::ConvRUn => match src {
            Source::Int { .. } => Value::F64(src.unsigned_bits() as f64),
            Source::Float(f) => Value::F64(f),
        },

        Opcode::ConvOvfI1 => Value::I32(src.checked(i8::MIN as i128, i8::MAX as i128, op)? as i32),
        Opcode::ConvOvfI2 => Value::I32(src.checked(i16::MIN as i128, i16::MAX as i128, op)? as i32),
        Opcode::ConvOvfI4 => Value::I32(src.checked(i32::MIN as i128, i32::MAX as i128, op)? as i32),
        Opcode::ConvOvfI8 => Value::I64(src.checked(i64::MIN as i128, i64::MAX as i128, op)? as i64),
        Opcode::ConvOvfU1 => Value::I32(src.checked(0, u8::MAX as i128, op)? as i32),
        Opcode::ConvOvfU2 => Value::I32(src.checked(0, u16::MAX as i128, op)? as i32),
        Opcode::ConvOvfU4 => Value::I32(src.checked(0, u32::MAX as i128, op)? as u32 as i32),
        Opcode::ConvOvfU8 => Value::I64(src.checked(0, u64::MAX as i128, op)? as u64 as i64),

        _ => return Err(VmError::TypeError(format!("'{}' is not a conversion", op))),
    })
}

impl Vm {
    pub(super) fn exec_conversion_ops(&mut self, frame: &mut Frame, op: Opcode) -> VmResult<OpcodeResult> {
        let value = frame.pop()?;
        frame.push(convert(op, &value)?)?;
        Ok(OpcodeResult::Continue)
    }
}
