//! Constants, stack manipulation, arguments and locals

use super::frame::Frame;
use super::{bad_operand, OpcodeResult, Vm};
use crate::emit::{Instruction, Opcode, Operand};
use crate::runtime::value::Value;
use crate::runtime::VmResult;

impl Vm {
    pub(super) fn exec_variable_ops(&mut self, frame: &mut Frame, instr: &Instruction) -> VmResult<OpcodeResult> {
        let op = instr.opcode;
        match op {
            Opcode::Nop => {}
            Opcode::Dup => {
                let top = frame.peek()?.clone();
                frame.push(top)?;
            }
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Ldnull => frame.push(Value::Null)?,

            Opcode::LdcI4M1 => frame.push(Value::I32(-1))?,
            Opcode::LdcI4_0
            | Opcode::LdcI4_1
            | Opcode::LdcI4_2
            | Opcode::LdcI4_3
            | Opcode::LdcI4_4
            | Opcode::LdcI4_5
            | Opcode::LdcI4_6
            | Opcode::LdcI4_7
            | Opcode::LdcI4_8 => frame.push(Value::I32((op as u8 - Opcode::LdcI4_0 as u8) as i32))?,
            Opcode::LdcI4S | Opcode::LdcI4 => match instr.operand {
                Operand::I32(v) => frame.push(Value::I32(v))?,
                _ => return Err(bad_operand(op)),
            },
            Opcode::LdcI8 => match instr.operand {
                Operand::I64(v) => frame.push(Value::I64(v))?,
                _ => return Err(bad_operand(op)),
            },
            Opcode::LdcR4 => match instr.operand {
                Operand::F32(v) => frame.push(Value::F32(v))?,
                _ => return Err(bad_operand(op)),
            },
            Opcode::LdcR8 => match instr.operand {
                Operand::F64(v) => frame.push(Value::F64(v))?,
                _ => return Err(bad_operand(op)),
            },
            Opcode::Ldstr => match &instr.operand {
                Operand::Str(s) => frame.push(Value::Str(s.clone()))?,
                _ => return Err(bad_operand(op)),
            },

            Opcode::Ldarg0 | Opcode::Ldarg1 | Opcode::Ldarg2 | Opcode::Ldarg3 => {
                let value = frame.arg((op as u8 - Opcode::Ldarg0 as u8) as usize)?;
                frame.push(value)?;
            }
            Opcode::LdargS | Opcode::Ldarg => {
                let value = frame.arg(arg_index(instr)?)?;
                frame.push(value)?;
            }
            Opcode::StargS | Opcode::Starg => {
                let value = frame.pop()?;
                frame.set_arg(arg_index(instr)?, value)?;
            }

            Opcode::Ldloc0 | Opcode::Ldloc1 | Opcode::Ldloc2 | Opcode::Ldloc3 => {
                let value = frame.local((op as u8 - Opcode::Ldloc0 as u8) as usize)?;
                frame.push(value)?;
            }
            Opcode::LdlocS | Opcode::Ldloc => {
                let value = frame.local(local_index(instr)?)?;
                frame.push(value)?;
            }
            Opcode::Stloc0 | Opcode::Stloc1 | Opcode::Stloc2 | Opcode::Stloc3 => {
                let value = frame.pop()?;
                frame.set_local((op as u8 - Opcode::Stloc0 as u8) as usize, value)?;
            }
            Opcode::StlocS | Opcode::Stloc => {
                let value = frame.pop()?;
                frame.set_local(local_index(instr)?, value)?;
            }

            _ => return Err(bad_operand(op)),
        }
        Ok(OpcodeResult::Continue)
    }
}

fn arg_index(instr: &Instruction) -> VmResult<usize> {
    match instr.operand {
        Operand::Arg(i) => Ok(i as usize),
        _ => Err(bad_operand(instr.opcode)),
    }
}

fn local_index(instr: &Instruction) -> VmResult<usize> {
    match instr.operand {
        Operand::Local(i) => Ok(i as usize),
        _ => Err(bad_operand(instr.opcode)),
    }
}
