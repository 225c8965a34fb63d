//! Branches, switch and return

use super::arithmetic::compare;
use super::frame::Frame;
use super::{bad_operand, OpcodeResult, Vm};
use crate::emit::{FlowControl, Instruction, Opcode, Operand};
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};
use crate::types::TypeRef;

/// Truthiness used by `brtrue` and `brfalse`
fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::I32(v) => *v != 0,
        Value::I64(v) => *v != 0,
        Value::F32(v) => *v != 0.0,
        Value::F64(v) => *v != 0.0,
        _ => true,
    }
}

impl Vm {
    pub(super) fn exec_control_flow_ops(
        &mut self,
        frame: &mut Frame,
        instr: &Instruction,
        ip: usize,
    ) -> VmResult<OpcodeResult> {
        let op = instr.opcode;
        match op {
            Opcode::Ret => {
                let value = if frame.method.return_type == TypeRef::Void {
                    Value::Null
                } else {
                    frame.pop()?
                };
                return Ok(OpcodeResult::Return(value));
            }
            Opcode::Switch => {
                let Operand::Switch(labels) = &instr.operand else {
                    return Err(bad_operand(op));
                };
                let index = frame.pop()?;
                let index = index
                    .as_i32()
                    .ok_or_else(|| VmError::TypeError(format!("switch index must be i32, found {}", index.kind_name())))?;
                if let Some(label) = labels.get(index as u32 as usize) {
                    frame.ip = frame.target(*label)?;
                }
            }
            Opcode::Throw | Opcode::Rethrow | Opcode::Leave | Opcode::LeaveS | Opcode::Endfinally => {
                return self.exec_exception_ops(frame, instr, ip)
            }
            _ => {
                let Operand::Label(label) = instr.operand else {
                    return Err(bad_operand(op));
                };
                let taken = match op.flow() {
                    FlowControl::Branch => true,
                    FlowControl::CondBranch => match op {
                        Opcode::Brtrue | Opcode::BrtrueS => is_true(&frame.pop()?),
                        Opcode::Brfalse | Opcode::BrfalseS => !is_true(&frame.pop()?),
                        _ => {
                            let b = frame.pop()?;
                            let a = frame.pop()?;
                            compare(op, &a, &b)?
                        }
                    },
                    _ => return Err(bad_operand(op)),
                };
                if taken {
                    frame.ip = frame.target(label)?;
                }
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
