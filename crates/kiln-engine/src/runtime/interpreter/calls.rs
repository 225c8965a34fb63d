//! Call, virtual call and object construction

use std::sync::Arc;

use super::frame::Frame;
use super::{bad_operand, method_operand, OpcodeResult, Vm};
use crate::emit::{Instruction, Opcode};
use crate::runtime::class::RuntimeMethod;
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};
use crate::types::{TypeRef, TypeKind};

impl Vm {
    pub(super) fn exec_call_ops(&mut self, frame: &mut Frame, instr: &Instruction) -> VmResult<OpcodeResult> {
        let (handle, generic_args) = method_operand(instr)?;
        let type_args: Arc<[TypeRef]> = match generic_args {
            Some(args) => args.iter().map(|t| frame.resolve(t)).collect(),
            None => Arc::from([]),
        };
        let method = self.runtime_method(handle)?;

        match instr.opcode {
            Opcode::Call | Opcode::Callvirt => {
                let receiver = usize::from(!method.is_static());
                let args = frame.pop_n(method.params.len() + receiver)?;
                let target = if method.is_static() {
                    self.ensure_initialized(handle.owner)?;
                    method
                } else if instr.opcode == Opcode::Callvirt {
                    let this = args.first().ok_or(VmError::StackUnderflow)?;
                    self.resolve_virtual(this, &method)?
                } else {
                    method
                };
                let returns = target.return_type != TypeRef::Void;
                let result = self.execute(target, args, type_args)?;
                if returns {
                    frame.push(result)?;
                }
            }
            Opcode::Newobj => {
                let rt = self.runtime_type(handle.owner)?;
                let mut args = frame.pop_n(method.params.len())?;
                let obj = self.allocate(&rt)?;
                args.insert(0, obj.clone());
                self.execute(method, args, type_args)?;
                frame.push(obj)?;
            }
            op => return Err(bad_operand(op)),
        }
        Ok(OpcodeResult::Continue)
    }

    /// Find the method a virtual call on `receiver` actually runs
    ///
    /// Interface methods go through the receiver type's interface map; the
    /// result (or the declared method) is then looked up in the receiver's
    /// vtable if it occupies a virtual slot.
    pub(super) fn resolve_virtual(
        &self,
        receiver: &Value,
        declared: &Arc<RuntimeMethod>,
    ) -> VmResult<Arc<RuntimeMethod>> {
        let obj = match receiver {
            Value::Object(o) => o,
            Value::Null => return Err(VmError::NullReference),
            _ if !declared.is_virtual() => return Ok(Arc::clone(declared)),
            other => {
                return Err(VmError::TypeError(format!(
                    "cannot dispatch '{}' on {}",
                    declared.name,
                    other.kind_name()
                )))
            }
        };
        let owner = declared.handle.owner;
        if !self.derives_from(obj.type_id(), owner) {
            return Err(VmError::InvalidCast {
                from: obj.type_id().to_string(),
                to: owner.to_string(),
            });
        }
        let rt = self.runtime_type(obj.type_id())?;

        let mut target = Arc::clone(declared);
        if self.runtime_type(owner)?.handle.kind == TypeKind::Interface {
            let implementation = rt.interface_map.get(&declared.handle).copied().ok_or_else(|| {
                VmError::MissingMember {
                    owner: rt.full_name.clone(),
                    member: declared.name.clone(),
                }
            })?;
            target = self.runtime_method(implementation)?;
        }
        if let Some(slot) = target.vtable_slot {
            if let Some(overriding) = rt.vtable.get_method(slot) {
                if overriding != target.handle {
                    target = self.runtime_method(overriding)?;
                }
            }
        }
        Ok(target)
    }
}
