//! Fields, casts, boxing and arrays

use std::sync::Arc;

use super::frame::Frame;
use super::{bad_operand, field_operand, literal_value, type_operand, OpcodeResult, Vm};
use crate::emit::{Instruction, Opcode};
use crate::runtime::class::FieldSlot;
use crate::runtime::object::{ArrayObject, BoxedValue};
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};
use crate::types::{TypeId, TypeRef};

impl Vm {
    pub(super) fn exec_object_ops(&mut self, frame: &mut Frame, instr: &Instruction) -> VmResult<OpcodeResult> {
        let op = instr.opcode;
        match op {
            Opcode::Ldfld => {
                let field = self.runtime_field(field_operand(instr)?)?;
                let target = frame.pop()?;
                let value = match (field.slot, &target) {
                    (_, Value::Null) => return Err(VmError::NullReference),
                    (FieldSlot::Instance(slot), Value::Object(obj)) => obj
                        .get_field(slot)
                        .ok_or_else(|| VmError::RuntimeError(format!("field '{}' outside object layout", field.name)))?,
                    (FieldSlot::Literal, _) => literal_value(&field),
                    (_, other) => {
                        return Err(VmError::TypeError(format!(
                            "ldfld '{}' on {}",
                            field.name,
                            other.kind_name()
                        )))
                    }
                };
                frame.push(value)?;
            }
            Opcode::Stfld => {
                let field = self.runtime_field(field_operand(instr)?)?;
                let value = frame.pop()?;
                match (field.slot, frame.pop()?) {
                    (_, Value::Null) => return Err(VmError::NullReference),
                    (FieldSlot::Instance(slot), Value::Object(obj)) => {
                        obj.set_field(slot, value).map_err(VmError::RuntimeError)?
                    }
                    (_, other) => {
                        return Err(VmError::TypeError(format!(
                            "stfld '{}' on {}",
                            field.name,
                            other.kind_name()
                        )))
                    }
                }
            }
            Opcode::Ldsfld => {
                let field = self.runtime_field(field_operand(instr)?)?;
                let value = match field.slot {
                    FieldSlot::Static(slot) => self.static_slot(field.handle.owner, slot)?.clone(),
                    FieldSlot::Literal => literal_value(&field),
                    FieldSlot::Instance(_) => {
                        return Err(VmError::TypeError(format!("ldsfld on instance field '{}'", field.name)))
                    }
                };
                frame.push(value)?;
            }
            Opcode::Stsfld => {
                let field = self.runtime_field(field_operand(instr)?)?;
                let value = frame.pop()?;
                match field.slot {
                    FieldSlot::Static(slot) => *self.static_slot(field.handle.owner, slot)? = value,
                    _ => return Err(VmError::TypeError(format!("stsfld on non-static field '{}'", field.name))),
                }
            }

            Opcode::Castclass => {
                let ty = frame.resolve(type_operand(instr)?);
                let value = frame.pop()?;
                if !value.is_null() && !self.conforms(&value, &ty) {
                    return Err(invalid_cast(&value, &ty));
                }
                frame.push(value)?;
            }
            Opcode::Isinst => {
                let ty = frame.resolve(type_operand(instr)?);
                let value = frame.pop()?;
                let result = if self.conforms(&value, &ty) { value } else { Value::Null };
                frame.push(result)?;
            }
            Opcode::Box => {
                let ty = frame.resolve(type_operand(instr)?);
                let value = frame.pop()?;
                let boxed = if ty.is_value_type() {
                    Value::Boxed(Arc::new(BoxedValue { ty, value }))
                } else {
                    value
                };
                frame.push(boxed)?;
            }
            Opcode::UnboxAny => {
                let ty = frame.resolve(type_operand(instr)?);
                let value = frame.pop()?;
                let result = if ty.is_value_type() {
                    match &value {
                        Value::Null => return Err(VmError::NullReference),
                        Value::Boxed(b) if b.ty == ty || b.ty.classify() == ty.classify() => b.value.clone(),
                        _ => return Err(invalid_cast(&value, &ty)),
                    }
                } else if value.is_null() || self.conforms(&value, &ty) {
                    value
                } else {
                    return Err(invalid_cast(&value, &ty));
                };
                frame.push(result)?;
            }

            Opcode::Newarr => {
                let element = frame.resolve(type_operand(instr)?);
                let len = frame.pop()?;
                let len = len
                    .as_i64()
                    .ok_or_else(|| VmError::TypeError(format!("array length must be an integer, found {}", len.kind_name())))?;
                let len = usize::try_from(len).map_err(|_| VmError::Overflow("newarr"))?;
                frame.push(Value::Array(Arc::new(ArrayObject::new(element, len))))?;
            }
            Opcode::Ldlen => match frame.pop()? {
                Value::Array(a) => frame.push(Value::I32(a.len() as i32))?,
                Value::Null => return Err(VmError::NullReference),
                other => return Err(VmError::TypeError(format!("ldlen on {}", other.kind_name()))),
            },
            Opcode::Ldelem => {
                let index = frame.pop()?;
                let array = array_operand(frame.pop()?)?;
                let i = element_index(&index, &array)?;
                let value = array.get(i).unwrap_or_default();
                frame.push(value)?;
            }
            Opcode::Stelem => {
                let value = frame.pop()?;
                let index = frame.pop()?;
                let array = array_operand(frame.pop()?)?;
                let i = element_index(&index, &array)?;
                array.set(i, value);
            }

            _ => return Err(bad_operand(op)),
        }
        Ok(OpcodeResult::Continue)
    }

    /// Check whether a non-null value can be viewed as `ty`
    pub(super) fn conforms(&self, value: &Value, ty: &TypeRef) -> bool {
        match (ty, value) {
            (_, Value::Null) => false,
            (TypeRef::Object, _) => true,
            (TypeRef::String, Value::Str(_)) => true,
            (TypeRef::Array(element), Value::Array(a)) => {
                a.element_type() == element.as_ref()
                    || (**element == TypeRef::Object && !a.element_type().is_value_type())
            }
            (TypeRef::Defined(h), Value::Object(o)) => self.derives_from(o.type_id(), h.id),
            (_, Value::Boxed(b)) => b.ty == *ty,
            _ => false,
        }
    }

    /// Check whether `ty` is `target`, derives from it or implements it
    pub(super) fn derives_from(&self, ty: TypeId, target: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            let Some(rt) = self.session.realized(id) else {
                return false;
            };
            if rt.implements(target) {
                return true;
            }
            current = rt.base;
        }
        false
    }
}

fn invalid_cast(value: &Value, ty: &TypeRef) -> VmError {
    VmError::InvalidCast {
        from: value.kind_name().to_string(),
        to: ty.to_string(),
    }
}

fn array_operand(value: Value) -> VmResult<Arc<ArrayObject>> {
    match value {
        Value::Array(a) => Ok(a),
        Value::Null => Err(VmError::NullReference),
        other => Err(VmError::TypeError(format!("expected an array, found {}", other.kind_name()))),
    }
}

fn element_index(index: &Value, array: &ArrayObject) -> VmResult<usize> {
    let i = index
        .as_i64()
        .ok_or_else(|| VmError::TypeError(format!("array index must be an integer, found {}", index.kind_name())))?;
    match usize::try_from(i) {
        Ok(i) if i < array.len() => Ok(i),
        _ => Err(VmError::IndexOutOfRange { index: i, len: array.len() }),
    }
}
