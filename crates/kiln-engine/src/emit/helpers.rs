//! Typed emission helpers
//!
//! These pick the compact encoding for constants and slot accesses, and
//! choose the instruction sequence for a conversion, box or default value
//! from the semantic class of the type involved.

use super::instruction::{Label, LocalBuilder, Operand};
use super::opcode::Opcode;
use super::{EmitError, EmitResult, InstructionEmitter};
use crate::types::{Constant, MethodRef, TypeClass, TypeRef};

/// Comparison used by [`InstructionEmitter::branch_if`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// a == b
    Eq,
    /// a != b
    Ne,
    /// a < b
    Lt,
    /// a <= b
    Le,
    /// a > b
    Gt,
    /// a >= b
    Ge,
}

impl InstructionEmitter {
    /// Push an int32 using the shortest encoding
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.emit(Opcode::LdcI4M1),
            0..=8 => self.emit(Opcode::indexed(Opcode::LdcI4_0, value as u8)),
            -128..=127 => self.emit_with(Opcode::LdcI4S, Operand::I32(value)),
            _ => self.emit_with(Opcode::LdcI4, Operand::I32(value)),
        }
    }

    /// Load an argument by index using the shortest encoding
    pub fn ldarg(&mut self, index: u16) -> &mut Self {
        match index {
            0..=3 => self.emit(Opcode::indexed(Opcode::Ldarg0, index as u8)),
            4..=255 => self.emit_with(Opcode::LdargS, Operand::Arg(index)),
            _ => self.emit_with(Opcode::Ldarg, Operand::Arg(index)),
        }
    }

    /// Store to an argument by index using the shortest encoding
    pub fn starg(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.emit_with(Opcode::StargS, Operand::Arg(index))
        } else {
            self.emit_with(Opcode::Starg, Operand::Arg(index))
        }
    }

    /// Load a local using the shortest encoding
    pub fn ldloc(&mut self, local: &LocalBuilder) -> &mut Self {
        self.ldloc_index(local.index)
    }

    /// Store to a local using the shortest encoding
    pub fn stloc(&mut self, local: &LocalBuilder) -> &mut Self {
        self.stloc_index(local.index)
    }

    /// Load a local by slot index using the shortest encoding
    pub fn ldloc_index(&mut self, index: u16) -> &mut Self {
        match index {
            0..=3 => self.emit(Opcode::indexed(Opcode::Ldloc0, index as u8)),
            4..=255 => self.emit_with(Opcode::LdlocS, Operand::Local(index)),
            _ => self.emit_with(Opcode::Ldloc, Operand::Local(index)),
        }
    }

    /// Store to a local by slot index using the shortest encoding
    pub fn stloc_index(&mut self, index: u16) -> &mut Self {
        match index {
            0..=3 => self.emit(Opcode::indexed(Opcode::Stloc0, index as u8)),
            4..=255 => self.emit_with(Opcode::StlocS, Operand::Local(index)),
            _ => self.emit_with(Opcode::Stloc, Operand::Local(index)),
        }
    }

    /// Push a compile-time constant
    pub fn load_constant(&mut self, constant: &Constant) -> &mut Self {
        match constant {
            Constant::Null => self.ldnull(),
            Constant::Bool(b) => self.ldc_i4(*b as i32),
            Constant::I32(v) => self.ldc_i4(*v),
            Constant::I64(v) => self.ldc_i8(*v),
            Constant::F32(v) => self.ldc_r4(*v),
            Constant::F64(v) => self.ldc_r8(*v),
            Constant::Str(s) => self.emit_with(Opcode::Ldstr, Operand::Str(s.clone())),
        }
    }

    /// Push the default value of a type
    ///
    /// Generic parameters go through a fresh local, which the runtime
    /// initializes to the instantiated type's default.
    pub fn load_default(&mut self, ty: &TypeRef) -> EmitResult<&mut Self> {
        match ty.classify() {
            TypeClass::Void => Err(EmitError::UnsupportedConversion {
                target: ty.clone(),
                reason: "void has no default value",
            }),
            TypeClass::Bool | TypeClass::Char => Ok(self.ldc_i4(0)),
            TypeClass::SignedInt(64) | TypeClass::UnsignedInt(64) => Ok(self.ldc_i8(0)),
            TypeClass::SignedInt(_) | TypeClass::UnsignedInt(_) => Ok(self.ldc_i4(0)),
            TypeClass::Float(32) => Ok(self.ldc_r4(0.0)),
            TypeClass::Float(_) => Ok(self.ldc_r8(0.0)),
            TypeClass::Reference => Ok(self.ldnull()),
            TypeClass::Generic => {
                let local = self.declare_local(ty.clone());
                Ok(self.ldloc(&local))
            }
        }
    }

    /// Convert the top of the stack to the target type
    pub fn convert_to(&mut self, target: &TypeRef) -> EmitResult<&mut Self> {
        let opcode = match target.classify() {
            TypeClass::SignedInt(8) => Opcode::ConvI1,
            TypeClass::SignedInt(16) => Opcode::ConvI2,
            TypeClass::SignedInt(32) => Opcode::ConvI4,
            TypeClass::SignedInt(_) => Opcode::ConvI8,
            TypeClass::UnsignedInt(8) => Opcode::ConvU1,
            TypeClass::UnsignedInt(16) | TypeClass::Char => Opcode::ConvU2,
            TypeClass::UnsignedInt(32) => Opcode::ConvU4,
            TypeClass::UnsignedInt(_) => Opcode::ConvU8,
            TypeClass::Float(32) => Opcode::ConvR4,
            TypeClass::Float(_) => Opcode::ConvR8,
            TypeClass::Bool => {
                return Err(EmitError::UnsupportedConversion {
                    target: target.clone(),
                    reason: "no numeric conversion produces a bool",
                })
            }
            TypeClass::Reference | TypeClass::Generic | TypeClass::Void => {
                return Err(EmitError::UnsupportedConversion {
                    target: target.clone(),
                    reason: "conversions apply to numeric types only",
                })
            }
        };
        Ok(self.emit(opcode))
    }

    /// Convert with overflow checking
    ///
    /// Float targets have no checked form and use the plain conversion.
    pub fn convert_checked_to(&mut self, target: &TypeRef) -> EmitResult<&mut Self> {
        let opcode = match target.classify() {
            TypeClass::SignedInt(8) => Opcode::ConvOvfI1,
            TypeClass::SignedInt(16) => Opcode::ConvOvfI2,
            TypeClass::SignedInt(32) => Opcode::ConvOvfI4,
            TypeClass::SignedInt(_) => Opcode::ConvOvfI8,
            TypeClass::UnsignedInt(8) => Opcode::ConvOvfU1,
            TypeClass::UnsignedInt(16) | TypeClass::Char => Opcode::ConvOvfU2,
            TypeClass::UnsignedInt(32) => Opcode::ConvOvfU4,
            TypeClass::UnsignedInt(_) => Opcode::ConvOvfU8,
            TypeClass::Float(_) => return self.convert_to(target),
            _ => {
                return Err(EmitError::UnsupportedConversion {
                    target: target.clone(),
                    reason: "checked conversions apply to numeric types only",
                })
            }
        };
        Ok(self.emit(opcode))
    }

    /// Convert between two known types, treating unsigned sources specially
    pub fn convert(&mut self, from: &TypeRef, to: &TypeRef) -> EmitResult<&mut Self> {
        match (from.classify(), to.classify()) {
            (TypeClass::UnsignedInt(_), TypeClass::Float(_)) => {
                self.conv_r_un();
                self.convert_to(to)
            }
            (a, b) if a == b && from.is_value_type() => Ok(self),
            _ => self.convert_to(to),
        }
    }

    /// Box the top of the stack if the type is a value type
    pub fn box_if_value(&mut self, ty: &TypeRef) -> &mut Self {
        if ty.is_value_type() || ty.is_generic() {
            self.box_value(ty.clone())
        } else {
            self
        }
    }

    /// Turn an object reference into a value of `ty`
    ///
    /// Value types (and generic parameters) are unboxed; references are
    /// cast. Casting to the root object type is a no-op.
    pub fn unbox_or_cast(&mut self, ty: &TypeRef) -> &mut Self {
        match ty {
            TypeRef::Object => self,
            _ if ty.is_value_type() || ty.is_generic() => self.unbox_any(ty.clone()),
            _ => self.castclass(ty.clone()),
        }
    }

    /// Load an array element of the given type
    pub fn load_element(&mut self, element: &TypeRef) -> &mut Self {
        self.ldelem(element.clone())
    }

    /// Store an array element of the given type
    pub fn store_element(&mut self, element: &TypeRef) -> &mut Self {
        self.stelem(element.clone())
    }

    /// Branch on a comparison of the two top values
    pub fn branch_if(&mut self, comparison: Comparison, label: Label) -> &mut Self {
        self.branch_compare(comparison, false, label)
    }

    /// Branch on an unsigned (or unordered float) comparison
    pub fn branch_if_unsigned(&mut self, comparison: Comparison, label: Label) -> &mut Self {
        self.branch_compare(comparison, true, label)
    }

    fn branch_compare(&mut self, comparison: Comparison, unsigned: bool, label: Label) -> &mut Self {
        let opcode = match (comparison, unsigned) {
            (Comparison::Eq, _) => Opcode::Beq,
            (Comparison::Ne, _) => Opcode::BneUn,
            (Comparison::Lt, false) => Opcode::Blt,
            (Comparison::Lt, true) => Opcode::BltUn,
            (Comparison::Le, false) => Opcode::Ble,
            (Comparison::Le, true) => Opcode::BleUn,
            (Comparison::Gt, false) => Opcode::Bgt,
            (Comparison::Gt, true) => Opcode::BgtUn,
            (Comparison::Ge, false) => Opcode::Bge,
            (Comparison::Ge, true) => Opcode::BgeUn,
        };
        self.emit_with(opcode, Operand::Label(label))
    }

    /// Branch if the top value is true, non-zero or non-null
    pub fn branch_if_true(&mut self, label: Label) -> &mut Self {
        self.brtrue(label)
    }

    /// Branch if the top value is false, zero or null
    pub fn branch_if_false(&mut self, label: Label) -> &mut Self {
        self.brfalse(label)
    }

    /// Unconditional branch
    pub fn branch(&mut self, label: Label) -> &mut Self {
        self.br(label)
    }

    /// Call a method, through virtual dispatch when requested
    pub fn call_method(&mut self, method: MethodRef, virtual_dispatch: bool) -> &mut Self {
        if virtual_dispatch {
            self.callvirt(method)
        } else {
            self.call(method)
        }
    }

    /// Construct an object and throw it
    pub fn throw_new(&mut self, constructor: MethodRef) -> &mut Self {
        self.newobj(constructor).throw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Primitive, TypeHandle, TypeId, TypeKind};

    fn ops(il: &InstructionEmitter) -> Vec<Opcode> {
        il.instructions().iter().map(|i| i.opcode).collect()
    }

    #[test]
    fn test_ldc_i4_folding() {
        let cases = [
            (-1, Opcode::LdcI4M1, Operand::None),
            (0, Opcode::LdcI4_0, Operand::None),
            (5, Opcode::LdcI4_5, Operand::None),
            (8, Opcode::LdcI4_8, Operand::None),
            (9, Opcode::LdcI4S, Operand::I32(9)),
            (-128, Opcode::LdcI4S, Operand::I32(-128)),
            (127, Opcode::LdcI4S, Operand::I32(127)),
            (128, Opcode::LdcI4, Operand::I32(128)),
            (-129, Opcode::LdcI4, Operand::I32(-129)),
            (i32::MAX, Opcode::LdcI4, Operand::I32(i32::MAX)),
        ];
        for (value, opcode, operand) in cases {
            let mut il = InstructionEmitter::new("f");
            il.ldc_i4(value);
            assert_eq!(il.instructions()[0].opcode, opcode, "value {}", value);
            assert_eq!(il.instructions()[0].operand, operand, "value {}", value);
        }
    }

    #[test]
    fn test_slot_short_forms() {
        let mut il = InstructionEmitter::new("f");
        il.ldarg(0).ldarg(3).ldarg(4).ldarg(300).starg(2).starg(256);
        assert_eq!(
            ops(&il),
            vec![
                Opcode::Ldarg0,
                Opcode::Ldarg3,
                Opcode::LdargS,
                Opcode::Ldarg,
                Opcode::StargS,
                Opcode::Starg
            ]
        );

        let mut il = InstructionEmitter::new("f");
        let locals: Vec<_> = (0..5).map(|_| il.declare_local(TypeRef::I32)).collect();
        il.ldloc(&locals[1]).stloc(&locals[3]).ldloc(&locals[4]).stloc(&locals[4]);
        assert_eq!(
            ops(&il),
            vec![Opcode::Ldloc1, Opcode::Stloc3, Opcode::LdlocS, Opcode::StlocS]
        );
    }

    #[test]
    fn test_convert_dispatch() {
        let cases = [
            (TypeRef::I8, Opcode::ConvI1),
            (TypeRef::I16, Opcode::ConvI2),
            (TypeRef::I32, Opcode::ConvI4),
            (TypeRef::I64, Opcode::ConvI8),
            (TypeRef::U8, Opcode::ConvU1),
            (TypeRef::U16, Opcode::ConvU2),
            (TypeRef::CHAR, Opcode::ConvU2),
            (TypeRef::U32, Opcode::ConvU4),
            (TypeRef::U64, Opcode::ConvU8),
            (TypeRef::F32, Opcode::ConvR4),
            (TypeRef::F64, Opcode::ConvR8),
        ];
        for (target, opcode) in cases {
            let mut il = InstructionEmitter::new("f");
            il.convert_to(&target).unwrap();
            assert_eq!(ops(&il), vec![opcode], "target {}", target);
        }
    }

    #[test]
    fn test_convert_enum_uses_underlying() {
        let handle = TypeHandle::new(
            TypeId(1),
            TypeKind::Enum {
                underlying: Primitive::U8,
            },
        );
        let mut il = InstructionEmitter::new("f");
        il.convert_to(&TypeRef::Defined(handle)).unwrap();
        il.convert_checked_to(&TypeRef::Defined(handle)).unwrap();
        assert_eq!(ops(&il), vec![Opcode::ConvU1, Opcode::ConvOvfU1]);
    }

    #[test]
    fn test_convert_unsupported() {
        let mut il = InstructionEmitter::new("f");
        let class = TypeRef::Defined(TypeHandle::new(TypeId(2), TypeKind::Class));
        for target in [TypeRef::String, TypeRef::BOOL, class, TypeRef::Void] {
            assert!(matches!(
                il.convert_to(&target),
                Err(EmitError::UnsupportedConversion { .. })
            ));
        }
        assert!(il.is_empty());
    }

    #[test]
    fn test_convert_unsigned_to_float() {
        let mut il = InstructionEmitter::new("f");
        il.convert(&TypeRef::U32, &TypeRef::F64).unwrap();
        assert_eq!(ops(&il), vec![Opcode::ConvRUn, Opcode::ConvR8]);
    }

    #[test]
    fn test_load_default() {
        let mut il = InstructionEmitter::new("f");
        il.load_default(&TypeRef::I32).unwrap();
        il.load_default(&TypeRef::I64).unwrap();
        il.load_default(&TypeRef::F32).unwrap();
        il.load_default(&TypeRef::String).unwrap();
        il.load_default(&TypeRef::generic("T")).unwrap();
        assert_eq!(
            ops(&il),
            vec![
                Opcode::LdcI4_0,
                Opcode::LdcI8,
                Opcode::LdcR4,
                Opcode::Ldnull,
                Opcode::Ldloc0
            ]
        );
        assert!(il.load_default(&TypeRef::Void).is_err());
    }

    #[test]
    fn test_box_and_unbox_dispatch() {
        let mut il = InstructionEmitter::new("f");
        il.box_if_value(&TypeRef::I32)
            .box_if_value(&TypeRef::String)
            .unbox_or_cast(&TypeRef::F64)
            .unbox_or_cast(&TypeRef::String)
            .unbox_or_cast(&TypeRef::Object);
        assert_eq!(
            ops(&il),
            vec![Opcode::Box, Opcode::UnboxAny, Opcode::Castclass]
        );
    }

    #[test]
    fn test_branch_helpers() {
        let mut il = InstructionEmitter::new("f");
        let l = il.define_label();
        il.branch_if(Comparison::Lt, l)
            .branch_if_unsigned(Comparison::Ge, l)
            .branch_if(Comparison::Ne, l)
            .branch_if_true(l)
            .branch_if_false(l);
        assert_eq!(
            ops(&il),
            vec![
                Opcode::Blt,
                Opcode::BgeUn,
                Opcode::BneUn,
                Opcode::Brtrue,
                Opcode::Brfalse
            ]
        );
    }
}
