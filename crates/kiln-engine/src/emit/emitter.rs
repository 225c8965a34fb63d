//! Fluent instruction emitter

use std::sync::Arc;

use super::instruction::{ExceptionRegion, HandlerKind, Instruction, Label, LocalBuilder, Operand};
use super::opcode::Opcode;
use super::EmitError;
use crate::types::{FieldRef, MethodRef, TypeRef};

/// An exception block that has been opened but not yet ended
#[derive(Debug)]
struct OpenBlock {
    try_start: usize,
    end: Label,
    try_end: Option<usize>,
    handler: Option<(usize, HandlerKind)>,
    finally_protects: usize,
}

/// Chainable emitter for one method body
///
/// Emission never fails eagerly: operand mismatches and label misuse are
/// recorded and reported by [`seal`](InstructionEmitter::seal), so a body
/// generator can chain calls freely and get every problem back as one
/// `Result`. Exception block misnesting is the exception, since the block
/// methods already return `Result`.
#[derive(Debug)]
pub struct InstructionEmitter {
    pub(crate) method: String,
    pub(crate) returns_value: bool,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) labels: Vec<Option<usize>>,
    pub(crate) locals: Vec<TypeRef>,
    pub(crate) regions: Vec<ExceptionRegion>,
    blocks: Vec<OpenBlock>,
    pub(crate) errors: Vec<EmitError>,
    pub(crate) sealed: bool,
}

impl InstructionEmitter {
    /// Create an emitter for a method body
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            returns_value: false,
            instructions: Vec::new(),
            labels: Vec::new(),
            locals: Vec::new(),
            regions: Vec::new(),
            blocks: Vec::new(),
            errors: Vec::new(),
            sealed: false,
        }
    }

    /// Declare whether `ret` carries a value
    pub fn returning(mut self, returns_value: bool) -> Self {
        self.returns_value = returns_value;
        self
    }

    /// Name of the method being emitted
    pub fn method_name(&self) -> &str {
        &self.method
    }

    /// Number of instructions emitted so far
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if nothing has been emitted yet
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions emitted so far
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Check if the emitter has been sealed
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ===== Raw emission =====

    /// Emit an opcode that takes no operand
    #[inline]
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.emit_with(opcode, Operand::None)
    }

    /// Emit an opcode with an operand
    ///
    /// The operand is checked against the opcode's operand kind; a mismatch
    /// is recorded and reported when the emitter is sealed.
    pub fn emit_with(&mut self, opcode: Opcode, operand: Operand) -> &mut Self {
        if self.sealed {
            if !self.errors.iter().any(|e| matches!(e, EmitError::Sealed(_))) {
                self.errors.push(EmitError::Sealed(self.method.clone()));
            }
            return self;
        }
        let expected = opcode.operand_kind();
        if !operand.fits(expected) {
            self.errors.push(EmitError::OperandMismatch {
                offset: self.instructions.len(),
                opcode: opcode.name(),
                expected,
            });
        }
        if let Operand::Label(label) = &operand {
            self.check_label(*label);
        }
        if let Operand::Switch(labels) = &operand {
            for label in labels.iter() {
                self.check_label(*label);
            }
        }
        self.instructions.push(Instruction { opcode, operand });
        self
    }

    fn check_label(&mut self, label: Label) {
        if label.0 as usize >= self.labels.len() {
            self.errors.push(EmitError::UnknownLabel {
                method: self.method.clone(),
                label: label.0,
            });
        }
    }

    // ===== Labels & locals =====

    /// Create a new, unmarked label
    pub fn define_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind a label to the position of the next emitted instruction
    pub fn mark_label(&mut self, label: Label) -> &mut Self {
        let position = self.instructions.len();
        match self.labels.get_mut(label.0 as usize) {
            None => self.errors.push(EmitError::UnknownLabel {
                method: self.method.clone(),
                label: label.0,
            }),
            Some(Some(_)) => self.errors.push(EmitError::LabelMarkedTwice {
                method: self.method.clone(),
                label: label.0,
            }),
            Some(slot) => *slot = Some(position),
        }
        self
    }

    /// Check if a label has been marked
    pub fn is_marked(&self, label: Label) -> bool {
        matches!(self.labels.get(label.0 as usize), Some(Some(_)))
    }

    /// Declare a local variable of the given type
    pub fn declare_local(&mut self, ty: TypeRef) -> LocalBuilder {
        let index = self.locals.len() as u16;
        self.locals.push(ty.clone());
        LocalBuilder { index, ty }
    }

    // ===== Exception blocks =====

    /// Open a protected region; returns the label that marks the block's end
    pub fn begin_exception_block(&mut self) -> Label {
        let end = self.define_label();
        self.blocks.push(OpenBlock {
            try_start: self.instructions.len(),
            end,
            try_end: None,
            handler: None,
            finally_protects: 0,
        });
        end
    }

    /// Close the current protected range (or previous catch) and start a catch handler
    pub fn begin_catch_block(&mut self, exception: TypeRef) -> Result<&mut Self, EmitError> {
        let end = match self.blocks.last() {
            None => return Err(self.block_error("catch block outside of an exception block")),
            Some(OpenBlock {
                handler: Some((_, HandlerKind::Finally)),
                ..
            }) => return Err(self.block_error("catch block after a finally block")),
            Some(block) => block.end,
        };
        self.leave(end);
        self.close_handler();
        let position = self.instructions.len();
        if let Some(block) = self.blocks.last_mut() {
            block.try_end.get_or_insert(position);
            block.handler = Some((position, HandlerKind::Catch(exception)));
        }
        Ok(self)
    }

    /// Close the current protected range (and any catches) and start a finally handler
    pub fn begin_finally_block(&mut self) -> Result<&mut Self, EmitError> {
        let end = match self.blocks.last() {
            None => return Err(self.block_error("finally block outside of an exception block")),
            Some(OpenBlock {
                handler: Some((_, HandlerKind::Finally)),
                ..
            }) => return Err(self.block_error("exception block already has a finally block")),
            Some(block) => block.end,
        };
        self.leave(end);
        self.close_handler();
        let position = self.instructions.len();
        if let Some(block) = self.blocks.last_mut() {
            block.try_end.get_or_insert(position);
            block.finally_protects = position;
            block.handler = Some((position, HandlerKind::Finally));
        }
        Ok(self)
    }

    /// Close the current handler and mark the block's end label
    pub fn end_exception_block(&mut self) -> Result<&mut Self, EmitError> {
        let (end, finally) = match self.blocks.last() {
            None => return Err(self.block_error("no exception block to end")),
            Some(OpenBlock { handler: None, .. }) => {
                return Err(self.block_error("exception block has no catch or finally handler"))
            }
            Some(block) => (
                block.end,
                matches!(block.handler, Some((_, HandlerKind::Finally))),
            ),
        };
        if finally {
            self.endfinally();
        } else {
            self.leave(end);
        }
        self.close_handler();
        self.blocks.pop();
        self.mark_label(end);
        Ok(self)
    }

    /// Number of exception blocks currently open
    pub fn open_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn close_handler(&mut self) {
        let handler_end = self.instructions.len();
        let Some(block) = self.blocks.last_mut() else {
            return;
        };
        if let Some((handler_start, kind)) = block.handler.take() {
            let try_end = match kind {
                HandlerKind::Finally => block.finally_protects,
                HandlerKind::Catch(_) => block.try_end.unwrap_or(handler_start),
            };
            self.regions.push(ExceptionRegion {
                try_start: block.try_start,
                try_end,
                handler_start,
                handler_end,
                kind,
            });
        }
    }

    fn block_error(&self, message: &str) -> EmitError {
        EmitError::ExceptionBlock {
            method: self.method.clone(),
            message: message.to_string(),
        }
    }

    pub(crate) fn unclosed_blocks(&self) -> usize {
        self.blocks.len()
    }
}

macro_rules! simple_ops {
    ($($name:ident => $op:ident, $mnemonic:literal;)*) => {
        $(
            #[doc = concat!("Emit `", $mnemonic, "`")]
            #[inline]
            pub fn $name(&mut self) -> &mut Self {
                self.emit(Opcode::$op)
            }
        )*
    };
}

macro_rules! branch_ops {
    ($($name:ident => $op:ident, $mnemonic:literal;)*) => {
        $(
            #[doc = concat!("Emit `", $mnemonic, "` to a label")]
            #[inline]
            pub fn $name(&mut self, label: Label) -> &mut Self {
                self.emit_with(Opcode::$op, Operand::Label(label))
            }
        )*
    };
}

macro_rules! type_ops {
    ($($name:ident => $op:ident, $mnemonic:literal;)*) => {
        $(
            #[doc = concat!("Emit `", $mnemonic, "` with a type operand")]
            #[inline]
            pub fn $name(&mut self, ty: TypeRef) -> &mut Self {
                self.emit_with(Opcode::$op, Operand::Type(ty))
            }
        )*
    };
}

macro_rules! field_ops {
    ($($name:ident => $op:ident, $mnemonic:literal;)*) => {
        $(
            #[doc = concat!("Emit `", $mnemonic, "`")]
            #[inline]
            pub fn $name(&mut self, field: FieldRef) -> &mut Self {
                self.emit_with(Opcode::$op, Operand::Field(field))
            }
        )*
    };
}

/// One emission method per opcode
impl InstructionEmitter {
    simple_ops! {
        nop => Nop, "nop";
        dup => Dup, "dup";
        pop => Pop, "pop";
        ldnull => Ldnull, "ldnull";
        ldarg_0 => Ldarg0, "ldarg.0";
        ldarg_1 => Ldarg1, "ldarg.1";
        ldarg_2 => Ldarg2, "ldarg.2";
        ldarg_3 => Ldarg3, "ldarg.3";
        ldloc_0 => Ldloc0, "ldloc.0";
        ldloc_1 => Ldloc1, "ldloc.1";
        ldloc_2 => Ldloc2, "ldloc.2";
        ldloc_3 => Ldloc3, "ldloc.3";
        stloc_0 => Stloc0, "stloc.0";
        stloc_1 => Stloc1, "stloc.1";
        stloc_2 => Stloc2, "stloc.2";
        stloc_3 => Stloc3, "stloc.3";
        add => Add, "add";
        sub => Sub, "sub";
        mul => Mul, "mul";
        div => Div, "div";
        div_un => DivUn, "div.un";
        rem => Rem, "rem";
        rem_un => RemUn, "rem.un";
        and => And, "and";
        or => Or, "or";
        xor => Xor, "xor";
        shl => Shl, "shl";
        shr => Shr, "shr";
        shr_un => ShrUn, "shr.un";
        neg => Neg, "neg";
        not => Not, "not";
        add_ovf => AddOvf, "add.ovf";
        add_ovf_un => AddOvfUn, "add.ovf.un";
        sub_ovf => SubOvf, "sub.ovf";
        sub_ovf_un => SubOvfUn, "sub.ovf.un";
        mul_ovf => MulOvf, "mul.ovf";
        mul_ovf_un => MulOvfUn, "mul.ovf.un";
        ckfinite => Ckfinite, "ckfinite";
        ceq => Ceq, "ceq";
        cgt => Cgt, "cgt";
        cgt_un => CgtUn, "cgt.un";
        clt => Clt, "clt";
        clt_un => CltUn, "clt.un";
        conv_i1 => ConvI1, "conv.i1";
        conv_i2 => ConvI2, "conv.i2";
        conv_i4 => ConvI4, "conv.i4";
        conv_i8 => ConvI8, "conv.i8";
        conv_u1 => ConvU1, "conv.u1";
        conv_u2 => ConvU2, "conv.u2";
        conv_u4 => ConvU4, "conv.u4";
        conv_u8 => ConvU8, "conv.u8";
        conv_r4 => ConvR4, "conv.r4";
        conv_r8 => ConvR8, "conv.r8";
        conv_r_un => ConvRUn, "conv.r.un";
        conv_ovf_i1 => ConvOvfI1, "conv.ovf.i1";
        conv_ovf_i2 => ConvOvfI2, "conv.ovf.i2";
        conv_ovf_i4 => ConvOvfI4, "conv.ovf.i4";
        conv_ovf_i8 => ConvOvfI8, "conv.ovf.i8";
        conv_ovf_u1 => ConvOvfU1, "conv.ovf.u1";
        conv_ovf_u2 => ConvOvfU2, "conv.ovf.u2";
        conv_ovf_u4 => ConvOvfU4, "conv.ovf.u4";
        conv_ovf_u8 => ConvOvfU8, "conv.ovf.u8";
        ret => Ret, "ret";
        ldlen => Ldlen, "ldlen";
        throw => Throw, "throw";
        rethrow => Rethrow, "rethrow";
        endfinally => Endfinally, "endfinally";
    }

    branch_ops! {
        br => Br, "br";
        br_s => BrS, "br.s";
        brfalse => Brfalse, "brfalse";
        brfalse_s => BrfalseS, "brfalse.s";
        brtrue => Brtrue, "brtrue";
        brtrue_s => BrtrueS, "brtrue.s";
        beq => Beq, "beq";
        beq_s => BeqS, "beq.s";
        bge => Bge, "bge";
        bge_s => BgeS, "bge.s";
        bgt => Bgt, "bgt";
        bgt_s => BgtS, "bgt.s";
        ble => Ble, "ble";
        ble_s => BleS, "ble.s";
        blt => Blt, "blt";
        blt_s => BltS, "blt.s";
        bne_un => BneUn, "bne.un";
        bne_un_s => BneUnS, "bne.un.s";
        bge_un => BgeUn, "bge.un";
        bge_un_s => BgeUnS, "bge.un.s";
        bgt_un => BgtUn, "bgt.un";
        bgt_un_s => BgtUnS, "bgt.un.s";
        ble_un => BleUn, "ble.un";
        ble_un_s => BleUnS, "ble.un.s";
        blt_un => BltUn, "blt.un";
        blt_un_s => BltUnS, "blt.un.s";
        leave => Leave, "leave";
        leave_s => LeaveS, "leave.s";
    }

    type_ops! {
        castclass => Castclass, "castclass";
        isinst => Isinst, "isinst";
        box_value => Box, "box";
        unbox_any => UnboxAny, "unbox.any";
        newarr => Newarr, "newarr";
        ldelem => Ldelem, "ldelem";
        stelem => Stelem, "stelem";
    }

    field_ops! {
        ldfld => Ldfld, "ldfld";
        stfld => Stfld, "stfld";
        ldsfld => Ldsfld, "ldsfld";
        stsfld => Stsfld, "stsfld";
    }

    /// Emit `ldc.i4.s`
    pub fn ldc_i4_s(&mut self, value: i8) -> &mut Self {
        self.emit_with(Opcode::LdcI4S, Operand::I32(value as i32))
    }

    /// Emit `ldc.i8`
    pub fn ldc_i8(&mut self, value: i64) -> &mut Self {
        self.emit_with(Opcode::LdcI8, Operand::I64(value))
    }

    /// Emit `ldc.r4`
    pub fn ldc_r4(&mut self, value: f32) -> &mut Self {
        self.emit_with(Opcode::LdcR4, Operand::F32(value))
    }

    /// Emit `ldc.r8`
    pub fn ldc_r8(&mut self, value: f64) -> &mut Self {
        self.emit_with(Opcode::LdcR8, Operand::F64(value))
    }

    /// Emit `ldstr`
    pub fn ldstr(&mut self, value: &str) -> &mut Self {
        self.emit_with(Opcode::Ldstr, Operand::Str(Arc::from(value)))
    }

    /// Emit `ldarg.s`
    pub fn ldarg_s(&mut self, index: u8) -> &mut Self {
        self.emit_with(Opcode::LdargS, Operand::Arg(index as u16))
    }

    /// Emit `starg.s`
    pub fn starg_s(&mut self, index: u8) -> &mut Self {
        self.emit_with(Opcode::StargS, Operand::Arg(index as u16))
    }

    /// Emit `switch` over a jump table
    pub fn switch(&mut self, targets: &[Label]) -> &mut Self {
        self.emit_with(Opcode::Switch, Operand::Switch(Arc::from(targets)))
    }

    /// Emit `call`
    pub fn call(&mut self, method: MethodRef) -> &mut Self {
        self.emit_with(Opcode::Call, Operand::Method(method))
    }

    /// Emit `call` of a generic method instantiation
    pub fn call_generic(&mut self, method: MethodRef, type_args: &[TypeRef]) -> &mut Self {
        self.emit_with(
            Opcode::Call,
            Operand::GenericMethod(method, Arc::from(type_args)),
        )
    }

    /// Emit `callvirt`
    pub fn callvirt(&mut self, method: MethodRef) -> &mut Self {
        self.emit_with(Opcode::Callvirt, Operand::Method(method))
    }

    /// Emit `newobj`
    pub fn newobj(&mut self, constructor: MethodRef) -> &mut Self {
        self.emit_with(Opcode::Newobj, Operand::Method(constructor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::OperandKind;

    #[test]
    fn test_chaining_appends_one_instruction_each() {
        let mut il = InstructionEmitter::new("f");
        il.ldarg_1().ldarg_2().add().ret();
        assert_eq!(il.len(), 4);
        assert_eq!(il.instructions()[2].opcode, Opcode::Add);
    }

    #[test]
    fn test_operand_mismatch_is_recorded() {
        let mut il = InstructionEmitter::new("f");
        il.emit(Opcode::Ldstr);
        il.emit_with(Opcode::Add, Operand::I32(1));
        assert_eq!(il.errors.len(), 2);
        assert_eq!(
            il.errors[0],
            EmitError::OperandMismatch {
                offset: 0,
                opcode: "ldstr",
                expected: OperandKind::Str,
            }
        );
    }

    #[test]
    fn test_mark_label_twice_is_recorded() {
        let mut il = InstructionEmitter::new("f");
        let l = il.define_label();
        il.mark_label(l).nop().mark_label(l);
        assert!(matches!(il.errors[0], EmitError::LabelMarkedTwice { label: 0, .. }));
    }

    #[test]
    fn test_try_catch_regions() {
        let mut il = InstructionEmitter::new("f");
        let end = il.begin_exception_block();
        il.ldstr("boom").throw();
        il.begin_catch_block(TypeRef::String).unwrap();
        il.pop();
        il.end_exception_block().unwrap();
        il.ret();

        // ldstr, throw, leave | pop, leave | ret
        assert_eq!(il.regions.len(), 1);
        let region = &il.regions[0];
        assert_eq!((region.try_start, region.try_end), (0, 3));
        assert_eq!((region.handler_start, region.handler_end), (3, 5));
        assert_eq!(il.labels[end.0 as usize], Some(5));
    }

    #[test]
    fn test_try_catch_finally_regions() {
        let mut il = InstructionEmitter::new("f");
        il.begin_exception_block();
        il.nop();
        il.begin_catch_block(TypeRef::Object).unwrap();
        il.pop();
        il.begin_finally_block().unwrap();
        il.nop();
        il.end_exception_block().unwrap();
        il.ret();

        // nop, leave | pop, leave | nop, endfinally | ret
        assert_eq!(il.regions.len(), 2);
        assert_eq!(il.regions[0].kind, HandlerKind::Catch(TypeRef::Object));
        assert_eq!((il.regions[0].try_start, il.regions[0].try_end), (0, 2));
        assert_eq!(il.regions[1].kind, HandlerKind::Finally);
        assert_eq!((il.regions[1].try_start, il.regions[1].try_end), (0, 4));
        assert_eq!((il.regions[1].handler_start, il.regions[1].handler_end), (4, 6));
    }

    #[test]
    fn test_misnested_blocks_fail_immediately() {
        let mut il = InstructionEmitter::new("f");
        assert!(matches!(
            il.begin_catch_block(TypeRef::Object),
            Err(EmitError::ExceptionBlock { .. })
        ));
        assert!(il.end_exception_block().is_err());

        il.begin_exception_block();
        assert!(il.end_exception_block().is_err());
        il.begin_finally_block().unwrap();
        assert!(il.begin_catch_block(TypeRef::Object).is_err());
        assert!(il.begin_finally_block().is_err());
    }
}
