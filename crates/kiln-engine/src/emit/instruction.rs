//! Instructions, operands and sealed method bodies

use std::fmt;
use std::sync::Arc;

use super::opcode::{Opcode, OperandKind};
use crate::types::{FieldRef, MethodRef, TypeRef};

/// Opaque branch target handle
///
/// Labels are created by [`InstructionEmitter::define_label`](super::InstructionEmitter::define_label)
/// and bound to a position by `mark_label`. A label is only meaningful for
/// the emitter that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

impl Label {
    /// Get the label's id within its emitter
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// A declared local variable
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBuilder {
    pub(crate) index: u16,
    pub(crate) ty: TypeRef,
}

impl LocalBuilder {
    /// Local slot index
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Declared type
    pub fn local_type(&self) -> &TypeRef {
        &self.ty
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// int32 immediate
    I32(i32),
    /// int64 immediate
    I64(i64),
    /// float32 immediate
    F32(f32),
    /// float64 immediate
    F64(f64),
    /// String literal
    Str(Arc<str>),
    /// Argument index
    Arg(u16),
    /// Local index
    Local(u16),
    /// Branch target
    Label(Label),
    /// Jump table targets
    Switch(Arc<[Label]>),
    /// Method or constructor
    Method(MethodRef),
    /// Generic method instantiation
    GenericMethod(MethodRef, Arc<[TypeRef]>),
    /// Field
    Field(FieldRef),
    /// Type
    Type(TypeRef),
}

impl Operand {
    /// Check whether this operand is acceptable for the given operand kind
    pub fn fits(&self, kind: OperandKind) -> bool {
        match (kind, self) {
            (OperandKind::None, Operand::None) => true,
            (OperandKind::ShortI32, Operand::I32(v)) => (-128..=127).contains(v),
            (OperandKind::I32, Operand::I32(_)) => true,
            (OperandKind::I64, Operand::I64(_)) => true,
            (OperandKind::F32, Operand::F32(_)) => true,
            (OperandKind::F64, Operand::F64(_)) => true,
            (OperandKind::Str, Operand::Str(_)) => true,
            (OperandKind::ShortArg, Operand::Arg(i)) => *i <= u8::MAX as u16,
            (OperandKind::Arg, Operand::Arg(_)) => true,
            (OperandKind::ShortLocal, Operand::Local(i)) => *i <= u8::MAX as u16,
            (OperandKind::Local, Operand::Local(_)) => true,
            (OperandKind::Label, Operand::Label(_)) => true,
            (OperandKind::Switch, Operand::Switch(_)) => true,
            (OperandKind::Method, Operand::Method(_) | Operand::GenericMethod(..)) => true,
            (OperandKind::Field, Operand::Field(_)) => true,
            (OperandKind::Type, Operand::Type(_)) => true,
            _ => false,
        }
    }

    /// Get the referenced method, if any
    pub fn method(&self) -> Option<MethodRef> {
        match self {
            Operand::Method(m) | Operand::GenericMethod(m, _) => Some(*m),
            _ => None,
        }
    }
}

/// One emitted instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Opcode
    pub opcode: Opcode,
    /// Operand (must fit the opcode's operand kind)
    pub operand: Operand,
}

impl Instruction {
    /// Instruction with no operand
    pub fn simple(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }
}

/// Handler kind of an exception region
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    /// Catches exceptions conforming to the type
    Catch(TypeRef),
    /// Runs on every exit from the protected range
    Finally,
}

/// A protected range and its handler, in instruction indices (ends exclusive)
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionRegion {
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
    /// Handler kind
    pub kind: HandlerKind,
}

impl ExceptionRegion {
    /// Check if an instruction index lies in the protected range
    pub fn protects(&self, ip: usize) -> bool {
        (self.try_start..self.try_end).contains(&ip)
    }

    /// Check if an instruction index lies in the handler
    pub fn in_handler(&self, ip: usize) -> bool {
        (self.handler_start..self.handler_end).contains(&ip)
    }
}

/// A sealed, immutable method body
///
/// Regions are ordered innermost first, so the first region protecting an
/// instruction is the one that handles it.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) labels: Vec<Option<usize>>,
    pub(crate) locals: Vec<TypeRef>,
    pub(crate) regions: Vec<ExceptionRegion>,
    pub(crate) max_stack: usize,
}

impl MethodBody {
    /// Instructions in order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Declared local types
    pub fn locals(&self) -> &[TypeRef] {
        &self.locals
    }

    /// Exception regions, innermost first
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// Maximum evaluation stack depth
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Resolve a label to its instruction index
    #[inline]
    pub fn target(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).copied().flatten()
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if the body has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Opcodes in order
    pub fn opcodes(&self) -> Vec<Opcode> {
        self.instructions.iter().map(|i| i.opcode).collect()
    }

    fn fmt_operand(&self, operand: &Operand, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match operand {
            Operand::None => Ok(()),
            Operand::I32(v) => write!(f, " {}", v),
            Operand::I64(v) => write!(f, " {}", v),
            Operand::F32(v) => write!(f, " {}", v),
            Operand::F64(v) => write!(f, " {}", v),
            Operand::Str(s) => write!(f, " {:?}", s),
            Operand::Arg(i) => write!(f, " {}", i),
            Operand::Local(i) => write!(f, " V_{}", i),
            Operand::Label(l) => self.fmt_target(*l, f),
            Operand::Switch(labels) => {
                write!(f, " (")?;
                for (i, l) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    self.fmt_target(*l, f)?;
                }
                write!(f, " )")
            }
            Operand::Method(m) => write!(f, " {}", m),
            Operand::GenericMethod(m, args) => {
                write!(f, " {}<", m)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ">")
            }
            Operand::Field(field) => write!(f, " {}", field),
            Operand::Type(t) => write!(f, " {}", t),
        }
    }

    fn fmt_target(&self, label: Label, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target(label) {
            Some(ip) => write!(f, " IL_{:04x}", ip),
            None => write!(f, " <L{}>", label.0),
        }
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".maxstack {}", self.max_stack)?;
        for (i, ty) in self.locals.iter().enumerate() {
            writeln!(f, ".local V_{} : {}", i, ty)?;
        }
        for (ip, instr) in self.instructions.iter().enumerate() {
            for region in &self.regions {
                if region.try_start == ip {
                    writeln!(f, ".try {{")?;
                }
                if region.handler_start == ip {
                    match &region.kind {
                        HandlerKind::Catch(ty) => writeln!(f, "}} catch {} {{", ty)?,
                        HandlerKind::Finally => writeln!(f, "}} finally {{")?,
                    }
                }
            }
            write!(f, "IL_{:04x}: {}", ip, instr.opcode.name())?;
            self.fmt_operand(&instr.operand, f)?;
            writeln!(f)?;
            for region in &self.regions {
                if region.handler_end == ip + 1 {
                    writeln!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_fits() {
        assert!(Operand::I32(127).fits(OperandKind::ShortI32));
        assert!(!Operand::I32(128).fits(OperandKind::ShortI32));
        assert!(Operand::Arg(255).fits(OperandKind::ShortArg));
        assert!(!Operand::Arg(256).fits(OperandKind::ShortArg));
        assert!(Operand::Arg(256).fits(OperandKind::Arg));
        assert!(!Operand::Local(1).fits(OperandKind::Arg));
        assert!(!Operand::None.fits(OperandKind::Label));
    }

    #[test]
    fn test_region_ranges() {
        let region = ExceptionRegion {
            try_start: 2,
            try_end: 5,
            handler_start: 5,
            handler_end: 8,
            kind: HandlerKind::Finally,
        };
        assert!(region.protects(2));
        assert!(region.protects(4));
        assert!(!region.protects(5));
        assert!(region.in_handler(5));
        assert!(!region.in_handler(8));
    }
}
