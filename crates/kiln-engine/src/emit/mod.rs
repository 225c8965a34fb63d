//! Instruction emission
//!
//! [`InstructionEmitter`] wraps one method body's instruction stream. Every
//! emission call appends exactly one instruction and returns the emitter so
//! calls chain. Labels, locals and exception regions are tracked alongside
//! the stream and resolved when the emitter is sealed into a [`MethodBody`].

mod emitter;
mod helpers;
mod instruction;
mod opcode;
mod seal;

pub use emitter::InstructionEmitter;
pub use helpers::Comparison;
pub use instruction::{
    ExceptionRegion, HandlerKind, Instruction, Label, LocalBuilder, MethodBody, Operand,
};
pub use opcode::{FlowControl, Opcode, OperandKind, StackEffect};
pub use seal::CallShape;

use crate::types::TypeRef;
use thiserror::Error;

/// Emission errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmitError {
    /// No instruction sequence exists for the requested conversion or load
    #[error("Unsupported conversion to {target}: {reason}")]
    UnsupportedConversion {
        /// Requested target type
        target: TypeRef,
        /// What made it unsupported
        reason: &'static str,
    },

    /// A branch references a label that was never marked
    #[error("Label {label} is used but never marked in '{method}'")]
    UnmarkedLabel {
        /// Method being emitted
        method: String,
        /// Label id
        label: u32,
    },

    /// A label was marked more than once
    #[error("Label {label} is marked twice in '{method}'")]
    LabelMarkedTwice {
        /// Method being emitted
        method: String,
        /// Label id
        label: u32,
    },

    /// A label was not created by this emitter
    #[error("Label {label} does not belong to '{method}'")]
    UnknownLabel {
        /// Method being emitted
        method: String,
        /// Label id
        label: u32,
    },

    /// A label is marked past the last instruction
    #[error("Label {label} in '{method}' does not precede an instruction")]
    InvalidBranchTarget {
        /// Method being emitted
        method: String,
        /// Label id
        label: u32,
    },

    /// An operand does not fit the opcode's operand kind
    #[error("Operand mismatch at IL_{offset:04x}: '{opcode}' expects {expected:?}")]
    OperandMismatch {
        /// Instruction index
        offset: usize,
        /// Opcode mnemonic
        opcode: &'static str,
        /// Expected operand kind
        expected: OperandKind,
    },

    /// Exception blocks were misnested or left open
    #[error("Exception block error in '{method}': {message}")]
    ExceptionBlock {
        /// Method being emitted
        method: String,
        /// What went wrong
        message: String,
    },

    /// The evaluation stack would underflow
    #[error("Stack underflow at IL_{offset:04x} in '{method}'")]
    StackUnderflow {
        /// Method being emitted
        method: String,
        /// Instruction index
        offset: usize,
    },

    /// Control can run past the last instruction
    #[error("Control falls off the end of '{0}'")]
    FallOffEnd(String),

    /// The emitter was already sealed
    #[error("Emitter for '{0}' is already sealed")]
    Sealed(String),
}

/// Emission result type
pub type EmitResult<T> = Result<T, EmitError>;
