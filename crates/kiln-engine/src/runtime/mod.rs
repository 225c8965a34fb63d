//! Host runtime for realized types
//!
//! This module provides:
//! - Realized type metadata (`class`)
//! - Heap objects, arrays and boxes (`object`)
//! - Stack values (`value`)
//! - The interpreter that executes sealed method bodies (`interpreter`)

mod class;
mod interpreter;
mod object;
mod options;
mod value;

pub use class::{FieldSlot, RuntimeField, RuntimeMethod, RuntimeProperty, RuntimeType, VTable};
pub use interpreter::Vm;
pub use object::{ArrayObject, BoxedValue, Object};
pub use options::{ResourceLimits, VmOptions};
pub use value::Value;

use crate::types::TypeId;
use thiserror::Error;

/// Interpreter errors
///
/// Every variant except [`VmError::Exception`] is a runtime fault that ends
/// the top-level invocation. `Exception` carries a value raised by `throw`
/// that no handler caught.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VmError {
    /// Call depth or evaluation stack limit exceeded
    #[error("Stack overflow")]
    StackOverflow,

    /// Pop from an empty evaluation stack
    #[error("Stack underflow")]
    StackUnderflow,

    /// Null receiver, array or thrown value
    #[error("Null reference")]
    NullReference,

    /// Failed cast or unbox
    #[error("Invalid cast from {from} to {to}")]
    InvalidCast {
        /// Runtime kind of the value
        from: String,
        /// Requested type
        to: String,
    },

    /// Checked arithmetic or conversion overflowed
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Integer division by zero
    #[error("Division by zero")]
    DivideByZero,

    /// Array index outside the array
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Array length
        len: usize,
    },

    /// Operand of the wrong kind
    #[error("Type error: {0}")]
    TypeError(String),

    /// Type id not present in the session
    #[error("Unknown type {0}")]
    UnknownType(TypeId),

    /// Member lookup failed
    #[error("Member '{member}' not found on '{owner}'")]
    MissingMember {
        /// Searched type
        owner: String,
        /// Member name or handle
        member: String,
    },

    /// Instantiation of an abstract type or interface
    #[error("Cannot create an instance of abstract type '{0}'")]
    AbstractInstantiation(String),

    /// Direct call of a method without a body
    #[error("Method '{0}' has no body")]
    MissingBody(String),

    /// Instruction budget exhausted
    #[error("Step budget of {0} instructions exceeded")]
    StepBudgetExceeded(u64),

    /// Value raised by `throw` and not caught
    #[error("Unhandled exception: {0}")]
    Exception(Value),

    /// Malformed body or invalid operation
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// Interpreter result type
pub type VmResult<T> = Result<T, VmError>;
