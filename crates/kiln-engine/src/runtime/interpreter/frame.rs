//! Activation records

use std::sync::Arc;

use crate::emit::{Label, MethodBody};
use crate::runtime::class::RuntimeMethod;
use crate::runtime::value::Value;
use crate::runtime::{VmError, VmResult};
use crate::types::TypeRef;

/// Work left for an `endfinally` to resume
#[derive(Debug)]
pub(super) enum Continuation {
    /// A `leave` is running finally handlers before reaching `target`
    Leave {
        /// Region whose finally handler is running
        region: usize,
        /// Final destination of the leave
        target: usize,
        /// Finally regions still to run, innermost first
        remaining: Vec<usize>,
    },
    /// An exception is unwinding through the finally handler of `region`
    Unwind {
        /// Region whose finally handler is running
        region: usize,
        /// Exception in flight
        exception: Value,
    },
}

impl Continuation {
    pub(super) fn region(&self) -> usize {
        match self {
            Continuation::Leave { region, .. } | Continuation::Unwind { region, .. } => *region,
        }
    }
}

/// One executing method
#[derive(Debug)]
pub(super) struct Frame {
    pub method: Arc<RuntimeMethod>,
    pub body: Arc<MethodBody>,
    pub args: Vec<Value>,
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    /// Generic arguments of this instantiation
    pub type_args: Arc<[TypeRef]>,
    pub ip: usize,
    pub pending: Vec<Continuation>,
    /// Exceptions caught by catch handlers still executing, by region
    pub handling: Vec<(usize, Value)>,
    max_stack: usize,
}

impl Frame {
    pub fn new(
        method: Arc<RuntimeMethod>,
        body: Arc<MethodBody>,
        args: Vec<Value>,
        type_args: Arc<[TypeRef]>,
        max_stack: usize,
    ) -> Self {
        let locals = body
            .locals()
            .iter()
            .map(|ty| Value::default_for(&ty.substitute(&method.generic_params, &type_args)).to_stack())
            .collect();
        Self {
            stack: Vec::with_capacity(body.max_stack()),
            method,
            body,
            args,
            locals,
            type_args,
            ip: 0,
            pending: Vec::new(),
            handling: Vec::new(),
            max_stack,
        }
    }

    /// Push in stack form
    #[inline]
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value.to_stack());
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop `n` values, returned in push order
    pub fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    /// Substitute this instantiation's generic arguments into `ty`
    pub fn resolve(&self, ty: &TypeRef) -> TypeRef {
        if ty.mentions_generic() {
            ty.substitute(&self.method.generic_params, &self.type_args)
        } else {
            ty.clone()
        }
    }

    /// Instruction index of a label
    pub fn target(&self, label: Label) -> VmResult<usize> {
        self.body
            .target(label)
            .ok_or_else(|| VmError::RuntimeError(format!("unresolved label {} in '{}'", label.id(), self.method.name)))
    }

    pub fn arg(&self, index: usize) -> VmResult<Value> {
        self.args
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::RuntimeError(format!("argument {} out of range in '{}'", index, self.method.name)))
    }

    pub fn set_arg(&mut self, index: usize, value: Value) -> VmResult<()> {
        let name = &self.method.name;
        match self.args.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::RuntimeError(format!("argument {} out of range in '{}'", index, name))),
        }
    }

    pub fn local(&self, index: usize) -> VmResult<Value> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::RuntimeError(format!("local {} out of range in '{}'", index, self.method.name)))
    }

    pub fn set_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        let name = &self.method.name;
        match self.locals.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::RuntimeError(format!("local {} out of range in '{}'", index, name))),
        }
    }
}
