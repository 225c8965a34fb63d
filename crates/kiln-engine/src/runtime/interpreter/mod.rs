//! Interpreter for sealed method bodies
//!
//! A [`Vm`] executes the realized types of one [`BuildSession`]. Static
//! storage and type initializer state belong to the `Vm`, so realized types
//! stay immutable and several `Vm`s can run the same session side by side.
//!
//! Opcode handlers are split by category into sibling modules, each adding
//! an `exec_*_ops` method to [`Vm`].

mod arithmetic;
mod calls;
mod control_flow;
mod conversions;
mod exceptions;
mod frame;
mod objects;
mod variables;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use self::frame::Frame;
use super::class::{FieldSlot, RuntimeField, RuntimeMethod, RuntimeType};
use super::object::Object;
use super::options::VmOptions;
use super::value::Value;
use super::{VmError, VmResult};
use crate::emit::{Instruction, Opcode, Operand};
use crate::session::BuildSession;
use crate::types::{FieldRef, MethodRef, TypeClass, TypeHandle, TypeId, TypeRef};

/// Result of executing one instruction
#[derive(Debug)]
pub(super) enum OpcodeResult {
    /// Continue with `frame.ip`
    Continue,
    /// Return from the current method with a value (`Null` for void)
    Return(Value),
}

/// Host interpreter
pub struct Vm {
    session: BuildSession,
    options: VmOptions,
    statics: FxHashMap<TypeId, Vec<Value>>,
    initialized: FxHashSet<TypeId>,
    depth: usize,
    steps: u64,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("options", &self.options)
            .field("initialized_types", &self.initialized.len())
            .field("depth", &self.depth)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Vm {
    /// Create a VM over a session with default options
    pub fn new(session: &BuildSession) -> Self {
        Self::with_options(session, VmOptions::default())
    }

    /// Create a VM over a session with custom options
    pub fn with_options(session: &BuildSession, options: VmOptions) -> Self {
        Self {
            session: session.clone(),
            options,
            statics: FxHashMap::default(),
            initialized: FxHashSet::default(),
            depth: 0,
            steps: 0,
        }
    }

    /// The session this VM executes
    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    /// VM options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Instructions executed by the most recent top-level invocation
    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    // ===== Host surface =====

    /// Create an instance, choosing the first constructor that accepts `args`
    pub fn new_object(&mut self, ty: TypeHandle, args: &[Value]) -> VmResult<Value> {
        let rt = self.runtime_type(ty.id)?;
        let ctor = rt
            .constructors()
            .find(|c| accepts(c, args))
            .cloned()
            .ok_or_else(|| missing(&rt, &format!(".ctor/{}", args.len())))?;
        self.construct(&rt, &ctor, args)
    }

    /// Create an instance with a specific constructor
    pub fn new_object_with(&mut self, constructor: MethodRef, args: &[Value]) -> VmResult<Value> {
        let rt = self.runtime_type(constructor.owner)?;
        let ctor = self.runtime_method(constructor)?;
        self.construct(&rt, &ctor, args)
    }

    /// Call a method without virtual dispatch
    pub fn invoke(&mut self, method: MethodRef, receiver: Option<&Value>, args: &[Value]) -> VmResult<Value> {
        let m = self.runtime_method(method)?;
        self.invoke_resolved(m, receiver, args, Arc::from([]))
    }

    /// Call an instance method by name through virtual dispatch
    pub fn invoke_virtual(&mut self, receiver: &Value, name: &str, args: &[Value]) -> VmResult<Value> {
        let type_id = self.receiver_type(receiver)?;
        let declared = self
            .find_on_chain(type_id, |t| {
                t.methods
                    .iter()
                    .find(|m| m.name == name && !m.is_static() && !m.kind.is_constructor() && accepts(m, args))
                    .cloned()
            })?
            .ok_or_else(|| self.missing_on(type_id, name))?;
        let target = self.resolve_virtual(receiver, &declared)?;
        self.invoke_resolved(target, Some(receiver), args, Arc::from([]))
    }

    /// Call a method handle with `callvirt` semantics
    ///
    /// Interface methods are mapped to the receiver's implementation first.
    pub fn invoke_method_virtual(&mut self, receiver: &Value, method: MethodRef, args: &[Value]) -> VmResult<Value> {
        let declared = self.runtime_method(method)?;
        let target = self.resolve_virtual(receiver, &declared)?;
        self.invoke_resolved(target, Some(receiver), args, Arc::from([]))
    }

    /// Call a static method by name
    pub fn invoke_static(&mut self, ty: TypeHandle, name: &str, args: &[Value]) -> VmResult<Value> {
        let rt = self.runtime_type(ty.id)?;
        let m = rt
            .methods
            .iter()
            .find(|m| m.name == name && m.is_static() && !m.kind.is_constructor() && accepts(m, args))
            .cloned()
            .ok_or_else(|| missing(&rt, name))?;
        self.invoke_resolved(m, None, args, Arc::from([]))
    }

    /// Call a generic method instantiated with `type_args`
    ///
    /// Instance methods are dispatched virtually when a receiver is given.
    pub fn invoke_generic(
        &mut self,
        method: MethodRef,
        type_args: &[TypeRef],
        receiver: Option<&Value>,
        args: &[Value],
    ) -> VmResult<Value> {
        let mut m = self.runtime_method(method)?;
        if let Some(r) = receiver {
            if !m.is_static() {
                m = self.resolve_virtual(r, &m)?;
            }
        }
        self.invoke_resolved(m, receiver, args, Arc::from(type_args))
    }

    /// Read a property through its getter
    pub fn get_property(&mut self, receiver: &Value, name: &str) -> VmResult<Value> {
        let type_id = self.receiver_type(receiver)?;
        let getter = self
            .find_on_chain(type_id, |t| t.property(name).and_then(|p| p.getter))?
            .ok_or_else(|| self.missing_on(type_id, &format!("get_{}", name)))?;
        self.invoke_method_virtual(receiver, getter, &[])
    }

    /// Write a property through its setter
    pub fn set_property(&mut self, receiver: &Value, name: &str, value: Value) -> VmResult<()> {
        let type_id = self.receiver_type(receiver)?;
        let setter = self
            .find_on_chain(type_id, |t| t.property(name).and_then(|p| p.setter))?
            .ok_or_else(|| self.missing_on(type_id, &format!("set_{}", name)))?;
        self.invoke_method_virtual(receiver, setter, &[value]).map(|_| ())
    }

    /// Read a static property
    pub fn get_static_property(&mut self, ty: TypeHandle, name: &str) -> VmResult<Value> {
        let getter = self
            .find_on_chain(ty.id, |t| t.property(name).and_then(|p| p.getter))?
            .ok_or_else(|| self.missing_on(ty.id, &format!("get_{}", name)))?;
        self.invoke(getter, None, &[])
    }

    /// Write a static property
    pub fn set_static_property(&mut self, ty: TypeHandle, name: &str, value: Value) -> VmResult<()> {
        let setter = self
            .find_on_chain(ty.id, |t| t.property(name).and_then(|p| p.setter))?
            .ok_or_else(|| self.missing_on(ty.id, &format!("set_{}", name)))?;
        self.invoke(setter, None, &[value]).map(|_| ())
    }

    /// Read an instance field by name
    pub fn get_field(&self, receiver: &Value, name: &str) -> VmResult<Value> {
        let obj = receiver_object(receiver)?;
        let field = self.field_on_chain(obj.type_id(), name)?;
        match field.slot {
            FieldSlot::Instance(slot) => obj
                .get_field(slot)
                .map(|v| v.coerce_to(&field.ty))
                .ok_or_else(|| VmError::RuntimeError(format!("field slot {} missing", slot))),
            FieldSlot::Literal => Ok(literal_value(&field)),
            FieldSlot::Static(_) => Err(VmError::TypeError(format!("'{}' is a static field", name))),
        }
    }

    /// Write an instance field by name
    pub fn set_field(&mut self, receiver: &Value, name: &str, value: Value) -> VmResult<()> {
        let obj = receiver_object(receiver)?;
        let field = self.field_on_chain(obj.type_id(), name)?;
        match field.slot {
            FieldSlot::Instance(slot) => obj
                .set_field(slot, value.coerce_to(&field.ty).to_stack())
                .map_err(VmError::RuntimeError),
            _ => Err(VmError::TypeError(format!("'{}' is not an instance field", name))),
        }
    }

    /// Read a static field or enum literal by name
    pub fn get_static_field(&mut self, ty: TypeHandle, name: &str) -> VmResult<Value> {
        let field = self.field_on_chain(ty.id, name)?;
        match field.slot {
            FieldSlot::Literal => Ok(literal_value(&field)),
            FieldSlot::Static(slot) => Ok(self.static_slot(field.handle.owner, slot)?.clone().coerce_to(&field.ty)),
            FieldSlot::Instance(_) => Err(VmError::TypeError(format!("'{}' is an instance field", name))),
        }
    }

    /// Write a static field by name
    pub fn set_static_field(&mut self, ty: TypeHandle, name: &str, value: Value) -> VmResult<()> {
        let field = self.field_on_chain(ty.id, name)?;
        match field.slot {
            FieldSlot::Static(slot) => {
                *self.static_slot(field.handle.owner, slot)? = value.coerce_to(&field.ty).to_stack();
                Ok(())
            }
            _ => Err(VmError::TypeError(format!("'{}' is not a writable static field", name))),
        }
    }

    /// Realized type of an object
    pub fn type_of(&self, value: &Value) -> Option<Arc<RuntimeType>> {
        value.as_object().and_then(|o| self.session.realized(o.type_id()))
    }

    /// Check whether a value is an instance of `ty` (`isinst` semantics)
    pub fn is_instance_of(&self, value: &Value, ty: &TypeRef) -> bool {
        self.conforms(value, ty)
    }

    // ===== Execution =====

    fn construct(&mut self, rt: &Arc<RuntimeType>, ctor: &Arc<RuntimeMethod>, args: &[Value]) -> VmResult<Value> {
        let obj = self.allocate(rt)?;
        let mut bound = bind_args(ctor, args)?;
        bound.insert(0, obj.clone());
        self.execute(Arc::clone(ctor), bound, Arc::from([]))?;
        Ok(obj)
    }

    fn invoke_resolved(
        &mut self,
        method: Arc<RuntimeMethod>,
        receiver: Option<&Value>,
        args: &[Value],
        type_args: Arc<[TypeRef]>,
    ) -> VmResult<Value> {
        let mut bound = bind_args(&method, args)?;
        if method.is_static() {
            self.ensure_initialized(method.handle.owner)?;
        } else {
            let receiver = receiver.ok_or_else(|| {
                VmError::TypeError(format!("instance method '{}' needs a receiver", method.name))
            })?;
            if receiver.is_null() {
                return Err(VmError::NullReference);
            }
            bound.insert(0, receiver.clone());
        }
        let return_type = method.return_type.substitute(&method.generic_params, &type_args);
        let result = self.execute(method, bound, type_args)?;
        Ok(result.coerce_to(&return_type))
    }

    /// Run a method body to completion
    pub(super) fn execute(
        &mut self,
        method: Arc<RuntimeMethod>,
        args: Vec<Value>,
        type_args: Arc<[TypeRef]>,
    ) -> VmResult<Value> {
        let body = match &method.body {
            Some(body) if !method.is_abstract() => Arc::clone(body),
            _ => return Err(VmError::MissingBody(method.name.clone())),
        };
        if type_args.len() != method.generic_params.len() {
            return Err(VmError::TypeError(format!(
                "'{}' expects {} type argument(s), got {}",
                method.name,
                method.generic_params.len(),
                type_args.len()
            )));
        }
        if self.depth == 0 {
            self.steps = 0;
        }
        if self.depth >= self.options.limits.max_call_depth {
            return Err(VmError::StackOverflow);
        }
        trace!(method = %method.name, depth = self.depth, "enter");

        self.depth += 1;
        let mut frame = Frame::new(method, body, args, type_args, self.options.limits.max_stack_depth);
        let result = self.run(&mut frame);
        self.depth -= 1;
        result
    }

    fn run(&mut self, frame: &mut Frame) -> VmResult<Value> {
        let body = Arc::clone(&frame.body);
        loop {
            let ip = frame.ip;
            let instr = body.instructions().get(ip).ok_or_else(|| {
                VmError::RuntimeError(format!("control fell off the end of '{}'", frame.method.name))
            })?;
            self.tick()?;
            frame.ip = ip + 1;

            match self.step(frame, instr, ip) {
                Ok(OpcodeResult::Continue) => {}
                Ok(OpcodeResult::Return(value)) => return Ok(value),
                Err(VmError::Exception(exception)) => self.raise(frame, exception, ip)?,
                Err(e) => return Err(e),
            }
        }
    }

    fn step(&mut self, frame: &mut Frame, instr: &Instruction, ip: usize) -> VmResult<OpcodeResult> {
        match instr.opcode.to_u8() {
            0x00..=0x3F => self.exec_variable_ops(frame, instr),
            0x40..=0x6F => self.exec_arithmetic_ops(frame, instr.opcode),
            0x70..=0x8F => self.exec_conversion_ops(frame, instr.opcode),
            0xB0..=0xB2 => self.exec_call_ops(frame, instr),
            0xC0..=0xDF => self.exec_object_ops(frame, instr),
            _ => self.exec_control_flow_ops(frame, instr, ip),
        }
    }

    fn tick(&mut self) -> VmResult<()> {
        self.steps += 1;
        match self.options.limits.max_step_budget {
            Some(budget) if self.steps > budget => Err(VmError::StepBudgetExceeded(budget)),
            _ => Ok(()),
        }
    }

    // ===== Types and storage =====

    pub(super) fn runtime_type(&self, id: TypeId) -> VmResult<Arc<RuntimeType>> {
        self.session.realized(id).ok_or(VmError::UnknownType(id))
    }

    pub(super) fn runtime_method(&self, method: MethodRef) -> VmResult<Arc<RuntimeMethod>> {
        let rt = self.runtime_type(method.owner)?;
        rt.method(method.index).cloned().ok_or_else(|| missing(&rt, &method.to_string()))
    }

    pub(super) fn runtime_field(&self, field: FieldRef) -> VmResult<RuntimeField> {
        let rt = self.runtime_type(field.owner)?;
        rt.field(field.index).cloned().ok_or_else(|| missing(&rt, &field.to_string()))
    }

    /// Allocate storage and run the type initializer on first use
    pub(super) fn ensure_initialized(&mut self, id: TypeId) -> VmResult<()> {
        if self.initialized.contains(&id) {
            return Ok(());
        }
        self.initialized.insert(id);
        let rt = self.runtime_type(id)?;
        self.statics.insert(id, rt.static_defaults.iter().cloned().map(Value::to_stack).collect());

        if !self.options.run_type_initializers {
            return Ok(());
        }
        if let Some(cctor) = rt.type_initializer {
            debug!(ty = %rt.full_name, "running type initializer");
            let m = self.runtime_method(cctor)?;
            self.execute(m, Vec::new(), Arc::from([]))?;
        }
        Ok(())
    }

    pub(super) fn static_slot(&mut self, owner: TypeId, slot: usize) -> VmResult<&mut Value> {
        self.ensure_initialized(owner)?;
        self.statics
            .get_mut(&owner)
            .and_then(|s| s.get_mut(slot))
            .ok_or_else(|| VmError::RuntimeError(format!("static slot {} missing on {}", slot, owner)))
    }

    pub(super) fn allocate(&mut self, rt: &RuntimeType) -> VmResult<Value> {
        if !rt.is_instantiable() {
            return Err(VmError::AbstractInstantiation(rt.full_name.clone()));
        }
        self.ensure_initialized(rt.id())?;
        let fields = rt.instance_defaults.iter().cloned().map(Value::to_stack).collect();
        Ok(Value::Object(Arc::new(Object::new(rt.id(), fields))))
    }

    fn receiver_type(&self, receiver: &Value) -> VmResult<TypeId> {
        receiver_object(receiver).map(|o| o.type_id())
    }

    /// Search a type and its bases
    fn find_on_chain<T>(&self, ty: TypeId, f: impl Fn(&RuntimeType) -> Option<T>) -> VmResult<Option<T>> {
        let mut current = Some(ty);
        while let Some(id) = current {
            let rt = self.runtime_type(id)?;
            if let Some(found) = f(&rt) {
                return Ok(Some(found));
            }
            current = rt.base;
        }
        Ok(None)
    }

    fn field_on_chain(&self, ty: TypeId, name: &str) -> VmResult<RuntimeField> {
        self.find_on_chain(ty, |t| t.find_field(name).cloned())?
            .ok_or_else(|| self.missing_on(ty, name))
    }

    fn missing_on(&self, ty: TypeId, member: &str) -> VmError {
        VmError::MissingMember {
            owner: self
                .session
                .realized(ty)
                .map(|t| t.full_name.clone())
                .unwrap_or_else(|| ty.to_string()),
            member: member.to_string(),
        }
    }
}

fn missing(rt: &RuntimeType, member: &str) -> VmError {
    VmError::MissingMember {
        owner: rt.full_name.clone(),
        member: member.to_string(),
    }
}

fn receiver_object(receiver: &Value) -> VmResult<&Arc<Object>> {
    match receiver {
        Value::Object(o) => Ok(o),
        Value::Null => Err(VmError::NullReference),
        other => Err(VmError::TypeError(format!("expected an object, found {}", other.kind_name()))),
    }
}

fn literal_value(field: &RuntimeField) -> Value {
    field
        .constant
        .as_ref()
        .map(Value::from)
        .unwrap_or_default()
        .coerce_to(&field.ty)
}

/// Check whether a host argument list fits a method's parameters
fn accepts(method: &RuntimeMethod, args: &[Value]) -> bool {
    if args.len() > method.params.len() {
        return false;
    }
    if method.params[args.len()..].iter().any(|p| p.default.is_none()) {
        return false;
    }
    method.params.iter().zip(args).all(|(p, a)| fits(a, &p.ty))
}

fn fits(value: &Value, ty: &TypeRef) -> bool {
    match (ty.classify(), value) {
        (TypeClass::Generic, _) => true,
        (TypeClass::Bool, Value::Bool(_) | Value::I32(_)) => true,
        (TypeClass::Char | TypeClass::SignedInt(8 | 16 | 32) | TypeClass::UnsignedInt(8 | 16 | 32), Value::I32(_)) => true,
        (TypeClass::SignedInt(64) | TypeClass::UnsignedInt(64), Value::I32(_) | Value::I64(_)) => true,
        (TypeClass::Float(_), Value::F32(_) | Value::F64(_)) => true,
        (TypeClass::Reference, Value::Null) => true,
        (TypeClass::Reference, Value::Str(_)) => matches!(ty, TypeRef::String | TypeRef::Object),
        (TypeClass::Reference, Value::Array(_)) => matches!(ty, TypeRef::Array(_) | TypeRef::Object),
        (TypeClass::Reference, Value::Object(_) | Value::Boxed(_)) => {
            matches!(ty, TypeRef::Defined(_) | TypeRef::Object)
        }
        _ => false,
    }
}

/// Fill defaults and put host arguments in stack form
fn bind_args(method: &RuntimeMethod, args: &[Value]) -> VmResult<Vec<Value>> {
    if args.len() > method.params.len() {
        return Err(VmError::TypeError(format!(
            "'{}' takes {} argument(s), got {}",
            method.name,
            method.params.len(),
            args.len()
        )));
    }
    method
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| match args.get(i) {
            Some(a) => Ok(a.clone().coerce_to(&p.ty).to_stack()),
            None => p
                .default
                .as_ref()
                .map(|c| Value::from(c).coerce_to(&p.ty).to_stack())
                .ok_or_else(|| VmError::TypeError(format!("missing argument '{}' for '{}'", p.name, method.name))),
        })
        .collect()
}

/// Extract a method operand and its generic instantiation
pub(super) fn method_operand(instr: &Instruction) -> VmResult<(MethodRef, Option<&Arc<[TypeRef]>>)> {
    match &instr.operand {
        Operand::Method(m) => Ok((*m, None)),
        Operand::GenericMethod(m, args) => Ok((*m, Some(args))),
        _ => Err(bad_operand(instr.opcode)),
    }
}

pub(super) fn field_operand(instr: &Instruction) -> VmResult<FieldRef> {
    match &instr.operand {
        Operand::Field(f) => Ok(*f),
        _ => Err(bad_operand(instr.opcode)),
    }
}

pub(super) fn type_operand(instr: &Instruction) -> VmResult<&TypeRef> {
    match &instr.operand {
        Operand::Type(t) => Ok(t),
        _ => Err(bad_operand(instr.opcode)),
    }
}

pub(super) fn bad_operand(opcode: Opcode) -> VmError {
    VmError::RuntimeError(format!("malformed operand for '{}'", opcode))
}
