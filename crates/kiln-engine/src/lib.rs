//! Kiln Engine
//!
//! Runtime construction of executable types:
//! - **Emit**: fluent instruction emission for method bodies (`emit` module)
//! - **Builder**: assembly, type and member builders with override resolution (`builder` module)
//! - **Attribute**: compile-time folding of attribute construction expressions (`attribute` module)
//! - **Session**: the shared name→handle registry and realized type table (`session` module)
//! - **Runtime**: an interpreter that loads and executes realized types (`runtime` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_engine::{BuildSession, Body, MethodConfig, TypeConfig, TypeRef, Vm, Value};
//!
//! let session = BuildSession::new();
//! let mut asm = session.define_assembly("Demo");
//! let calc = {
//!     let mut tb = asm.define_type("Calculator", TypeConfig::public())?;
//!     tb.define_default_constructor()?;
//!     tb.define_method(
//!         "Twice",
//!         MethodConfig::public().param("x", TypeRef::I32).returns(TypeRef::I32),
//!         Body::with(|il, _| {
//!             il.ldarg_1().ldc_i4(2).mul().ret();
//!             Ok(())
//!         }),
//!     )?;
//!     tb.handle()
//! };
//! asm.finalize()?;
//!
//! let mut vm = Vm::new(&session);
//! let obj = vm.new_object(calc, &[])?;
//! assert_eq!(vm.invoke_virtual(&obj, "Twice", &[Value::I32(21)])?, Value::I32(42));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::should_implement_trait)]

/// Type identities and type references shared by every layer
pub mod types;

/// Instruction emission: opcodes, emitter, sealing
pub mod emit;

/// Assembly, type and member builders
pub mod builder;

/// Attribute value compilation
pub mod attribute;

/// Build sessions and the shared type registry
pub mod session;

/// Host runtime for realized types
pub mod runtime;

pub use attribute::{
    AttributeError, AttributeExpr, AttributePayload, AttributeValue, AttributeValueCompiler,
    MemberAccess,
};
pub use builder::{
    AssemblyBuilder, Body, BuildContext, BuildError, BuildResult, ConstructorConfig,
    FieldAttributes, FieldConfig, MethodAttributes, MethodBuilder, MethodConfig, Modifier,
    MethodKind, ParamSpec, PropertyAccessors, PropertyConfig, PropertyHandle, RealizedUnit,
    TypeAttributes, TypeBuilder, TypeConfig, Visibility,
};
pub use emit::{
    Comparison, EmitError, EmitResult, Instruction, InstructionEmitter, Label, LocalBuilder,
    MethodBody, Opcode, Operand,
};
pub use runtime::{ResourceLimits, RuntimeMethod, RuntimeType, Value, Vm, VmError, VmOptions, VmResult};
pub use session::{BuildOptions, BuildSession, TypeRegistry};
pub use types::{Constant, FieldRef, MethodRef, Primitive, TypeClass, TypeHandle, TypeId, TypeKind, TypeRef};
