//! Assembly, type and member builders
//!
//! An [`AssemblyBuilder`] owns the descriptors of every type defined in one
//! unit. [`TypeBuilder`]s borrow it to add members; method bodies are
//! generated through an [`InstructionEmitter`](crate::emit::InstructionEmitter)
//! with a [`BuildContext`] describing where the body lives. `finalize()`
//! realizes every type into the owning [`BuildSession`](crate::BuildSession).

mod assembly;
mod config;
mod context;
pub mod descriptor;
pub mod flags;
mod lookup;
mod method;
mod overrides;
mod realize;
mod type_builder;

pub use assembly::{AssemblyBuilder, RealizedUnit};
pub use config::{
    Body, BodyFn, ConstructorConfig, FieldConfig, MethodConfig, ParamSpec, PropertyAccessors,
    PropertyConfig, TypeConfig,
};
pub use context::{BuildContext, MemberRef};
pub use descriptor::{MethodKind, TypeState};
pub use flags::{FieldAttributes, MethodAttributes, Modifier, OverrideOrigin, TypeAttributes, Visibility};
pub use lookup::{FieldSig, MethodSig};
pub use method::MethodBuilder;
pub use overrides::OverrideTarget;
pub use type_builder::{PropertyHandle, TypeBuilder};

use crate::attribute::AttributeError;
use crate::emit::EmitError;
use crate::types::TypeId;
use thiserror::Error;

/// Builder errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// A type or member was given an empty name
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    /// A member with the same name (and signature, for methods) already exists
    #[error("Duplicate member '{member}' on type '{owner}'")]
    DuplicateMember {
        /// Owning type name
        owner: String,
        /// Member name
        member: String,
    },

    /// A type with the same full name is already registered
    #[error("Duplicate type name '{0}'")]
    DuplicateType(String),

    /// The matched base method is not virtual, or is final
    #[error("Method '{method}' on base type '{base}' cannot be overridden")]
    NotOverridable {
        /// Base type name
        base: String,
        /// Method name
        method: String,
    },

    /// An interface was given a base type
    #[error("Interface '{0}' cannot have a base type")]
    InterfaceBase(String),

    /// A member lookup failed
    #[error("Unresolvable member '{member}' on type '{owner}'")]
    UnresolvableMember {
        /// Type searched
        owner: String,
        /// Member searched for
        member: String,
    },

    /// A type id is not known to this unit or its session
    #[error("Unknown type {0}")]
    UnknownType(TypeId),

    /// The type has already been realized and can no longer change
    #[error("Type '{0}' is already realized")]
    TypeRealized(String),

    /// A member is not allowed on this kind of type, or is malformed
    #[error("Invalid member on '{owner}': {reason}")]
    InvalidMember {
        /// Owning type name
        owner: String,
        /// What is wrong
        reason: String,
    },

    /// The base type chain loops back on itself
    #[error("Circular inheritance involving '{0}'")]
    CircularInheritance(String),

    /// Body emission failed
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// Attribute compilation failed
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// Builder result type
pub type BuildResult<T> = Result<T, BuildError>;
