//! Declaration records accumulated while a type is being built

use std::sync::Arc;

use super::config::ParamSpec;
use super::flags::{FieldAttributes, MethodAttributes, Modifier, TypeAttributes, Visibility};
use crate::attribute::AttributePayload;
use crate::emit::MethodBody;
use crate::types::{Constant, MethodRef, TypeHandle, TypeId, TypeRef};

/// Lifecycle of a type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState {
    /// Members may still be added
    Building,
    /// Realized into the session; immutable
    Realized,
}

/// What a method descriptor declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Ordinary method
    Method,
    /// Instance constructor
    Constructor,
    /// Type initializer
    TypeInitializer,
    /// Property getter
    Getter,
    /// Property setter
    Setter,
}

impl MethodKind {
    /// Check if this is an instance constructor or a type initializer
    pub fn is_constructor(&self) -> bool {
        matches!(self, MethodKind::Constructor | MethodKind::TypeInitializer)
    }
}

/// Tagged member entry in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    /// Index into `fields`
    Field(u32),
    /// Index into `properties`
    Property(u32),
    /// Index into `methods`
    Method(u32),
    /// Index into `methods`
    Constructor(u32),
    /// Index into `fields`
    EnumLiteral(u32),
    /// Generic parameter of a method
    GenericParameter {
        /// Index into `methods`
        method: u32,
        /// Position in the method's generic parameter list
        position: u32,
        /// Parameter name
        name: String,
    },
}

/// A method, constructor or accessor
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
    /// Kind
    pub kind: MethodKind,
    /// Flags after override resolution
    pub attributes: MethodAttributes,
    /// Parameters (receiver excluded)
    pub params: Vec<ParamSpec>,
    /// Return type
    pub return_type: TypeRef,
    /// Generic parameter names
    pub generic_params: Vec<String>,
    /// Sealed body; `None` for abstract methods and while being generated
    pub body: Option<Arc<MethodBody>>,
    /// Interface method this explicitly implements
    pub overrides: Option<MethodRef>,
    /// Base method whose vtable slot this reuses
    pub base_slot: Option<MethodRef>,
    /// Applied custom attributes
    pub custom_attributes: Vec<AttributePayload>,
}

impl MethodDescriptor {
    /// Parameter types in order
    pub fn param_types(&self) -> Vec<TypeRef> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    /// Check for the `STATIC` flag
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Check for the `ABSTRACT` flag
    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(MethodAttributes::ABSTRACT)
    }
}

/// A field or enum literal
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeRef,
    /// Flags
    pub attributes: FieldAttributes,
    /// Literal value or initial value
    pub constant: Option<Constant>,
}

impl FieldDescriptor {
    /// Check for the `STATIC` flag
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

/// A property: accessor methods plus an optional backing field
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Property type
    pub ty: TypeRef,
    /// Index of the getter in `methods`
    pub getter: Option<u32>,
    /// Index of the setter in `methods`
    pub setter: Option<u32>,
    /// Index of the backing field in `fields`
    pub backing_field: Option<u32>,
}

/// Everything declared for one type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Identity and kind
    pub handle: TypeHandle,
    /// Simple name
    pub name: String,
    /// Name qualified by enclosing types (`Outer+Inner`)
    pub full_name: String,
    /// Accessibility
    pub visibility: Visibility,
    /// Modifier
    pub modifier: Modifier,
    /// Computed flags
    pub attributes: TypeAttributes,
    /// Base type; `None` is the root object type
    pub base: Option<TypeRef>,
    /// Declared interfaces, unique, in insertion order
    pub interfaces: Vec<TypeRef>,
    /// Fields and enum literals
    pub fields: Vec<FieldDescriptor>,
    /// Methods, constructors and accessors
    pub methods: Vec<MethodDescriptor>,
    /// Properties
    pub properties: Vec<PropertyDescriptor>,
    /// Declaration log
    pub members: Vec<MemberDescriptor>,
    /// Nested type ids
    pub nested: Vec<TypeId>,
    /// Enclosing type, for nested types
    pub enclosing: Option<TypeId>,
    /// Applied custom attributes
    pub custom_attributes: Vec<AttributePayload>,
    /// Lifecycle state
    pub state: TypeState,
    pub(crate) next_literal: i64,
}

impl TypeDescriptor {
    pub(crate) fn new(
        handle: TypeHandle,
        name: &str,
        full_name: String,
        visibility: Visibility,
        modifier: Modifier,
        attributes: TypeAttributes,
    ) -> Self {
        Self {
            handle,
            name: name.to_string(),
            full_name,
            visibility,
            modifier,
            attributes,
            base: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            members: Vec::new(),
            nested: Vec::new(),
            enclosing: None,
            custom_attributes: Vec::new(),
            state: TypeState::Building,
            next_literal: 0,
        }
    }

    /// Check if the type has been realized
    pub fn is_realized(&self) -> bool {
        self.state == TypeState::Realized
    }

    /// Method handle for a method index
    pub fn method_ref(&self, index: u32) -> MethodRef {
        MethodRef {
            owner: self.handle.id,
            index,
        }
    }
}
