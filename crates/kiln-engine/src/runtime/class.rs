//! Realized type metadata consumed by the interpreter

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::attribute::AttributePayload;
use crate::builder::{FieldAttributes, MethodAttributes, MethodKind, ParamSpec, TypeAttributes};
use crate::emit::MethodBody;
use crate::types::{Constant, FieldRef, MethodRef, TypeHandle, TypeId, TypeRef};

use super::value::Value;

/// Virtual method table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VTable {
    /// Method handles (indexed by slot)
    pub methods: Vec<MethodRef>,
}

impl VTable {
    /// Create a new empty vtable
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a method and return its slot
    pub fn add_method(&mut self, method: MethodRef) -> usize {
        self.methods.push(method);
        self.methods.len() - 1
    }

    /// Get the method in a slot
    pub fn get_method(&self, slot: usize) -> Option<MethodRef> {
        self.methods.get(slot).copied()
    }

    /// Get number of slots
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Replace the method in an existing slot
    pub fn override_method(&mut self, slot: usize, method: MethodRef) -> Result<(), String> {
        match self.methods.get_mut(slot) {
            Some(m) => {
                *m = method;
                Ok(())
            }
            None => Err(format!("Method slot {} out of bounds", slot)),
        }
    }
}

/// Storage location of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSlot {
    /// Index into an object's field slots
    Instance(usize),
    /// Index into the type's static storage
    Static(usize),
    /// Compile-time constant; no storage
    Literal,
}

/// A realized field or enum literal
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeField {
    /// Handle
    pub handle: FieldRef,
    /// Name
    pub name: String,
    /// Type
    pub ty: TypeRef,
    /// Flags
    pub attributes: FieldAttributes,
    /// Storage location
    pub slot: FieldSlot,
    /// Literal or initial value
    pub constant: Option<Constant>,
}

impl RuntimeField {
    /// Check if this is an enum literal
    pub fn is_literal(&self) -> bool {
        self.attributes.contains(FieldAttributes::LITERAL)
    }
}

/// A realized method, constructor or accessor
#[derive(Debug, Clone)]
pub struct RuntimeMethod {
    /// Handle
    pub handle: MethodRef,
    /// Name
    pub name: String,
    /// Kind
    pub kind: MethodKind,
    /// Flags
    pub attributes: MethodAttributes,
    /// Parameters (receiver excluded)
    pub params: Vec<ParamSpec>,
    /// Return type
    pub return_type: TypeRef,
    /// Generic parameter names
    pub generic_params: Vec<String>,
    /// Body; `None` for abstract methods
    pub body: Option<Arc<MethodBody>>,
    /// Slot in the owner's vtable, for virtual methods
    pub vtable_slot: Option<usize>,
    /// Interface method explicitly implemented
    pub overrides: Option<MethodRef>,
    /// Applied custom attributes
    pub custom_attributes: Vec<AttributePayload>,
}

impl RuntimeMethod {
    /// Check for the `STATIC` flag
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Check for the `VIRTUAL` flag
    pub fn is_virtual(&self) -> bool {
        self.attributes.contains(MethodAttributes::VIRTUAL)
    }

    /// Check for the `ABSTRACT` flag
    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(MethodAttributes::ABSTRACT)
    }

    /// Parameter types in order
    pub fn param_types(&self) -> Vec<TypeRef> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

/// A realized property
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeProperty {
    /// Name
    pub name: String,
    /// Type
    pub ty: TypeRef,
    /// Getter
    pub getter: Option<MethodRef>,
    /// Setter
    pub setter: Option<MethodRef>,
    /// Backing field of an auto property
    pub backing_field: Option<FieldRef>,
}

/// A realized, immutable type
#[derive(Debug, Clone)]
pub struct RuntimeType {
    /// Identity and kind
    pub handle: TypeHandle,
    /// Simple name
    pub name: String,
    /// Full name (`Outer+Inner` for nested types)
    pub full_name: String,
    /// Flags
    pub attributes: TypeAttributes,
    /// Base class; `None` is the root object type
    pub base: Option<TypeId>,
    /// Declared interfaces
    pub interfaces: Vec<TypeId>,
    /// Every implemented interface, inherited ones included
    pub all_interfaces: Vec<TypeId>,
    /// Enclosing type
    pub enclosing: Option<TypeId>,
    /// Nested types
    pub nested: Vec<TypeId>,
    /// Own fields, by declaration index
    pub fields: Vec<RuntimeField>,
    /// Own methods, by declaration index
    pub methods: Vec<Arc<RuntimeMethod>>,
    /// Own properties
    pub properties: Vec<RuntimeProperty>,
    /// Initial values of every instance slot, inherited slots first
    pub instance_defaults: Vec<Value>,
    /// Initial values of the type's static storage
    pub static_defaults: Vec<Value>,
    /// Virtual method table, inherited slots first
    pub vtable: VTable,
    /// Interface method → implementing method
    pub interface_map: FxHashMap<MethodRef, MethodRef>,
    /// Type initializer
    pub type_initializer: Option<MethodRef>,
    /// Applied custom attributes
    pub custom_attributes: Vec<AttributePayload>,
}

impl RuntimeType {
    /// Type id
    pub fn id(&self) -> TypeId {
        self.handle.id
    }

    /// Type reference to this type
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::Defined(self.handle)
    }

    /// Check if instances can be created
    pub fn is_instantiable(&self) -> bool {
        !self.attributes.intersects(TypeAttributes::ABSTRACT | TypeAttributes::INTERFACE | TypeAttributes::VALUE_TYPE)
    }

    /// Method by handle index
    pub fn method(&self, index: u32) -> Option<&Arc<RuntimeMethod>> {
        self.methods.get(index as usize)
    }

    /// Field by handle index
    pub fn field(&self, index: u32) -> Option<&RuntimeField> {
        self.fields.get(index as usize)
    }

    /// Own method by name, optionally by parameter types (constructors excluded)
    pub fn find_method(&self, name: &str, params: Option<&[TypeRef]>) -> Option<&Arc<RuntimeMethod>> {
        self.methods.iter().find(|m| {
            m.name == name && !m.kind.is_constructor() && params.map_or(true, |p| m.param_types() == p)
        })
    }

    /// Own field by name
    pub fn find_field(&self, name: &str) -> Option<&RuntimeField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Own property by name
    pub fn property(&self, name: &str) -> Option<&RuntimeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Instance constructor by parameter types
    pub fn constructor(&self, params: &[TypeRef]) -> Option<&Arc<RuntimeMethod>> {
        self.methods
            .iter()
            .find(|m| m.kind == MethodKind::Constructor && m.param_types() == params)
    }

    /// Instance constructors
    pub fn constructors(&self) -> impl Iterator<Item = &Arc<RuntimeMethod>> + '_ {
        self.methods.iter().filter(|m| m.kind == MethodKind::Constructor)
    }

    /// Enum literal value by name
    pub fn literal(&self, name: &str) -> Option<&Constant> {
        self.fields
            .iter()
            .find(|f| f.is_literal() && f.name == name)
            .and_then(|f| f.constant.as_ref())
    }

    /// Enum literals in declaration order
    pub fn literals(&self) -> impl Iterator<Item = (&str, &Constant)> + '_ {
        self.fields
            .iter()
            .filter(|f| f.is_literal())
            .filter_map(|f| f.constant.as_ref().map(|c| (f.name.as_str(), c)))
    }

    /// Check if the type implements an interface, directly or through a base
    pub fn implements(&self, interface: TypeId) -> bool {
        self.all_interfaces.contains(&interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vtable_override_and_bounds() {
        let m = |i| MethodRef {
            owner: TypeId(1),
            index: i,
        };
        let mut vt = VTable::new();
        assert_eq!(vt.add_method(m(0)), 0);
        assert_eq!(vt.add_method(m(1)), 1);
        vt.override_method(0, m(5)).unwrap();
        assert_eq!(vt.get_method(0), Some(m(5)));
        assert!(vt.override_method(2, m(6)).is_err());
        assert_eq!(vt.method_count(), 2);
    }
}
