//! Builder for one class, interface or enum

use tracing::debug;

use super::assembly::AssemblyBuilder;
use super::config::{
    Body, ConstructorConfig, FieldConfig, MethodConfig, PropertyAccessors, PropertyConfig, TypeConfig,
};
use super::descriptor::{FieldDescriptor, MemberDescriptor, MethodKind, PropertyDescriptor, TypeDescriptor};
use super::flags::{field_attributes, literal_attributes, Modifier, Visibility};
use super::method::{self, MethodBuilder};
use super::{BuildError, BuildResult};
use crate::attribute::{AttributeExpr, AttributePayload, AttributeValueCompiler};
use crate::types::{Constant, FieldRef, MethodRef, Primitive, TypeHandle, TypeId, TypeKind, TypeRef};

/// Handles produced by [`TypeBuilder::define_property`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyHandle {
    /// Owning type
    pub owner: TypeId,
    /// Index into the owner's properties
    pub index: u32,
    /// Getter accessor
    pub getter: Option<MethodRef>,
    /// Setter accessor
    pub setter: Option<MethodRef>,
    /// Backing field of an auto property
    pub backing_field: Option<FieldRef>,
}

/// Adds members to one type of an [`AssemblyBuilder`]
///
/// Every `define_*` call validates the name, computes the member's flags
/// and records it in the type's declaration log. Nothing can be added once
/// the unit has been finalized.
pub struct TypeBuilder<'a> {
    asm: &'a mut AssemblyBuilder,
    id: TypeId,
}

impl<'a> TypeBuilder<'a> {
    pub(crate) fn new(asm: &'a mut AssemblyBuilder, id: TypeId) -> Self {
        Self { asm, id }
    }

    /// Id of the type
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Handle of the type
    pub fn handle(&self) -> TypeHandle {
        self.asm
            .descriptor(self.id)
            .map(|d| d.handle)
            .unwrap_or(TypeHandle::new(self.id, TypeKind::Class))
    }

    /// Type reference to the type
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::Defined(self.handle())
    }

    /// Declaration record of the type
    pub fn descriptor(&self) -> BuildResult<&TypeDescriptor> {
        self.asm.descriptor(self.id).ok_or(BuildError::UnknownType(self.id))
    }

    /// The assembly being built
    pub fn assembly(&self) -> &AssemblyBuilder {
        self.asm
    }

    fn building(&mut self) -> BuildResult<&mut TypeDescriptor> {
        self.asm.building_mut(self.id)
    }

    fn invalid(&self, reason: impl Into<String>) -> BuildError {
        BuildError::InvalidMember {
            owner: self.asm.type_name(self.id),
            reason: reason.into(),
        }
    }

    /// Set the base class
    pub fn set_base(&mut self, base: TypeRef) -> BuildResult<&mut Self> {
        let (kind, full_name) = {
            let desc = self.building()?;
            (desc.handle.kind, desc.full_name.clone())
        };
        match kind {
            TypeKind::Interface => return Err(BuildError::InterfaceBase(full_name)),
            TypeKind::Enum { .. } => return Err(self.invalid("enums cannot have a base type")),
            TypeKind::Class => {}
        }
        if base.defined_id() == Some(self.id) {
            return Err(BuildError::CircularInheritance(full_name));
        }
        let base = self.asm.check_base(&full_name, base)?;
        self.building()?.base = base;
        Ok(self)
    }

    /// Add an implemented interface; duplicates are ignored
    pub fn add_interface(&mut self, interface: TypeRef) -> BuildResult<&mut Self> {
        let (kind, full_name) = {
            let desc = self.building()?;
            (desc.handle.kind, desc.full_name.clone())
        };
        if kind.is_enum() {
            return Err(self.invalid("enums cannot implement interfaces"));
        }
        self.asm.check_interface(&full_name, &interface)?;
        let desc = self.building()?;
        if !desc.interfaces.contains(&interface) {
            desc.interfaces.push(interface);
        }
        Ok(self)
    }

    /// Define a field
    ///
    /// Interfaces carry no fields, so this is a no-op returning `None` there.
    pub fn define_field(&mut self, name: &str, ty: TypeRef, config: FieldConfig) -> BuildResult<Option<FieldRef>> {
        if name.is_empty() {
            return Err(BuildError::EmptyName("Field"));
        }
        match self.building()?.handle.kind {
            TypeKind::Interface => return Ok(None),
            TypeKind::Enum { .. } => return Err(self.invalid("enums declare literals, not fields")),
            TypeKind::Class => {}
        }
        if ty == TypeRef::Void {
            return Err(self.invalid(format!("field '{}' cannot be void", name)));
        }
        let mut attributes = field_attributes(config.visibility, config.modifier);
        if config.default.is_some() {
            attributes |= super::flags::FieldAttributes::HAS_DEFAULT;
        }
        let field = self.push_field(FieldDescriptor {
            name: name.to_string(),
            ty,
            attributes,
            constant: config.default,
        })?;
        Ok(Some(field))
    }

    fn push_field(&mut self, field: FieldDescriptor) -> BuildResult<FieldRef> {
        let id = self.id;
        let desc = self.building()?;
        if desc.fields.iter().any(|f| f.name == field.name) {
            return Err(BuildError::DuplicateMember {
                owner: desc.full_name.clone(),
                member: field.name,
            });
        }
        let index = desc.fields.len() as u32;
        let literal = field.attributes.contains(super::flags::FieldAttributes::LITERAL);
        debug!(r#type = %desc.full_name, field = %field.name, ty = %field.ty, "defined field");
        desc.fields.push(field);
        desc.members.push(if literal {
            MemberDescriptor::EnumLiteral(index)
        } else {
            MemberDescriptor::Field(index)
        });
        Ok(FieldRef { owner: id, index })
    }

    /// Define an enum literal
    ///
    /// An omitted value is one more than the previous literal, starting at 0.
    pub fn define_literal(&mut self, name: &str, value: Option<i64>) -> BuildResult<FieldRef> {
        if name.is_empty() {
            return Err(BuildError::EmptyName("Literal"));
        }
        let (handle, next) = {
            let desc = self.building()?;
            (desc.handle, desc.next_literal)
        };
        let TypeKind::Enum { underlying } = handle.kind else {
            return Err(self.invalid(format!("literal '{}' outside of an enum", name)));
        };
        let value = value.unwrap_or(next);
        if !fits_underlying(value, underlying) {
            return Err(self.invalid(format!(
                "literal '{}' value {} does not fit {}",
                name,
                value,
                underlying.name()
            )));
        }
        let field = self.push_field(FieldDescriptor {
            name: name.to_string(),
            ty: TypeRef::Defined(handle),
            attributes: literal_attributes(),
            constant: Some(Constant::integral(value, underlying)),
        })?;
        self.building()?.next_literal = value.wrapping_add(1);
        Ok(field)
    }

    /// Define a method and generate its body
    pub fn define_method(&mut self, name: &str, config: MethodConfig, body: Body<'_>) -> BuildResult<MethodRef> {
        method::define_method(self.asm, self.id, name, config, body, MethodKind::Method)
    }

    /// Define an instance constructor or type initializer
    pub fn define_constructor(&mut self, config: ConstructorConfig, body: Body<'_>) -> BuildResult<MethodRef> {
        method::define_constructor(self.asm, self.id, config, body)
    }

    /// Public parameterless constructor chaining to the base constructor
    pub fn define_default_constructor(&mut self) -> BuildResult<MethodRef> {
        self.define_constructor(ConstructorConfig::public(), Body::Minimal)
    }

    /// Define a property with its accessors
    pub fn define_property(
        &mut self,
        name: &str,
        ty: TypeRef,
        config: PropertyConfig<'_>,
    ) -> BuildResult<PropertyHandle> {
        if name.is_empty() {
            return Err(BuildError::EmptyName("Property"));
        }
        let kind = self.building()?.handle.kind;
        if kind.is_enum() {
            return Err(self.invalid("enums cannot declare properties"));
        }
        if ty == TypeRef::Void {
            return Err(self.invalid(format!("property '{}' cannot be void", name)));
        }
        {
            let desc = self.building()?;
            if desc.properties.iter().any(|p| p.name == name) {
                return Err(BuildError::DuplicateMember {
                    owner: desc.full_name.clone(),
                    member: name.to_string(),
                });
            }
        }

        let mark = {
            let desc = self.building()?;
            (desc.fields.len(), desc.methods.len(), desc.members.len())
        };
        let result = self.declare_property(name, ty, config);
        if result.is_err() {
            // Drop the backing field and any accessor already declared
            if let Ok(desc) = self.asm.descriptor_mut(self.id) {
                let (fields, methods, members) = mark;
                desc.fields.truncate(fields);
                desc.methods.truncate(methods);
                desc.members.truncate(members);
            }
        }
        result
    }

    fn declare_property(
        &mut self,
        name: &str,
        ty: TypeRef,
        config: PropertyConfig<'_>,
    ) -> BuildResult<PropertyHandle> {
        let kind = self.building()?.handle.kind;
        let is_static = config.modifier == Modifier::Static;
        let getter_config = MethodConfig::public()
            .with_visibility(config.visibility)
            .with_modifier(config.modifier)
            .no_params()
            .returns(ty.clone());
        let setter_config = MethodConfig::public()
            .with_visibility(config.visibility)
            .with_modifier(config.modifier)
            .param("value", ty.clone())
            .returns(TypeRef::Void);

        let (getter_body, setter_body, backing_field) = match config.accessors {
            PropertyAccessors::Auto { writable } if kind.is_interface() => {
                (Some(Body::Minimal), writable.then_some(Body::Minimal), None)
            }
            PropertyAccessors::Auto { writable } => {
                let field_config = FieldConfig {
                    visibility: Visibility::Private,
                    modifier: if is_static { Modifier::Static } else { Modifier::Standard },
                    default: None,
                };
                let field = self
                    .define_field(&format!("<{}>k__BackingField", name), ty.clone(), field_config)?
                    .ok_or_else(|| self.invalid("backing field was not created"))?;
                let getter = Body::with(move |il, _| {
                    if is_static {
                        il.ldsfld(field);
                    } else {
                        il.ldarg_0().ldfld(field);
                    }
                    il.ret();
                    Ok(())
                });
                let setter = writable.then(|| {
                    Body::with(move |il, _| {
                        if is_static {
                            il.ldarg_0().stsfld(field);
                        } else {
                            il.ldarg_0().ldarg_1().stfld(field);
                        }
                        il.ret();
                        Ok(())
                    })
                });
                (Some(getter), setter, Some(field))
            }
            PropertyAccessors::Custom { getter, setter } => {
                if getter.is_none() && setter.is_none() {
                    return Err(self.invalid(format!("property '{}' has no accessors", name)));
                }
                (getter, setter, None)
            }
        };

        let getter = match getter_body {
            Some(body) => Some(method::define_method(
                self.asm,
                self.id,
                &format!("get_{}", name),
                getter_config,
                body,
                MethodKind::Getter,
            )?),
            None => None,
        };
        let setter = match setter_body {
            Some(body) => Some(method::define_method(
                self.asm,
                self.id,
                &format!("set_{}", name),
                setter_config,
                body,
                MethodKind::Setter,
            )?),
            None => None,
        };

        let id = self.id;
        let desc = self.building()?;
        let index = desc.properties.len() as u32;
        desc.properties.push(PropertyDescriptor {
            name: name.to_string(),
            ty,
            getter: getter.map(|m| m.index),
            setter: setter.map(|m| m.index),
            backing_field: backing_field.map(|f| f.index),
        });
        desc.members.push(MemberDescriptor::Property(index));
        debug!(r#type = %desc.full_name, property = name, "defined property");
        Ok(PropertyHandle {
            owner: id,
            index,
            getter,
            setter,
            backing_field,
        })
    }

    /// Define a nested class
    pub fn define_nested_type(&mut self, name: &str, config: TypeConfig) -> BuildResult<TypeBuilder<'_>> {
        let id = self.asm.declare_type(name, TypeKind::Class, config, Some(self.id))?;
        Ok(TypeBuilder::new(self.asm, id))
    }

    /// Define a nested interface
    pub fn define_nested_interface(&mut self, name: &str, config: TypeConfig) -> BuildResult<TypeBuilder<'_>> {
        let id = self.asm.declare_type(name, TypeKind::Interface, config, Some(self.id))?;
        Ok(TypeBuilder::new(self.asm, id))
    }

    /// Define a nested enum
    pub fn define_nested_enum(
        &mut self,
        name: &str,
        visibility: Visibility,
        underlying: Primitive,
    ) -> BuildResult<TypeBuilder<'_>> {
        let config = TypeConfig::default().with_visibility(visibility);
        let id = self
            .asm
            .declare_type(name, TypeKind::Enum { underlying }, config, Some(self.id))?;
        Ok(TypeBuilder::new(self.asm, id))
    }

    /// Attach a compiled custom attribute to the type
    pub fn set_custom_attribute(&mut self, payload: AttributePayload) -> BuildResult<&mut Self> {
        self.building()?.custom_attributes.push(payload);
        Ok(self)
    }

    /// Compile an attribute expression and attach it to the type
    pub fn apply_attribute(&mut self, expr: &AttributeExpr) -> BuildResult<&mut Self> {
        let payload = AttributeValueCompiler::with_session(self.asm.session()).compile(expr)?;
        self.set_custom_attribute(payload)
    }

    /// Reopen a method of this type
    pub fn method(&mut self, method: MethodRef) -> BuildResult<MethodBuilder<'_>> {
        if method.owner != self.id {
            return Err(self.invalid(format!("method {} belongs to another type", method)));
        }
        MethodBuilder::new(self.asm, method)
    }
}

impl std::fmt::Debug for TypeBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBuilder")
            .field("id", &self.id)
            .field("name", &self.asm.type_name(self.id))
            .finish()
    }
}

fn fits_underlying(value: i64, underlying: Primitive) -> bool {
    match underlying {
        Primitive::I8 => i8::try_from(value).is_ok(),
        Primitive::I16 => i16::try_from(value).is_ok(),
        Primitive::I32 => i32::try_from(value).is_ok(),
        Primitive::U8 => u8::try_from(value).is_ok(),
        Primitive::U16 | Primitive::Char => u16::try_from(value).is_ok(),
        Primitive::U32 => u32::try_from(value).is_ok(),
        Primitive::I64 | Primitive::U64 => true,
        Primitive::Bool | Primitive::F32 | Primitive::F64 => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::flags::{FieldAttributes, MethodAttributes};
    use crate::session::BuildSession;

    #[test]
    fn test_enum_literals_auto_increment() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Enums");
        let mut tb = asm.define_enum("Level", Visibility::Public, Primitive::I32).unwrap();
        tb.define_literal("A", None).unwrap();
        tb.define_literal("B", Some(30)).unwrap();
        tb.define_literal("C", None).unwrap();

        let desc = tb.descriptor().unwrap();
        let values: Vec<_> = desc
            .fields
            .iter()
            .map(|f| f.constant.as_ref().and_then(Constant::as_i64))
            .collect();
        assert_eq!(values, vec![Some(0), Some(30), Some(31)]);
        assert!(desc.fields[0].attributes.contains(FieldAttributes::LITERAL));
        assert!(matches!(desc.members[1], MemberDescriptor::EnumLiteral(1)));
    }

    #[test]
    fn test_enum_rejects_fields_and_methods() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Enums");
        let mut tb = asm.define_enum("Color", Visibility::Public, Primitive::U8).unwrap();
        assert!(matches!(
            tb.define_field("x", TypeRef::I32, FieldConfig::public()),
            Err(BuildError::InvalidMember { .. })
        ));
        assert!(matches!(
            tb.define_method("F", MethodConfig::public(), Body::Minimal),
            Err(BuildError::InvalidMember { .. })
        ));
        assert!(matches!(
            tb.define_literal("Big", Some(300)),
            Err(BuildError::InvalidMember { .. })
        ));
    }

    #[test]
    fn test_interface_has_no_fields_and_no_base() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Ifaces");
        let mut tb = asm.define_interface("IShape", TypeConfig::public()).unwrap();
        assert_eq!(tb.define_field("x", TypeRef::I32, FieldConfig::public()).unwrap(), None);
        assert!(matches!(
            tb.set_base(TypeRef::Object),
            Err(BuildError::InterfaceBase(name)) if name == "IShape"
        ));
        let m = tb
            .define_method("Area", MethodConfig::public().no_params().returns(TypeRef::F64), Body::Minimal)
            .unwrap();
        let desc = tb.descriptor().unwrap();
        let attrs = desc.methods[m.index as usize].attributes;
        assert!(attrs.contains(MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL));
        assert!(desc.methods[m.index as usize].body.is_none());
    }

    #[test]
    fn test_empty_and_duplicate_names() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Names");
        assert_eq!(
            asm.define_type("", TypeConfig::public()).err(),
            Some(BuildError::EmptyName("Type"))
        );
        let mut tb = asm.define_type("Point", TypeConfig::public()).unwrap();
        tb.define_field("x", TypeRef::I32, FieldConfig::public()).unwrap();
        assert!(matches!(
            tb.define_field("x", TypeRef::I64, FieldConfig::public()),
            Err(BuildError::DuplicateMember { .. })
        ));
        assert_eq!(
            tb.define_field("", TypeRef::I32, FieldConfig::public()),
            Err(BuildError::EmptyName("Field"))
        );
        assert!(matches!(
            asm.define_type("Point", TypeConfig::public()),
            Err(BuildError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_add_interface_deduplicates() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Dedup");
        let a = asm.define_interface("IA", TypeConfig::public()).unwrap().type_ref();
        let b = asm.define_interface("IB", TypeConfig::public()).unwrap().type_ref();
        let mut tb = asm.define_type("C", TypeConfig::public()).unwrap();
        tb.add_interface(a.clone()).unwrap();
        tb.add_interface(b.clone()).unwrap();
        tb.add_interface(a.clone()).unwrap();
        assert_eq!(tb.descriptor().unwrap().interfaces, vec![a, b]);
        assert!(matches!(
            tb.add_interface(TypeRef::I32),
            Err(BuildError::InvalidMember { .. })
        ));
    }

    #[test]
    fn test_auto_property_declares_backing_field_and_accessors() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Props");
        let mut tb = asm.define_type("Person", TypeConfig::public()).unwrap();
        let prop = tb
            .define_property("Name", TypeRef::String, PropertyConfig::auto())
            .unwrap();
        let desc = tb.descriptor().unwrap();
        let field = prop.backing_field.unwrap();
        assert_eq!(desc.fields[field.index as usize].name, "<Name>k__BackingField");
        let getter = &desc.methods[prop.getter.unwrap().index as usize];
        assert_eq!(getter.name, "get_Name");
        assert!(getter.attributes.contains(MethodAttributes::SPECIAL_NAME));
        assert_eq!(getter.return_type, TypeRef::String);
        let setter = &desc.methods[prop.setter.unwrap().index as usize];
        assert_eq!(setter.name, "set_Name");
        assert_eq!(setter.param_types(), vec![TypeRef::String]);
    }

    #[test]
    fn test_failed_property_leaves_no_members_behind() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Props");
        let mut tb = asm.define_type("Person", TypeConfig::public()).unwrap();
        tb.define_method(
            "get_Age",
            MethodConfig::public().no_params().returns(TypeRef::I32),
            Body::Minimal,
        )
        .unwrap();
        tb.define_method(
            "set_Height",
            MethodConfig::public().param("value", TypeRef::I32),
            Body::Minimal,
        )
        .unwrap();
        let (fields, methods, members) = {
            let desc = tb.descriptor().unwrap();
            (desc.fields.len(), desc.methods.len(), desc.members.len())
        };

        // Getter clashes: the backing field is dropped
        let err = tb
            .define_property("Age", TypeRef::I32, PropertyConfig::auto())
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { ref member, .. } if member == "get_Age"));
        // Setter clashes: the backing field and the getter are dropped
        let err = tb
            .define_property("Height", TypeRef::I32, PropertyConfig::auto())
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMember { ref member, .. } if member == "set_Height"));

        let desc = tb.descriptor().unwrap();
        assert_eq!(desc.fields.len(), fields);
        assert_eq!(desc.methods.len(), methods);
        assert_eq!(desc.members.len(), members);
        assert!(desc.properties.is_empty());
        assert!(!desc.methods.iter().any(|m| m.name == "get_Height"));

        // The name is free for a valid definition afterwards
        let prop = tb
            .define_property("Weight", TypeRef::I32, PropertyConfig::auto())
            .unwrap();
        assert_eq!(prop.backing_field.unwrap().index as usize, fields);
    }

    #[test]
    fn test_nested_type_full_name() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Nesting");
        let mut outer = asm.define_type("Outer", TypeConfig::public()).unwrap();
        let inner = outer
            .define_nested_type("Inner", TypeConfig::public().with_visibility(Visibility::Private))
            .unwrap()
            .handle();
        assert_eq!(asm.local_type("Outer+Inner"), Some(inner));
        let desc = asm.descriptor(inner.id).unwrap();
        assert!(desc
            .attributes
            .contains(crate::builder::flags::TypeAttributes::NESTED_PRIVATE));
    }
}
