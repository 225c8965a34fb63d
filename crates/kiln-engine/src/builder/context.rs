//! Context handed to body generation callbacks

use super::assembly::AssemblyBuilder;
use super::lookup::{FieldSig, MethodSig};
use super::overrides::OverrideTarget;
use super::{BuildError, BuildResult};
use crate::emit::InstructionEmitter;
use crate::types::{FieldRef, MethodRef, TypeHandle, TypeId, TypeRef};

/// The member a body is being generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef {
    /// A method, constructor or accessor
    Method(MethodRef),
    /// A field
    Field(FieldRef),
}

/// Read-only view of where a body is being generated
///
/// Contexts are cheap copies; each `with_*` call returns a child that differs
/// from its parent in exactly one field.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    assembly: &'a AssemblyBuilder,
    current_type: Option<TypeId>,
    member: Option<MemberRef>,
    overriding: Option<&'a OverrideTarget>,
}

impl<'a> BuildContext<'a> {
    /// Root context for an assembly
    pub fn new(assembly: &'a AssemblyBuilder) -> Self {
        Self {
            assembly,
            current_type: None,
            member: None,
            overriding: None,
        }
    }

    /// Child context for a type
    pub fn with_type(self, id: TypeId) -> Self {
        Self {
            current_type: Some(id),
            ..self
        }
    }

    /// Child context for a member
    pub fn with_member(self, member: MemberRef) -> Self {
        Self {
            member: Some(member),
            ..self
        }
    }

    /// Child context carrying the method being overridden
    pub fn with_override(self, target: Option<&'a OverrideTarget>) -> Self {
        Self {
            overriding: target,
            ..self
        }
    }

    /// The assembly being built
    pub fn assembly(&self) -> &'a AssemblyBuilder {
        self.assembly
    }

    /// The type being built, if any
    pub fn current_type(&self) -> Option<TypeHandle> {
        self.current_type
            .and_then(|id| self.assembly.summary(id).ok())
            .map(|s| s.handle)
    }

    /// The member being built, if any
    pub fn current_member(&self) -> Option<MemberRef> {
        self.member
    }

    /// The method being overridden or implemented, if any
    pub fn overridden(&self) -> Option<&'a OverrideTarget> {
        self.overriding
    }

    /// The current type, or an error outside of a type
    pub fn this_type(&self) -> BuildResult<TypeHandle> {
        self.current_type().ok_or_else(|| BuildError::InvalidMember {
            owner: self.assembly.name().to_string(),
            reason: "no current type in this context".to_string(),
        })
    }

    /// Type reference to the current type
    pub fn this_type_ref(&self) -> BuildResult<TypeRef> {
        self.this_type().map(TypeRef::Defined)
    }

    /// Resolve a type by full name, in this unit first and then the session
    pub fn resolve_type(&self, name: &str) -> BuildResult<TypeHandle> {
        self.assembly
            .local_type(name)
            .or_else(|| self.assembly.session().resolve_type(name))
            .ok_or_else(|| BuildError::UnresolvableMember {
                owner: self.assembly.name().to_string(),
                member: name.to_string(),
            })
    }

    /// Field of the current type (or its bases) by name
    pub fn field(&self, name: &str) -> BuildResult<FieldRef> {
        let id = self.this_type()?.id;
        Ok(self.assembly.find_field(id, name)?.handle)
    }

    /// Method of the current type (or its bases) by name and parameter types
    pub fn method(&self, name: &str, params: &[TypeRef]) -> BuildResult<MethodRef> {
        let id = self.this_type()?.id;
        Ok(self.assembly.find_method(id, name, Some(params))?.handle)
    }

    /// Method of any known type by name, optionally by parameter types
    pub fn method_on(&self, ty: TypeId, name: &str, params: Option<&[TypeRef]>) -> BuildResult<MethodRef> {
        Ok(self.assembly.find_method(ty, name, params)?.handle)
    }

    /// Field of any known type by name
    pub fn field_on(&self, ty: TypeId, name: &str) -> BuildResult<FieldRef> {
        Ok(self.assembly.find_field(ty, name)?.handle)
    }

    /// Instance constructor of any known type by parameter types
    pub fn constructor_on(&self, ty: TypeId, params: &[TypeRef]) -> BuildResult<MethodRef> {
        Ok(self.assembly.find_constructor(ty, params)?.handle)
    }

    /// Parameterless constructor of the current type's base, if there is one
    pub fn base_constructor(&self) -> Option<MethodRef> {
        let id = self.current_type?;
        let base = self.assembly.summary(id).ok()?.base?;
        self.assembly.find_constructor(base, &[]).ok().map(|m| m.handle)
    }

    /// Signature of any known method
    pub fn signature(&self, method: MethodRef) -> BuildResult<MethodSig> {
        self.assembly.method_sig(method)
    }

    /// Emit a call, using `callvirt` for virtual instance methods
    pub fn emit_call(&self, il: &mut InstructionEmitter, method: MethodRef) -> BuildResult<()> {
        let sig = self.assembly.method_sig(method)?;
        let virtual_dispatch = sig.is_virtual() && !sig.is_static();
        il.call_method(method, virtual_dispatch);
        Ok(())
    }

    /// Emit a field load, choosing `ldsfld` for static fields
    ///
    /// For instance fields the receiver must already be on the stack.
    pub fn emit_load_field(&self, il: &mut InstructionEmitter, field: FieldRef) -> BuildResult<()> {
        if self.field_sig(field)?.is_static() {
            il.ldsfld(field);
        } else {
            il.ldfld(field);
        }
        Ok(())
    }

    /// Emit a field store, choosing `stsfld` for static fields
    pub fn emit_store_field(&self, il: &mut InstructionEmitter, field: FieldRef) -> BuildResult<()> {
        if self.field_sig(field)?.is_static() {
            il.stsfld(field);
        } else {
            il.stfld(field);
        }
        Ok(())
    }

    fn field_sig(&self, field: FieldRef) -> BuildResult<FieldSig> {
        self.assembly
            .summary(field.owner)?
            .fields
            .into_iter()
            .nth(field.index as usize)
            .ok_or_else(|| BuildError::UnresolvableMember {
                owner: self.assembly.type_name(field.owner),
                member: field.to_string(),
            })
    }
}

impl std::fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("assembly", &self.assembly.name())
            .field("current_type", &self.current_type)
            .field("member", &self.member)
            .field("overriding", &self.overriding.map(|t| t.method))
            .finish()
    }
}
