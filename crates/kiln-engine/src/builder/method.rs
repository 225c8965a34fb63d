//! Method and constructor construction

use std::sync::Arc;

use tracing::{debug, warn};

use super::assembly::AssemblyBuilder;
use super::config::{Body, ConstructorConfig, MethodConfig};
use super::context::{BuildContext, MemberRef};
use super::descriptor::{MemberDescriptor, MethodDescriptor, MethodKind};
use super::flags::{apply_override, constructor_attributes, method_attributes, MethodAttributes, Modifier, OverrideOrigin};
use super::lookup::MethodSig;
use super::overrides::{resolve_override, resolve_signature, OverrideTarget};
use super::{BuildError, BuildResult};
use crate::attribute::{AttributeExpr, AttributePayload, AttributeValueCompiler};
use crate::emit::{InstructionEmitter, MethodBody};
use crate::types::{MethodRef, TypeId, TypeKind, TypeRef};

/// Define a method, accessor or operator on `owner`
///
/// The signature is fixed before the handle is reserved: override resolution
/// runs first and fills unspecified parameter and return types from the
/// matched method. If body generation fails the reservation is rolled back.
pub(crate) fn define_method(
    asm: &mut AssemblyBuilder,
    owner: TypeId,
    name: &str,
    config: MethodConfig,
    body: Body<'_>,
    kind: MethodKind,
) -> BuildResult<MethodRef> {
    if name.is_empty() {
        return Err(BuildError::EmptyName("Method"));
    }
    let (handle, type_name) = {
        let desc = asm.building_mut(owner)?;
        (desc.handle, desc.full_name.clone())
    };
    if handle.kind.is_enum() {
        return Err(BuildError::InvalidMember {
            owner: type_name,
            reason: format!("enums cannot declare method '{}'", name),
        });
    }

    let mut attributes = method_attributes(handle.kind, config.visibility, config.modifier);
    if matches!(kind, MethodKind::Getter | MethodKind::Setter) {
        attributes |= MethodAttributes::SPECIAL_NAME;
    }
    let explicit = config.modifier == Modifier::ExplicitInterfaceImpl;
    let target = if attributes.contains(MethodAttributes::STATIC) || handle.kind.is_interface() {
        None
    } else {
        resolve_override(asm, owner, name, &config)?
    };
    if explicit && !matches!(&target, Some(t) if t.origin == OverrideOrigin::Interface) {
        return Err(BuildError::UnresolvableMember {
            owner: type_name,
            member: name.to_string(),
        });
    }
    if let Some(t) = &target {
        attributes = apply_override(attributes, t.origin, config.modifier);
    }

    let signature = resolve_signature(&config, target.as_ref());
    let stored_name = match &target {
        Some(t) if explicit => format!("{}.{}", asm.type_name(t.method.owner), name),
        _ => name.to_string(),
    };
    let param_types: Vec<TypeRef> = signature.params.iter().map(|p| p.ty.clone()).collect();

    let (overrides, base_slot) = match &target {
        Some(t) if t.origin == OverrideOrigin::Interface => (Some(t.method), None),
        Some(t) => (None, Some(t.method)),
        None => (None, None),
    };
    let descriptor = MethodDescriptor {
        name: stored_name,
        kind,
        attributes,
        params: signature.params,
        return_type: signature.return_type,
        generic_params: signature.generic_params,
        body: None,
        overrides,
        base_slot,
        custom_attributes: Vec::new(),
    };
    let method = reserve(asm, owner, descriptor, &param_types)?;

    if attributes.contains(MethodAttributes::ABSTRACT) {
        if body.is_generated() {
            warn!(r#type = %type_name, method = name, "discarding body of abstract method");
        }
        debug!(r#type = %type_name, method = name, "defined abstract method");
        return Ok(method);
    }

    match generate_body(asm, method, target.as_ref(), body) {
        Ok(sealed) => {
            install_body(asm, method, sealed)?;
            debug!(r#type = %type_name, method = name, %method, "defined method");
            Ok(method)
        }
        Err(e) => {
            rollback(asm, method);
            Err(e)
        }
    }
}

/// Define an instance constructor or type initializer on `owner`
pub(crate) fn define_constructor(
    asm: &mut AssemblyBuilder,
    owner: TypeId,
    config: ConstructorConfig,
    body: Body<'_>,
) -> BuildResult<MethodRef> {
    let (handle, type_name) = {
        let desc = asm.building_mut(owner)?;
        (desc.handle, desc.full_name.clone())
    };
    if handle.kind != TypeKind::Class {
        return Err(BuildError::InvalidMember {
            owner: type_name,
            reason: "only classes declare constructors".to_string(),
        });
    }
    if config.is_static && !config.params.is_empty() {
        return Err(BuildError::InvalidMember {
            owner: type_name,
            reason: "type initializers take no parameters".to_string(),
        });
    }

    let (name, kind) = if config.is_static {
        (".cctor", MethodKind::TypeInitializer)
    } else {
        (".ctor", MethodKind::Constructor)
    };
    let param_types: Vec<TypeRef> = config.params.iter().map(|p| p.ty.clone()).collect();
    let descriptor = MethodDescriptor {
        name: name.to_string(),
        kind,
        attributes: constructor_attributes(config.visibility, config.is_static),
        params: config.params,
        return_type: TypeRef::Void,
        generic_params: Vec::new(),
        body: None,
        overrides: None,
        base_slot: None,
        custom_attributes: Vec::new(),
    };
    let method = reserve(asm, owner, descriptor, &param_types)?;

    match generate_body(asm, method, None, body) {
        Ok(sealed) => {
            install_body(asm, method, sealed)?;
            debug!(r#type = %type_name, ctor = name, params = param_types.len(), "defined constructor");
            Ok(method)
        }
        Err(e) => {
            rollback(asm, method);
            Err(e)
        }
    }
}

fn reserve(
    asm: &mut AssemblyBuilder,
    owner: TypeId,
    descriptor: MethodDescriptor,
    param_types: &[TypeRef],
) -> BuildResult<MethodRef> {
    let desc = asm.building_mut(owner)?;
    let clash = desc.methods.iter().any(|m| {
        m.name == descriptor.name && m.kind.is_constructor() == descriptor.kind.is_constructor() && m.param_types() == param_types
    });
    if clash {
        return Err(BuildError::DuplicateMember {
            owner: desc.full_name.clone(),
            member: descriptor.name,
        });
    }

    let index = desc.methods.len() as u32;
    let constructor = descriptor.kind.is_constructor();
    let generics: Vec<String> = descriptor.generic_params.clone();
    desc.methods.push(descriptor);
    desc.members.push(if constructor {
        MemberDescriptor::Constructor(index)
    } else {
        MemberDescriptor::Method(index)
    });
    for (position, name) in generics.into_iter().enumerate() {
        desc.members.push(MemberDescriptor::GenericParameter {
            method: index,
            position: position as u32,
            name,
        });
    }
    Ok(desc.method_ref(index))
}

fn rollback(asm: &mut AssemblyBuilder, method: MethodRef) {
    if let Ok(desc) = asm.descriptor_mut(method.owner) {
        if desc.methods.len() == method.index as usize + 1 {
            desc.methods.pop();
            desc.members.retain(|m| match m {
                MemberDescriptor::Method(i) | MemberDescriptor::Constructor(i) => *i != method.index,
                MemberDescriptor::GenericParameter { method: i, .. } => *i != method.index,
                _ => true,
            });
        }
    }
}

fn install_body(asm: &mut AssemblyBuilder, method: MethodRef, body: MethodBody) -> BuildResult<()> {
    let desc = asm.descriptor_mut(method.owner)?;
    let slot = desc
        .methods
        .get_mut(method.index as usize)
        .ok_or_else(|| BuildError::UnresolvableMember {
            owner: desc.full_name.clone(),
            member: method.to_string(),
        })?;
    slot.body = Some(Arc::new(body));
    Ok(())
}

/// Run body generation for a reserved method and seal the result
fn generate_body(
    asm: &AssemblyBuilder,
    method: MethodRef,
    target: Option<&OverrideTarget>,
    body: Body<'_>,
) -> BuildResult<MethodBody> {
    let desc = asm.descriptor(method.owner).ok_or(BuildError::UnknownType(method.owner))?;
    let m = desc
        .methods
        .get(method.index as usize)
        .ok_or_else(|| BuildError::UnresolvableMember {
            owner: desc.full_name.clone(),
            member: method.to_string(),
        })?;

    let mut il = InstructionEmitter::new(format!("{}::{}", desc.full_name, m.name))
        .returning(m.return_type != TypeRef::Void);
    let ctx = BuildContext::new(asm)
        .with_type(method.owner)
        .with_member(MemberRef::Method(method))
        .with_override(target);

    match body {
        Body::Generate(generate) => generate(&mut il, &ctx)?,
        Body::Minimal => emit_minimal(&mut il, &ctx, m)?,
    }
    Ok(il.seal_with(|op, callee| asm.call_shape(op, callee))?)
}

fn emit_minimal(il: &mut InstructionEmitter, ctx: &BuildContext<'_>, m: &MethodDescriptor) -> BuildResult<()> {
    if m.kind == MethodKind::Constructor {
        if let Some(base_ctor) = ctx.base_constructor() {
            il.ldarg_0().call(base_ctor);
        }
    } else if m.return_type != TypeRef::Void {
        il.load_default(&m.return_type)?;
    }
    il.ret();
    Ok(())
}

fn override_target(asm: &AssemblyBuilder, m: &MethodDescriptor) -> BuildResult<Option<OverrideTarget>> {
    let link = match (m.overrides, m.base_slot) {
        (Some(method), _) => Some((method, OverrideOrigin::Interface)),
        (None, Some(method)) => Some((method, OverrideOrigin::BaseType)),
        (None, None) => None,
    };
    link.map(|(method, origin)| {
        Ok(OverrideTarget {
            method,
            origin,
            signature: asm.method_sig(method)?,
        })
    })
    .transpose()
}

/// Reopened method of a type that is still being built
pub struct MethodBuilder<'a> {
    asm: &'a mut AssemblyBuilder,
    method: MethodRef,
}

impl<'a> MethodBuilder<'a> {
    pub(crate) fn new(asm: &'a mut AssemblyBuilder, method: MethodRef) -> BuildResult<Self> {
        asm.method_sig(method)?;
        Ok(Self { asm, method })
    }

    /// Method handle
    pub fn handle(&self) -> MethodRef {
        self.method
    }

    /// Current signature
    pub fn signature(&self) -> BuildResult<MethodSig> {
        self.asm.method_sig(self.method)
    }

    /// Current sealed body, if any
    pub fn body(&self) -> Option<Arc<MethodBody>> {
        self.asm
            .descriptor(self.method.owner)
            .and_then(|d| d.methods.get(self.method.index as usize))
            .and_then(|m| m.body.clone())
    }

    /// Regenerate the body; the signature is unchanged
    pub fn replace_body(&mut self, body: Body<'_>) -> BuildResult<&mut Self> {
        let m = {
            let desc = self.asm.building_mut(self.method.owner)?;
            desc.methods
                .get(self.method.index as usize)
                .cloned()
                .ok_or_else(|| BuildError::UnresolvableMember {
                    owner: desc.full_name.clone(),
                    member: self.method.to_string(),
                })?
        };
        if m.is_abstract() {
            return Err(BuildError::InvalidMember {
                owner: self.asm.type_name(self.method.owner),
                reason: format!("abstract method '{}' has no body", m.name),
            });
        }
        let target = override_target(self.asm, &m)?;
        let sealed = generate_body(self.asm, self.method, target.as_ref(), body)?;
        install_body(self.asm, self.method, sealed)?;
        debug!(method = %m.name, handle = %self.method, "replaced body");
        Ok(self)
    }

    /// Attach a compiled custom attribute
    pub fn set_custom_attribute(&mut self, payload: AttributePayload) -> BuildResult<&mut Self> {
        let method = self.method;
        let desc = self.asm.building_mut(method.owner)?;
        let full_name = desc.full_name.clone();
        let m = desc
            .methods
            .get_mut(method.index as usize)
            .ok_or(BuildError::UnresolvableMember {
                owner: full_name,
                member: method.to_string(),
            })?;
        m.custom_attributes.push(payload);
        Ok(self)
    }

    /// Compile an attribute expression and attach it
    pub fn apply_attribute(&mut self, expr: &AttributeExpr) -> BuildResult<&mut Self> {
        let payload = AttributeValueCompiler::with_session(self.asm.session()).compile(expr)?;
        self.set_custom_attribute(payload)
    }
}

impl std::fmt::Debug for MethodBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBuilder").field("method", &self.method).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeConfig;
    use crate::emit::Opcode;
    use crate::session::BuildSession;

    #[test]
    fn test_minimal_bodies() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Minimal");
        let mut tb = asm.define_type("Widget", TypeConfig::public()).unwrap();
        let ctor = tb.define_default_constructor().unwrap();
        let count = tb
            .define_method("Count", MethodConfig::public().no_params().returns(TypeRef::I32), Body::Minimal)
            .unwrap();
        let reset = tb
            .define_method("Reset", MethodConfig::public().no_params(), Body::Minimal)
            .unwrap();

        let desc = tb.descriptor().unwrap();
        let body = |m: MethodRef| desc.methods[m.index as usize].body.clone().unwrap().opcodes();
        // No user-defined base, so the constructor only returns
        assert_eq!(body(ctor), vec![Opcode::Ret]);
        assert_eq!(body(count), vec![Opcode::LdcI4_0, Opcode::Ret]);
        assert_eq!(body(reset), vec![Opcode::Ret]);
    }

    #[test]
    fn test_constructor_chains_to_base() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Chain");
        let base = {
            let mut tb = asm.define_type("Base", TypeConfig::public()).unwrap();
            tb.define_default_constructor().unwrap();
            tb.type_ref()
        };
        let mut tb = asm.define_type("Derived", TypeConfig::public().extends(base)).unwrap();
        let ctor = tb.define_default_constructor().unwrap();
        let desc = tb.descriptor().unwrap();
        let ops = desc.methods[ctor.index as usize].body.as_ref().unwrap().opcodes();
        assert_eq!(ops, vec![Opcode::Ldarg0, Opcode::Call, Opcode::Ret]);
    }

    #[test]
    fn test_failed_body_is_rolled_back() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Rollback");
        let mut tb = asm.define_type("Broken", TypeConfig::public()).unwrap();
        let result = tb.define_method(
            "Bad",
            MethodConfig::public().no_params().returns(TypeRef::I32),
            Body::with(|il, _| {
                il.ldc_i4(1);
                Ok(())
            }),
        );
        assert!(matches!(result, Err(BuildError::Emit(_))));
        assert!(tb.descriptor().unwrap().methods.is_empty());
        assert!(tb.descriptor().unwrap().members.is_empty());
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Dup");
        let mut tb = asm.define_type("Calc", TypeConfig::public()).unwrap();
        let sig = MethodConfig::public().param("x", TypeRef::I32).returns(TypeRef::I32);
        let body = || {
            Body::with(|il, _| {
                il.ldarg_1().ret();
                Ok(())
            })
        };
        tb.define_method("Id", sig.clone(), body()).unwrap();
        assert!(matches!(
            tb.define_method("Id", sig, body()),
            Err(BuildError::DuplicateMember { .. })
        ));
        // Overloading on parameter types is fine
        tb.define_method(
            "Id",
            MethodConfig::public().param("x", TypeRef::I64).returns(TypeRef::I64),
            body(),
        )
        .unwrap();
    }

    #[test]
    fn test_not_overridable_base_method() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Final");
        let base = {
            let mut tb = asm.define_type("Base", TypeConfig::public()).unwrap();
            tb.define_method("Run", MethodConfig::public().no_params(), Body::Minimal)
                .unwrap();
            tb.type_ref()
        };
        let mut tb = asm.define_type("Derived", TypeConfig::public().extends(base)).unwrap();
        assert_eq!(
            tb.define_method("Run", MethodConfig::public().no_params(), Body::Minimal),
            Err(BuildError::NotOverridable {
                base: "Base".to_string(),
                method: "Run".to_string(),
            })
        );
    }

    #[test]
    fn test_override_clears_new_slot() {
        let session = BuildSession::new();
        let mut asm = session.define_assembly("Virtuals");
        let (base, speak) = {
            let mut tb = asm.define_type("Animal", TypeConfig::public()).unwrap();
            let m = tb
                .define_method("Speak", MethodConfig::public().as_virtual().returns(TypeRef::String).no_params(), Body::Minimal)
                .unwrap();
            (tb.type_ref(), m)
        };
        let mut tb = asm.define_type("Dog", TypeConfig::public().extends(base)).unwrap();
        let m = tb
            .define_method(
                "Speak",
                MethodConfig::public(),
                Body::with(|il, ctx| {
                    assert!(ctx.overridden().is_some());
                    il.ldstr("Woof").ret();
                    Ok(())
                }),
            )
            .unwrap();
        let desc = tb.descriptor().unwrap();
        let dm = &desc.methods[m.index as usize];
        assert!(dm.attributes.contains(MethodAttributes::VIRTUAL));
        assert!(!dm.attributes.contains(MethodAttributes::NEW_SLOT));
        assert_eq!(dm.base_slot, Some(speak));
        assert_eq!(dm.return_type, TypeRef::String);
        assert!(dm.params.is_empty());
    }
}
