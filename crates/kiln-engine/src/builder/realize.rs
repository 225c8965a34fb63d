//! Turning type descriptors into realized runtime types

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::assembly::AssemblyBuilder;
use super::descriptor::{MethodDescriptor, MethodKind, TypeState};
use super::flags::{FieldAttributes, MethodAttributes, TypeAttributes};
use super::{BuildError, BuildResult};
use crate::runtime::{FieldSlot, RuntimeField, RuntimeMethod, RuntimeProperty, RuntimeType, VTable, Value};
use crate::types::{FieldRef, MethodRef, TypeHandle, TypeId, TypeKind, TypeRef};

/// Realize `id` and everything it depends on, appending to `out` in order
///
/// `in_progress` holds the types whose realization has started but not
/// finished; meeting one of them again through a base or interface edge is
/// circular inheritance.
pub(crate) fn realize_type(
    asm: &mut AssemblyBuilder,
    id: TypeId,
    in_progress: &mut FxHashSet<TypeId>,
    out: &mut Vec<TypeHandle>,
) -> BuildResult<()> {
    let (dependencies, nested, full_name) = match asm.descriptor(id) {
        Some(d) if d.is_realized() => return Ok(()),
        Some(d) => {
            let mut deps: Vec<TypeId> = d.base.iter().filter_map(TypeRef::defined_id).collect();
            deps.extend(d.interfaces.iter().filter_map(TypeRef::defined_id));
            (deps, d.nested.clone(), d.full_name.clone())
        }
        // Defined by an earlier unit, already realized in the session
        None => return Ok(()),
    };
    if !in_progress.insert(id) {
        return Err(BuildError::CircularInheritance(full_name));
    }

    for dep in dependencies {
        realize_type(asm, dep, in_progress, out)?;
    }
    let mut deferred = Vec::new();
    for inner in nested {
        if depends_on(asm, inner, id)? {
            deferred.push(inner);
        } else {
            realize_type(asm, inner, in_progress, out)?;
        }
    }

    let runtime = build_runtime_type(asm, id)?;
    let handle = runtime.handle;
    let installed = asm.session().install(runtime)?;
    asm.descriptor_mut(id)?.state = TypeState::Realized;
    out.push(handle);
    in_progress.remove(&id);
    debug!(
        r#type = %full_name,
        id = %id,
        methods = installed.methods.len(),
        vtable = installed.vtable.method_count(),
        "realized type"
    );

    for inner in deferred {
        realize_type(asm, inner, in_progress, out)?;
    }
    Ok(())
}

fn depends_on(asm: &AssemblyBuilder, ty: TypeId, on: TypeId) -> BuildResult<bool> {
    Ok(asm.base_chain(ty)?.contains(&on) || asm.all_interfaces(ty)?.contains(&on))
}

fn invalid(owner: &str, reason: String) -> BuildError {
    BuildError::InvalidMember {
        owner: owner.to_string(),
        reason,
    }
}

fn build_runtime_type(asm: &AssemblyBuilder, id: TypeId) -> BuildResult<RuntimeType> {
    let desc = asm.descriptor(id).ok_or(BuildError::UnknownType(id))?;
    let session = asm.session();
    let owner = desc.full_name.as_str();
    let is_class = desc.handle.kind == TypeKind::Class;
    let is_abstract = desc.attributes.contains(TypeAttributes::ABSTRACT);

    let base = match desc.base.as_ref().and_then(TypeRef::defined_id) {
        Some(b) => Some(session.realized(b).ok_or(BuildError::UnknownType(b))?),
        None => None,
    };
    if let Some(b) = &base {
        if b.attributes.contains(TypeAttributes::SEALED) {
            return Err(invalid(owner, format!("cannot derive from sealed type '{}'", b.full_name)));
        }
    }

    // Field layout: inherited instance slots come first
    let mut instance_defaults = base.as_ref().map(|b| b.instance_defaults.clone()).unwrap_or_default();
    let mut static_defaults = Vec::new();
    let mut fields = Vec::with_capacity(desc.fields.len());
    for (i, f) in desc.fields.iter().enumerate() {
        let initial = match &f.constant {
            Some(c) => Value::from(c).coerce_to(&f.ty),
            None => Value::default_for(&f.ty),
        };
        let slot = if f.attributes.contains(FieldAttributes::LITERAL) {
            FieldSlot::Literal
        } else if f.is_static() {
            static_defaults.push(initial);
            FieldSlot::Static(static_defaults.len() - 1)
        } else {
            instance_defaults.push(initial);
            FieldSlot::Instance(instance_defaults.len() - 1)
        };
        fields.push(RuntimeField {
            handle: FieldRef {
                owner: id,
                index: i as u32,
            },
            name: f.name.clone(),
            ty: f.ty.clone(),
            attributes: f.attributes,
            slot,
            constant: f.constant.clone(),
        });
    }

    // Virtual slots: copy the base table, reuse slots of overridden methods
    let mut vtable = base.as_ref().map(|b| b.vtable.clone()).unwrap_or_default();
    let mut methods = Vec::with_capacity(desc.methods.len());
    let mut type_initializer = None;
    for (i, m) in desc.methods.iter().enumerate() {
        let handle = desc.method_ref(i as u32);
        if !m.is_abstract() && m.body.is_none() {
            return Err(invalid(owner, format!("method '{}' has no body", m.name)));
        }
        if m.is_abstract() && is_class && !is_abstract {
            return Err(invalid(owner, format!("abstract method '{}' in a non-abstract type", m.name)));
        }
        if m.kind == MethodKind::TypeInitializer {
            type_initializer = Some(handle);
        }
        let vtable_slot = if is_class && m.attributes.contains(MethodAttributes::VIRTUAL) && !m.is_static() {
            Some(assign_slot(asm, &mut vtable, handle, m, owner)?)
        } else {
            None
        };
        methods.push(Arc::new(RuntimeMethod {
            handle,
            name: m.name.clone(),
            kind: m.kind,
            attributes: m.attributes,
            params: m.params.clone(),
            return_type: m.return_type.clone(),
            generic_params: m.generic_params.clone(),
            body: m.body.clone(),
            vtable_slot,
            overrides: m.overrides,
            custom_attributes: m.custom_attributes.clone(),
        }));
    }

    let declared: Vec<TypeId> = desc.interfaces.iter().filter_map(TypeRef::defined_id).collect();
    let all_interfaces = if is_class {
        asm.all_interfaces(id)?
    } else {
        asm.interface_closure(&declared)?
    };

    let mut interface_map = base.as_ref().map(|b| b.interface_map.clone()).unwrap_or_default();
    if is_class {
        map_interfaces(asm, id, &methods, &all_interfaces, &mut interface_map)?;
    }

    if is_class && !is_abstract && session.options().verify_implementations {
        for (slot, target) in vtable.methods.iter().enumerate() {
            let abstract_name = if target.owner == id {
                methods
                    .get(target.index as usize)
                    .filter(|m| m.is_abstract())
                    .map(|m| m.name.clone())
            } else {
                session
                    .realized(target.owner)
                    .and_then(|t| t.method(target.index).cloned())
                    .filter(|m| m.is_abstract())
                    .map(|m| m.name.clone())
            };
            if let Some(name) = abstract_name {
                return Err(invalid(
                    owner,
                    format!("inherited abstract method '{}' (slot {}) is not implemented", name, slot),
                ));
            }
        }
    }

    let properties = desc
        .properties
        .iter()
        .map(|p| RuntimeProperty {
            name: p.name.clone(),
            ty: p.ty.clone(),
            getter: p.getter.map(|i| desc.method_ref(i)),
            setter: p.setter.map(|i| desc.method_ref(i)),
            backing_field: p.backing_field.map(|index| FieldRef { owner: id, index }),
        })
        .collect();

    Ok(RuntimeType {
        handle: desc.handle,
        name: desc.name.clone(),
        full_name: desc.full_name.clone(),
        attributes: desc.attributes,
        base: base.as_ref().map(|b| b.id()),
        interfaces: declared,
        all_interfaces,
        enclosing: desc.enclosing,
        nested: desc.nested.clone(),
        fields,
        methods,
        properties,
        instance_defaults,
        static_defaults,
        vtable,
        interface_map,
        type_initializer,
        custom_attributes: desc.custom_attributes.clone(),
    })
}

fn assign_slot(
    asm: &AssemblyBuilder,
    vtable: &mut VTable,
    handle: MethodRef,
    m: &MethodDescriptor,
    owner: &str,
) -> BuildResult<usize> {
    let inherited = match m.base_slot {
        Some(base_method) if !m.attributes.contains(MethodAttributes::NEW_SLOT) => asm
            .session()
            .realized(base_method.owner)
            .and_then(|t| t.method(base_method.index).and_then(|bm| bm.vtable_slot)),
        _ => None,
    };
    match inherited {
        Some(slot) => {
            vtable
                .override_method(slot, handle)
                .map_err(|reason| invalid(owner, reason))?;
            Ok(slot)
        }
        None => Ok(vtable.add_method(handle)),
    }
}

/// Map every interface method reachable from the type to its implementation
///
/// Explicit implementations win, then public methods of the type itself
/// matched by name and signature, then whatever the base type already
/// mapped, then matching methods found on the base chain.
fn map_interfaces(
    asm: &AssemblyBuilder,
    id: TypeId,
    methods: &[Arc<RuntimeMethod>],
    interfaces: &[TypeId],
    map: &mut FxHashMap<MethodRef, MethodRef>,
) -> BuildResult<()> {
    let session = asm.session();
    let desc = asm.descriptor(id).ok_or(BuildError::UnknownType(id))?;
    let verify = session.options().verify_implementations && !desc.attributes.contains(TypeAttributes::ABSTRACT);
    let bases = asm.base_chain(id)?;

    for iface in interfaces {
        let iface_rt = session.realized(*iface).ok_or(BuildError::UnknownType(*iface))?;
        for im in &iface_rt.methods {
            if im.kind.is_constructor() || im.is_static() {
                continue;
            }
            let explicit = methods.iter().find(|m| m.overrides == Some(im.handle));
            let own = || {
                methods.iter().find(|m| {
                    m.attributes.contains(MethodAttributes::PUBLIC) && implements_signature(m, im)
                })
            };
            let mut found = explicit.or_else(own).map(|m| m.handle);
            if found.is_none() {
                found = map.get(&im.handle).copied();
            }
            if found.is_none() {
                found = bases.iter().find_map(|b| {
                    session.realized(*b).and_then(|t| {
                        t.methods
                            .iter()
                            .find(|m| m.attributes.contains(MethodAttributes::PUBLIC) && implements_signature(m, im))
                            .map(|m| m.handle)
                    })
                });
            }
            match found {
                Some(implementation) => {
                    map.insert(im.handle, implementation);
                }
                None if verify => {
                    return Err(invalid(
                        &desc.full_name,
                        format!("interface method '{}.{}' is not implemented", iface_rt.full_name, im.name),
                    ));
                }
                None => {}
            }
        }
    }
    Ok(())
}

/// Same name, generic arity and parameter types (generic names compared by position)
fn implements_signature(candidate: &RuntimeMethod, contract: &RuntimeMethod) -> bool {
    if candidate.name != contract.name
        || candidate.is_static()
        || candidate.kind.is_constructor()
        || candidate.generic_params.len() != contract.generic_params.len()
        || candidate.params.len() != contract.params.len()
    {
        return false;
    }
    let renamed: Vec<TypeRef> = contract.generic_params.iter().map(|g| TypeRef::generic(g)).collect();
    let rename = |ty: &TypeRef| ty.substitute(&candidate.generic_params, &renamed);
    candidate
        .params
        .iter()
        .zip(&contract.params)
        .all(|(a, b)| rename(&a.ty) == b.ty)
        && rename(&candidate.return_type) == contract.return_type
}
