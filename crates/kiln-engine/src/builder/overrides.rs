//! Override and interface-implementation resolution

use tracing::debug;

use super::assembly::AssemblyBuilder;
use super::config::{MethodConfig, ParamSpec};
use super::flags::OverrideOrigin;
use super::lookup::MethodSig;
use super::{BuildError, BuildResult};
use crate::types::{MethodRef, TypeId, TypeRef};

/// The base or interface method a new method overrides or implements
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideTarget {
    /// The matched method
    pub method: MethodRef,
    /// Where it was found
    pub origin: OverrideOrigin,
    /// Its signature
    pub signature: MethodSig,
}

/// Find the method that a new method named `name` on `owner` overrides
///
/// The base chain is searched first, nearest base first, matching name and
/// any parameter and return types the config specifies. A match there must
/// be virtual and not final. Otherwise the transitive closure of the owner's
/// interfaces is searched by name and arity. Explicit interface
/// implementations only consider interfaces.
pub(crate) fn resolve_override(
    asm: &AssemblyBuilder,
    owner: TypeId,
    name: &str,
    config: &MethodConfig,
) -> BuildResult<Option<OverrideTarget>> {
    let param_types: Option<Vec<TypeRef>> = config
        .params
        .as_ref()
        .map(|ps| ps.iter().map(|p| p.ty.clone()).collect());
    let params = param_types.as_deref();
    let explicit = config.modifier == super::flags::Modifier::ExplicitInterfaceImpl;

    if !explicit {
        for base in asm.base_chain(owner)? {
            let summary = asm.summary(base)?;
            let found = summary
                .methods
                .into_iter()
                .find(|m| !m.is_static() && m.matches(name, params, config.return_type.as_ref()));
            if let Some(m) = found {
                if !m.is_virtual() || m.is_final() {
                    return Err(BuildError::NotOverridable {
                        base: summary.name,
                        method: name.to_string(),
                    });
                }
                debug!(method = name, base = %summary.name, "overrides base method");
                return Ok(Some(OverrideTarget {
                    method: m.handle,
                    origin: OverrideOrigin::BaseType,
                    signature: m,
                }));
            }
        }
    }

    let declared = asm.summary(owner)?.interfaces;
    for iface in asm.interface_closure(&declared)? {
        let summary = asm.summary(iface)?;
        let found = summary.methods.into_iter().find(|m| {
            m.name == name
                && !m.kind.is_constructor()
                && params.map_or(true, |p| p.len() == m.params.len())
        });
        if let Some(m) = found {
            debug!(method = name, interface = %summary.name, "implements interface method");
            return Ok(Some(OverrideTarget {
                method: m.handle,
                origin: OverrideOrigin::Interface,
                signature: m,
            }));
        }
    }

    Ok(None)
}

/// Final signature of a new method
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedSignature {
    pub params: Vec<ParamSpec>,
    pub return_type: TypeRef,
    pub generic_params: Vec<String>,
}

/// Fill unspecified signature parts from the override target
///
/// Generic parameters are captured from the target when the config declares
/// none. When the config renames them, the target's types are rewritten to
/// the new names by position, which also covers a return type that is itself
/// a generic parameter.
pub(crate) fn resolve_signature(
    config: &MethodConfig,
    target: Option<&OverrideTarget>,
) -> ResolvedSignature {
    let Some(target) = target else {
        return ResolvedSignature {
            params: config.params.clone().unwrap_or_default(),
            return_type: config.return_type.clone().unwrap_or(TypeRef::Void),
            generic_params: config.generic_params.clone(),
        };
    };
    let sig = &target.signature;

    let (generic_params, rename): (Vec<String>, Option<Vec<TypeRef>>) =
        if config.generic_params.is_empty() {
            (sig.generic_params.clone(), None)
        } else if config.generic_params.len() == sig.generic_params.len() {
            let renamed = config
                .generic_params
                .iter()
                .map(|g| TypeRef::generic(g))
                .collect();
            (config.generic_params.clone(), Some(renamed))
        } else {
            (config.generic_params.clone(), None)
        };
    let adopt = |ty: &TypeRef| match &rename {
        Some(args) => ty.substitute(&sig.generic_params, args),
        None => ty.clone(),
    };

    let params = match &config.params {
        Some(params) => params.clone(),
        None => sig
            .params
            .iter()
            .zip(&sig.param_names)
            .map(|(ty, name)| ParamSpec::new(name.clone(), adopt(ty)))
            .collect(),
    };
    let return_type = match &config.return_type {
        Some(ty) => ty.clone(),
        None => adopt(&sig.return_type),
    };

    ResolvedSignature {
        params,
        return_type,
        generic_params,
    }
}
