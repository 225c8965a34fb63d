//! Member lookup across types still being built and types already realized

use rustc_hash::FxHashSet;

use super::assembly::AssemblyBuilder;
use super::descriptor::{MethodDescriptor, MethodKind, TypeDescriptor};
use super::flags::{FieldAttributes, MethodAttributes};
use super::{BuildError, BuildResult};
use crate::emit::{CallShape, Opcode};
use crate::runtime::{RuntimeMethod, RuntimeType};
use crate::types::{FieldRef, MethodRef, TypeHandle, TypeId, TypeRef};

/// Signature view of a method, independent of where it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    /// Handle
    pub handle: MethodRef,
    /// Name
    pub name: String,
    /// Kind
    pub kind: MethodKind,
    /// Flags
    pub attributes: MethodAttributes,
    /// Parameter types
    pub params: Vec<TypeRef>,
    /// Parameter names
    pub param_names: Vec<String>,
    /// Return type
    pub return_type: TypeRef,
    /// Generic parameter names
    pub generic_params: Vec<String>,
}

impl MethodSig {
    pub(crate) fn from_descriptor(owner: TypeId, index: usize, m: &MethodDescriptor) -> Self {
        Self {
            handle: MethodRef {
                owner,
                index: index as u32,
            },
            name: m.name.clone(),
            kind: m.kind,
            attributes: m.attributes,
            params: m.param_types(),
            param_names: m.params.iter().map(|p| p.name.clone()).collect(),
            return_type: m.return_type.clone(),
            generic_params: m.generic_params.clone(),
        }
    }

    pub(crate) fn from_runtime(m: &RuntimeMethod) -> Self {
        Self {
            handle: m.handle,
            name: m.name.clone(),
            kind: m.kind,
            attributes: m.attributes,
            params: m.params.iter().map(|p| p.ty.clone()).collect(),
            param_names: m.params.iter().map(|p| p.name.clone()).collect(),
            return_type: m.return_type.clone(),
            generic_params: m.generic_params.clone(),
        }
    }

    /// Check for the `STATIC` flag
    pub fn is_static(&self) -> bool {
        self.attributes.contains(MethodAttributes::STATIC)
    }

    /// Check for the `VIRTUAL` flag
    pub fn is_virtual(&self) -> bool {
        self.attributes.contains(MethodAttributes::VIRTUAL)
    }

    /// Check for the `FINAL` flag
    pub fn is_final(&self) -> bool {
        self.attributes.contains(MethodAttributes::FINAL)
    }

    /// Check if name and (optionally) parameter and return types match
    ///
    /// `None` acts as a wildcard. Constructors never match.
    pub fn matches(&self, name: &str, params: Option<&[TypeRef]>, return_type: Option<&TypeRef>) -> bool {
        self.name == name
            && !self.kind.is_constructor()
            && params.map_or(true, |p| p == self.params.as_slice())
            && return_type.map_or(true, |r| *r == self.return_type)
    }

    /// Stack shape of a call to this method with the given opcode
    pub fn call_shape(&self, opcode: Opcode) -> CallShape {
        let receiver = usize::from(!self.is_static());
        let returns = usize::from(self.return_type != TypeRef::Void);
        match opcode {
            Opcode::Newobj => CallShape {
                pops: self.params.len(),
                pushes: 1,
            },
            _ => CallShape {
                pops: self.params.len() + receiver,
                pushes: returns,
            },
        }
    }
}

/// Field view, independent of where it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSig {
    /// Handle
    pub handle: FieldRef,
    /// Name
    pub name: String,
    /// Type
    pub ty: TypeRef,
    /// Flags
    pub attributes: FieldAttributes,
}

impl FieldSig {
    /// Check for the `STATIC` flag
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

/// Owned summary of a type used by lookups
#[derive(Debug, Clone)]
pub(crate) struct TypeSummary {
    pub handle: TypeHandle,
    pub name: String,
    pub base: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    pub methods: Vec<MethodSig>,
    pub fields: Vec<FieldSig>,
}

impl TypeSummary {
    fn from_descriptor(t: &TypeDescriptor) -> Self {
        let id = t.handle.id;
        Self {
            handle: t.handle,
            name: t.full_name.clone(),
            base: t.base.as_ref().and_then(TypeRef::defined_id),
            interfaces: t.interfaces.iter().filter_map(TypeRef::defined_id).collect(),
            methods: t
                .methods
                .iter()
                .enumerate()
                .map(|(i, m)| MethodSig::from_descriptor(id, i, m))
                .collect(),
            fields: t
                .fields
                .iter()
                .enumerate()
                .map(|(i, f)| FieldSig {
                    handle: FieldRef {
                        owner: id,
                        index: i as u32,
                    },
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    attributes: f.attributes,
                })
                .collect(),
        }
    }

    fn from_runtime(t: &RuntimeType) -> Self {
        Self {
            handle: t.handle,
            name: t.full_name.clone(),
            base: t.base,
            interfaces: t.interfaces.clone(),
            methods: t.methods.iter().map(|m| MethodSig::from_runtime(m)).collect(),
            fields: t
                .fields
                .iter()
                .map(|f| FieldSig {
                    handle: f.handle,
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    attributes: f.attributes,
                })
                .collect(),
        }
    }
}

impl AssemblyBuilder {
    /// Summarize a type from this unit or from the session
    pub(crate) fn summary(&self, id: TypeId) -> BuildResult<TypeSummary> {
        if let Some(t) = self.descriptor(id) {
            return Ok(TypeSummary::from_descriptor(t));
        }
        self.session()
            .realized(id)
            .map(|t| TypeSummary::from_runtime(&t))
            .ok_or(BuildError::UnknownType(id))
    }

    /// Full name of a type, for diagnostics
    pub(crate) fn type_name(&self, id: TypeId) -> String {
        self.summary(id)
            .map(|s| s.name)
            .unwrap_or_else(|_| id.to_string())
    }

    /// Base types of `id`, nearest first
    pub(crate) fn base_chain(&self, id: TypeId) -> BuildResult<Vec<TypeId>> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        seen.insert(id);
        let mut current = self.summary(id)?.base;
        while let Some(base) = current {
            if !seen.insert(base) {
                return Err(BuildError::CircularInheritance(self.type_name(id)));
            }
            chain.push(base);
            current = self.summary(base)?.base;
        }
        Ok(chain)
    }

    /// Transitive closure of interfaces reachable from `roots`, in discovery order
    pub(crate) fn interface_closure(&self, roots: &[TypeId]) -> BuildResult<Vec<TypeId>> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack: Vec<TypeId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            let summary = self.summary(id)?;
            stack.extend(summary.interfaces.iter().rev().copied());
        }
        Ok(out)
    }

    /// Interfaces of a type including those inherited from its bases
    pub(crate) fn all_interfaces(&self, id: TypeId) -> BuildResult<Vec<TypeId>> {
        let mut roots = self.summary(id)?.interfaces;
        for base in self.base_chain(id)? {
            roots.extend(self.summary(base)?.interfaces);
        }
        self.interface_closure(&roots)
    }

    /// Find a method on a type or its bases (constructors excluded)
    pub(crate) fn find_method(
        &self,
        id: TypeId,
        name: &str,
        params: Option<&[TypeRef]>,
    ) -> BuildResult<MethodSig> {
        let mut search = vec![id];
        search.extend(self.base_chain(id)?);
        for ty in search {
            let summary = self.summary(ty)?;
            if let Some(m) = summary.methods.into_iter().find(|m| m.matches(name, params, None)) {
                return Ok(m);
            }
        }
        // Interfaces declare members that classes reach only through the closure
        if self.summary(id)?.handle.kind.is_interface() {
            for iface in self.interface_closure(&[id])? {
                let summary = self.summary(iface)?;
                if let Some(m) = summary.methods.into_iter().find(|m| m.matches(name, params, None)) {
                    return Ok(m);
                }
            }
        }
        Err(BuildError::UnresolvableMember {
            owner: self.type_name(id),
            member: name.to_string(),
        })
    }

    /// Find a field on a type or its bases
    pub(crate) fn find_field(&self, id: TypeId, name: &str) -> BuildResult<FieldSig> {
        let mut search = vec![id];
        search.extend(self.base_chain(id)?);
        for ty in search {
            if let Some(f) = self.summary(ty)?.fields.into_iter().find(|f| f.name == name) {
                return Ok(f);
            }
        }
        Err(BuildError::UnresolvableMember {
            owner: self.type_name(id),
            member: name.to_string(),
        })
    }

    /// Find an instance constructor declared by the type itself
    pub(crate) fn find_constructor(&self, id: TypeId, params: &[TypeRef]) -> BuildResult<MethodSig> {
        self.summary(id)?
            .methods
            .into_iter()
            .find(|m| m.kind == MethodKind::Constructor && m.params == params)
            .ok_or_else(|| BuildError::UnresolvableMember {
                owner: self.type_name(id),
                member: format!(".ctor/{}", params.len()),
            })
    }

    /// Signature of a method handle
    pub(crate) fn method_sig(&self, method: MethodRef) -> BuildResult<MethodSig> {
        self.summary(method.owner)?
            .methods
            .into_iter()
            .nth(method.index as usize)
            .ok_or_else(|| BuildError::UnresolvableMember {
                owner: self.type_name(method.owner),
                member: method.to_string(),
            })
    }

    /// Stack shape of a call site, if the callee is known
    pub(crate) fn call_shape(&self, opcode: Opcode, method: MethodRef) -> Option<CallShape> {
        let owner = self.descriptor(method.owner);
        match owner {
            Some(t) => t
                .methods
                .get(method.index as usize)
                .map(|m| MethodSig::from_descriptor(t.handle.id, method.index as usize, m).call_shape(opcode)),
            None => self
                .session()
                .realized(method.owner)
                .and_then(|t| t.methods.get(method.index as usize).cloned())
                .map(|m| MethodSig::from_runtime(&m).call_shape(opcode)),
        }
    }
}
