//! Top-level container for one unit of dynamically built types

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use super::config::TypeConfig;
use super::descriptor::{TypeDescriptor, TypeState};
use super::flags::{type_attributes, Modifier, Visibility};
use super::realize;
use super::type_builder::TypeBuilder;
use super::{BuildError, BuildResult};
use crate::session::BuildSession;
use crate::types::{Primitive, TypeHandle, TypeId, TypeKind, TypeRef};

/// Result of finalizing a unit
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedUnit {
    /// Unit name
    pub name: String,
    /// Module name
    pub module_name: String,
    /// Every realized type, in realization order
    pub types: Vec<TypeHandle>,
    /// Top-level types, in definition order
    pub top_level: Vec<TypeHandle>,
}

impl RealizedUnit {
    /// Check if the unit contains a type
    pub fn contains(&self, id: TypeId) -> bool {
        self.types.iter().any(|h| h.id == id)
    }

    /// Number of realized types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the unit realized nothing
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builder for one unit of types
///
/// Types are defined through [`define_type`](Self::define_type),
/// [`define_interface`](Self::define_interface) and
/// [`define_enum`](Self::define_enum), populated through the returned
/// [`TypeBuilder`], and realized into the session by
/// [`finalize`](Self::finalize).
pub struct AssemblyBuilder {
    session: BuildSession,
    name: String,
    module_name: String,
    output_target: Option<PathBuf>,
    types: FxHashMap<TypeId, TypeDescriptor>,
    top_level: Vec<TypeId>,
    names: FxHashMap<String, TypeId>,
    finalized: Option<Arc<RealizedUnit>>,
}

impl AssemblyBuilder {
    pub(crate) fn new(session: BuildSession, name: &str) -> Self {
        Self {
            session,
            name: name.to_string(),
            module_name: name.to_string(),
            output_target: None,
            types: FxHashMap::default(),
            top_level: Vec::new(),
            names: FxHashMap::default(),
            finalized: None,
        }
    }

    /// Unit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module name (defaults to the unit name)
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Set the module name
    pub fn set_module_name(&mut self, module_name: &str) {
        self.module_name = module_name.to_string();
    }

    /// Record where the unit would be persisted; nothing is ever written
    pub fn set_output_target(&mut self, path: impl Into<PathBuf>) {
        self.output_target = Some(path.into());
    }

    /// Recorded output target
    pub fn output_target(&self) -> Option<&Path> {
        self.output_target.as_deref()
    }

    /// Owning session
    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    /// Check if `finalize` has completed
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Define a top-level class
    pub fn define_type(&mut self, name: &str, config: TypeConfig) -> BuildResult<TypeBuilder<'_>> {
        let id = self.declare_type(name, TypeKind::Class, config, None)?;
        Ok(TypeBuilder::new(self, id))
    }

    /// Define a top-level interface
    pub fn define_interface(&mut self, name: &str, config: TypeConfig) -> BuildResult<TypeBuilder<'_>> {
        let id = self.declare_type(name, TypeKind::Interface, config, None)?;
        Ok(TypeBuilder::new(self, id))
    }

    /// Define a top-level enum over an integral primitive
    pub fn define_enum(
        &mut self,
        name: &str,
        visibility: Visibility,
        underlying: Primitive,
    ) -> BuildResult<TypeBuilder<'_>> {
        let config = TypeConfig::default().with_visibility(visibility);
        let id = self.declare_type(name, TypeKind::Enum { underlying }, config, None)?;
        Ok(TypeBuilder::new(self, id))
    }

    /// Reopen a type defined in this unit
    pub fn type_builder(&mut self, handle: TypeHandle) -> BuildResult<TypeBuilder<'_>> {
        if !self.types.contains_key(&handle.id) {
            return Err(BuildError::UnknownType(handle.id));
        }
        Ok(TypeBuilder::new(self, handle.id))
    }

    /// Descriptor of a type defined in this unit
    pub fn descriptor(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(&id)
    }

    pub(crate) fn descriptor_mut(&mut self, id: TypeId) -> BuildResult<&mut TypeDescriptor> {
        self.types.get_mut(&id).ok_or(BuildError::UnknownType(id))
    }

    /// Descriptor of a type that may still change
    pub(crate) fn building_mut(&mut self, id: TypeId) -> BuildResult<&mut TypeDescriptor> {
        let desc = self.descriptor_mut(id)?;
        if desc.is_realized() {
            return Err(BuildError::TypeRealized(desc.full_name.clone()));
        }
        Ok(desc)
    }

    /// Top-level type descriptors in definition order
    pub fn top_level_types(&self) -> impl Iterator<Item = &TypeDescriptor> + '_ {
        self.top_level.iter().filter_map(|id| self.types.get(id))
    }

    /// Number of types defined in this unit, nested included
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Look up a type of this unit by full name
    pub fn local_type(&self, full_name: &str) -> Option<TypeHandle> {
        self.names
            .get(full_name)
            .and_then(|id| self.types.get(id))
            .map(|t| t.handle)
    }

    pub(crate) fn declare_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        config: TypeConfig,
        enclosing: Option<TypeId>,
    ) -> BuildResult<TypeId> {
        if name.is_empty() {
            return Err(BuildError::EmptyName("Type"));
        }
        if self.finalized.is_some() {
            return Err(BuildError::TypeRealized(self.name.clone()));
        }
        let full_name = match enclosing {
            Some(outer) => format!("{}+{}", self.building_mut(outer)?.full_name, name),
            None => name.to_string(),
        };
        if self.names.contains_key(&full_name) || self.session.resolve_type(&full_name).is_some() {
            return Err(BuildError::DuplicateType(full_name));
        }

        let base = match (kind, config.base) {
            (TypeKind::Interface, Some(_)) => return Err(BuildError::InterfaceBase(full_name)),
            (TypeKind::Class, Some(base)) => self.check_base(&full_name, base)?,
            (TypeKind::Enum { underlying }, _) if !underlying.is_integral() => {
                return Err(BuildError::InvalidMember {
                    owner: full_name,
                    reason: format!("enum underlying type {} is not integral", underlying.name()),
                })
            }
            _ => None,
        };
        let mut interfaces: Vec<TypeRef> = Vec::new();
        if !kind.is_enum() {
            for iface in config.interfaces {
                self.check_interface(&full_name, &iface)?;
                if !interfaces.contains(&iface) {
                    interfaces.push(iface);
                }
            }
        }

        let modifier = if kind.is_interface() {
            Modifier::Abstract
        } else {
            config.modifier
        };
        let id = self.session.allocate_type_id();
        let handle = TypeHandle::new(id, kind);
        let attributes = type_attributes(kind, config.visibility, modifier, enclosing.is_some());
        let mut desc = TypeDescriptor::new(
            handle,
            name,
            full_name.clone(),
            config.visibility,
            modifier,
            attributes,
        );
        desc.base = base;
        desc.interfaces = interfaces;
        desc.enclosing = enclosing;

        match enclosing {
            Some(outer) => self.building_mut(outer)?.nested.push(id),
            None => self.top_level.push(id),
        }
        self.types.insert(id, desc);
        self.names.insert(full_name.clone(), id);
        debug!(unit = %self.name, r#type = %full_name, %kind, "defined type");
        Ok(id)
    }

    /// Validate a base type; the root object type is stored as `None`
    pub(crate) fn check_base(&self, owner: &str, base: TypeRef) -> BuildResult<Option<TypeRef>> {
        match &base {
            TypeRef::Object => Ok(None),
            TypeRef::Defined(h) if h.kind == TypeKind::Class => {
                self.summary(h.id)?;
                Ok(Some(base))
            }
            _ => Err(BuildError::InvalidMember {
                owner: owner.to_string(),
                reason: format!("base type {} is not a class", base),
            }),
        }
    }

    pub(crate) fn check_interface(&self, owner: &str, iface: &TypeRef) -> BuildResult<()> {
        match iface {
            TypeRef::Defined(h) if h.kind.is_interface() => self.summary(h.id).map(|_| ()),
            _ => Err(BuildError::InvalidMember {
                owner: owner.to_string(),
                reason: format!("{} is not an interface", iface),
            }),
        }
    }

    /// Realize every type of the unit into the session
    ///
    /// Base types and implemented interfaces are realized before the types
    /// that depend on them, nested types before their enclosing type (unless
    /// a nested type derives from its encloser). Calling this again returns
    /// the same unit without realizing anything twice.
    ///
    /// On failure every type realized by this call is withdrawn from the
    /// session and reopened, so the unit can be fixed and finalized again.
    pub fn finalize(&mut self) -> BuildResult<Arc<RealizedUnit>> {
        if let Some(unit) = &self.finalized {
            return Ok(Arc::clone(unit));
        }

        let mut realized = Vec::new();
        let mut in_progress = FxHashSet::default();
        for id in self.top_level.clone() {
            if let Err(err) = realize::realize_type(self, id, &mut in_progress, &mut realized) {
                self.roll_back(&realized);
                return Err(err);
            }
        }

        let top_level = self
            .top_level
            .iter()
            .filter_map(|id| self.types.get(id))
            .map(|t| t.handle)
            .collect();
        let unit = Arc::new(RealizedUnit {
            name: self.name.clone(),
            module_name: self.module_name.clone(),
            types: realized,
            top_level,
        });
        info!(unit = %self.name, types = unit.types.len(), "finalized unit");
        self.finalized = Some(Arc::clone(&unit));
        Ok(unit)
    }

    fn roll_back(&mut self, realized: &[TypeHandle]) {
        for handle in realized.iter().rev() {
            self.session.uninstall(handle.id);
            if let Some(desc) = self.types.get_mut(&handle.id) {
                desc.state = TypeState::Building;
            }
        }
        warn!(unit = %self.name, withdrawn = realized.len(), "finalize failed, unit reopened");
    }
}

impl std::fmt::Debug for AssemblyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyBuilder")
            .field("name", &self.name)
            .field("module_name", &self.module_name)
            .field("types", &self.types.len())
            .field("finalized", &self.finalized.is_some())
            .finish()
    }
}
