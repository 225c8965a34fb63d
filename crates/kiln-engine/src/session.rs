//! Build session: the shared registry of realized types
//!
//! A [`BuildSession`] is a cheap, cloneable handle. Every
//! [`AssemblyBuilder`] created from it allocates type ids from the session and
//! installs its realized types there, so later units (and the [`Vm`]) can
//! resolve them by name. The registry is safe to use from several threads at
//! once.
//!
//! [`Vm`]: crate::Vm

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::builder::{AssemblyBuilder, BuildError, BuildResult, FieldSig, MethodSig};
use crate::runtime::RuntimeType;
use crate::types::{TypeHandle, TypeId, TypeRef};

/// Session options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Reject non-abstract classes that leave abstract or interface methods
    /// unimplemented
    pub verify_implementations: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            verify_implementations: true,
        }
    }
}

/// Concurrent full name → handle registry
#[derive(Debug, Default)]
pub struct TypeRegistry {
    names: DashMap<String, TypeHandle>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name; fails if the name is taken
    pub fn register(&self, full_name: &str, handle: TypeHandle) -> BuildResult<()> {
        match self.names.entry(full_name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BuildError::DuplicateType(full_name.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Look up a name
    pub fn get(&self, full_name: &str) -> Option<TypeHandle> {
        self.names.get(full_name).map(|h| *h)
    }

    /// Check if a name is registered
    pub fn contains(&self, full_name: &str) -> bool {
        self.names.contains_key(full_name)
    }

    /// Number of registered names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.names.iter().map(|e| e.key().clone()).collect()
    }

    fn remove(&self, full_name: &str) {
        self.names.remove(full_name);
    }

    fn clear(&self) {
        self.names.clear();
    }
}

#[derive(Debug)]
struct SessionInner {
    options: BuildOptions,
    registry: TypeRegistry,
    types: RwLock<FxHashMap<TypeId, Arc<RuntimeType>>>,
    next_type_id: AtomicU32,
}

/// Shared owner of realized types
#[derive(Debug, Clone)]
pub struct BuildSession {
    inner: Arc<SessionInner>,
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSession {
    /// Create a session with default options
    pub fn new() -> Self {
        Self::with_options(BuildOptions::default())
    }

    /// Create a session with specific options
    pub fn with_options(options: BuildOptions) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                options,
                registry: TypeRegistry::new(),
                types: RwLock::new(FxHashMap::default()),
                next_type_id: AtomicU32::new(1),
            }),
        }
    }

    /// Session options
    pub fn options(&self) -> &BuildOptions {
        &self.inner.options
    }

    /// Start a new unit
    pub fn define_assembly(&self, name: &str) -> AssemblyBuilder {
        debug!(unit = name, "defining unit");
        AssemblyBuilder::new(self.clone(), name)
    }

    /// Name registry
    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Resolve a realized type by full name
    pub fn resolve_type(&self, full_name: &str) -> Option<TypeHandle> {
        self.inner.registry.get(full_name)
    }

    /// Resolve a realized type by full name, as a type reference
    pub fn type_ref(&self, full_name: &str) -> BuildResult<TypeRef> {
        self.resolve_type(full_name)
            .map(TypeRef::Defined)
            .ok_or_else(|| BuildError::UnresolvableMember {
                owner: "session".to_string(),
                member: full_name.to_string(),
            })
    }

    /// Realized type by id
    pub fn realized(&self, id: TypeId) -> Option<Arc<RuntimeType>> {
        self.inner.types.read().get(&id).cloned()
    }

    /// Realized type by full name
    pub fn realized_by_name(&self, full_name: &str) -> Option<Arc<RuntimeType>> {
        self.resolve_type(full_name).and_then(|h| self.realized(h.id))
    }

    /// Number of realized types
    pub fn type_count(&self) -> usize {
        self.inner.types.read().len()
    }

    /// Find a method of a realized type or its bases by name and
    /// (optionally) parameter types
    pub fn find_method(&self, ty: TypeId, name: &str, params: Option<&[TypeRef]>) -> BuildResult<MethodSig> {
        let mut current = Some(ty);
        while let Some(id) = current {
            let t = self.realized(id).ok_or(BuildError::UnknownType(id))?;
            if let Some(m) = t.find_method(name, params) {
                return Ok(MethodSig::from_runtime(m));
            }
            current = t.base;
        }
        Err(self.unresolvable(ty, name))
    }

    /// Find a field of a realized type or its bases by name
    pub fn find_field(&self, ty: TypeId, name: &str) -> BuildResult<FieldSig> {
        let mut current = Some(ty);
        while let Some(id) = current {
            let t = self.realized(id).ok_or(BuildError::UnknownType(id))?;
            if let Some(f) = t.find_field(name) {
                return Ok(FieldSig {
                    handle: f.handle,
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                    attributes: f.attributes,
                });
            }
            current = t.base;
        }
        Err(self.unresolvable(ty, name))
    }

    /// Find an instance constructor of a realized type by parameter types
    pub fn find_constructor(&self, ty: TypeId, params: &[TypeRef]) -> BuildResult<MethodSig> {
        let t = self.realized(ty).ok_or(BuildError::UnknownType(ty))?;
        t.constructor(params)
            .map(|m| MethodSig::from_runtime(m))
            .ok_or_else(|| self.unresolvable(ty, &format!(".ctor/{}", params.len())))
    }

    /// Drop every realized type and registered name
    ///
    /// Type ids keep counting up, so handles from before the reset never
    /// alias new types.
    pub fn clear(&self) {
        self.inner.types.write().clear();
        self.inner.registry.clear();
        debug!("cleared session");
    }

    pub(crate) fn allocate_type_id(&self) -> TypeId {
        TypeId(self.inner.next_type_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Publish a realized type under its full name
    pub(crate) fn install(&self, ty: RuntimeType) -> BuildResult<Arc<RuntimeType>> {
        self.inner.registry.register(&ty.full_name, ty.handle)?;
        let ty = Arc::new(ty);
        self.inner.types.write().insert(ty.id(), Arc::clone(&ty));
        Ok(ty)
    }

    /// Withdraw a type installed by a unit whose finalize failed
    pub(crate) fn uninstall(&self, id: TypeId) {
        if let Some(ty) = self.inner.types.write().remove(&id) {
            self.inner.registry.remove(&ty.full_name);
        }
    }

    fn unresolvable(&self, ty: TypeId, member: &str) -> BuildError {
        let owner = self
            .realized(ty)
            .map(|t| t.full_name.clone())
            .unwrap_or_else(|| ty.to_string());
        BuildError::UnresolvableMember {
            owner,
            member: member.to_string(),
        }
    }
}
