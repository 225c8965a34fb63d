//! Declaration records passed to the builders
//!
//! Signatures are fixed here, before a member handle is reserved, so a
//! member's parameter and return types never change after it exists.

use super::context::BuildContext;
use super::flags::{Modifier, Visibility};
use super::BuildResult;
use crate::emit::InstructionEmitter;
use crate::types::{Constant, TypeRef};

/// Body generation callback
pub type BodyFn<'a> =
    Box<dyn FnOnce(&mut InstructionEmitter, &BuildContext<'_>) -> BuildResult<()> + 'a>;

/// How a method body is produced
pub enum Body<'a> {
    /// `ret` for void methods, default value + `ret` otherwise; constructors
    /// chain to the base parameterless constructor when one exists
    Minimal,
    /// Run a callback against the method's emitter
    Generate(BodyFn<'a>),
}

impl<'a> Body<'a> {
    /// Generate the body with a callback
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&mut InstructionEmitter, &BuildContext<'_>) -> BuildResult<()> + 'a,
    {
        Body::Generate(Box::new(f))
    }

    /// Emit the minimal body
    pub fn minimal() -> Self {
        Body::Minimal
    }

    /// Check if a callback was supplied
    pub fn is_generated(&self) -> bool {
        matches!(self, Body::Generate(_))
    }
}

impl Default for Body<'_> {
    fn default() -> Self {
        Body::Minimal
    }
}

impl std::fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Minimal => write!(f, "Body::Minimal"),
            Body::Generate(_) => write!(f, "Body::Generate(..)"),
        }
    }
}

/// A method or constructor parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeRef,
    /// Optional default value
    pub default: Option<Constant>,
    /// Output parameter marker
    pub is_out: bool,
}

impl ParamSpec {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            is_out: false,
        }
    }

    /// Attach a default value
    pub fn with_default(mut self, value: Constant) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark as an output parameter
    pub fn out(mut self) -> Self {
        self.is_out = true;
        self
    }
}

/// Type declaration
#[derive(Debug, Clone, Default)]
pub struct TypeConfig {
    /// Accessibility
    pub visibility: Visibility,
    /// Modifier
    pub modifier: Modifier,
    /// Base type; `None` means the root object type
    pub base: Option<TypeRef>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeRef>,
}

impl TypeConfig {
    /// Public type with no modifier
    pub fn public() -> Self {
        Self::default()
    }

    /// Internal type with no modifier
    pub fn internal() -> Self {
        Self::default().with_visibility(Visibility::Internal)
    }

    /// Set accessibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set modifier
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Abstract type
    pub fn as_abstract(self) -> Self {
        self.with_modifier(Modifier::Abstract)
    }

    /// Sealed type
    pub fn as_sealed(self) -> Self {
        self.with_modifier(Modifier::Sealed)
    }

    /// Static type
    pub fn as_static(self) -> Self {
        self.with_modifier(Modifier::Static)
    }

    /// Derive from a base type
    pub fn extends(mut self, base: TypeRef) -> Self {
        self.base = Some(base);
        self
    }

    /// Implement an interface
    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }
}

/// Method declaration
///
/// Leaving `params` or `return_type` unset lets override resolution fill
/// them in from the matched base or interface method.
#[derive(Debug, Clone, Default)]
pub struct MethodConfig {
    /// Accessibility
    pub visibility: Visibility,
    /// Modifier
    pub modifier: Modifier,
    /// Parameters, or `None` to match any
    pub params: Option<Vec<ParamSpec>>,
    /// Return type, or `None` to match any
    pub return_type: Option<TypeRef>,
    /// Generic parameter names
    pub generic_params: Vec<String>,
}

impl MethodConfig {
    /// Public method with no modifier
    pub fn public() -> Self {
        Self::default()
    }

    /// Private method with no modifier
    pub fn private() -> Self {
        Self::default().with_visibility(Visibility::Private)
    }

    /// Set accessibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set modifier
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Virtual method
    pub fn as_virtual(self) -> Self {
        self.with_modifier(Modifier::Virtual)
    }

    /// Abstract method
    pub fn as_abstract(self) -> Self {
        self.with_modifier(Modifier::Abstract)
    }

    /// Sealed (final) method
    pub fn as_sealed(self) -> Self {
        self.with_modifier(Modifier::Sealed)
    }

    /// Static method
    pub fn as_static(self) -> Self {
        self.with_modifier(Modifier::Static)
    }

    /// Explicit interface implementation
    pub fn as_explicit_impl(self) -> Self {
        self.with_modifier(Modifier::ExplicitInterfaceImpl)
    }

    /// Append a parameter
    pub fn param(self, name: &str, ty: TypeRef) -> Self {
        self.param_spec(ParamSpec::new(name, ty))
    }

    /// Append a fully specified parameter
    pub fn param_spec(mut self, spec: ParamSpec) -> Self {
        self.params.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// Declare an empty parameter list
    pub fn no_params(mut self) -> Self {
        self.params = Some(Vec::new());
        self
    }

    /// Set the return type
    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Declare a generic parameter
    pub fn generic(mut self, name: &str) -> Self {
        self.generic_params.push(name.to_string());
        self
    }
}

/// Field declaration
#[derive(Debug, Clone, Default)]
pub struct FieldConfig {
    /// Accessibility
    pub visibility: Visibility,
    /// Modifier (`Static`, or `Sealed` for read-only)
    pub modifier: Modifier,
    /// Initial value
    pub default: Option<Constant>,
}

impl FieldConfig {
    /// Public instance field
    pub fn public() -> Self {
        Self::default()
    }

    /// Private instance field
    pub fn private() -> Self {
        Self {
            visibility: Visibility::Private,
            ..Self::default()
        }
    }

    /// Static field
    pub fn as_static(mut self) -> Self {
        self.modifier = Modifier::Static;
        self
    }

    /// Read-only field
    pub fn as_readonly(mut self) -> Self {
        self.modifier = Modifier::Sealed;
        self
    }

    /// Initial value
    pub fn with_default(mut self, value: Constant) -> Self {
        self.default = Some(value);
        self
    }
}

/// How property accessors are produced
pub enum PropertyAccessors<'a> {
    /// Backing field plus generated accessors
    Auto {
        /// Generate a setter
        writable: bool,
    },
    /// Caller-supplied accessor bodies; no backing field
    Custom {
        /// Getter body
        getter: Option<Body<'a>>,
        /// Setter body
        setter: Option<Body<'a>>,
    },
}

/// Property declaration
pub struct PropertyConfig<'a> {
    /// Accessibility of the accessors
    pub visibility: Visibility,
    /// Modifier of the accessors
    pub modifier: Modifier,
    /// Accessor generation
    pub accessors: PropertyAccessors<'a>,
}

impl<'a> PropertyConfig<'a> {
    /// Read/write auto property
    pub fn auto() -> Self {
        Self {
            visibility: Visibility::Public,
            modifier: Modifier::Standard,
            accessors: PropertyAccessors::Auto { writable: true },
        }
    }

    /// Read-only auto property
    pub fn read_only() -> Self {
        Self {
            accessors: PropertyAccessors::Auto { writable: false },
            ..Self::auto()
        }
    }

    /// Property with custom accessor bodies
    pub fn custom(getter: Option<Body<'a>>, setter: Option<Body<'a>>) -> Self {
        Self {
            accessors: PropertyAccessors::Custom { getter, setter },
            ..Self::auto()
        }
    }

    /// Set accessibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set modifier
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Virtual accessors
    pub fn as_virtual(self) -> Self {
        self.with_modifier(Modifier::Virtual)
    }

    /// Static property
    pub fn as_static(self) -> Self {
        self.with_modifier(Modifier::Static)
    }
}

impl std::fmt::Debug for PropertyConfig<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let accessors = match &self.accessors {
            PropertyAccessors::Auto { writable } => format!("Auto {{ writable: {} }}", writable),
            PropertyAccessors::Custom { getter, setter } => format!(
                "Custom {{ getter: {}, setter: {} }}",
                getter.is_some(),
                setter.is_some()
            ),
        };
        f.debug_struct("PropertyConfig")
            .field("visibility", &self.visibility)
            .field("modifier", &self.modifier)
            .field("accessors", &accessors)
            .finish()
    }
}

/// Constructor declaration
#[derive(Debug, Clone, Default)]
pub struct ConstructorConfig {
    /// Accessibility
    pub visibility: Visibility,
    /// Type initializer instead of instance constructor
    pub is_static: bool,
    /// Parameters
    pub params: Vec<ParamSpec>,
}

impl ConstructorConfig {
    /// Public instance constructor
    pub fn public() -> Self {
        Self::default()
    }

    /// Type initializer
    pub fn type_initializer() -> Self {
        Self {
            visibility: Visibility::Private,
            is_static: true,
            params: Vec::new(),
        }
    }

    /// Set accessibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Append a parameter
    pub fn param(mut self, name: &str, ty: TypeRef) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Append a fully specified parameter
    pub fn param_spec(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }
}
