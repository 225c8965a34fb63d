//! Type identities and type references
//!
//! Every builder, instruction operand and runtime structure refers to types
//! and members through the small `Copy` handles defined here. A [`TypeId`]
//! is allocated by the [`BuildSession`](crate::BuildSession) when a type is
//! defined and never reused within that session.

use std::fmt;
use std::sync::Arc;

/// Session-unique identifier of a defined type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitive value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Boolean
    Bool,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
}

impl Primitive {
    /// Get the primitive's display name
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
        }
    }

    /// Check if this primitive is an integer usable as an enum's underlying type
    pub fn is_integral(&self) -> bool {
        !matches!(self, Primitive::Bool | Primitive::Char | Primitive::F32 | Primitive::F64)
    }
}

/// Kind tag of a defined type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type with fields, methods and a single base class
    Class,
    /// Abstract contract: abstract virtual members only
    Interface,
    /// Named integral constants over an underlying primitive
    Enum {
        /// Underlying integral type
        underlying: Primitive,
    },
}

impl TypeKind {
    /// Check if this is an interface
    pub fn is_interface(&self) -> bool {
        matches!(self, TypeKind::Interface)
    }

    /// Check if this is an enum
    pub fn is_enum(&self) -> bool {
        matches!(self, TypeKind::Enum { .. })
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Interface => write!(f, "interface"),
            TypeKind::Enum { underlying } => write!(f, "enum : {}", underlying.name()),
        }
    }
}

/// Handle to a defined type: its identity plus its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    /// Type identity
    pub id: TypeId,
    /// Kind tag
    pub kind: TypeKind,
}

impl TypeHandle {
    /// Create a new handle
    pub fn new(id: TypeId, kind: TypeKind) -> Self {
        Self { id, kind }
    }
}

/// Handle to a method or constructor: owning type plus declaration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// Owning type
    pub owner: TypeId,
    /// Index in the owner's method table
    pub index: u32,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::m{}", self.owner, self.index)
    }
}

/// Handle to a field: owning type plus declaration index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// Owning type
    pub owner: TypeId,
    /// Index in the owner's field table
    pub index: u32,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::f{}", self.owner, self.index)
    }
}

/// A reference to a type as it appears in signatures and operands
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// No value (method return only)
    Void,
    /// A primitive value type
    Primitive(Primitive),
    /// Immutable string
    String,
    /// The root object type
    Object,
    /// Single-dimension array of an element type
    Array(Box<TypeRef>),
    /// A type defined through the builders
    Defined(TypeHandle),
    /// A generic method parameter, by name
    Generic(Arc<str>),
}

impl TypeRef {
    /// `bool`
    pub const BOOL: TypeRef = TypeRef::Primitive(Primitive::Bool);
    /// `char`
    pub const CHAR: TypeRef = TypeRef::Primitive(Primitive::Char);
    /// `i8`
    pub const I8: TypeRef = TypeRef::Primitive(Primitive::I8);
    /// `i16`
    pub const I16: TypeRef = TypeRef::Primitive(Primitive::I16);
    /// `i32`
    pub const I32: TypeRef = TypeRef::Primitive(Primitive::I32);
    /// `i64`
    pub const I64: TypeRef = TypeRef::Primitive(Primitive::I64);
    /// `u8`
    pub const U8: TypeRef = TypeRef::Primitive(Primitive::U8);
    /// `u16`
    pub const U16: TypeRef = TypeRef::Primitive(Primitive::U16);
    /// `u32`
    pub const U32: TypeRef = TypeRef::Primitive(Primitive::U32);
    /// `u64`
    pub const U64: TypeRef = TypeRef::Primitive(Primitive::U64);
    /// `f32`
    pub const F32: TypeRef = TypeRef::Primitive(Primitive::F32);
    /// `f64`
    pub const F64: TypeRef = TypeRef::Primitive(Primitive::F64);

    /// Reference to a generic parameter
    pub fn generic(name: &str) -> Self {
        TypeRef::Generic(Arc::from(name))
    }

    /// Array of this element type
    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    /// Classify this type for conversion and boxing decisions
    pub fn classify(&self) -> TypeClass {
        match self {
            TypeRef::Void => TypeClass::Void,
            TypeRef::Primitive(p) => classify_primitive(*p),
            TypeRef::Defined(TypeHandle {
                kind: TypeKind::Enum { underlying },
                ..
            }) => classify_primitive(*underlying),
            TypeRef::String | TypeRef::Object | TypeRef::Array(_) | TypeRef::Defined(_) => {
                TypeClass::Reference
            }
            TypeRef::Generic(_) => TypeClass::Generic,
        }
    }

    /// Check if values of this type are stored inline rather than by reference
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeRef::Primitive(_)
                | TypeRef::Defined(TypeHandle {
                    kind: TypeKind::Enum { .. },
                    ..
                })
        )
    }

    /// Check if this is a generic parameter reference
    pub fn is_generic(&self) -> bool {
        matches!(self, TypeRef::Generic(_))
    }

    /// Check if this type (or any element type) mentions a generic parameter
    pub fn mentions_generic(&self) -> bool {
        match self {
            TypeRef::Generic(_) => true,
            TypeRef::Array(e) => e.mentions_generic(),
            _ => false,
        }
    }

    /// Replace generic parameters by position using `params` → `args`
    pub fn substitute(&self, params: &[String], args: &[TypeRef]) -> TypeRef {
        match self {
            TypeRef::Generic(name) => params
                .iter()
                .position(|p| p.as_str() == &**name)
                .and_then(|i| args.get(i))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeRef::Array(e) => TypeRef::Array(Box::new(e.substitute(params, args))),
            _ => self.clone(),
        }
    }

    /// Get the defined type id, if any
    pub fn defined_id(&self) -> Option<TypeId> {
        match self {
            TypeRef::Defined(h) => Some(h.id),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Primitive(p) => write!(f, "{}", p.name()),
            TypeRef::String => write!(f, "string"),
            TypeRef::Object => write!(f, "object"),
            TypeRef::Array(e) => write!(f, "{}[]", e),
            TypeRef::Defined(h) => write!(f, "{}{}", h.kind, h.id),
            TypeRef::Generic(name) => write!(f, "!!{}", name),
        }
    }
}

fn classify_primitive(p: Primitive) -> TypeClass {
    match p {
        Primitive::Bool => TypeClass::Bool,
        Primitive::Char => TypeClass::Char,
        Primitive::I8 => TypeClass::SignedInt(8),
        Primitive::I16 => TypeClass::SignedInt(16),
        Primitive::I32 => TypeClass::SignedInt(32),
        Primitive::I64 => TypeClass::SignedInt(64),
        Primitive::U8 => TypeClass::UnsignedInt(8),
        Primitive::U16 => TypeClass::UnsignedInt(16),
        Primitive::U32 => TypeClass::UnsignedInt(32),
        Primitive::U64 => TypeClass::UnsignedInt(64),
        Primitive::F32 => TypeClass::Float(32),
        Primitive::F64 => TypeClass::Float(64),
    }
}

/// Semantic classification of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// Character
    Char,
    /// Signed integer of the given bit width
    SignedInt(u8),
    /// Unsigned integer of the given bit width
    UnsignedInt(u8),
    /// Float of the given bit width
    Float(u8),
    /// Any reference type
    Reference,
    /// Generic parameter, decided at execution time
    Generic,
}

/// A compile-time constant (parameter defaults, literals, `ldstr` payloads)
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String
    Str(Arc<str>),
}

impl Constant {
    /// Build an integral constant sized for the given underlying primitive
    pub fn integral(value: i64, underlying: Primitive) -> Self {
        match underlying {
            Primitive::I64 | Primitive::U64 => Constant::I64(value),
            _ => Constant::I32(value as i32),
        }
    }

    /// Get the integral value, if this constant is integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::I32(v) => Some(*v as i64),
            Constant::I64(v) => Some(*v),
            Constant::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Constant::Str(Arc::from(s))
    }
}

impl From<i32> for Constant {
    fn from(v: i32) -> Self {
        Constant::I32(v)
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Constant::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_enum_uses_underlying() {
        let handle = TypeHandle::new(
            TypeId(7),
            TypeKind::Enum {
                underlying: Primitive::U16,
            },
        );
        assert_eq!(TypeRef::Defined(handle).classify(), TypeClass::UnsignedInt(16));
        assert!(TypeRef::Defined(handle).is_value_type());
    }

    #[test]
    fn test_classify_references() {
        assert_eq!(TypeRef::String.classify(), TypeClass::Reference);
        assert_eq!(TypeRef::array_of(TypeRef::I32).classify(), TypeClass::Reference);
        let class = TypeHandle::new(TypeId(1), TypeKind::Class);
        assert_eq!(TypeRef::Defined(class).classify(), TypeClass::Reference);
        assert_eq!(TypeRef::generic("T").classify(), TypeClass::Generic);
    }

    #[test]
    fn test_substitute_generic() {
        let params = vec!["T".to_string(), "U".to_string()];
        let args = vec![TypeRef::I32, TypeRef::String];
        assert_eq!(TypeRef::generic("U").substitute(&params, &args), TypeRef::String);
        assert_eq!(
            TypeRef::array_of(TypeRef::generic("T")).substitute(&params, &args),
            TypeRef::array_of(TypeRef::I32)
        );
        assert_eq!(TypeRef::generic("V").substitute(&params, &args), TypeRef::generic("V"));
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeRef::array_of(TypeRef::F64).to_string(), "f64[]");
        assert_eq!(TypeId(3).to_string(), "#3");
        assert_eq!(
            MethodRef {
                owner: TypeId(3),
                index: 2
            }
            .to_string(),
            "#3::m2"
        );
    }
}
