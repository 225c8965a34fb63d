//! Values manipulated by the interpreter

use std::fmt;
use std::sync::Arc;

use super::object::{ArrayObject, BoxedValue, Object};
use crate::types::{Constant, TypeClass, TypeRef};

/// A value on the evaluation stack, in a local, argument or field
///
/// Small integers (`bool`, `char`, 8/16/32-bit) are widened to `I32` on the
/// stack; unsigned values keep their bit pattern. Enums are their underlying
/// integer.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Null reference
    #[default]
    Null,
    /// Boolean as seen by the host
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Class instance
    Object(Arc<Object>),
    /// Array
    Array(Arc<ArrayObject>),
    /// Boxed value type
    Boxed(Arc<BoxedValue>),
}

impl Value {
    /// Default value of a type
    pub fn default_for(ty: &TypeRef) -> Value {
        match ty.classify() {
            TypeClass::Bool => Value::Bool(false),
            TypeClass::SignedInt(64) | TypeClass::UnsignedInt(64) => Value::I64(0),
            TypeClass::Char | TypeClass::SignedInt(_) | TypeClass::UnsignedInt(_) => Value::I32(0),
            TypeClass::Float(32) => Value::F32(0.0),
            TypeClass::Float(_) => Value::F64(0.0),
            TypeClass::Void | TypeClass::Reference | TypeClass::Generic => Value::Null,
        }
    }

    /// Create a string value
    pub fn string(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view (booleans count as 0/1)
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            Value::Bool(b) => Some(*b as i32),
            _ => None,
        }
    }

    /// 64-bit integer view, widening 32-bit values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(*v as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Float view, widening 32-bit floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            Value::F32(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean view (non-zero integers are true)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I32(v) => Some(*v != 0),
            Value::I64(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// String view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Object view
    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Array view
    pub fn as_array(&self) -> Option<&Arc<ArrayObject>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Stack form of the value (booleans widen to `I32`)
    pub fn to_stack(self) -> Value {
        match self {
            Value::Bool(b) => Value::I32(b as i32),
            other => other,
        }
    }

    /// Reshape a value for a declared type at the host boundary
    ///
    /// Integers become `Bool` for boolean types and widen to `I64` for 64-bit
    /// types; other values are returned unchanged.
    pub fn coerce_to(self, ty: &TypeRef) -> Value {
        match (ty.classify(), self) {
            (TypeClass::Bool, v @ (Value::I32(_) | Value::I64(_))) => Value::Bool(v.as_bool().unwrap_or(false)),
            (TypeClass::SignedInt(64) | TypeClass::UnsignedInt(64), Value::I32(v)) => Value::I64(v as i64),
            (TypeClass::Float(64), Value::F32(v)) => Value::F64(v as f64),
            (_, v) => v,
        }
    }

    /// Short description of the value's kind, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Boxed(_) => "boxed",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Boxed(a), Value::Boxed(b)) => Arc::ptr_eq(a, b) || (a.ty == b.ty && a.value == b.value),
            _ => false,
        }
    }
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::I32(v) => Value::I32(*v),
            Constant::I64(v) => Value::I64(*v),
            Constant::F32(v) => Value::F32(*v),
            Constant::F64(v) => Value::F64(*v),
            Constant::Str(s) => Value::Str(Arc::clone(s)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Arc::from(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "<object {} of {}>", o.object_id(), o.type_id()),
            Value::Array(a) => write!(f, "<{}[{}]>", a.element_type(), a.len()),
            Value::Boxed(b) => write!(f, "<boxed {}: {}>", b.ty, b.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Primitive, TypeHandle, TypeId, TypeKind};

    #[test]
    fn test_defaults_follow_classification() {
        assert_eq!(Value::default_for(&TypeRef::BOOL), Value::Bool(false));
        assert_eq!(Value::default_for(&TypeRef::U16), Value::I32(0));
        assert_eq!(Value::default_for(&TypeRef::U64), Value::I64(0));
        assert_eq!(Value::default_for(&TypeRef::F32), Value::F32(0.0));
        assert_eq!(Value::default_for(&TypeRef::String), Value::Null);
        let e = TypeRef::Defined(TypeHandle::new(
            TypeId(1),
            TypeKind::Enum {
                underlying: Primitive::I64,
            },
        ));
        assert_eq!(Value::default_for(&e), Value::I64(0));
    }

    #[test]
    fn test_host_boundary_coercion() {
        assert_eq!(Value::I32(1).coerce_to(&TypeRef::BOOL), Value::Bool(true));
        assert_eq!(Value::I32(0).coerce_to(&TypeRef::BOOL), Value::Bool(false));
        assert_eq!(Value::I32(-3).coerce_to(&TypeRef::I64), Value::I64(-3));
        assert_eq!(Value::string("x").coerce_to(&TypeRef::Object), Value::string("x"));
        assert_eq!(Value::Bool(true).to_stack(), Value::I32(1));
    }

    #[test]
    fn test_reference_equality_for_objects() {
        let a = Arc::new(Object::new(TypeId(1), vec![Value::I32(1)]));
        let b = Arc::new(Object::new(TypeId(1), vec![Value::I32(1)]));
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
        assert_eq!(Value::string("hi"), Value::from("hi"));
    }
}
