//! Compile attribute-application expressions into flat payloads
//!
//! An attribute application is described as an [`AttributeExpr`] tree such as
//! `new SomeAttr(1, "x") { Flag = true }`. [`AttributeValueCompiler`] walks the
//! tree once: constants are taken as they are, member accesses are evaluated
//! immediately and folded, and anything else (method calls, operators,
//! nested construction) is rejected as malformed.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::runtime::{FieldSlot, Value};
use crate::session::BuildSession;
use crate::types::{Constant, FieldRef, TypeClass, TypeRef};

/// Attribute compilation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttributeError {
    /// The expression contains something that is neither a constant nor a
    /// foldable member access
    #[error("Malformed attribute expression: {0}")]
    Malformed(String),

    /// Property names and values differ in length
    #[error("Attribute property count mismatch: {names} names, {values} values")]
    CountMismatch {
        /// Number of property names
        names: usize,
        /// Number of property values
        values: usize,
    },
}

/// A folded attribute argument
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Null
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
    Str(String),
    /// Type reference
    Type(TypeRef),
    /// Array of values
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    fn kind_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::I32(_) => "i32",
            AttributeValue::I64(_) => "i64",
            AttributeValue::F32(_) => "f32",
            AttributeValue::F64(_) => "f64",
            AttributeValue::Str(_) => "string",
            AttributeValue::Type(_) => "type",
            AttributeValue::Array(_) => "array",
        }
    }
}

impl From<&Constant> for AttributeValue {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Null => AttributeValue::Null,
            Constant::Bool(b) => AttributeValue::Bool(*b),
            Constant::I32(v) => AttributeValue::I32(*v),
            Constant::I64(v) => AttributeValue::I64(*v),
            Constant::F32(v) => AttributeValue::F32(*v),
            Constant::F64(v) => AttributeValue::F64(*v),
            Constant::Str(s) => AttributeValue::Str(s.to_string()),
        }
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::I32(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

/// A side-effect-free member access, evaluated at compile time
#[derive(Clone)]
pub enum MemberAccess {
    /// Host-side property or field read
    Getter {
        /// Member name, for diagnostics
        name: String,
        /// Reads the current value
        get: Arc<dyn Fn() -> AttributeValue + Send + Sync>,
    },
    /// Static field or enum literal of a realized type
    StaticField(FieldRef),
}

impl fmt::Debug for MemberAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberAccess::Getter { name, .. } => write!(f, "Getter({})", name),
            MemberAccess::StaticField(field) => write!(f, "StaticField({})", field),
        }
    }
}

/// Property assignment inside an object initializer
#[derive(Debug, Clone)]
pub struct MemberBinding {
    /// Property name
    pub property: String,
    /// Assigned value
    pub value: AttributeExpr,
}

/// Expression tree describing an attribute application
#[derive(Debug, Clone)]
pub enum AttributeExpr {
    /// Literal value
    Constant(AttributeValue),
    /// Member access folded at compile time
    Member(MemberAccess),
    /// Conversion of a foldable operand
    Convert {
        /// Converted expression
        operand: Box<AttributeExpr>,
        /// Target type
        to: TypeRef,
    },
    /// Array of foldable items
    NewArray {
        /// Element type
        element: TypeRef,
        /// Items
        items: Vec<AttributeExpr>,
    },
    /// Attribute constructor call
    New {
        /// Attribute type name
        attribute: String,
        /// Constructor arguments
        args: Vec<AttributeExpr>,
    },
    /// Constructor call followed by property assignments
    MemberInit {
        /// The constructor call
        new: Box<AttributeExpr>,
        /// Property assignments in order
        bindings: Vec<MemberBinding>,
    },
    /// Method call; never foldable
    Call {
        /// Method name
        method: String,
        /// Arguments
        args: Vec<AttributeExpr>,
    },
    /// Binary operator; never foldable
    Binary {
        /// Operator symbol
        op: String,
        /// Left operand
        left: Box<AttributeExpr>,
        /// Right operand
        right: Box<AttributeExpr>,
    },
}

impl AttributeExpr {
    /// Constructor call `new attribute(args...)`
    pub fn new(attribute: &str, args: Vec<AttributeExpr>) -> Self {
        AttributeExpr::New {
            attribute: attribute.to_string(),
            args,
        }
    }

    /// Literal
    pub fn constant(value: impl Into<AttributeValue>) -> Self {
        AttributeExpr::Constant(value.into())
    }

    /// Host getter, evaluated when compiled
    pub fn getter<F>(name: &str, get: F) -> Self
    where
        F: Fn() -> AttributeValue + Send + Sync + 'static,
    {
        AttributeExpr::Member(MemberAccess::Getter {
            name: name.to_string(),
            get: Arc::new(get),
        })
    }

    /// Static field or enum literal read
    pub fn static_field(field: FieldRef) -> Self {
        AttributeExpr::Member(MemberAccess::StaticField(field))
    }

    /// Method call
    pub fn call(method: &str, args: Vec<AttributeExpr>) -> Self {
        AttributeExpr::Call {
            method: method.to_string(),
            args,
        }
    }

    /// Convert to a type
    pub fn convert(self, to: TypeRef) -> Self {
        AttributeExpr::Convert {
            operand: Box::new(self),
            to,
        }
    }

    /// Append a property assignment, turning a constructor call into an
    /// object initializer
    pub fn init(self, property: &str, value: AttributeExpr) -> Self {
        let binding = MemberBinding {
            property: property.to_string(),
            value,
        };
        match self {
            AttributeExpr::MemberInit { new, mut bindings } => {
                bindings.push(binding);
                AttributeExpr::MemberInit { new, bindings }
            }
            other => AttributeExpr::MemberInit {
                new: Box::new(other),
                bindings: vec![binding],
            },
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            AttributeExpr::Constant(_) => "constant",
            AttributeExpr::Member(_) => "member access",
            AttributeExpr::Convert { .. } => "conversion",
            AttributeExpr::NewArray { .. } => "array",
            AttributeExpr::New { .. } => "constructor call",
            AttributeExpr::MemberInit { .. } => "object initializer",
            AttributeExpr::Call { .. } => "method call",
            AttributeExpr::Binary { .. } => "binary operator",
        }
    }
}

/// Flat description of an attribute application
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePayload {
    attribute: String,
    constructor_args: Vec<AttributeValue>,
    property_names: Vec<String>,
    property_values: Vec<AttributeValue>,
}

impl AttributePayload {
    /// Assemble a payload; names and values must have the same length
    pub fn from_parts(
        attribute: &str,
        constructor_args: Vec<AttributeValue>,
        property_names: Vec<String>,
        property_values: Vec<AttributeValue>,
    ) -> Result<Self, AttributeError> {
        if property_names.len() != property_values.len() {
            return Err(AttributeError::CountMismatch {
                names: property_names.len(),
                values: property_values.len(),
            });
        }
        Ok(Self {
            attribute: attribute.to_string(),
            constructor_args,
            property_names,
            property_values,
        })
    }

    /// Attribute type name
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Constructor arguments in order
    pub fn constructor_args(&self) -> &[AttributeValue] {
        &self.constructor_args
    }

    /// Assigned property names in order
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    /// Assigned property values, parallel to the names
    pub fn property_values(&self) -> &[AttributeValue] {
        &self.property_values
    }

    /// (name, value) pairs in assignment order
    pub fn properties(&self) -> impl Iterator<Item = (&str, &AttributeValue)> + '_ {
        self.property_names
            .iter()
            .map(String::as_str)
            .zip(self.property_values.iter())
    }

    /// Value assigned to a property
    pub fn property(&self, name: &str) -> Option<&AttributeValue> {
        self.properties().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

/// One-shot interpreter for [`AttributeExpr`] trees
///
/// Static field reads need a session to look the realized field up.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttributeValueCompiler<'s> {
    session: Option<&'s BuildSession>,
}

impl<'s> AttributeValueCompiler<'s> {
    /// Compiler without access to realized types
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Compiler that can fold static fields of realized types
    pub fn with_session(session: &'s BuildSession) -> Self {
        Self { session: Some(session) }
    }

    /// Compile a constructor call or object initializer
    pub fn compile(&self, expr: &AttributeExpr) -> Result<AttributePayload, AttributeError> {
        let (new, bindings) = match expr {
            AttributeExpr::MemberInit { new, bindings } => (new.as_ref(), bindings.as_slice()),
            AttributeExpr::New { .. } => (expr, &[][..]),
            other => {
                return Err(AttributeError::Malformed(format!(
                    "expected a constructor call, found a {}",
                    other.kind_name()
                )))
            }
        };
        let AttributeExpr::New { attribute, args } = new else {
            return Err(AttributeError::Malformed(format!(
                "object initializer must wrap a constructor call, found a {}",
                new.kind_name()
            )));
        };

        let constructor_args = args
            .iter()
            .map(|a| self.evaluate(a))
            .collect::<Result<Vec<_>, _>>()?;
        let mut names = Vec::with_capacity(bindings.len());
        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if names.contains(&binding.property) {
                return Err(AttributeError::Malformed(format!(
                    "property '{}' assigned twice",
                    binding.property
                )));
            }
            names.push(binding.property.clone());
            values.push(self.evaluate(&binding.value)?);
        }
        AttributePayload::from_parts(attribute, constructor_args, names, values)
    }

    /// Fold a single argument expression to a value
    pub fn evaluate(&self, expr: &AttributeExpr) -> Result<AttributeValue, AttributeError> {
        match expr {
            AttributeExpr::Constant(v) => Ok(v.clone()),
            AttributeExpr::Member(MemberAccess::Getter { get, .. }) => Ok(get()),
            AttributeExpr::Member(MemberAccess::StaticField(field)) => self.read_static(*field),
            AttributeExpr::Convert { operand, to } => convert(self.evaluate(operand)?, to),
            AttributeExpr::NewArray { element, items } => {
                let items = items
                    .iter()
                    .map(|item| self.evaluate(item).and_then(|v| convert(v, element)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AttributeValue::Array(items))
            }
            AttributeExpr::Call { method, .. } => Err(AttributeError::Malformed(format!(
                "method call '{}' cannot be folded to a constant",
                method
            ))),
            other => Err(AttributeError::Malformed(format!(
                "a {} cannot be folded to a constant",
                other.kind_name()
            ))),
        }
    }

    fn read_static(&self, field: FieldRef) -> Result<AttributeValue, AttributeError> {
        let session = self.session.ok_or_else(|| {
            AttributeError::Malformed(format!("static field {} read without a session", field))
        })?;
        let ty = session
            .realized(field.owner)
            .ok_or_else(|| AttributeError::Malformed(format!("type of field {} is not realized", field)))?;
        let f = ty
            .field(field.index)
            .ok_or_else(|| AttributeError::Malformed(format!("unknown field {}", field)))?;
        match (f.slot, &f.constant) {
            (FieldSlot::Literal, Some(c)) => Ok(AttributeValue::from(c)),
            (FieldSlot::Static(slot), _) => ty
                .static_defaults
                .get(slot)
                .ok_or_else(|| AttributeError::Malformed(format!("unknown static slot of {}", field)))
                .and_then(from_value),
            _ => Err(AttributeError::Malformed(format!(
                "'{}.{}' is not a static field",
                ty.full_name, f.name
            ))),
        }
    }
}

fn from_value(value: &Value) -> Result<AttributeValue, AttributeError> {
    match value {
        Value::Null => Ok(AttributeValue::Null),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::I32(v) => Ok(AttributeValue::I32(*v)),
        Value::I64(v) => Ok(AttributeValue::I64(*v)),
        Value::F32(v) => Ok(AttributeValue::F32(*v)),
        Value::F64(v) => Ok(AttributeValue::F64(*v)),
        Value::Str(s) => Ok(AttributeValue::Str(s.to_string())),
        other => Err(AttributeError::Malformed(format!(
            "a {} value cannot be used as an attribute argument",
            other.kind_name()
        ))),
    }
}

/// Fold a conversion with unchecked (wrapping) numeric semantics
fn convert(value: AttributeValue, to: &TypeRef) -> Result<AttributeValue, AttributeError> {
    let integral = match value {
        AttributeValue::I32(v) => Some(v as i64),
        AttributeValue::I64(v) => Some(v),
        _ => None,
    };
    let float = match value {
        AttributeValue::F32(v) => Some(v as f64),
        AttributeValue::F64(v) => Some(v),
        _ => integral.map(|v| v as f64),
    };
    let unsupported =
        || AttributeError::Malformed(format!("cannot convert a {} constant to {}", value.kind_name(), to));

    match to.classify() {
        TypeClass::Reference | TypeClass::Generic => Ok(value.clone()),
        TypeClass::Bool if matches!(value, AttributeValue::Bool(_)) => Ok(value.clone()),
        TypeClass::Bool | TypeClass::Void => Err(unsupported()),
        TypeClass::SignedInt(bits) => {
            let v = integral.or_else(|| float.map(|f| f as i64)).ok_or_else(unsupported)?;
            Ok(match bits {
                8 => AttributeValue::I32(v as i8 as i32),
                16 => AttributeValue::I32(v as i16 as i32),
                32 => AttributeValue::I32(v as i32),
                _ => AttributeValue::I64(v),
            })
        }
        TypeClass::UnsignedInt(bits) => {
            let v = integral.or_else(|| float.map(|f| f as u64 as i64)).ok_or_else(unsupported)?;
            Ok(match bits {
                8 => AttributeValue::I32(v as u8 as i32),
                16 => AttributeValue::I32(v as u16 as i32),
                32 => AttributeValue::I32(v as u32 as i32),
                _ => AttributeValue::I64(v),
            })
        }
        TypeClass::Char => Ok(AttributeValue::I32(integral.ok_or_else(unsupported)? as u16 as i32)),
        TypeClass::Float(32) => Ok(AttributeValue::F32(float.ok_or_else(unsupported)? as f32)),
        TypeClass::Float(_) => Ok(AttributeValue::F64(float.ok_or_else(unsupported)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_and_initializer() {
        let expr = AttributeExpr::new(
            "SomeAttr",
            vec![AttributeExpr::constant(1), AttributeExpr::constant("x")],
        )
        .init("Flag", AttributeExpr::constant(true));

        let payload = AttributeValueCompiler::new().compile(&expr).unwrap();
        assert_eq!(payload.attribute(), "SomeAttr");
        assert_eq!(
            payload.constructor_args(),
            &[AttributeValue::I32(1), AttributeValue::Str("x".to_string())]
        );
        let props: Vec<_> = payload.properties().collect();
        assert_eq!(props, vec![("Flag", &AttributeValue::Bool(true))]);
    }

    #[test]
    fn test_method_call_is_malformed() {
        let expr = AttributeExpr::new(
            "SomeAttr",
            vec![AttributeExpr::call("ComputeLimit", vec![AttributeExpr::constant(3)])],
        );
        let err = AttributeValueCompiler::new().compile(&expr).unwrap_err();
        assert!(matches!(&err, AttributeError::Malformed(msg) if msg.contains("ComputeLimit")));
    }

    #[test]
    fn test_method_call_in_initializer_is_malformed() {
        let expr = AttributeExpr::new("SomeAttr", vec![])
            .init("Name", AttributeExpr::call("ToString", vec![]));
        assert!(matches!(
            AttributeValueCompiler::new().compile(&expr),
            Err(AttributeError::Malformed(_))
        ));
    }

    #[test]
    fn test_getter_is_folded_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let expr = AttributeExpr::new(
            "Limit",
            vec![AttributeExpr::getter("Config.Max", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                AttributeValue::I32(64)
            })],
        );
        let payload = AttributeValueCompiler::new().compile(&expr).unwrap();
        assert_eq!(payload.constructor_args(), &[AttributeValue::I32(64)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_conversions_fold() {
        let c = AttributeValueCompiler::new();
        let byte = AttributeExpr::constant(300).convert(TypeRef::U8);
        assert_eq!(c.evaluate(&byte).unwrap(), AttributeValue::I32(44));
        let wide = AttributeExpr::constant(-1).convert(TypeRef::I64);
        assert_eq!(c.evaluate(&wide).unwrap(), AttributeValue::I64(-1));
        let float = AttributeExpr::constant(2).convert(TypeRef::F64);
        assert_eq!(c.evaluate(&float).unwrap(), AttributeValue::F64(2.0));
        let bad = AttributeExpr::constant("x").convert(TypeRef::I32);
        assert!(c.evaluate(&bad).is_err());
    }

    #[test]
    fn test_arrays_of_constants() {
        let expr = AttributeExpr::NewArray {
            element: TypeRef::I64,
            items: vec![AttributeExpr::constant(1), AttributeExpr::constant(2)],
        };
        assert_eq!(
            AttributeValueCompiler::new().evaluate(&expr).unwrap(),
            AttributeValue::Array(vec![AttributeValue::I64(1), AttributeValue::I64(2)])
        );
    }

    #[test]
    fn test_payload_count_mismatch() {
        let err = AttributePayload::from_parts("A", vec![], vec!["X".to_string()], vec![]).unwrap_err();
        assert_eq!(err, AttributeError::CountMismatch { names: 1, values: 0 });
    }

    #[test]
    fn test_non_constructor_root_is_malformed() {
        let expr = AttributeExpr::constant(5);
        assert!(matches!(
            AttributeValueCompiler::new().compile(&expr),
            Err(AttributeError::Malformed(_))
        ));
    }

    #[test]
    fn test_static_field_needs_session() {
        let field = FieldRef {
            owner: crate::types::TypeId(1),
            index: 0,
        };
        let expr = AttributeExpr::static_field(field);
        assert!(AttributeValueCompiler::new().evaluate(&expr).is_err());
    }
}
