//! Heap objects: class instances, arrays and boxed values

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::value::Value;
use crate::types::{TypeId, TypeRef};

/// Global counter for generating unique object IDs
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Class instance
///
/// Field slots follow the realized type's instance layout: inherited fields
/// first, then the type's own fields in declaration order.
#[derive(Debug)]
pub struct Object {
    object_id: u64,
    type_id: TypeId,
    fields: RwLock<Vec<Value>>,
}

impl Object {
    /// Create an object with initial field values
    pub fn new(type_id: TypeId, fields: Vec<Value>) -> Self {
        Self {
            object_id: generate_object_id(),
            type_id,
            fields: RwLock::new(fields),
        }
    }

    /// Unique object ID
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Exact runtime type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get a field value by slot
    pub fn get_field(&self, slot: usize) -> Option<Value> {
        self.fields.read().get(slot).cloned()
    }

    /// Set a field value by slot
    pub fn set_field(&self, slot: usize, value: Value) -> Result<(), String> {
        let mut fields = self.fields.write();
        let count = fields.len();
        match fields.get_mut(slot) {
            Some(f) => {
                *f = value;
                Ok(())
            }
            None => Err(format!(
                "Field slot {} out of bounds (object has {} fields)",
                slot, count
            )),
        }
    }

    /// Get number of field slots
    pub fn field_count(&self) -> usize {
        self.fields.read().len()
    }
}

/// Single-dimension, zero-based array
#[derive(Debug)]
pub struct ArrayObject {
    element: TypeRef,
    items: RwLock<Vec<Value>>,
}

impl ArrayObject {
    /// Create an array of `len` default elements
    pub fn new(element: TypeRef, len: usize) -> Self {
        let items = vec![Value::default_for(&element); len];
        Self {
            element,
            items: RwLock::new(items),
        }
    }

    /// Create an array from existing values
    pub fn from_values(element: TypeRef, items: Vec<Value>) -> Self {
        Self {
            element,
            items: RwLock::new(items),
        }
    }

    /// Element type
    pub fn element_type(&self) -> &TypeRef {
        &self.element
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if the array is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Get an element
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    /// Set an element; returns false when out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Copy of all elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }
}

/// A value type wrapped as a reference
#[derive(Debug, Clone, PartialEq)]
pub struct BoxedValue {
    /// Type the value was boxed as
    pub ty: TypeRef,
    /// Stack form of the value
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_fields() {
        let obj = Object::new(TypeId(3), vec![Value::I32(0), Value::Null]);
        assert_eq!(obj.field_count(), 2);
        obj.set_field(1, Value::string("x")).unwrap();
        assert_eq!(obj.get_field(1), Some(Value::string("x")));
        assert!(obj.set_field(2, Value::Null).is_err());
        assert_eq!(obj.get_field(5), None);
    }

    #[test]
    fn test_object_ids_are_unique() {
        let a = Object::new(TypeId(1), Vec::new());
        let b = Object::new(TypeId(1), Vec::new());
        assert_ne!(a.object_id(), b.object_id());
    }

    #[test]
    fn test_array_defaults_and_bounds() {
        let arr = ArrayObject::new(TypeRef::I64, 3);
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(2), Some(Value::I64(0)));
        assert!(arr.set(0, Value::I64(9)));
        assert!(!arr.set(3, Value::I64(1)));
        assert_eq!(arr.to_vec()[0], Value::I64(9));
    }
}
