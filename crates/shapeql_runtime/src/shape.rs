//! Result shapes.
//!
//! A [`Shape`] is the layout of one object in a response: the declaring
//! type plus the ordered output field names and their value types. Two
//! selections that produce the same layout share a single `Arc<Shape>`
//! through the [`ShapeCache`], so equal layouts compare by pointer.

use crate::schema::TypeRef;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Identifier of a shape within its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u64);

impl ShapeId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// One output field of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeField {
    pub name: String,
    pub ty: TypeRef,
}

impl ShapeField {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShapeKey {
    type_name: String,
    fields: Vec<ShapeField>,
}

/// The layout of one response object.
#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    id: ShapeId,
    type_name: String,
    fields: Vec<ShapeField>,
}

impl Shape {
    pub const fn id(&self) -> ShapeId {
        self.id
    }

    /// The type whose fields this shape selects.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[ShapeField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Builds an instance from values given in field order.
    ///
    /// The instance carries exactly this shape's fields: missing trailing
    /// values become `null` and surplus values are dropped.
    pub fn instantiate(&self, values: Vec<Value>) -> Value {
        let mut values = values.into_iter();
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), values.next().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}

/// Deduplicates shapes.
///
/// Safe to share across threads; concurrent requests for the same layout
/// all receive the same `Arc`.
#[derive(Debug, Default)]
pub struct ShapeCache {
    shapes: RwLock<FxHashMap<ShapeKey, Arc<Shape>>>,
    next_id: AtomicU64,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shape for `type_name` with `fields`, creating it on first
    /// request.
    pub fn get_or_create(&self, type_name: &str, fields: Vec<ShapeField>) -> Arc<Shape> {
        let key = ShapeKey {
            type_name: type_name.to_string(),
            fields,
        };

        if let Some(shape) = self
            .shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(shape);
        }

        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        let next_id = &self.next_id;
        let shape = shapes.entry(key).or_insert_with_key(|key| {
            let id = ShapeId(next_id.fetch_add(1, Ordering::Relaxed));
            trace!(shape = id.0, type_name = %key.type_name, fields = key.fields.len(), "new shape");
            Arc::new(Shape {
                id,
                type_name: key.type_name.clone(),
                fields: key.fields.clone(),
            })
        });
        Arc::clone(shape)
    }

    /// Number of distinct shapes created so far.
    pub fn len(&self) -> usize {
        self.shapes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<ShapeField> {
        names
            .iter()
            .map(|name| ShapeField::new(*name, TypeRef::named("Int")))
            .collect()
    }

    #[test]
    fn test_same_layout_same_shape() {
        let cache = ShapeCache::new();
        let a = cache.get_or_create("Person", fields(&["id", "name"]));
        let b = cache.get_or_create("Person", fields(&["id", "name"]));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_order_and_type_distinguish_shapes() {
        let cache = ShapeCache::new();
        let a = cache.get_or_create("Person", fields(&["id", "name"]));
        let b = cache.get_or_create("Person", fields(&["name", "id"]));
        let c = cache.get_or_create("Message", fields(&["id", "name"]));
        let d = cache.get_or_create(
            "Person",
            vec![
                ShapeField::new("id", TypeRef::named("ID")),
                ShapeField::new("name", TypeRef::named("Int")),
            ],
        );
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(!Arc::ptr_eq(&a, &d));
        assert_eq!(cache.len(), 4);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_concurrent_creation_yields_one_shape() {
        let cache = Arc::new(ShapeCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_create("Person", fields(&["id"])))
            })
            .collect();
        let shapes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(shapes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_instantiate() {
        let cache = ShapeCache::new();
        let shape = cache.get_or_create("Person", fields(&["id", "name"]));
        assert_eq!(
            shape.instantiate(vec![json!(1), json!("Ada")]),
            json!({ "id": 1, "name": "Ada" })
        );
        assert_eq!(shape.instantiate(vec![json!(1)]), json!({ "id": 1, "name": null }));
        assert!(shape.contains("name"));
        assert_eq!(shape.field_names().collect::<Vec<_>>(), ["id", "name"]);
        assert_eq!(shape.type_name(), "Person");
    }
}
