//! Graph document model
//!
//! `Value` is the unit of exchange between the engine and the wire. Scalars
//! are plain; arrays and maps are shared handles, so two fields referencing
//! the same node stay one node, and self-referential structures are
//! representable in memory before they ever hit the codec. Handles are
//! `Arc<RwLock<..>>` so state carrying them can move between tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Shared array node
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;

/// Shared map node
pub type MapRef = Arc<RwLock<BTreeMap<String, Value>>>;

/// A document value: scalar, or a shared handle to an array/map node
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(ArrayRef),
    Map(MapRef),
}

impl Value {
    /// Create an empty array node
    pub fn array() -> Self {
        Value::Array(Arc::new(RwLock::new(Vec::new())))
    }

    /// Create an array node from items
    pub fn array_from(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    /// Create an empty map node
    pub fn map() -> Self {
        Value::Map(Arc::new(RwLock::new(BTreeMap::new())))
    }

    /// Is this a scalar (passes through serialization unchanged)?
    #[inline]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Map(_))
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Look up a map entry by key (clones the handle, not the subtree)
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.read_recursive().get(key).cloned(),
            _ => None,
        }
    }

    /// Insert a map entry; no-op on non-map values
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Value::Map(map) = self {
            map.write().insert(key.into(), value);
        }
    }

    /// Look up an array item by index (clones the handle, not the subtree)
    pub fn item(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(items) => items.read_recursive().get(index).cloned(),
            _ => None,
        }
    }

    /// Append an array item; no-op on non-array values
    pub fn push(&self, value: Value) {
        if let Value::Array(items) = self {
            items.write().push(value);
        }
    }

    /// Snapshot of a map node's entries in key order; empty for non-maps
    pub fn entries(&self) -> Vec<(String, Value)> {
        match self {
            Value::Map(map) => map
                .read_recursive()
                .iter()
                .map(|(key, item)| (key.clone(), item.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of children of an array/map node, 0 for scalars
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.read_recursive().len(),
            Value::Map(map) => map.read_recursive().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node identity for arrays/maps (the handle address), `None` for scalars
    #[inline]
    pub fn node_id(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(Arc::as_ptr(items) as usize),
            Value::Map(map) => Some(Arc::as_ptr(map) as usize),
            _ => None,
        }
    }

    /// Do two values share the same node?
    pub fn same_node(&self, other: &Value) -> bool {
        match (self.node_id(), other.node_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Structural equality, tolerant of cycles.
    ///
    /// Node pairs already under comparison are assumed equal, which is the
    /// coinductive reading: two graphs are equal unless a finite path tells
    /// them apart.
    pub fn deep_eq(&self, other: &Value) -> bool {
        fn eq(a: &Value, b: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
            match (a, b) {
                (Value::Null, Value::Null) => true,
                (Value::Bool(x), Value::Bool(y)) => x == y,
                (Value::Int(x), Value::Int(y)) => x == y,
                (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
                (Value::Str(x), Value::Str(y)) => x == y,
                (Value::Array(x), Value::Array(y)) => {
                    let pair = (Arc::as_ptr(x) as usize, Arc::as_ptr(y) as usize);
                    if seen.contains(&pair) {
                        return true;
                    }
                    seen.push(pair);
                    let x = x.read_recursive();
                    let y = y.read_recursive();
                    x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| eq(a, b, seen))
                }
                (Value::Map(x), Value::Map(y)) => {
                    let pair = (Arc::as_ptr(x) as usize, Arc::as_ptr(y) as usize);
                    if seen.contains(&pair) {
                        return true;
                    }
                    seen.push(pair);
                    let x = x.read_recursive();
                    let y = y.read_recursive();
                    x.len() == y.len()
                        && x.iter()
                            .zip(y.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && eq(va, vb, seen))
                }
                _ => false,
            }
        }
        eq(self, other, &mut Vec::new())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_access() {
        let map = Value::map();
        map.insert("a", Value::from(1i64));
        map.insert("b", Value::from("two"));

        assert_eq!(map.get("a").and_then(|v| v.as_int()), Some(1));
        assert_eq!(map.get("b").and_then(|v| v.as_str()), Some("two".into()));
        assert!(map.get("c").is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_shared_node_identity() {
        let shared = Value::map();
        shared.insert("x", Value::from(9i64));

        let root = Value::map();
        root.insert("left", shared.clone());
        root.insert("right", shared.clone());

        let left = root.get("left").unwrap();
        let right = root.get("right").unwrap();
        assert!(left.same_node(&right));

        // mutation through one handle is visible through the other
        left.insert("x", Value::from(10i64));
        assert_eq!(right.get("x").and_then(|v| v.as_int()), Some(10));
    }

    #[test]
    fn test_deep_eq_on_cycle() {
        let a = Value::map();
        a.insert("name", Value::from("a"));
        a.insert("me", a.clone());

        let b = Value::map();
        b.insert("name", Value::from("a"));
        b.insert("me", b.clone());

        assert!(a.deep_eq(&b));

        let c = Value::map();
        c.insert("name", Value::from("c"));
        c.insert("me", c.clone());
        assert!(!a.deep_eq(&c));
    }

    #[test]
    fn test_values_cross_threads() {
        let map = Value::map();
        map.insert("n", Value::from(1i64));
        let handle = std::thread::spawn(move || map.get("n").and_then(|v| v.as_int()));
        assert_eq!(handle.join().unwrap(), Some(1));
    }
}
