//! The ordered whole-state model.
//!
//! Whole state is a list of named slices in reducer iteration order. Slice
//! values are shared `Arc`s: reducers signal "unchanged" by returning the
//! same `Arc`, and `Arc::ptr_eq` is the change-detection test. The whole
//! state is itself shared (`Arc<AppState>`) and replaced wholesale, never
//! mutated in place.

use std::sync::Arc;

use serde_json::{Map, Value};

/// One slice's value. Dynamic by design: slices are contributed at runtime
/// by feature modules the engine knows nothing about.
pub type SliceState = Value;

/// Ordered map of slice key → shared slice value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    entries: Vec<(String, Arc<SliceState>)>,
}

impl AppState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<(String, Arc<SliceState>)>) -> Self {
        Self { entries }
    }

    /// Build from a JSON object, e.g. a preloaded-state blob. Non-object
    /// values become a single unnamed root slice under `""`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                entries: map
                    .into_iter()
                    .map(|(k, v)| (k, Arc::new(v)))
                    .collect(),
            },
            Value::Null => Self::empty(),
            other => Self {
                entries: vec![(String::new(), Arc::new(other))],
            },
        }
    }

    pub fn get(&self, key: &str) -> Option<&Arc<SliceState>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Project to a JSON object, for selectors and external consumers.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            map.insert(key.clone(), (**value).clone());
        }
        Value::Object(map)
    }
}
