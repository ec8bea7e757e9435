//! Node parameters.
//!
//! `Params` is the string-keyed configuration map a flow hands to each node it
//! visits. It behaves like stack memory: passed down from the enclosing flow,
//! never written back. Batch flows derive one merged map per batch item.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Immutable per-visit configuration for nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    inner: HashMap<String, JsonValue>,
}

impl Params {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn from_map(map: HashMap<String, JsonValue>) -> Self {
        Self { inner: map }
    }

    /// Build params from a JSON object value. Returns `None` for any other
    /// JSON kind.
    pub fn from_object(value: &JsonValue) -> Option<Self> {
        value.as_object().map(|map| Self {
            inner: map.clone().into_iter().collect(),
        })
    }

    pub fn set<V: Serialize>(&mut self, key: &str, value: V) -> Result<(), serde_json::Error> {
        let json_value = serde_json::to_value(value)?;
        self.inner.insert(key.to_string(), json_value);
        Ok(())
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.inner
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Merge `overrides` on top of this map. Keys in `overrides` win.
    pub fn merge(&self, overrides: &Params) -> Self {
        let mut merged = self.inner.clone();
        merged.extend(overrides.inner.clone());
        Self { inner: merged }
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn builder() -> ParamsBuilder {
        ParamsBuilder::new()
    }
}

#[derive(Default)]
pub struct ParamsBuilder {
    inner: HashMap<String, JsonValue>,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Serialize>(mut self, key: &str, value: V) -> Result<Self, serde_json::Error> {
        let json_value = serde_json::to_value(value)?;
        self.inner.insert(key.to_string(), json_value);
        Ok(self)
    }

    /// Like [`ParamsBuilder::insert`] for values that cannot fail to
    /// serialize. Panics otherwise, so keep it out of library code paths.
    pub fn insert_unwrap<V: Serialize>(mut self, key: &str, value: V) -> Self {
        let json_value =
            serde_json::to_value(value).expect("ParamsBuilder: value failed to serialize");
        self.inner.insert(key.to_string(), json_value);
        self
    }

    pub fn build(self) -> Params {
        Params { inner: self.inner }
    }
}
