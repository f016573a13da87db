//! Per-matcher key/value state.
//!
//! Every matcher owns a [`State`]. Each dispatch pass works on a copy: rules
//! write their findings (matched prefix, command arguments, regex groups) into
//! the copy and the handler reads them back. Nothing a rule writes leaks into
//! the matcher's stored state or into other matchers.

use std::collections::HashMap;
use std::collections::hash_map;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StateError, StateResult};

/// String-keyed map of JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    values: HashMap<String, Value>,
}

impl State {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Inserts a value (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value for `key` as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over all entries.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    /// Copies every entry of `other` into `self`, overwriting on conflict.
    pub fn merge(&mut self, other: &State) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Deserializes the value for `key`.
    ///
    /// A missing key is deserialized from `null`, so `Option<T>` fields come
    /// back as `None`; any other target type reports [`StateError::Missing`].
    pub fn extract<T: DeserializeOwned>(&self, key: &str) -> StateResult<T> {
        match self.values.get(key) {
            Some(value) => T::deserialize(value).map_err(|e| StateError::Mismatch {
                key: key.to_string(),
                reason: e.to_string(),
            }),
            None => T::deserialize(&Value::Null).map_err(|_| StateError::Missing {
                key: key.to_string(),
            }),
        }
    }

    /// Like [`extract`](Self::extract), but a missing key yields `T::default()`.
    pub fn extract_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> StateResult<T> {
        if self.values.contains_key(key) {
            self.extract(key)
        } else {
            Ok(T::default())
        }
    }

    /// Extracts a typed view of the whole state.
    pub fn parse<T: FromState>(&self) -> StateResult<T> {
        T::from_state(self)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Types that can be built from a [`State`].
///
/// Usually derived with `#[derive(FromState)]`.
pub trait FromState: Sized {
    /// Builds `Self` from the given state.
    fn from_state(state: &State) -> StateResult<Self>;
}

impl FromState for State {
    fn from_state(state: &State) -> StateResult<Self> {
        Ok(state.clone())
    }
}
