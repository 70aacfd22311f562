//! Ordered attribute values shared by event payloads and snapshots.
//!
//! The runtime never interprets attribute contents; it only guarantees that
//! the order in which keys were inserted is the order in which they are
//! iterated, exported, and serialized. Deterministic ordering is what makes
//! snapshot output stable across runs.

use serde::{Deserialize, Serialize};

/// An opaque attribute value.
///
/// The variant set covers what domain nodes actually export: scalars, text,
/// and nested lists (positions, paths). Anything richer belongs in the
/// domain crate, encoded into these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric value, coercing integers to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        Self::List(value)
    }
}

/// An attribute was rejected while being applied to an entity.
///
/// Produced by [`Entity::set_attribute`](crate::entity::Entity::set_attribute)
/// during restore; accumulated into the restore report rather than aborting
/// the rebuild.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("attribute `{key}` rejected: {reason}")]
pub struct AttrError {
    pub key: String,
    pub reason: String,
}

impl AttrError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// An insertion-ordered key/value mapping.
///
/// Setting an existing key replaces its value in place, preserving the
/// original position. Lookup is linear; attribute sets are small (a handful
/// of keys per node or payload) and iteration order matters more than
/// lookup speed here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs {
    entries: Vec<(String, AttrValue)>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for literal payload construction.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts or replaces `key`. Replacement keeps the key's original
    /// position in the iteration order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, AttrValue)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        let mut attrs = Self::new();
        for (key, value) in iter {
            attrs.set(key, value);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let attrs = Attrs::new()
            .with("z", 1)
            .with("a", 2)
            .with("m", 3);
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut attrs = Attrs::new().with("x", 1).with("y", 2);
        attrs.set("x", 10);
        let entries: Vec<(&str, i64)> = attrs
            .iter()
            .map(|(k, v)| (k, v.as_i64().unwrap()))
            .collect();
        assert_eq!(entries, [("x", 10), ("y", 2)]);
    }

    #[test]
    fn typed_accessors() {
        let attrs = Attrs::new()
            .with("flag", true)
            .with("count", 3)
            .with("rate", 0.5)
            .with("label", "barn");
        assert_eq!(attrs.get("flag").and_then(AttrValue::as_bool), Some(true));
        assert_eq!(attrs.get("count").and_then(AttrValue::as_i64), Some(3));
        assert_eq!(attrs.get("count").and_then(AttrValue::as_f64), Some(3.0));
        assert_eq!(attrs.get("rate").and_then(AttrValue::as_f64), Some(0.5));
        assert_eq!(attrs.get("label").and_then(AttrValue::as_str), Some("barn"));
        assert!(attrs.get("missing").is_none());
    }

    #[test]
    fn json_round_trip() {
        let attrs = Attrs::new()
            .with("name", "well")
            .with("level", 4)
            .with(
                "position",
                vec![AttrValue::Float(1.5), AttrValue::Float(-2.0)],
            );
        let json = serde_json::to_string(&attrs).unwrap();
        let back: Attrs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
