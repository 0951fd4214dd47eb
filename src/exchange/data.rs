//! Normalized payload wrapper.

use std::ops::Deref;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Sequence view of an exchanged value, keeping the original as `raw`.
///
/// - `null` normalizes to an empty sequence
/// - an array normalizes to a fresh sequence with the same elements
/// - anything else normalizes to a one-element sequence
///
/// Normalizing the items of a `DataArray` again yields the same items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataArray {
    items: Vec<Value>,
    raw: Value,
}

impl DataArray {
    /// Empty data, as produced when an exchange closes before a reply.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalize a raw value.
    pub fn normalize(raw: Value) -> Self {
        let items = match &raw {
            Value::Null => Vec::new(),
            Value::Array(values) => values.clone(),
            other => vec![other.clone()],
        };
        Self { items, raw }
    }

    /// Normalized items.
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// The original, un-normalized value.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Consume into the normalized items.
    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl Deref for DataArray {
    type Target = [Value];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl From<Value> for DataArray {
    fn from(raw: Value) -> Self {
        Self::normalize(raw)
    }
}

impl From<DataArray> for Value {
    fn from(data: DataArray) -> Self {
        Value::Array(data.items)
    }
}

impl Serialize for DataArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}
