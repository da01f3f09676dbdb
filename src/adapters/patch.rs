//! Merge patch documents sent to infrastructure resources

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Independently updatable facet of a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubResource {
    /// The main resource endpoint (`spec` and metadata)
    Spec,
    /// The `/status` sub-resource
    Status,
}

impl fmt::Display for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubResource::Spec => write!(f, "spec"),
            SubResource::Status => write!(f, "status"),
        }
    }
}

/// Ordered key/value tree used as a merge patch payload
#[derive(Clone, Debug, PartialEq)]
pub enum PatchValue {
    String(String),
    Integer(i64),
    Bool(bool),
    /// Keys are serialized in insertion order
    Object(Vec<(String, PatchValue)>),
}

impl PatchValue {
    /// Start an empty object
    pub fn object() -> Self {
        PatchValue::Object(Vec::new())
    }

    /// Append a field to an object; a no-op on scalar values
    pub fn field(mut self, key: impl Into<String>, value: impl Into<PatchValue>) -> Self {
        if let PatchValue::Object(ref mut fields) = self {
            fields.push((key.into(), value.into()));
        }
        self
    }

    /// Look up a nested value by path
    #[cfg(test)]
    pub fn get(&self, path: &[&str]) -> Option<&PatchValue> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            PatchValue::Object(fields) => fields
                .iter()
                .find(|(k, _)| k == head)
                .and_then(|(_, v)| v.get(rest)),
            _ => None,
        }
    }

    /// Encode into a JSON value suitable for `Patch::Merge`
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl From<&str> for PatchValue {
    fn from(v: &str) -> Self {
        PatchValue::String(v.to_string())
    }
}

impl From<String> for PatchValue {
    fn from(v: String) -> Self {
        PatchValue::String(v)
    }
}

impl From<i64> for PatchValue {
    fn from(v: i64) -> Self {
        PatchValue::Integer(v)
    }
}

impl From<bool> for PatchValue {
    fn from(v: bool) -> Self {
        PatchValue::Bool(v)
    }
}

impl Serialize for PatchValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PatchValue::String(s) => serializer.serialize_str(s),
            PatchValue::Integer(i) => serializer.serialize_i64(*i),
            PatchValue::Bool(b) => serializer.serialize_bool(*b),
            PatchValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// A single merge patch aimed at one sub-resource of the target
#[derive(Clone, Debug, PartialEq)]
pub struct PatchDocument {
    pub sub_resource: SubResource,
    pub body: PatchValue,
}

impl PatchDocument {
    /// Patch for the main resource
    pub fn spec(body: PatchValue) -> Self {
        Self {
            sub_resource: SubResource::Spec,
            body,
        }
    }

    /// Patch for the `/status` sub-resource
    pub fn status(body: PatchValue) -> Self {
        Self {
            sub_resource: SubResource::Status,
            body,
        }
    }
}
