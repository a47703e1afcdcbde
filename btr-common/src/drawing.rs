//! Drawing model types
//!
//! A drawing version is a set of geometric objects keyed by id. Versions are
//! parsed from the JSON arrays stored in the blob store; the diff engine
//! consumes them and produces a [`ChangeReport`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// One geometric element of a drawing (wall, door, window, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingObject {
    /// Identifier, unique within a version
    pub id: String,
    /// Open-ended type tag
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DrawingObject {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            x,
            y,
            width,
            height,
        }
    }
}

/// Complete snapshot of a drawing's objects, keyed by id
///
/// Iteration is in ascending id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawingVersion {
    objects: BTreeMap<String, DrawingObject>,
}

impl DrawingVersion {
    /// Create an empty version
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a version from objects; a repeated id keeps the last occurrence
    pub fn from_objects(objects: impl IntoIterator<Item = DrawingObject>) -> Self {
        let mut version = Self::new();
        for object in objects {
            if let Some(previous) = version.objects.insert(object.id.clone(), object) {
                warn!(id = %previous.id, "Duplicate object id in drawing version, keeping last");
            }
        }
        version
    }

    /// Parse a version from its JSON array form
    ///
    /// Returns `MalformedObject` if the payload is not an array or any element
    /// lacks a required field.
    pub fn from_json(value: &Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| {
            Error::MalformedObject(format!(
                "drawing version must be a JSON array, got {}",
                json_kind(value)
            ))
        })?;

        let objects = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                DrawingObject::deserialize(item)
                    .map_err(|e| Error::MalformedObject(format!("object at index {}: {}", index, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_objects(objects))
    }

    pub fn get(&self, id: &str) -> Option<&DrawingObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Object ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Objects in ascending id order
    pub fn objects(&self) -> impl Iterator<Item = &DrawingObject> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<DrawingObject> for DrawingVersion {
    fn from_iter<I: IntoIterator<Item = DrawingObject>>(iter: I) -> Self {
        Self::from_objects(iter)
    }
}

/// Human-readable description of differences between two versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub moved: Vec<String>,
    pub summary: String,
}

impl ChangeReport {
    /// True when no additions, removals or moves were found
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
