//! Stored items and item lists

use crate::core::error::{FieldValidationError, GraphResult, ValidationError};
use crate::core::etag::Fingerprint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A stored payload with its identity, fingerprint and timestamps
///
/// Items are values: nothing mutates an item returned by storage. A
/// modification builds a new item and hands the original along so storage
/// can compare fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: Value,
    pub etag: Fingerprint,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

impl Item {
    /// Build an item from a validated payload.
    ///
    /// The payload must carry a non-null `id`. `created` and `updated` are
    /// read from the payload when present, otherwise set to now.
    pub fn new(payload: Map<String, Value>) -> GraphResult<Self> {
        let id = match payload.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                return Err(ValidationError::FieldErrors(vec![FieldValidationError::new(
                    "id", "required",
                )])
                .into());
            }
        };
        let now = Utc::now();
        let created = timestamp(&payload, "created").unwrap_or(now);
        let updated = timestamp(&payload, "updated").unwrap_or(now);
        Ok(Self {
            id,
            etag: Fingerprint::of(&payload),
            created,
            updated,
            payload,
        })
    }

    /// Identifier rendered as a string key
    pub fn key(&self) -> String {
        id_key(&self.id)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}

/// Storage key of an identifier value (`"u1"` and `u1` are the same key)
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timestamp(payload: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Ordered page of items returned by a find
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemList {
    pub items: Vec<Item>,
    /// Total matching items, when computed
    pub total: Option<usize>,
    /// Offset applied to produce `items`
    pub offset: usize,
}

impl ItemList {
    pub fn new(items: Vec<Item>, total: Option<usize>, offset: usize) -> Self {
        Self {
            items,
            total,
            offset,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
