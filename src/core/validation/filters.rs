//! Reusable field value transforms
//!
//! These are used as `OnInit` / `OnUpdate` hooks on schema fields. Each
//! receives the current value (`None` when absent) and returns the new one.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Hook: set the current time, always overriding the previous value
pub fn now() -> impl Fn(Option<Value>) -> Option<Value> + Send + Sync + Clone {
    |_: Option<Value>| {
        Some(Value::String(
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ))
    }
}

/// Hook: generate a UUID v4 string when no value is set
pub fn new_id() -> impl Fn(Option<Value>) -> Option<Value> + Send + Sync + Clone {
    |value: Option<Value>| match value {
        Some(v) if !v.is_null() => Some(v),
        _ => Some(Value::String(Uuid::new_v4().to_string())),
    }
}

/// Hook: trim whitespace from string
pub fn trim() -> impl Fn(Option<Value>) -> Option<Value> + Send + Sync + Clone {
    |value: Option<Value>| match value {
        Some(Value::String(s)) => Some(Value::String(s.trim().to_string())),
        other => other,
    }
}

/// Hook: convert string to uppercase
pub fn uppercase() -> impl Fn(Option<Value>) -> Option<Value> + Send + Sync + Clone {
    |value: Option<Value>| match value {
        Some(Value::String(s)) => Some(Value::String(s.to_uppercase())),
        other => other,
    }
}

/// Hook: convert string to lowercase
pub fn lowercase() -> impl Fn(Option<Value>) -> Option<Value> + Send + Sync + Clone {
    |value: Option<Value>| match value {
        Some(Value::String(s)) => Some(Value::String(s.to_lowercase())),
        other => other,
    }
}
