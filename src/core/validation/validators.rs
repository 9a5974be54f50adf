//! Field validators
//!
//! A validator is a capability with one required operation (`validate`) and
//! optional `compile` and `serialize` steps. Validators are chosen when the
//! schema is declared; nothing inspects their concrete type at runtime.

use crate::core::field::{Field, FieldFormat, FieldKind};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::OnceLock;

/// Capability implemented by every field validator
pub trait FieldValidator: Send + Sync {
    /// Check a value and return the (possibly normalized) value to store
    fn validate(&self, value: Value) -> Result<Value, String>;

    /// Declared kind of the values this validator accepts
    fn kind(&self) -> FieldKind;

    /// Prepare internal state once, when the schema is compiled
    fn compile(&self) -> Result<(), String> {
        Ok(())
    }

    /// Transform a stored value before it is returned to a client
    fn serialize(&self, value: Value) -> Result<Value, String> {
        Ok(value)
    }

    /// Element definition for array validators
    fn element(&self) -> Option<&Field> {
        None
    }

    /// Referenced resource path for reference validators
    fn reference(&self) -> Option<&str> {
        None
    }
}

/// Validates strings: length, allowed values, pattern and format
#[derive(Debug, Clone, Default)]
pub struct StringValidator {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub allowed: Vec<String>,
    pub pattern: Option<String>,
    pub format: Option<FieldFormat>,
    compiled: OnceLock<Regex>,
}

impl StringValidator {
    pub fn min_len(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self.compiled = OnceLock::new();
        self
    }

    pub fn format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    fn regex(&self) -> Result<Option<&Regex>, String> {
        let Some(pattern) = &self.pattern else {
            return Ok(None);
        };
        if let Some(re) = self.compiled.get() {
            return Ok(Some(re));
        }
        let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
        Ok(Some(self.compiled.get_or_init(|| re)))
    }
}

impl FieldValidator for StringValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        let Some(s) = value.as_str() else {
            return Err("not a string".to_string());
        };
        let len = s.chars().count();
        if let Some(min) = self.min_len
            && len < min
        {
            return Err(format!("is shorter than {}", min));
        }
        if let Some(max) = self.max_len
            && len > max
        {
            return Err(format!("is longer than {}", max));
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|a| a == s) {
            return Err(format!("is not one of {:?}", self.allowed));
        }
        if let Some(re) = self.regex()?
            && !re.is_match(s)
        {
            return Err(format!("does not match {}", re.as_str()));
        }
        if let Some(format) = &self.format
            && !format.validate(s)
        {
            return Err(format!("is not a valid {}", format.name()));
        }
        Ok(value)
    }

    fn kind(&self) -> FieldKind {
        FieldKind::String
    }

    fn compile(&self) -> Result<(), String> {
        self.regex().map(|_| ())
    }
}

/// Validates integers within optional bounds
#[derive(Debug, Clone, Default)]
pub struct IntegerValidator {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub allowed: Vec<i64>,
}

impl IntegerValidator {
    pub fn range(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            allowed: Vec::new(),
        }
    }
}

impl FieldValidator for IntegerValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        let n = match value.as_i64() {
            Some(n) => n,
            // Accept 3.0 from clients that only send floats
            None => match value.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
                _ => return Err("not an integer".to_string()),
            },
        };
        if let Some(min) = self.min
            && n < min
        {
            return Err(format!("is lower than {}", min));
        }
        if let Some(max) = self.max
            && n > max
        {
            return Err(format!("is greater than {}", max));
        }
        if !self.allowed.is_empty() && !self.allowed.contains(&n) {
            return Err(format!("is not one of {:?}", self.allowed));
        }
        Ok(json!(n))
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Integer
    }
}

/// Validates floating point numbers within optional bounds
#[derive(Debug, Clone, Default)]
pub struct FloatValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl FieldValidator for FloatValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        let Some(n) = value.as_f64() else {
            return Err("not a number".to_string());
        };
        if let Some(min) = self.min
            && n < min
        {
            return Err(format!("is lower than {}", min));
        }
        if let Some(max) = self.max
            && n > max
        {
            return Err(format!("is greater than {}", max));
        }
        Ok(value)
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Float
    }
}

/// Validates booleans
#[derive(Debug, Clone, Default)]
pub struct BoolValidator;

impl FieldValidator for BoolValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        if value.is_boolean() {
            Ok(value)
        } else {
            Err("not a boolean".to_string())
        }
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Bool
    }
}

/// Validates RFC 3339 timestamps, normalized to UTC with millisecond precision
#[derive(Debug, Clone, Default)]
pub struct TimeValidator;

impl TimeValidator {
    fn normalize(value: &Value) -> Result<Value, String> {
        let Some(s) = value.as_str() else {
            return Err("not a time".to_string());
        };
        let dt = DateTime::parse_from_rfc3339(s).map_err(|_| "not a RFC3339 time".to_string())?;
        Ok(Value::String(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ))
    }
}

impl FieldValidator for TimeValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        Self::normalize(&value)
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Time
    }

    fn serialize(&self, value: Value) -> Result<Value, String> {
        Self::normalize(&value)
    }
}

/// Validates arrays; each element is checked against `values`
#[derive(Debug, Clone, Default)]
pub struct ArrayValidator {
    pub values: Field,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
}

impl ArrayValidator {
    pub fn new(values: Field) -> Self {
        Self {
            values,
            min_len: None,
            max_len: None,
        }
    }

    pub fn min_len(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }
}

impl FieldValidator for ArrayValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        let Value::Array(items) = value else {
            return Err("not an array".to_string());
        };
        if let Some(min) = self.min_len
            && items.len() < min
        {
            return Err(format!("has fewer than {} items", min));
        }
        if let Some(max) = self.max_len
            && items.len() > max
        {
            return Err(format!("has more than {} items", max));
        }
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let item = self
                .values
                .validate_value(&i.to_string(), item)
                .map_err(|errors| {
                    let msgs: Vec<String> = errors
                        .iter()
                        .map(|e| format!("{}: {}", e.field, e.message))
                        .collect();
                    format!("invalid value at {}", msgs.join(", "))
                })?;
            out.push(item);
        }
        Ok(Value::Array(out))
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Array
    }

    fn compile(&self) -> Result<(), String> {
        if let Some(v) = &self.values.validator {
            v.compile()?;
        }
        if let Some(schema) = &self.values.schema {
            schema.compile().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn serialize(&self, value: Value) -> Result<Value, String> {
        let (Value::Array(items), Some(v)) = (&value, &self.values.validator) else {
            return Ok(value);
        };
        items
            .iter()
            .map(|item| v.serialize(item.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn element(&self) -> Option<&Field> {
        Some(&self.values)
    }
}

/// Validates a reference to an item of another resource
#[derive(Debug, Clone)]
pub struct ReferenceValidator {
    /// Dotted path of the referenced resource (e.g. `users` or `users.posts`)
    pub path: String,
}

impl ReferenceValidator {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl FieldValidator for ReferenceValidator {
    fn validate(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::String(_) | Value::Number(_) => Ok(value),
            _ => Err(format!("not a valid reference to {}", self.path)),
        }
    }

    fn kind(&self) -> FieldKind {
        FieldKind::Reference
    }

    fn reference(&self) -> Option<&str> {
        Some(&self.path)
    }
}
