//! Schema: the ordered set of fields a resource accepts
//!
//! A schema drives the whole mutation path:
//!
//! ```text
//! payload ──▶ prepare() ──▶ (changes, base) ──▶ validate() ──▶ document
//!             defaults        read-only check     validators
//!             OnInit/OnUpdate                     required / unknown fields
//!                                                 dependencies
//! ```
//!
//! Schemas are immutable once bound to a resource and are shared across
//! requests without locking.

use crate::core::error::{ConfigError, FieldValidationError, GraphError, GraphResult, ValidationError};
use crate::core::field::Field;
use crate::core::query::values_equal;
use crate::core::validation::filters;
use crate::core::validation::{StringValidator, TimeValidator};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

/// Ordered mapping of field name to field definition
#[derive(Clone, Default)]
pub struct Schema {
    /// Informational only
    pub description: String,
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Add (or replace) a field
    pub fn field(mut self, name: &str, field: Field) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Top-level field by name
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Field by dotted path, descending into sub-schemas
    pub fn get_field(&self, path: &str) -> Option<&Field> {
        match path.split_once('.') {
            None => self.fields.get(path),
            Some((head, rest)) => self.fields.get(head)?.sub_schema()?.get_field(rest),
        }
    }

    /// Compile validators, nested schemas, parameters and dependencies
    pub fn compile(&self) -> GraphResult<()> {
        for (name, field) in &self.fields {
            let invalid = |message: String| {
                GraphError::Config(ConfigError::InvalidSchema {
                    field: name.clone(),
                    message,
                })
            };
            if let Some(v) = &field.validator {
                v.compile().map_err(invalid)?;
            }
            if let Some(schema) = &field.schema {
                schema.compile()?;
            }
            if let Some(params) = &field.params {
                for (param, def) in &params.definitions {
                    if let Some(v) = &def.validator {
                        v.compile()
                            .map_err(|msg| invalid(format!("parameter '{}': {}", param, msg)))?;
                    }
                }
            }
            field.dependency_predicate(name, self)?;
        }
        Ok(())
    }

    /// Build the change set and the base document for validation.
    ///
    /// - creation (`original` is `None`): defaults then `OnInit` hooks;
    /// - modification: client changes of read-only fields are rejected,
    ///   `replace` turns every field missing from the payload into a removal
    ///   (read-only fields are carried over), then `OnUpdate` hooks run.
    pub fn prepare(
        &self,
        payload: &Map<String, Value>,
        original: Option<&Map<String, Value>>,
        replace: bool,
    ) -> GraphResult<(Map<String, Value>, Map<String, Value>)> {
        let mut changes = payload.clone();

        let Some(original) = original else {
            for (name, field) in &self.fields {
                if !changes.contains_key(name)
                    && let Some(default) = &field.default
                {
                    changes.insert(name.clone(), default.clone());
                }
                if let Some(hook) = &field.on_init {
                    let value = hook(changes.get(name).cloned());
                    apply_hook(&mut changes, name, value);
                }
            }
            return Ok((changes, Map::new()));
        };

        let mut errors = Vec::new();
        for (name, value) in payload {
            if let Some(field) = self.fields.get(name)
                && field.read_only
                && !original.get(name).is_some_and(|o| values_equal(o, value))
            {
                errors.push(FieldValidationError::new(name, "read-only"));
            }
        }
        if !errors.is_empty() {
            return Err(ValidationError::FieldErrors(errors).into());
        }

        if replace {
            for (name, value) in original {
                if changes.contains_key(name) {
                    continue;
                }
                let replacement = match self.fields.get(name) {
                    Some(field) if field.read_only => value.clone(),
                    Some(field) => field.default.clone().unwrap_or(Value::Null),
                    None => Value::Null,
                };
                changes.insert(name.clone(), replacement);
            }
        }

        for (name, field) in &self.fields {
            if let Some(hook) = &field.on_update {
                let current = match changes.get(name) {
                    Some(Value::Null) => None,
                    Some(v) => Some(v.clone()),
                    None => original.get(name).cloned(),
                };
                apply_hook(&mut changes, name, hook(current));
            }
        }

        Ok((changes, original.clone()))
    }

    /// Merge `changes` over `base` and validate the resulting document
    pub fn validate(
        &self,
        changes: &Map<String, Value>,
        base: &Map<String, Value>,
    ) -> GraphResult<Map<String, Value>> {
        self.validate_fields(changes, base)
            .map_err(|errors| ValidationError::FieldErrors(errors).into())
    }

    pub(crate) fn validate_fields(
        &self,
        changes: &Map<String, Value>,
        base: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<FieldValidationError>> {
        let mut errors = Vec::new();

        for (name, field) in &self.fields {
            if !field.required {
                continue;
            }
            let missing = match changes.get(name) {
                Some(Value::Null) => true,
                Some(_) => false,
                None => base.get(name).is_none_or(Value::is_null),
            };
            if missing {
                errors.push(FieldValidationError::new(name, "required"));
            }
        }

        let mut doc = base.clone();
        for (name, value) in changes {
            if value.is_null() {
                doc.shift_remove(name);
            } else {
                doc.insert(name.clone(), value.clone());
            }
        }

        let mut validated = Map::new();
        for (name, value) in doc {
            let Some(field) = self.fields.get(&name) else {
                errors.push(FieldValidationError::new(&name, "invalid field"));
                continue;
            };
            match field.validate_value(&name, value) {
                Ok(value) => {
                    validated.insert(name, value);
                }
                Err(field_errors) => errors.extend(field_errors),
            }
        }

        for (name, value) in changes {
            if value.is_null() {
                continue;
            }
            let Some(field) = self.fields.get(name) else {
                continue;
            };
            match field.dependency_predicate(name, self) {
                Ok(Some(predicate)) if !predicate.matches(&validated) => {
                    errors.push(FieldValidationError::new(
                        name,
                        "does not match dependency",
                    ));
                }
                Ok(_) => {}
                Err(e) => errors.push(FieldValidationError::new(name, e.to_string())),
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }
}

fn apply_hook(changes: &mut Map<String, Value>, name: &str, value: Option<Value>) {
    match value {
        Some(v) => {
            changes.insert(name.to_string(), v);
        }
        None => {
            changes.shift_remove(name);
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("description", &self.description)
            .field("fields", &self.fields)
            .finish()
    }
}

/// `id` field: required, read-only, filterable and sortable, generated on creation
pub fn id_field() -> Field {
    Field::new()
        .required()
        .read_only()
        .filterable()
        .sortable()
        .with_on_init(filters::new_id())
        .with_validator(StringValidator::default())
}

/// `created` field: read-only timestamp set on creation
pub fn created_field() -> Field {
    Field::new()
        .required()
        .read_only()
        .filterable()
        .sortable()
        .with_on_init(filters::now())
        .with_validator(TimeValidator)
}

/// `updated` field: read-only timestamp refreshed on every modification
pub fn updated_field() -> Field {
    Field::new()
        .required()
        .read_only()
        .filterable()
        .sortable()
        .with_on_init(filters::now())
        .with_on_update(filters::now())
        .with_validator(TimeValidator)
}
