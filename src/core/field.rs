//! Field definitions, field kinds and parameter handlers

use crate::core::context::Context;
use crate::core::error::{FieldValidationError, GraphError, GraphResult, QueryError};
use crate::core::query::Predicate;
use crate::core::schema::Schema;
use crate::core::validation::FieldValidator;
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Transform applied to a field value on creation or modification.
///
/// Receives the current value (`None` when absent) and returns the new one
/// (`None` removes the field).
pub type FieldHook = Arc<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

/// Parameters passed to a field handler, already validated
pub type ParamValues = IndexMap<String, Value>;

/// Declared type family of a field, used to check operator legality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Any,
    String,
    Integer,
    Float,
    Bool,
    Time,
    Array,
    Object,
    Reference,
}

impl FieldKind {
    /// Whether `$lt`, `$lte`, `$gt` and `$gte` may target this kind
    pub fn is_comparable(self) -> bool {
        matches!(
            self,
            FieldKind::Any | FieldKind::Integer | FieldKind::Float | FieldKind::Time
        )
    }

    /// Whether `$regex` may target this kind
    pub fn accepts_regex(self) -> bool {
        matches!(self, FieldKind::Any | FieldKind::String)
    }
}

/// Field format validators for string fields
#[derive(Debug, Clone)]
pub enum FieldFormat {
    Email,
    Uuid,
    Url,
    Phone,
    Custom(Regex),
}

impl FieldFormat {
    /// Validate a string against this format
    pub fn validate(&self, value: &str) -> bool {
        match self {
            FieldFormat::Email => Self::is_valid_email(value),
            FieldFormat::Uuid => Uuid::parse_str(value).is_ok(),
            FieldFormat::Url => Self::is_valid_url(value),
            FieldFormat::Phone => Self::is_valid_phone(value),
            FieldFormat::Custom(regex) => regex.is_match(value),
        }
    }

    /// Name used in validation messages
    pub fn name(&self) -> &str {
        match self {
            FieldFormat::Email => "email",
            FieldFormat::Uuid => "uuid",
            FieldFormat::Url => "url",
            FieldFormat::Phone => "phone",
            FieldFormat::Custom(regex) => regex.as_str(),
        }
    }

    fn is_valid_email(email: &str) -> bool {
        static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = EMAIL_REGEX.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
        });
        regex.is_match(email)
    }

    fn is_valid_url(url: &str) -> bool {
        static URL_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = URL_REGEX.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap());
        regex.is_match(url)
    }

    fn is_valid_phone(phone: &str) -> bool {
        static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = PHONE_REGEX.get_or_init(|| {
            // At least 8 digits, max 15 (E.164 standard)
            Regex::new(r"^\+?[1-9]\d{7,14}$").unwrap()
        });
        regex.is_match(phone)
    }
}

/// Handler transforming a field value according to projection parameters
///
/// Handlers may suspend (they run inside the request [`Context`]), but must
/// not mutate shared state: they receive a value and return a new one.
#[async_trait]
pub trait FieldHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, value: Value, params: &ParamValues)
    -> Result<Value, String>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> FieldHandler for FnHandler<F>
where
    F: Fn(Value, &ParamValues) -> Result<Value, String> + Send + Sync,
{
    async fn handle(
        &self,
        _ctx: &Context,
        value: Value,
        params: &ParamValues,
    ) -> Result<Value, String> {
        (self.0)(value, params)
    }
}

/// Wrap a synchronous closure as a [`FieldHandler`]
pub fn handler_fn<F>(f: F) -> Arc<dyn FieldHandler>
where
    F: Fn(Value, &ParamValues) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// A single declared field parameter
#[derive(Clone, Default)]
pub struct Param {
    pub description: String,
    pub validator: Option<Arc<dyn FieldValidator>>,
}

impl Param {
    pub fn new(validator: impl FieldValidator + 'static) -> Self {
        Self {
            description: String::new(),
            validator: Some(Arc::new(validator)),
        }
    }
}

/// Parameter set accepted by a field in a projection, with its handler
#[derive(Clone)]
pub struct Params {
    pub definitions: IndexMap<String, Param>,
    pub handler: Arc<dyn FieldHandler>,
}

impl Params {
    pub fn new(handler: Arc<dyn FieldHandler>) -> Self {
        Self {
            definitions: IndexMap::new(),
            handler,
        }
    }

    pub fn param(mut self, name: &str, param: Param) -> Self {
        self.definitions.insert(name.to_string(), param);
        self
    }

    /// Validate raw projection parameters against the declared set
    pub fn validate(&self, field: &str, raw: &ParamValues) -> GraphResult<ParamValues> {
        let mut out = ParamValues::new();
        for (name, value) in raw {
            let Some(def) = self.definitions.get(name) else {
                return Err(GraphError::query_parse(
                    Some(field),
                    format!("unsupported parameter '{}'", name),
                ));
            };
            let value = match &def.validator {
                Some(v) => v.validate(value.clone()).map_err(|msg| {
                    GraphError::query_parse(
                        Some(field),
                        format!("invalid parameter '{}': {}", name, msg),
                    )
                })?,
                None => value.clone(),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}

/// Definition of a single schema field
#[derive(Clone, Default)]
pub struct Field {
    pub description: String,
    pub required: bool,
    pub read_only: bool,
    pub hidden: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub default: Option<Value>,
    pub on_init: Option<FieldHook>,
    pub on_update: Option<FieldHook>,
    /// Filter the resulting document must match for this field to be set
    pub dependency: Option<Value>,
    pub validator: Option<Arc<dyn FieldValidator>>,
    /// Nested sub-schema for object values
    pub schema: Option<Schema>,
    pub params: Option<Params>,
    compiled_dependency: OnceLock<Predicate>,
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_on_init(
        mut self,
        hook: impl Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.on_init = Some(Arc::new(hook));
        self
    }

    pub fn with_on_update(
        mut self,
        hook: impl Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(hook));
        self
    }

    pub fn with_dependency(mut self, filter: Value) -> Self {
        self.dependency = Some(filter);
        self.compiled_dependency = OnceLock::new();
        self
    }

    pub fn with_validator(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    /// Declared kind of the field
    pub fn kind(&self) -> FieldKind {
        match (&self.validator, &self.schema) {
            (Some(v), _) => v.kind(),
            (None, Some(_)) => FieldKind::Object,
            (None, None) => FieldKind::Any,
        }
    }

    /// Sub-schema of an object field
    pub fn sub_schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Element definition of an array field
    pub fn element(&self) -> Option<&Field> {
        self.validator.as_ref().and_then(|v| v.element())
    }

    /// Resource path referenced by this field (or by its array elements)
    pub fn reference(&self) -> Option<&str> {
        self.validator
            .as_ref()
            .and_then(|v| v.reference())
            .or_else(|| self.element().and_then(|e| e.reference()))
    }

    /// Validate a value for this field, recursing into the sub-schema
    pub fn validate_value(&self, name: &str, value: Value) -> Result<Value, Vec<FieldValidationError>> {
        let value = match &self.validator {
            Some(v) => v
                .validate(value)
                .map_err(|msg| vec![FieldValidationError::new(name, msg)])?,
            None => value,
        };
        let Some(schema) = &self.schema else {
            return Ok(value);
        };
        let Value::Object(obj) = value else {
            return Err(vec![FieldValidationError::new(name, "not an object")]);
        };
        schema
            .validate_fields(&obj, &serde_json::Map::new())
            .map(Value::Object)
            .map_err(|errors| {
                errors
                    .into_iter()
                    .map(|e| FieldValidationError::new(format!("{}.{}", name, e.field), e.message))
                    .collect()
            })
    }

    /// Serialize a stored value for output
    pub fn serialize(&self, name: &str, value: Value) -> GraphResult<Value> {
        match &self.validator {
            Some(v) => v.serialize(value).map_err(|msg| {
                GraphError::Internal(format!("cannot serialize field '{}': {}", name, msg))
            }),
            None => Ok(value),
        }
    }

    /// Compiled dependency predicate, parsed against the enclosing schema
    pub(crate) fn dependency_predicate(
        &self,
        name: &str,
        schema: &Schema,
    ) -> GraphResult<Option<&Predicate>> {
        let Some(filter) = &self.dependency else {
            return Ok(None);
        };
        if let Some(predicate) = self.compiled_dependency.get() {
            return Ok(Some(predicate));
        }
        let predicate = Predicate::parse_lenient(filter, schema).map_err(|e| {
            let message = match e {
                GraphError::Query(QueryError::Parse { message, .. }) => message,
                other => other.to_string(),
            };
            GraphError::Config(crate::core::error::ConfigError::InvalidSchema {
                field: name.to_string(),
                message: format!("invalid dependency: {}", message),
            })
        })?;
        Ok(Some(self.compiled_dependency.get_or_init(|| predicate)))
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind())
            .field("required", &self.required)
            .field("read_only", &self.read_only)
            .field("hidden", &self.hidden)
            .field("filterable", &self.filterable)
            .field("sortable", &self.sortable)
            .field("default", &self.default)
            .field("dependency", &self.dependency)
            .field("schema", &self.schema)
            .field("params", &self.params.as_ref().map(|p| p.definitions.keys().collect::<Vec<_>>()))
            .finish()
    }
}
