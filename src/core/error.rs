//! Typed error handling for the resource graph
//!
//! Every fallible operation in the crate returns a [`GraphError`]. The enum
//! groups errors by category so callers can match on the exact failure
//! instead of inspecting strings.
//!
//! # Error Categories
//!
//! - [`ValidationError`]: payload rejected by the schema
//! - [`QueryError`]: malformed or disallowed filter, sort or field selection
//! - [`ResourceError`]: missing items, fingerprint conflicts, mode gate rejections
//! - [`NotImplementedError`]: operators or capabilities a backend lacks, embedding limits
//! - [`StorageError`]: storage backend failures
//! - [`ConfigError`]: configuration and graph binding errors
//! - `Cancelled` / `Timeout`: derived from the request [`Context`](crate::core::Context)
//!
//! # Example
//!
//! ```rust,ignore
//! match host.update(&ctx, &["users", "u1"], payload, Some(&etag), None).await {
//!     Ok(item) => println!("new etag: {}", item.etag),
//!     Err(e) if e.kind() == ErrorKind::Conflict => println!("stale copy, refetch"),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type of the crate
#[derive(Debug, Clone)]
pub enum GraphError {
    /// Payload validation errors
    Validation(ValidationError),

    /// Filter, sort and projection errors
    Query(QueryError),

    /// Item and resource level errors
    Resource(ResourceError),

    /// Unsupported operator, capability or embedding shape
    NotImplemented(NotImplementedError),

    /// Storage backend errors
    Storage(StorageError),

    /// Configuration errors
    Config(ConfigError),

    /// The request context was cancelled by the caller
    Cancelled,

    /// The request deadline elapsed
    Timeout,

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

/// Coarse classification of a [`GraphError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    QueryParse,
    FieldNotFilterable,
    FieldNotSortable,
    MethodNotAllowed,
    NotFound,
    Conflict,
    NotImplemented,
    Cancelled,
    Timeout,
    Storage,
    Config,
    Internal,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Validation(e) => write!(f, "{}", e),
            GraphError::Query(e) => write!(f, "{}", e),
            GraphError::Resource(e) => write!(f, "{}", e),
            GraphError::NotImplemented(e) => write!(f, "{}", e),
            GraphError::Storage(e) => write!(f, "{}", e),
            GraphError::Config(e) => write!(f, "{}", e),
            GraphError::Cancelled => write!(f, "Request cancelled"),
            GraphError::Timeout => write!(f, "Request deadline exceeded"),
            GraphError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Validation(e) => Some(e),
            GraphError::Query(e) => Some(e),
            GraphError::Resource(e) => Some(e),
            GraphError::NotImplemented(e) => Some(e),
            GraphError::Storage(e) => Some(e),
            GraphError::Config(e) => Some(e),
            GraphError::Cancelled | GraphError::Timeout | GraphError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GraphError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Validation(_) => ErrorKind::Validation,
            GraphError::Query(e) => e.kind(),
            GraphError::Resource(e) => e.kind(),
            GraphError::NotImplemented(_) => ErrorKind::NotImplemented,
            GraphError::Storage(_) => ErrorKind::Storage,
            GraphError::Config(_) => ErrorKind::Config,
            GraphError::Cancelled => ErrorKind::Cancelled,
            GraphError::Timeout => ErrorKind::Timeout,
            GraphError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GraphError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GraphError::Query(_) => StatusCode::BAD_REQUEST,
            GraphError::Resource(e) => e.status_code(),
            GraphError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            GraphError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GraphError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // 499 Client Closed Request
            GraphError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
            GraphError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            GraphError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            GraphError::Validation(_) => "VALIDATION_ERROR",
            GraphError::Query(e) => e.error_code(),
            GraphError::Resource(e) => e.error_code(),
            GraphError::NotImplemented(e) => e.error_code(),
            GraphError::Storage(_) => "STORAGE_ERROR",
            GraphError::Config(_) => "CONFIG_ERROR",
            GraphError::Cancelled => "CANCELLED",
            GraphError::Timeout => "TIMEOUT",
            GraphError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GraphError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            GraphError::Resource(ResourceError::NotFound { resource, id }) => {
                Some(serde_json::json!({ "resource": resource, "id": id }))
            }
            GraphError::Resource(ResourceError::Conflict { resource, id })
            | GraphError::Resource(ResourceError::PreconditionFailed { resource, id }) => {
                Some(serde_json::json!({ "resource": resource, "id": id }))
            }
            _ => None,
        }
    }

    /// Shorthand for a [`ResourceError::NotFound`]
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        GraphError::Resource(ResourceError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        })
    }

    /// Shorthand for a [`ResourceError::Conflict`]
    pub fn conflict(resource: &str, id: impl fmt::Display) -> Self {
        GraphError::Resource(ResourceError::Conflict {
            resource: resource.to_string(),
            id: id.to_string(),
        })
    }

    /// Shorthand for a [`QueryError::Parse`]
    pub fn query_parse(field: Option<&str>, message: impl Into<String>) -> Self {
        GraphError::Query(QueryError::Parse {
            field: field.map(str::to_string),
            message: message.into(),
        })
    }
}

impl IntoResponse for GraphError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to payload validation
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// One or more fields failed validation
    FieldErrors(Vec<FieldValidationError>),

    /// The payload is not a JSON object
    InvalidJson { message: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ValidationError {
    /// Messages reported for a given field
    pub fn messages_for(&self, field: &str) -> Vec<&str> {
        match self {
            ValidationError::FieldErrors(errors) => errors
                .iter()
                .filter(|e| e.field == field)
                .map(|e| e.message.as_str())
                .collect(),
            ValidationError::InvalidJson { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for GraphError {
    fn from(err: ValidationError) -> Self {
        GraphError::Validation(err)
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors related to filters, sorts and field selections
#[derive(Debug, Clone)]
pub enum QueryError {
    /// Malformed expression, unknown field or illegal operator
    Parse {
        field: Option<String>,
        message: String,
    },

    /// Field used in a filter is not filterable
    FieldNotFilterable { field: String },

    /// Field used in a sort is not sortable
    FieldNotSortable { field: String },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Parse { .. } => ErrorKind::QueryParse,
            QueryError::FieldNotFilterable { .. } => ErrorKind::FieldNotFilterable,
            QueryError::FieldNotSortable { .. } => ErrorKind::FieldNotSortable,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::Parse { .. } => "QUERY_PARSE_ERROR",
            QueryError::FieldNotFilterable { .. } => "FIELD_NOT_FILTERABLE",
            QueryError::FieldNotSortable { .. } => "FIELD_NOT_SORTABLE",
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Parse {
                field: Some(field),
                message,
            } => write!(f, "Invalid query on '{}': {}", field, message),
            QueryError::Parse {
                field: None,
                message,
            } => write!(f, "Invalid query: {}", message),
            QueryError::FieldNotFilterable { field } => {
                write!(f, "Field '{}' is not filterable", field)
            }
            QueryError::FieldNotSortable { field } => {
                write!(f, "Field '{}' is not sortable", field)
            }
        }
    }
}

impl std::error::Error for QueryError {}

impl From<QueryError> for GraphError {
    fn from(err: QueryError) -> Self {
        GraphError::Query(err)
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors related to items and resource nodes
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Item was not found
    NotFound { resource: String, id: String },

    /// Stored fingerprint differs from the expected one
    Conflict { resource: String, id: String },

    /// Client supplied fingerprint does not match the stored item
    PreconditionFailed { resource: String, id: String },

    /// An item with the same identity already exists
    AlreadyExists { resource: String, id: String },

    /// Mode is not in the resource's allowed modes
    MethodNotAllowed { resource: String, mode: String },

    /// Path does not resolve to a bound resource
    RouteNotFound { path: String },
}

impl ResourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::NotFound { .. } | ResourceError::RouteNotFound { .. } => {
                ErrorKind::NotFound
            }
            ResourceError::Conflict { .. }
            | ResourceError::PreconditionFailed { .. }
            | ResourceError::AlreadyExists { .. } => ErrorKind::Conflict,
            ResourceError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::Conflict { .. } => StatusCode::CONFLICT,
            ResourceError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            ResourceError::AlreadyExists { .. } => StatusCode::CONFLICT,
            ResourceError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ResourceError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "ITEM_NOT_FOUND",
            ResourceError::Conflict { .. } => "CONFLICT",
            ResourceError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            ResourceError::AlreadyExists { .. } => "ITEM_ALREADY_EXISTS",
            ResourceError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ResourceError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound { resource, id } => {
                write!(f, "{} with id '{}' not found", resource, id)
            }
            ResourceError::Conflict { resource, id } => {
                write!(f, "{} with id '{}' was modified concurrently", resource, id)
            }
            ResourceError::PreconditionFailed { resource, id } => {
                write!(
                    f,
                    "{} with id '{}' does not match the supplied fingerprint",
                    resource, id
                )
            }
            ResourceError::AlreadyExists { resource, id } => {
                write!(f, "{} with id '{}' already exists", resource, id)
            }
            ResourceError::MethodNotAllowed { resource, mode } => {
                write!(f, "Mode '{}' not allowed on {}", mode, resource)
            }
            ResourceError::RouteNotFound { path } => {
                write!(f, "No resource bound at '{}'", path)
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for GraphError {
    fn from(err: ResourceError) -> Self {
        GraphError::Resource(err)
    }
}

// =============================================================================
// Not Implemented Errors
// =============================================================================

/// Errors for operators, capabilities or shapes the system refuses to evaluate
#[derive(Debug, Clone)]
pub enum NotImplementedError {
    /// The storage backend cannot evaluate a query operator natively
    Operator { backend: String, operator: String },

    /// The storage backend lacks a capability
    Capability { backend: String, capability: String },

    /// Projection nests deeper than the configured maximum
    DepthExceeded { max_depth: usize },

    /// Projection re-enters a resource already on the active embedding path
    EmbeddingCycle { path: String },
}

impl NotImplementedError {
    pub fn error_code(&self) -> &'static str {
        match self {
            NotImplementedError::Operator { .. } => "OPERATOR_NOT_IMPLEMENTED",
            NotImplementedError::Capability { .. } => "CAPABILITY_NOT_IMPLEMENTED",
            NotImplementedError::DepthExceeded { .. } => "EMBEDDING_DEPTH_EXCEEDED",
            NotImplementedError::EmbeddingCycle { .. } => "EMBEDDING_CYCLE",
        }
    }
}

impl fmt::Display for NotImplementedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotImplementedError::Operator { backend, operator } => {
                write!(f, "Operator {} not implemented by {}", operator, backend)
            }
            NotImplementedError::Capability {
                backend,
                capability,
            } => {
                write!(f, "{} does not support {}", backend, capability)
            }
            NotImplementedError::DepthExceeded { max_depth } => {
                write!(f, "Embedding depth exceeded (max {})", max_depth)
            }
            NotImplementedError::EmbeddingCycle { path } => {
                write!(f, "Embedding cycle detected: {}", path)
            }
        }
    }
}

impl std::error::Error for NotImplementedError {}

impl From<NotImplementedError> for GraphError {
    fn from(err: NotImplementedError) -> Self {
        GraphError::NotImplemented(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Query or command failed in the backend
    Backend { backend: String, message: String },

    /// Backend not available
    Unavailable { backend: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend { backend, message } => {
                write!(f, "{} error: {}", backend, message)
            }
            StorageError::Unavailable { backend } => {
                write!(f, "Storage backend '{}' is unavailable", backend)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for GraphError {
    fn from(err: StorageError) -> Self {
        GraphError::Storage(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration and graph binding
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Failed to parse configuration
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Schema failed to compile
    InvalidSchema { field: String, message: String },

    /// Resource binding rejected
    InvalidBinding { resource: String, message: String },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::InvalidSchema { field, message } => {
                write!(f, "Invalid schema field '{}': {}", field, message)
            }
            ConfigError::InvalidBinding { resource, message } => {
                write!(f, "Cannot bind resource '{}': {}", resource, message)
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for GraphError {
    fn from(err: ConfigError) -> Self {
        GraphError::Config(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for GraphError {
    fn from(err: std::io::Error) -> Self {
        GraphError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for GraphError {
    fn from(err: serde_yaml::Error) -> Self {
        GraphError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for resource graph operations
pub type GraphResult<T> = Result<T, GraphError>;
