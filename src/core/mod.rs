//! Core module containing the fundamental types of a resource graph
//!
//! Leaf-first: fields and schemas, validation, the query language, items
//! and their fingerprints, the storage and hook capabilities, and the
//! request context every operation runs in.

pub mod context;
pub mod error;
pub mod etag;
pub mod field;
pub mod hooks;
pub mod item;
pub mod outcome;
pub mod projection;
pub mod query;
pub mod schema;
pub mod store;
pub mod validation;

pub use context::{CancelHandle, Context};
pub use error::{
    ConfigError, ErrorKind, FieldValidationError, GraphError, GraphResult, NotImplementedError,
    QueryError, ResourceError, StorageError, ValidationError,
};
pub use etag::Fingerprint;
pub use field::{Field, FieldFormat, FieldHandler, FieldKind, Param, ParamValues, Params, handler_fn};
pub use hooks::ResourceHook;
pub use item::{Item, ItemList};
pub use outcome::Outcome;
pub use projection::ProjectionField;
pub use query::{ListParams, PaginationMeta, Predicate, Query, Sort, Window};
pub use schema::{Schema, created_field, id_field, updated_field};
pub use store::{MultiGetter, Storer};
