//! # resgraph
//!
//! A resource graph over pluggable storage: schema validation, a filter
//! language, projections with embedding, and optimistic concurrency keyed
//! on a content fingerprint.
//!
//! ## Features
//!
//! - **Schemas**: ordered fields with validators, defaults, init/update
//!   transforms, read-only and hidden flags, and dependency predicates
//! - **Filters**: `$in`, `$nin`, `$lt`..`$gte`, `$exists`, `$regex`,
//!   `$elemMatch`, `$and` and `$or`, checked against the schema
//! - **Sub-resources**: items scoped to a parent item through a link field
//! - **Projections**: aliases, parameterized field handlers, references and
//!   sub-resource lists embedded on demand, resolved concurrently
//! - **Concurrency control**: every write is a compare-and-swap on the
//!   item fingerprint
//! - **Cancellation**: a request [`Context`](core::Context) carries the
//!   cancel signal, the deadline and the tracing span end to end
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resgraph::prelude::*;
//!
//! let mut graph = ResourceGraph::new();
//! graph
//!     .bind(
//!         "users",
//!         Schema::new()
//!             .field("id", id_field())
//!             .field("name", Field::new().required().with_validator(StringValidator::default())),
//!         Arc::new(MemoryStorer::new()),
//!         Conf::default(),
//!     )?
//!     .bind(
//!         "posts",
//!         "user",
//!         Schema::new()
//!             .field("id", id_field())
//!             .field("user", Field::new().filterable().with_validator(ReferenceValidator::new("users")))
//!             .field("title", Field::new().sortable()),
//!         Arc::new(MemoryStorer::new()),
//!         Conf::default(),
//!     )?;
//!
//! let host = GraphHost::new(graph, GraphConfig::default())?;
//! let ctx = Context::new().with_timeout(Duration::from_secs(5));
//! let posts = host
//!     .list(&ctx, &["users", "u1", "posts"], &ListParams::default())
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod graph;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        CancelHandle, Context, ErrorKind, Field, FieldFormat, FieldHandler, Fingerprint,
        GraphError, GraphResult, Item, ItemList, ListParams, MultiGetter, Outcome, Param,
        ParamValues, Params, Predicate, ProjectionField, Query, ResourceHook, Schema, Sort,
        Storer, Window, created_field, handler_fn, id_field, updated_field,
    };
    pub use crate::core::validation::{
        ArrayValidator, BoolValidator, FieldValidator, FloatValidator, IntegerValidator,
        ReferenceValidator, StringValidator, TimeValidator, filters,
    };

    // === Graph ===
    pub use crate::graph::{Conf, Mode, Resolver, Resource, ResourceGraph, TotalPolicy};

    // === Storage ===
    pub use crate::storage::MemoryStorer;

    // === Config ===
    pub use crate::config::{GraphConfig, ResolverConfig};

    // === Server ===
    pub use crate::server::{GraphHost, ItemResponse, ListResponse};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::{Map, Value, json};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
