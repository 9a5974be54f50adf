//! Storage collaborator contract
//!
//! A [`Storer`] persists the items of one resource. The graph is agnostic to
//! the backend: it hands over queries made of a [`Predicate`], a [`Sort`] and
//! a [`Window`] and expects storage to honor them exactly.
//!
//! Implementations must follow these rules:
//!
//! - a predicate using an operator the backend cannot evaluate fails the
//!   call with [`NotImplementedError::Operator`] instead of ignoring it;
//! - `insert` stores the whole batch or nothing, and rejects an id that is
//!   already stored;
//! - `update` and `delete` compare the stored fingerprint with the one of
//!   the original item and leave storage untouched on mismatch, returning a
//!   conflict;
//! - every call honors the [`Context`] it receives.
//!
//! [`Predicate`]: crate::core::query::Predicate
//! [`Sort`]: crate::core::query::Sort
//! [`Window`]: crate::core::query::Window

use crate::core::context::Context;
use crate::core::error::{GraphResult, NotImplementedError};
use crate::core::item::{Item, ItemList};
use crate::core::query::Query;
use async_trait::async_trait;
use serde_json::Value;

/// Persistence of the items of one resource
#[async_trait]
pub trait Storer: Send + Sync {
    /// Items matching the query, in query order, within its window.
    ///
    /// `total` is the count of matching items before the window; a
    /// backend may leave it empty when `want_total` is false.
    async fn find(&self, ctx: &Context, query: &Query, want_total: bool) -> GraphResult<ItemList>;

    /// Store new items atomically
    async fn insert(&self, ctx: &Context, items: &[Item]) -> GraphResult<()>;

    /// Replace `original` with `item` if the stored fingerprint still matches
    async fn update(&self, ctx: &Context, item: &Item, original: &Item) -> GraphResult<()>;

    /// Remove `item` if the stored fingerprint still matches
    async fn delete(&self, ctx: &Context, item: &Item) -> GraphResult<()>;

    /// Remove every item matching the query predicate, returning the count
    async fn clear(&self, ctx: &Context, query: &Query) -> GraphResult<usize>;

    /// Bulk lookup capability, when the backend has one
    fn multi_getter(&self) -> Option<&dyn MultiGetter> {
        None
    }

    /// Name used in logs and errors
    fn name(&self) -> &str {
        "storage"
    }
}

/// Optional bulk lookup by identifiers
#[async_trait]
pub trait MultiGetter: Send + Sync {
    /// Items for `ids`, in the same order; `None` where an id is unknown
    async fn multi_get(&self, ctx: &Context, ids: &[Value]) -> GraphResult<Vec<Option<Item>>>;
}

/// Fail with [`NotImplementedError::Operator`] when `query` uses one of `refused`
pub fn check_operators(backend: &str, query: &Query, refused: &[String]) -> GraphResult<()> {
    match query
        .predicate
        .operators()
        .into_iter()
        .find(|op| refused.iter().any(|r| r == op))
    {
        Some(op) => {
            tracing::warn!(backend = %backend, operator = %op, "operator not implemented");
            Err(NotImplementedError::Operator {
                backend: backend.to_string(),
                operator: op.to_string(),
            }
            .into())
        }
        None => Ok(()),
    }
}
