//! Resource lifecycle hooks
//!
//! Hooks are registered on a resource in order. "Before" hooks run before
//! the storage call and may modify its input or abort it with an error.
//! "After" hooks receive the [`Outcome`] of the operation and return the
//! outcome to pass on, so replacing an error or a result is an explicit
//! substitution.
//!
//! ```text
//! on_find ─▶ storage.find ─▶ on_found
//! on_get  ─▶ storage.find ─▶ on_got
//! on_insert ─▶ storage.insert ─▶ on_inserted
//! on_update ─▶ storage.update ─▶ on_updated
//! on_delete ─▶ storage.delete ─▶ on_deleted
//! on_clear ─▶ storage.clear ─▶ on_cleared
//! ```

use crate::core::context::Context;
use crate::core::error::GraphResult;
use crate::core::item::{Item, ItemList};
use crate::core::outcome::Outcome;
use crate::core::query::Query;
use async_trait::async_trait;
use serde_json::Value;

/// Hook into the operations of one resource; every method is optional
#[async_trait]
#[allow(unused_variables)]
pub trait ResourceHook: Send + Sync {
    async fn on_find(&self, ctx: &Context, resource: &str, query: &mut Query) -> GraphResult<()> {
        Ok(())
    }

    async fn on_found(
        &self,
        ctx: &Context,
        resource: &str,
        query: &Query,
        list: Outcome<ItemList>,
    ) -> Outcome<ItemList> {
        list
    }

    async fn on_get(&self, ctx: &Context, resource: &str, id: &Value) -> GraphResult<()> {
        Ok(())
    }

    async fn on_got(&self, ctx: &Context, resource: &str, item: Outcome<Item>) -> Outcome<Item> {
        item
    }

    /// Items may be modified; their fingerprint is recomputed afterwards
    async fn on_insert(&self, ctx: &Context, resource: &str, items: &mut Vec<Item>) -> GraphResult<()> {
        Ok(())
    }

    async fn on_inserted(
        &self,
        ctx: &Context,
        resource: &str,
        items: &[Item],
        result: Outcome<()>,
    ) -> Outcome<()> {
        result
    }

    /// The item may be modified; its fingerprint is recomputed afterwards
    async fn on_update(
        &self,
        ctx: &Context,
        resource: &str,
        item: &mut Item,
        original: &Item,
    ) -> GraphResult<()> {
        Ok(())
    }

    async fn on_updated(
        &self,
        ctx: &Context,
        resource: &str,
        item: &Item,
        original: &Item,
        result: Outcome<()>,
    ) -> Outcome<()> {
        result
    }

    async fn on_delete(&self, ctx: &Context, resource: &str, item: &Item) -> GraphResult<()> {
        Ok(())
    }

    async fn on_deleted(
        &self,
        ctx: &Context,
        resource: &str,
        item: &Item,
        result: Outcome<()>,
    ) -> Outcome<()> {
        result
    }

    async fn on_clear(&self, ctx: &Context, resource: &str, query: &mut Query) -> GraphResult<()> {
        Ok(())
    }

    async fn on_cleared(
        &self,
        ctx: &Context,
        resource: &str,
        query: &Query,
        deleted: Outcome<usize>,
    ) -> Outcome<usize> {
        deleted
    }
}
