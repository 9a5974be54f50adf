//! In-memory storage for testing and development
//!
//! Items are kept in insertion order. Every mutation takes the write lock
//! for its whole check-then-apply sequence, which gives the atomic batch
//! insert and the fingerprint compare-and-swap required by [`Storer`].

use crate::core::context::Context;
use crate::core::error::{GraphError, GraphResult, ResourceError, StorageError};
use crate::core::item::{Item, ItemList, id_key};
use crate::core::query::Query;
use crate::core::store::{MultiGetter, Storer, check_operators};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const BACKEND: &str = "memory";

/// In-memory storer
///
/// Clones share the same items. Uses RwLock for thread-safe access.
#[derive(Clone, Default)]
pub struct MemoryStorer {
    items: Arc<RwLock<IndexMap<String, Item>>>,
    refused: Vec<String>,
}

impl MemoryStorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare operators this storer refuses to evaluate
    pub fn without_operators(mut self, operators: &[&str]) -> Self {
        self.refused = operators.iter().map(|op| op.to_string()).collect();
        self
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored item, in storage order
    pub fn snapshot(&self) -> GraphResult<Vec<Item>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(&self) -> GraphResult<RwLockReadGuard<'_, IndexMap<String, Item>>> {
        self.items.read().map_err(|e| lock_error(e.to_string()))
    }

    fn write(&self) -> GraphResult<RwLockWriteGuard<'_, IndexMap<String, Item>>> {
        self.items.write().map_err(|e| lock_error(e.to_string()))
    }

    /// Check that `original` is still the stored version of its item
    fn check_current(items: &IndexMap<String, Item>, original: &Item) -> GraphResult<String> {
        let key = original.key();
        match items.get(&key) {
            Some(stored) if stored.etag == original.etag => Ok(key),
            Some(_) => {
                tracing::warn!(backend = BACKEND, id = %key, "fingerprint mismatch");
                Err(GraphError::conflict(BACKEND, &key))
            }
            None => Err(GraphError::not_found(BACKEND, &key)),
        }
    }
}

fn lock_error(message: String) -> GraphError {
    StorageError::Backend {
        backend: BACKEND.to_string(),
        message: format!("failed to acquire lock: {}", message),
    }
    .into()
}

fn check_ctx(ctx: &Context) -> GraphResult<()> {
    match ctx.err() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait]
impl Storer for MemoryStorer {
    async fn find(&self, ctx: &Context, query: &Query, want_total: bool) -> GraphResult<ItemList> {
        check_ctx(ctx)?;
        check_operators(BACKEND, query, &self.refused)?;

        let items = self.read()?;
        let mut matched: Vec<Item> = items
            .values()
            .filter(|item| query.predicate.matches(&item.payload))
            .cloned()
            .collect();
        drop(items);

        if !query.sort.is_empty() {
            matched.sort_by(|a, b| query.sort.compare(&a.payload, &b.payload));
        }
        let total = want_total.then_some(matched.len());
        Ok(ItemList::new(
            query.window.apply(matched),
            total,
            query.window.offset,
        ))
    }

    async fn insert(&self, ctx: &Context, new_items: &[Item]) -> GraphResult<()> {
        check_ctx(ctx)?;
        let mut items = self.write()?;

        let mut seen = std::collections::HashSet::new();
        for item in new_items {
            let key = item.key();
            if items.contains_key(&key) || !seen.insert(key.clone()) {
                return Err(ResourceError::AlreadyExists {
                    resource: BACKEND.to_string(),
                    id: key,
                }
                .into());
            }
        }
        for item in new_items {
            items.insert(item.key(), item.clone());
        }
        Ok(())
    }

    async fn update(&self, ctx: &Context, item: &Item, original: &Item) -> GraphResult<()> {
        check_ctx(ctx)?;
        if item.key() != original.key() {
            return Err(GraphError::Internal(format!(
                "cannot change item id from {} to {}",
                original.key(),
                item.key()
            )));
        }
        let mut items = self.write()?;
        let key = Self::check_current(&items, original)?;
        items.insert(key, item.clone());
        Ok(())
    }

    async fn delete(&self, ctx: &Context, item: &Item) -> GraphResult<()> {
        check_ctx(ctx)?;
        let mut items = self.write()?;
        let key = Self::check_current(&items, item)?;
        items.shift_remove(&key);
        Ok(())
    }

    async fn clear(&self, ctx: &Context, query: &Query) -> GraphResult<usize> {
        check_ctx(ctx)?;
        check_operators(BACKEND, query, &self.refused)?;
        let mut items = self.write()?;
        let before = items.len();
        items.retain(|_, item| !query.predicate.matches(&item.payload));
        Ok(before - items.len())
    }

    fn multi_getter(&self) -> Option<&dyn MultiGetter> {
        Some(self)
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

#[async_trait]
impl MultiGetter for MemoryStorer {
    async fn multi_get(&self, ctx: &Context, ids: &[Value]) -> GraphResult<Vec<Option<Item>>> {
        check_ctx(ctx)?;
        let items = self.read()?;
        Ok(ids.iter().map(|id| items.get(&id_key(id)).cloned()).collect())
    }
}
