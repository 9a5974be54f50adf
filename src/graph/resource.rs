//! Resource nodes
//!
//! A [`Resource`] binds a name to a schema, a storage collaborator, a
//! configuration and an ordered list of hooks. Sub-resources are bound on
//! their parent with the name of the field linking them to it.
//!
//! Every operation passes the mode gate first, so a disallowed operation
//! never reaches storage.

use super::conf::{Conf, Mode};
use crate::core::context::Context;
use crate::core::error::{
    ConfigError, GraphError, GraphResult, NotImplementedError, ResourceError,
};
use crate::core::field::FieldKind;
use crate::core::hooks::ResourceHook;
use crate::core::item::{Item, ItemList, id_key};
use crate::core::outcome::Outcome;
use crate::core::query::{Predicate, Query, Window};
use crate::core::schema::Schema;
use crate::core::store::Storer;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named, schema-bound collection of items
pub struct Resource {
    name: String,
    path: String,
    parent_field: String,
    schema: Schema,
    storer: Arc<dyn Storer>,
    conf: Conf,
    hooks: Vec<Arc<dyn ResourceHook>>,
    children: IndexMap<String, Resource>,
}

pub(crate) fn check_name(name: &str) -> GraphResult<()> {
    if name.is_empty() || name.contains(['.', '/']) {
        return Err(ConfigError::InvalidBinding {
            resource: name.to_string(),
            message: "name must be non-empty and contain no '.' or '/'".to_string(),
        }
        .into());
    }
    Ok(())
}

impl Resource {
    pub(crate) fn new(
        name: &str,
        path: String,
        parent_field: &str,
        schema: Schema,
        storer: Arc<dyn Storer>,
        conf: Conf,
    ) -> GraphResult<Self> {
        check_name(name)?;
        conf.validate(&path)?;
        if !parent_field.is_empty() {
            let field = schema.get(parent_field).ok_or_else(|| ConfigError::InvalidBinding {
                resource: path.clone(),
                message: format!("parent field '{}' not in schema", parent_field),
            })?;
            if !field.filterable {
                return Err(ConfigError::InvalidBinding {
                    resource: path.clone(),
                    message: format!("parent field '{}' is not filterable", parent_field),
                }
                .into());
            }
        }
        schema.compile()?;

        Ok(Self {
            name: name.to_string(),
            path,
            parent_field: parent_field.to_string(),
            schema,
            storer,
            conf,
            hooks: Vec::new(),
            children: IndexMap::new(),
        })
    }

    /// Bind a sub-resource whose items link to this one through `parent_field`
    pub fn bind(
        &mut self,
        name: &str,
        parent_field: &str,
        schema: Schema,
        storer: Arc<dyn Storer>,
        conf: Conf,
    ) -> GraphResult<&mut Resource> {
        if parent_field.is_empty() {
            return Err(ConfigError::InvalidBinding {
                resource: format!("{}.{}", self.path, name),
                message: "sub-resources need a parent field".to_string(),
            }
            .into());
        }
        if self.children.contains_key(name) {
            return Err(ConfigError::InvalidBinding {
                resource: format!("{}.{}", self.path, name),
                message: "name already bound".to_string(),
            }
            .into());
        }
        let path = format!("{}.{}", self.path, name);
        let child = Resource::new(name, path, parent_field, schema, storer, conf)?;
        tracing::debug!(resource = %child.path, parent_field = %parent_field, "bound sub-resource");
        Ok(self.children.entry(name.to_string()).or_insert(child))
    }

    /// Append a hook; hooks run in registration order
    pub fn use_hook(&mut self, hook: Arc<dyn ResourceHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path from the root, e.g. `users.posts`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Field linking items to their parent item, empty for roots
    pub fn parent_field(&self) -> &str {
        &self.parent_field
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    pub fn storer(&self) -> &Arc<dyn Storer> {
        &self.storer
    }

    /// Typed item id for a request path segment
    ///
    /// Numeric and boolean ids are read as JSON literals, every other kind
    /// as a string. `None` when the `id` field rejects the segment.
    pub fn path_id(&self, segment: &str) -> Option<Value> {
        let Some(field) = self.schema.get_field("id") else {
            return Some(Value::String(segment.to_string()));
        };
        let raw = match field.kind() {
            FieldKind::Integer | FieldKind::Float | FieldKind::Bool => {
                serde_json::from_str(segment).ok()?
            }
            _ => Value::String(segment.to_string()),
        };
        field.validate_value("id", raw).ok()
    }

    pub fn child(&self, name: &str) -> Option<&Resource> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.children.get_mut(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &Resource> {
        self.children.values()
    }

    /// Fail with `MethodNotAllowed` unless `mode` is allowed
    pub fn check_mode(&self, mode: Mode) -> GraphResult<()> {
        if self.conf.is_mode_allowed(mode) {
            return Ok(());
        }
        tracing::debug!(resource = %self.path, mode = %mode, "mode not allowed");
        Err(ResourceError::MethodNotAllowed {
            resource: self.path.clone(),
            mode: mode.to_string(),
        }
        .into())
    }

    /// Build a validated item from a client payload.
    ///
    /// `original` is the stored item for modifications; `replace` discards
    /// every field the payload does not carry.
    pub fn build_item(
        &self,
        payload: &Map<String, Value>,
        original: Option<&Item>,
        replace: bool,
    ) -> GraphResult<Item> {
        let (changes, base) =
            self.schema
                .prepare(payload, original.map(|o| &o.payload), replace)?;
        let doc = self.schema.validate(&changes, &base)?;
        let item = Item::new(doc)?;
        if let Some(original) = original
            && item.key() != original.key()
        {
            return Err(GraphError::Internal(format!(
                "item id changed from {} to {}",
                original.key(),
                item.key()
            )));
        }
        Ok(item)
    }

    /// Items matching `query`
    pub async fn find(&self, ctx: &Context, query: Query, want_total: bool) -> GraphResult<ItemList> {
        self.check_mode(Mode::List)?;
        self.find_unchecked(ctx, query, want_total).await
    }

    async fn find_unchecked(
        &self,
        ctx: &Context,
        mut query: Query,
        want_total: bool,
    ) -> GraphResult<ItemList> {
        if query.window.limit.is_none() {
            query.window.limit = self.conf.default_limit;
        }
        for hook in &self.hooks {
            hook.on_find(ctx, &self.path, &mut query).await?;
        }
        let want_total = self.conf.force_total.wants_total(want_total);
        tracing::debug!(
            resource = %self.path,
            filter = %query.predicate,
            sort = %query.sort,
            offset = query.window.offset,
            "find"
        );
        let mut outcome = Outcome::from(ctx.run(self.storer.find(ctx, &query, want_total)).await);
        for hook in &self.hooks {
            outcome = hook.on_found(ctx, &self.path, &query, outcome).await;
        }
        outcome.ok_or(GraphError::Internal(format!(
            "hook on {} dropped the find result",
            self.path
        )))
    }

    /// Item with identifier `id`, or a not-found error
    pub async fn get(&self, ctx: &Context, id: &Value) -> GraphResult<Item> {
        self.check_mode(Mode::Read)?;
        for hook in &self.hooks {
            hook.on_get(ctx, &self.path, id).await?;
        }
        let query = Query::new(Predicate::Equal {
            field: "id".to_string(),
            value: id.clone(),
        })
        .with_window(Window {
            offset: 0,
            limit: Some(1),
        });
        tracing::debug!(resource = %self.path, id = %id_key(id), "get");
        let found = ctx
            .run(self.storer.find(ctx, &query, false))
            .await
            .map(|list| list.items.into_iter().next());
        let mut outcome = Outcome::from_option(found);
        for hook in &self.hooks {
            outcome = hook.on_got(ctx, &self.path, outcome).await;
        }
        outcome.ok_or(GraphError::not_found(&self.path, id_key(id)))
    }

    /// Whether an item matches `predicate`; used to check ancestors of a
    /// path, so it skips the mode gate but still runs the find hooks
    pub(crate) async fn exists(&self, ctx: &Context, predicate: Predicate) -> GraphResult<bool> {
        let query = Query::new(predicate).with_window(Window {
            offset: 0,
            limit: Some(1),
        });
        let list = self.find_unchecked(ctx, query, false).await?;
        Ok(!list.is_empty())
    }

    /// Items for several identifiers, in order, `None` where not found.
    ///
    /// Uses the storage bulk lookup when available, a single `$in` find
    /// otherwise.
    pub async fn multi_get(&self, ctx: &Context, ids: &[Value]) -> GraphResult<Vec<Option<Item>>> {
        self.check_mode(Mode::Read)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        for hook in &self.hooks {
            for id in ids {
                hook.on_get(ctx, &self.path, id).await?;
            }
        }
        tracing::debug!(resource = %self.path, count = ids.len(), "multi get");

        let found = match self.storer.multi_getter() {
            Some(getter) => ctx.run(getter.multi_get(ctx, ids)).await?,
            None => {
                let query = Query::new(Predicate::In {
                    field: "id".to_string(),
                    values: ids.to_vec(),
                });
                let list = ctx
                    .run(self.storer.find(ctx, &query, false))
                    .await
                    .map_err(|err| match err {
                        GraphError::NotImplemented(NotImplementedError::Operator { backend, .. }) => {
                            NotImplementedError::Capability {
                                backend,
                                capability: "multi_get".to_string(),
                            }
                            .into()
                        }
                        other => other,
                    })?;
                let mut by_key: HashMap<String, Item> =
                    list.items.into_iter().map(|item| (item.key(), item)).collect();
                ids.iter().map(|id| by_key.remove(&id_key(id))).collect()
            }
        };

        let mut items = Vec::with_capacity(found.len());
        for item in found {
            let mut outcome = Outcome::from_option(Ok(item));
            for hook in &self.hooks {
                outcome = hook.on_got(ctx, &self.path, outcome).await;
            }
            items.push(outcome.into_result()?);
        }
        Ok(items)
    }

    /// Store new items
    pub async fn insert(&self, ctx: &Context, mut items: Vec<Item>) -> GraphResult<Vec<Item>> {
        self.check_mode(Mode::Create)?;
        if !self.hooks.is_empty() {
            for hook in &self.hooks {
                hook.on_insert(ctx, &self.path, &mut items).await?;
            }
            items = items
                .into_iter()
                .map(|item| Item::new(item.payload))
                .collect::<GraphResult<_>>()?;
        }
        tracing::debug!(resource = %self.path, count = items.len(), "insert");
        let mut outcome = Outcome::from(ctx.run(self.storer.insert(ctx, &items)).await);
        for hook in &self.hooks {
            outcome = hook.on_inserted(ctx, &self.path, &items, outcome).await;
        }
        outcome.into_result()?;
        Ok(items)
    }

    /// Store a patched version of `original`
    pub async fn update(&self, ctx: &Context, item: Item, original: &Item) -> GraphResult<Item> {
        self.check_mode(Mode::Update)?;
        self.modify(ctx, item, original).await
    }

    /// Store a replacement of `original`
    pub async fn replace(&self, ctx: &Context, item: Item, original: &Item) -> GraphResult<Item> {
        self.check_mode(Mode::Replace)?;
        self.modify(ctx, item, original).await
    }

    async fn modify(&self, ctx: &Context, mut item: Item, original: &Item) -> GraphResult<Item> {
        if !self.hooks.is_empty() {
            for hook in &self.hooks {
                hook.on_update(ctx, &self.path, &mut item, original).await?;
            }
            item = Item::new(item.payload)?;
        }
        tracing::debug!(resource = %self.path, id = %item.key(), etag = %item.etag, "update");
        let mut outcome = Outcome::from(ctx.run(self.storer.update(ctx, &item, original)).await);
        for hook in &self.hooks {
            outcome = hook
                .on_updated(ctx, &self.path, &item, original, outcome)
                .await;
        }
        outcome.into_result()?;
        Ok(item)
    }

    /// Remove an item
    pub async fn delete(&self, ctx: &Context, item: &Item) -> GraphResult<()> {
        self.check_mode(Mode::Delete)?;
        for hook in &self.hooks {
            hook.on_delete(ctx, &self.path, item).await?;
        }
        tracing::debug!(resource = %self.path, id = %item.key(), "delete");
        let mut outcome = Outcome::from(ctx.run(self.storer.delete(ctx, item)).await);
        for hook in &self.hooks {
            outcome = hook.on_deleted(ctx, &self.path, item, outcome).await;
        }
        outcome.into_result()?;
        Ok(())
    }

    /// Remove every item matching the query predicate
    pub async fn clear(&self, ctx: &Context, mut query: Query) -> GraphResult<usize> {
        self.check_mode(Mode::Clear)?;
        for hook in &self.hooks {
            hook.on_clear(ctx, &self.path, &mut query).await?;
        }
        tracing::debug!(resource = %self.path, filter = %query.predicate, "clear");
        let mut outcome = Outcome::from(ctx.run(self.storer.clear(ctx, &query)).await);
        for hook in &self.hooks {
            outcome = hook.on_cleared(ctx, &self.path, &query, outcome).await;
        }
        outcome.ok_or(GraphError::Internal(format!(
            "hook on {} dropped the clear result",
            self.path
        )))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("parent_field", &self.parent_field)
            .field("storer", &self.storer.name())
            .field("conf", &self.conf)
            .field("hooks", &self.hooks.len())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}
