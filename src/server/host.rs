//! Transport-agnostic request host
//!
//! [`GraphHost`] holds everything needed to serve a resource graph: the
//! graph itself, the projection resolver and the configuration. Transports
//! (HTTP, RPC, tests) translate their requests into calls on the host and
//! its results back into their own wire format.
//!
//! Every operation takes the request path as segments, alternating resource
//! names and item ids:
//!
//! ```text
//! ["users"]                          list / create / clear users
//! ["users", "u1"]                    get / replace / update / delete u1
//! ["users", "u1", "posts"]           posts of u1
//! ["users", "u1", "posts", "p1"]     post p1, only if it belongs to u1
//! ```

use crate::config::GraphConfig;
use crate::core::context::Context;
use crate::core::error::{
    ErrorKind, FieldValidationError, GraphError, GraphResult, ResourceError, ValidationError,
};
use crate::core::etag::Fingerprint;
use crate::core::item::{Item, id_key};
use crate::core::query::{ListParams, PaginationMeta, Predicate, Query, Sort, Window, values_equal};
use crate::graph::{Plan, ResolvedPath, Resolver, Resource, ResourceGraph};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A page of projected items
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub meta: PaginationMeta,
    pub items: Vec<Map<String, Value>>,
}

/// A projected item with its concurrency metadata
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub etag: Fingerprint,
    pub updated: DateTime<Utc>,
    pub document: Map<String, Value>,
}

/// Host context holding the graph state shared by all requests
pub struct GraphHost {
    graph: Arc<ResourceGraph>,
    resolver: Resolver,
    config: Arc<GraphConfig>,
}

impl GraphHost {
    /// Build the host once every resource is bound
    pub fn new(graph: ResourceGraph, config: GraphConfig) -> GraphResult<Self> {
        config.validate()?;
        graph.check_references()?;
        let graph = Arc::new(graph);
        let resolver = Resolver::new(graph.clone(), config.resolver);
        tracing::info!(
            roots = graph.roots().count(),
            max_depth = config.resolver.max_depth,
            fan_out = config.resolver.fan_out,
            "graph host ready"
        );
        Ok(Self {
            graph,
            resolver,
            config: Arc::new(config),
        })
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// List the items of a collection path
    pub async fn list(
        &self,
        ctx: &Context,
        path: &[&str],
        params: &ListParams,
    ) -> GraphResult<ListResponse> {
        let target = self.collection(path)?;
        let resource = target.resource;

        let mut predicate = target.parent_predicate();
        if let Some(filter) = params.filter_value()? {
            predicate = predicate.and(Predicate::parse(&filter, resource.schema())?);
        }
        let sort = match params.sort.as_deref() {
            Some(order) => Sort::parse(order, resource.schema())?,
            None => Sort::default(),
        };
        let plan = self.plan(resource, params.fields.as_deref())?;
        self.check_ancestors(ctx, &target).await?;

        let page = params.page();
        let limit = params.limit(resource.conf().default_limit);
        let query = Query::new(predicate)
            .with_sort(sort)
            .with_window(Window::from_page(page, limit, params.skip()));
        let list = resource.find(ctx, query, params.total).await?;
        let items = self.resolver.project_items(ctx, &plan, &list.items).await?;

        Ok(ListResponse {
            meta: PaginationMeta::new(page, limit, list.offset, list.total),
            items,
        })
    }

    /// Fetch and project one item
    pub async fn get(
        &self,
        ctx: &Context,
        path: &[&str],
        fields: Option<&str>,
    ) -> GraphResult<ItemResponse> {
        let (target, id) = self.item_path(path)?;
        let plan = self.plan(target.resource, fields)?;
        self.check_ancestors(ctx, &target).await?;
        let item = self.lookup(ctx, &target, &id).await?;
        self.respond(ctx, &plan, item).await
    }

    /// Create an item in a collection
    pub async fn create(
        &self,
        ctx: &Context,
        path: &[&str],
        mut payload: Map<String, Value>,
        fields: Option<&str>,
    ) -> GraphResult<ItemResponse> {
        let target = self.collection(path)?;
        let resource = target.resource;
        let plan = self.plan(resource, fields)?;
        stamp_links(&target, &mut payload)?;
        self.check_ancestors(ctx, &target).await?;

        let item = resource.build_item(&payload, None, false)?;
        self.insert_one(ctx, resource, item, &plan).await
    }

    /// Replace an item entirely, creating it when it does not exist
    pub async fn replace(
        &self,
        ctx: &Context,
        path: &[&str],
        mut payload: Map<String, Value>,
        if_match: Option<&str>,
        fields: Option<&str>,
    ) -> GraphResult<ItemResponse> {
        let (target, id) = self.item_path(path)?;
        let resource = target.resource;
        let plan = self.plan(resource, fields)?;
        stamp_links(&target, &mut payload)?;
        match payload.get("id") {
            Some(given) if !values_equal(given, &id) => {
                return Err(field_error("id", "does not match the item path"));
            }
            Some(_) => {}
            None => {
                payload.insert("id".to_string(), id.clone());
            }
        }
        self.check_ancestors(ctx, &target).await?;

        let original = match self.lookup(ctx, &target, &id).await {
            Ok(original) => original,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if if_match.is_some() {
                    return Err(precondition_failed(resource, &id_key(&id)));
                }
                let item = resource.build_item(&payload, None, false)?;
                return self.insert_one(ctx, resource, item, &plan).await;
            }
            Err(e) => return Err(e),
        };
        check_precondition(resource, &original, if_match)?;
        let item = resource.build_item(&payload, Some(&original), true)?;
        let stored = resource.replace(ctx, item, &original).await?;
        self.respond(ctx, &plan, stored).await
    }

    /// Apply a partial change to an existing item
    pub async fn update(
        &self,
        ctx: &Context,
        path: &[&str],
        mut payload: Map<String, Value>,
        if_match: Option<&str>,
        fields: Option<&str>,
    ) -> GraphResult<ItemResponse> {
        let (target, id) = self.item_path(path)?;
        let resource = target.resource;
        let plan = self.plan(resource, fields)?;
        stamp_links(&target, &mut payload)?;
        self.check_ancestors(ctx, &target).await?;

        let original = self.lookup(ctx, &target, &id).await?;
        check_precondition(resource, &original, if_match)?;
        let item = resource.build_item(&payload, Some(&original), false)?;
        let stored = resource.update(ctx, item, &original).await?;
        self.respond(ctx, &plan, stored).await
    }

    /// Delete an item
    pub async fn delete(&self, ctx: &Context, path: &[&str], if_match: Option<&str>) -> GraphResult<()> {
        let (target, id) = self.item_path(path)?;
        self.check_ancestors(ctx, &target).await?;
        let original = self.lookup(ctx, &target, &id).await?;
        check_precondition(target.resource, &original, if_match)?;
        target.resource.delete(ctx, &original).await
    }

    /// Delete every item of a collection matching `filter`
    pub async fn clear(&self, ctx: &Context, path: &[&str], filter: Option<&Value>) -> GraphResult<usize> {
        let target = self.collection(path)?;
        let mut predicate = target.parent_predicate();
        if let Some(filter) = filter {
            predicate = predicate.and(Predicate::parse(filter, target.resource.schema())?);
        }
        self.check_ancestors(ctx, &target).await?;
        let removed = target.resource.clear(ctx, Query::new(predicate)).await?;
        tracing::debug!(resource = %target.resource.path(), removed, "cleared");
        Ok(removed)
    }

    fn plan(&self, resource: &Resource, fields: Option<&str>) -> GraphResult<Plan> {
        self.resolver.plan_str(resource, fields)
    }

    fn collection<'a>(&'a self, path: &[&str]) -> GraphResult<ResolvedPath<'a>> {
        let target = self.graph.resolve(path)?;
        if target.id.is_some() {
            return Err(route_not_found(path));
        }
        Ok(target)
    }

    fn item_path<'a>(&'a self, path: &[&str]) -> GraphResult<(ResolvedPath<'a>, Value)> {
        let mut target = self.graph.resolve(path)?;
        let id = target.id.take().ok_or_else(|| route_not_found(path))?;
        Ok((target, id))
    }

    /// Fail with `NotFound` unless every ancestor item of the path exists
    async fn check_ancestors(&self, ctx: &Context, target: &ResolvedPath<'_>) -> GraphResult<()> {
        try_join_all(target.ancestors.iter().enumerate().map(|(index, ancestor)| async move {
            let predicate = target.ancestor_predicate(index).unwrap_or_else(Predicate::all);
            if ancestor.resource.exists(ctx, predicate).await? {
                Ok(())
            } else {
                Err(GraphError::not_found(ancestor.resource.path(), id_key(&ancestor.id)))
            }
        }))
        .await?;
        Ok(())
    }

    /// Item `id` of the target resource, scoped to the parent item
    async fn lookup(&self, ctx: &Context, target: &ResolvedPath<'_>, id: &Value) -> GraphResult<Item> {
        let item = target.resource.get(ctx, id).await?;
        if !target.parent_predicate().matches(&item.payload) {
            return Err(GraphError::not_found(target.resource.path(), id_key(id)));
        }
        Ok(item)
    }

    async fn insert_one(
        &self,
        ctx: &Context,
        resource: &Resource,
        item: Item,
        plan: &Plan,
    ) -> GraphResult<ItemResponse> {
        let stored = resource
            .insert(ctx, vec![item])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::Internal("insert returned no item".to_string()))?;
        self.respond(ctx, plan, stored).await
    }

    async fn respond(&self, ctx: &Context, plan: &Plan, item: Item) -> GraphResult<ItemResponse> {
        let document = self.resolver.project_item(ctx, plan, &item).await?;
        Ok(ItemResponse {
            etag: item.etag,
            updated: item.updated,
            document,
        })
    }
}

/// Set parent link fields on a write, rejecting a conflicting client value
fn stamp_links(target: &ResolvedPath<'_>, payload: &mut Map<String, Value>) -> GraphResult<()> {
    for (field, value) in target.link_values() {
        match payload.get(&field) {
            Some(given) if !values_equal(given, &value) => {
                return Err(field_error(&field, "does not match the parent item"));
            }
            _ => {
                payload.insert(field, value);
            }
        }
    }
    Ok(())
}

fn check_precondition(resource: &Resource, item: &Item, if_match: Option<&str>) -> GraphResult<()> {
    match if_match {
        Some(token) if !item.etag.matches(token) => {
            tracing::debug!(resource = %resource.path(), id = %item.key(), "precondition failed");
            Err(precondition_failed(resource, &item.key()))
        }
        _ => Ok(()),
    }
}

fn precondition_failed(resource: &Resource, id: &str) -> GraphError {
    ResourceError::PreconditionFailed {
        resource: resource.path().to_string(),
        id: id.to_string(),
    }
    .into()
}

fn route_not_found(path: &[&str]) -> GraphError {
    ResourceError::RouteNotFound {
        path: path.join("/"),
    }
    .into()
}

fn field_error(field: &str, message: &str) -> GraphError {
    ValidationError::FieldErrors(vec![FieldValidationError::new(field, message)]).into()
}
