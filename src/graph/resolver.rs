//! Projection and embedding resolver
//!
//! Resolution happens in two passes:
//!
//! 1. [`Resolver::plan`] checks a field selection against the schemas and the
//!    graph, expands wildcards, validates parameters and embedding controls,
//!    and rejects cycles and excessive depth. No storage is touched.
//! 2. [`Resolver::project_item`] / [`Resolver::project_items`] run a plan
//!    over items. Sibling nodes and sibling items are resolved concurrently;
//!    storage fetches share one semaphore per request, and identical
//!    reference lookups within a request are coalesced into one fetch.
//!
//! ```text
//! posts  fields=title,author{name},comments(limit:2){body}
//!
//! post ──┬── title                      copy
//!        ├── author ──▶ users.get(id)   lookup (coalesced)
//!        └── comments ─▶ comments.find({post: id}, limit 2)
//! ```
//!
//! The first failing fetch aborts the whole projection and drops its
//! in-flight siblings. A reference to a missing item resolves to null.

use super::conf::Mode;
use super::resource::Resource;
use super::ResourceGraph;
use crate::config::ResolverConfig;
use crate::core::context::Context;
use crate::core::error::{ErrorKind, GraphError, GraphResult, NotImplementedError};
use crate::core::field::{Field, FieldHandler, ParamValues};
use crate::core::item::{Item, id_key};
use crate::core::projection::ProjectionField;
use crate::core::query::{MAX_LIMIT, Predicate, Query, Sort, Window};
use crate::core::schema::Schema;
use futures::future::{BoxFuture, FutureExt, Shared, try_join_all};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

/// Parameters accepted on a sub-resource embedding
const EMBED_PARAMS: &[&str] = &["sort", "filter", "skip", "page", "limit"];

/// A validated projection, ready to run
#[derive(Clone)]
pub struct Plan {
    nodes: Vec<PlanNode>,
}

impl Plan {
    /// Output keys, in order
    pub fn keys(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.key.as_str()).collect()
    }
}

#[derive(Clone)]
struct PlanNode {
    key: String,
    name: String,
    field: Option<Field>,
    handler: Option<(Arc<dyn FieldHandler>, ParamValues)>,
    kind: NodeKind,
}

#[derive(Clone)]
enum NodeKind {
    /// Copy of the stored value
    Value,
    /// Sub-document, or array of sub-documents
    Document(Vec<PlanNode>),
    /// Lookup of referenced items by id
    Reference {
        path: String,
        many: bool,
        children: Vec<PlanNode>,
    },
    /// List of sub-resource items linked to the current item
    Connection(Box<Connection>),
}

#[derive(Clone)]
struct Connection {
    path: String,
    parent_field: String,
    predicate: Predicate,
    sort: Sort,
    page: usize,
    limit: Option<usize>,
    skip: usize,
    children: Vec<PlanNode>,
}

/// Plans and runs projections over a resource graph
#[derive(Clone)]
pub struct Resolver {
    graph: Arc<ResourceGraph>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(graph: Arc<ResourceGraph>, config: ResolverConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Validate a field selection for items of `resource`
    pub fn plan(&self, resource: &Resource, fields: &[ProjectionField]) -> GraphResult<Plan> {
        let mut stack = vec![resource.path().to_string()];
        let nodes = self.plan_level(Some(resource), resource.schema(), fields, 0, &mut stack)?;
        Ok(Plan { nodes })
    }

    /// Parse and validate a field-selection expression; `None` selects `*`
    pub fn plan_str(&self, resource: &Resource, fields: Option<&str>) -> GraphResult<Plan> {
        let fields = ProjectionField::parse(fields.unwrap_or(""))?;
        self.plan(resource, &fields)
    }

    fn plan_level(
        &self,
        owner: Option<&Resource>,
        schema: &Schema,
        fields: &[ProjectionField],
        depth: usize,
        stack: &mut Vec<String>,
    ) -> GraphResult<Vec<PlanNode>> {
        let mut explicit = Vec::new();
        let mut keys = HashSet::new();
        let mut wildcard = false;
        for field in fields {
            if field.is_wildcard() {
                if field.alias.is_some() || !field.params.is_empty() || !field.children.is_empty() {
                    return Err(GraphError::query_parse(
                        Some("*"),
                        "wildcard takes no alias, parameters or sub-fields",
                    ));
                }
                wildcard = true;
                continue;
            }
            if !keys.insert(field.key().to_string()) {
                return Err(GraphError::query_parse(
                    Some(field.key()),
                    "duplicate output key",
                ));
            }
            explicit.push(self.plan_node(owner, schema, field, depth, stack)?);
        }

        let mut nodes = Vec::new();
        if wildcard {
            for (name, field) in schema.fields() {
                if field.hidden || keys.contains(name.as_str()) {
                    continue;
                }
                nodes.push(PlanNode {
                    key: name.clone(),
                    name: name.clone(),
                    field: Some(field.clone()),
                    handler: None,
                    kind: NodeKind::Value,
                });
            }
        }
        nodes.extend(explicit);
        Ok(nodes)
    }

    fn plan_node(
        &self,
        owner: Option<&Resource>,
        schema: &Schema,
        proj: &ProjectionField,
        depth: usize,
        stack: &mut Vec<String>,
    ) -> GraphResult<PlanNode> {
        let Some(field) = schema.get(&proj.name) else {
            if let Some(child) = owner.and_then(|o| o.child(&proj.name)) {
                return self.plan_connection(child, proj, depth, stack);
            }
            return Err(GraphError::query_parse(Some(&proj.name), "unknown field"));
        };
        if field.hidden {
            return Err(GraphError::query_parse(Some(&proj.name), "unknown field"));
        }

        let handler = match (&field.params, proj.params.is_empty()) {
            (_, true) => None,
            (Some(params), false) => Some((
                params.handler.clone(),
                params.validate(&proj.name, &proj.params)?,
            )),
            (None, false) => {
                return Err(GraphError::query_parse(
                    Some(&proj.name),
                    "field does not accept parameters",
                ));
            }
        };

        let kind = if proj.children.is_empty() {
            NodeKind::Value
        } else if let Some(path) = field.reference() {
            let target = self.graph.get(path).ok_or_else(|| {
                GraphError::Internal(format!("reference to unbound resource '{}'", path))
            })?;
            let children = self.embed(target, &proj.children, depth, stack)?;
            NodeKind::Reference {
                path: path.to_string(),
                many: field.element().is_some(),
                children,
            }
        } else if let Some(sub) = field
            .sub_schema()
            .or_else(|| field.element().and_then(Field::sub_schema))
        {
            NodeKind::Document(self.plan_level(None, sub, &proj.children, depth, stack)?)
        } else {
            return Err(GraphError::query_parse(
                Some(&proj.name),
                "field has no sub-fields",
            ));
        };

        Ok(PlanNode {
            key: proj.key().to_string(),
            name: proj.name.clone(),
            field: Some(field.clone()),
            handler,
            kind,
        })
    }

    /// Plan children of an embedded resource, enforcing depth and cycles
    fn embed(
        &self,
        target: &Resource,
        children: &[ProjectionField],
        depth: usize,
        stack: &mut Vec<String>,
    ) -> GraphResult<Vec<PlanNode>> {
        if depth + 1 > self.config.max_depth {
            return Err(NotImplementedError::DepthExceeded {
                max_depth: self.config.max_depth,
            }
            .into());
        }
        if stack.iter().any(|p| p == target.path()) {
            let mut cycle = stack.clone();
            cycle.push(target.path().to_string());
            return Err(NotImplementedError::EmbeddingCycle {
                path: cycle.join(" > "),
            }
            .into());
        }
        stack.push(target.path().to_string());
        let nodes = self.plan_level(Some(target), target.schema(), children, depth + 1, stack);
        stack.pop();
        nodes
    }

    fn plan_connection(
        &self,
        child: &Resource,
        proj: &ProjectionField,
        depth: usize,
        stack: &mut Vec<String>,
    ) -> GraphResult<PlanNode> {
        let name = proj.name.as_str();
        if let Some(unknown) = proj.params.keys().find(|k| !EMBED_PARAMS.contains(&k.as_str())) {
            return Err(GraphError::query_parse(
                Some(name),
                format!("unsupported parameter '{}'", unknown),
            ));
        }
        let predicate = match proj.params.get("filter") {
            None => Predicate::all(),
            Some(Value::String(raw)) => Predicate::parse_str(raw, child.schema())?,
            Some(filter) => Predicate::parse(filter, child.schema())?,
        };
        let sort = match proj.params.get("sort") {
            None => Sort::default(),
            Some(Value::String(order)) => Sort::parse(order, child.schema())?,
            Some(_) => {
                return Err(GraphError::query_parse(Some(name), "sort must be a string"));
            }
        };
        let count = |param: &str| -> GraphResult<Option<usize>> {
            match proj.params.get(param) {
                None => Ok(None),
                Some(v) => v
                    .as_u64()
                    .map(|n| Some(usize::try_from(n).unwrap_or(usize::MAX)))
                    .ok_or_else(|| {
                        GraphError::query_parse(
                            Some(name),
                            format!("{} must be a non-negative integer", param),
                        )
                    }),
            }
        };
        let page = count("page")?.unwrap_or(1).max(1);
        let limit = count("limit")?.map(|l| l.min(MAX_LIMIT));
        let skip = count("skip")?.unwrap_or(0);

        let wildcard = [ProjectionField::wildcard()];
        let children = if proj.children.is_empty() {
            &wildcard[..]
        } else {
            &proj.children[..]
        };
        let children = self.embed(child, children, depth, stack)?;

        Ok(PlanNode {
            key: proj.key().to_string(),
            name: name.to_string(),
            field: None,
            handler: None,
            kind: NodeKind::Connection(Box::new(Connection {
                path: child.path().to_string(),
                parent_field: child.parent_field().to_string(),
                predicate,
                sort,
                page,
                limit,
                skip,
                children,
            })),
        })
    }

    /// Project one item
    pub async fn project_item(&self, ctx: &Context, plan: &Plan, item: &Item) -> GraphResult<Map<String, Value>> {
        let request = Request::new(self, ctx);
        ctx.run(request.resolve_doc(&plan.nodes, &item.payload)).await
    }

    /// Project a list of items, keeping their order
    pub async fn project_items(
        &self,
        ctx: &Context,
        plan: &Plan,
        items: &[Item],
    ) -> GraphResult<Vec<Map<String, Value>>> {
        let request = Request::new(self, ctx);
        tracing::trace!(items = items.len(), "projecting list");
        ctx.run(try_join_all(
            items
                .iter()
                .map(|item| request.resolve_doc(&plan.nodes, &item.payload)),
        ))
        .await
    }
}

type Fetch = Shared<BoxFuture<'static, GraphResult<Option<Item>>>>;

/// State shared by every fetch of one top-level projection
struct Request {
    graph: Arc<ResourceGraph>,
    ctx: Context,
    permits: Arc<Semaphore>,
    fetches: Mutex<HashMap<(String, String), Fetch>>,
}

impl Request {
    fn new(resolver: &Resolver, ctx: &Context) -> Self {
        Self {
            graph: resolver.graph.clone(),
            ctx: ctx.clone(),
            permits: Arc::new(Semaphore::new(resolver.config.fan_out.max(1))),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn resource(&self, path: &str) -> GraphResult<&Resource> {
        self.graph
            .get(path)
            .ok_or_else(|| GraphError::Internal(format!("unbound resource '{}'", path)))
    }

    fn resolve_doc<'a>(
        &'a self,
        nodes: &'a [PlanNode],
        doc: &'a Map<String, Value>,
    ) -> BoxFuture<'a, GraphResult<Map<String, Value>>> {
        async move {
            let values = try_join_all(nodes.iter().map(|node| self.resolve_node(node, doc))).await?;
            let mut out = Map::new();
            for (node, value) in nodes.iter().zip(values) {
                if let Some(value) = value {
                    out.insert(node.key.clone(), value);
                }
            }
            Ok(out)
        }
        .boxed()
    }

    fn resolve_node<'a>(
        &'a self,
        node: &'a PlanNode,
        doc: &'a Map<String, Value>,
    ) -> BoxFuture<'a, GraphResult<Option<Value>>> {
        async move {
            let raw = match &node.kind {
                NodeKind::Connection(conn) => {
                    return self.resolve_connection(conn, doc).await.map(Some);
                }
                _ => match doc.get(&node.name) {
                    None => return Ok(None),
                    Some(value) => value.clone(),
                },
            };
            // Handlers see the stored value; their result is then projected
            let value = match &node.handler {
                Some((handler, params)) => {
                    self.ctx
                        .run(async {
                            handler.handle(&self.ctx, raw, params).await.map_err(|msg| {
                                GraphError::query_parse(Some(&node.name), msg)
                            })
                        })
                        .await?
                }
                None => raw,
            };
            self.resolve_value(node, &value).await.map(Some)
        }
        .boxed()
    }

    async fn resolve_value(&self, node: &PlanNode, value: &Value) -> GraphResult<Value> {
        match &node.kind {
            NodeKind::Value => match &node.field {
                Some(field) => serialize(field, &node.name, value.clone()),
                None => Ok(value.clone()),
            },
            NodeKind::Document(children) => match value {
                Value::Object(obj) => Ok(Value::Object(self.resolve_doc(children, obj).await?)),
                Value::Array(items) => {
                    let resolved = try_join_all(items.iter().map(|item| async move {
                        match item {
                            Value::Object(obj) => {
                                Ok::<_, GraphError>(Value::Object(self.resolve_doc(children, obj).await?))
                            }
                            other => Ok(other.clone()),
                        }
                    }))
                    .await?;
                    Ok(Value::Array(resolved))
                }
                other => Ok(other.clone()),
            },
            NodeKind::Reference {
                path,
                many: false,
                children,
            } => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                match self.fetch(path, value).await? {
                    Some(item) => Ok(Value::Object(self.resolve_doc(children, &item.payload).await?)),
                    None => Ok(Value::Null),
                }
            }
            NodeKind::Reference {
                path,
                many: true,
                children,
            } => {
                let Value::Array(ids) = value else {
                    return Ok(Value::Null);
                };
                let items = self.multi_fetch(path, ids).await?;
                let resolved = try_join_all(items.iter().map(|item| async move {
                    match item {
                        Some(item) => {
                            Ok::<_, GraphError>(Value::Object(self.resolve_doc(children, &item.payload).await?))
                        }
                        None => Ok(Value::Null),
                    }
                }))
                .await?;
                Ok(Value::Array(resolved))
            }
            NodeKind::Connection(_) => Ok(value.clone()),
        }
    }

    /// Coalesced lookup of one referenced item
    fn fetch(&self, path: &str, id: &Value) -> Fetch {
        let key = (path.to_string(), id_key(id));
        let mut fetches = self.fetches.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fetch) = fetches.get(&key) {
            tracing::trace!(resource = %path, id = %key.1, "coalesced lookup");
            return fetch.clone();
        }

        let graph = self.graph.clone();
        let ctx = self.ctx.clone();
        let permits = self.permits.clone();
        let path = path.to_string();
        let id = id.clone();
        let fetch = async move {
            let resource = graph
                .get(&path)
                .ok_or_else(|| GraphError::Internal(format!("unbound resource '{}'", path)))?;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| GraphError::Internal(e.to_string()))?;
            tracing::trace!(resource = %path, id = %id_key(&id), "lookup");
            match resource.get(&ctx, &id).await {
                Ok(item) => Ok(Some(item)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        }
        .boxed()
        .shared();
        fetches.insert(key, fetch.clone());
        fetch
    }

    async fn multi_fetch(&self, path: &str, ids: &[Value]) -> GraphResult<Vec<Option<Item>>> {
        let resource = self.resource(path)?;
        let wanted: Vec<Value> = ids.iter().filter(|id| !id.is_null()).cloned().collect();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GraphError::Internal(e.to_string()))?;
        tracing::trace!(resource = %path, count = wanted.len(), "bulk lookup");
        let mut found = resource.multi_get(&self.ctx, &wanted).await?.into_iter();
        Ok(ids
            .iter()
            .map(|id| if id.is_null() { None } else { found.next().flatten() })
            .collect())
    }

    async fn resolve_connection(
        &self,
        conn: &Connection,
        doc: &Map<String, Value>,
    ) -> GraphResult<Value> {
        let id = doc
            .get("id")
            .ok_or_else(|| GraphError::Internal("embedding parent has no id".to_string()))?;
        let resource = self.resource(&conn.path)?;
        resource.check_mode(Mode::List)?;

        let per_page = conn.limit.or(resource.conf().default_limit);
        let query = Query::new(
            Predicate::Equal {
                field: conn.parent_field.clone(),
                value: id.clone(),
            }
            .and(conn.predicate.clone()),
        )
        .with_sort(conn.sort.clone())
        .with_window(Window::from_page(conn.page, per_page, conn.skip));

        let list = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| GraphError::Internal(e.to_string()))?;
            tracing::trace!(resource = %conn.path, parent = %id_key(id), "embedded list");
            resource.find(&self.ctx, query, false).await?
        };

        let docs = try_join_all(
            list.items
                .iter()
                .map(|item| self.resolve_doc(&conn.children, &item.payload)),
        )
        .await?;
        Ok(Value::Array(docs.into_iter().map(Value::Object).collect()))
    }
}

/// Serialize a stored value, recursing into sub-documents
fn serialize(field: &Field, name: &str, value: Value) -> GraphResult<Value> {
    let value = field.serialize(name, value)?;
    match (field.sub_schema(), value) {
        (Some(schema), Value::Object(obj)) => {
            let mut out = Map::new();
            for (key, value) in obj {
                match schema.get(&key) {
                    Some(sub) if sub.hidden => {}
                    Some(sub) => {
                        out.insert(key.clone(), serialize(sub, &key, value)?);
                    }
                    None => {
                        out.insert(key, value);
                    }
                }
            }
            Ok(Value::Object(out))
        }
        (_, value) => Ok(value),
    }
}
