//! Shared test harness for resource graph testing
//!
//! Provides a blog graph (users, their posts, the comments on each post)
//! backed by [`InstrumentedStorer`], a storage wrapper that injects latency
//! and records call counts and the concurrency high-water mark.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod harness;
//! use harness::*;
//! ```

#![allow(dead_code)]

pub mod storer_contract;

use async_trait::async_trait;
use resgraph::core::item::{Item, ItemList, id_key};
use resgraph::core::query::{Predicate, Query};
use resgraph::prelude::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// InstrumentedStorer
// ---------------------------------------------------------------------------

/// Latency injected before a call, chosen from the query
pub type Latency = Arc<dyn Fn(&Query) -> Duration + Send + Sync>;

/// Counters shared by every clone of an [`InstrumentedStorer`]
#[derive(Default)]
pub struct Counters {
    pub finds: AtomicUsize,
    pub multi_gets: AtomicUsize,
    pub writes: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub high_water: AtomicUsize,
    /// Calls dropped before they completed
    pub aborted: AtomicUsize,
}

/// Storage wrapper around [`MemoryStorer`] for observing the resolver
pub struct InstrumentedStorer {
    inner: MemoryStorer,
    latency: Mutex<Option<Latency>>,
    bulk: bool,
    pub counters: Counters,
}

/// Tracks one in-flight call; counts it as aborted if dropped early
struct CallGuard<'a> {
    counters: &'a Counters,
    done: bool,
}

impl<'a> CallGuard<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.high_water.fetch_max(now, Ordering::SeqCst);
        Self {
            counters,
            done: false,
        }
    }

    fn finish(mut self) {
        self.done = true;
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        if !self.done {
            self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl InstrumentedStorer {
    pub fn new() -> Self {
        Self::wrap(MemoryStorer::new())
    }

    pub fn wrap(inner: MemoryStorer) -> Self {
        Self {
            inner,
            latency: Mutex::new(None),
            bulk: false,
            counters: Counters::default(),
        }
    }

    /// Expose the bulk lookup capability of the wrapped storer
    pub fn with_bulk(mut self) -> Self {
        self.bulk = true;
        self
    }

    pub fn set_latency(&self, latency: impl Fn(&Query) -> Duration + Send + Sync + 'static) {
        *self.latency.lock().unwrap() = Some(Arc::new(latency));
    }

    pub fn set_fixed_latency(&self, latency: Duration) {
        self.set_latency(move |_| latency);
    }

    pub fn clear_latency(&self) {
        *self.latency.lock().unwrap() = None;
    }

    pub fn finds(&self) -> usize {
        self.counters.finds.load(Ordering::SeqCst)
    }

    pub fn multi_gets(&self) -> usize {
        self.counters.multi_gets.load(Ordering::SeqCst)
    }

    pub fn high_water(&self) -> usize {
        self.counters.high_water.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> usize {
        self.counters.aborted.load(Ordering::SeqCst)
    }

    /// Reset every counter, typically after seeding
    pub fn reset(&self) {
        for counter in [
            &self.counters.finds,
            &self.counters.multi_gets,
            &self.counters.writes,
            &self.counters.high_water,
            &self.counters.aborted,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn inner(&self) -> &MemoryStorer {
        &self.inner
    }

    async fn delay(&self, query: &Query) {
        let latency = self.latency.lock().unwrap().clone();
        if let Some(latency) = latency {
            tokio::time::sleep(latency(query)).await;
        }
    }
}

#[async_trait]
impl Storer for InstrumentedStorer {
    async fn find(&self, ctx: &Context, query: &Query, want_total: bool) -> GraphResult<ItemList> {
        self.counters.finds.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard::enter(&self.counters);
        self.delay(query).await;
        let result = self.inner.find(ctx, query, want_total).await;
        guard.finish();
        result
    }

    async fn insert(&self, ctx: &Context, items: &[Item]) -> GraphResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(ctx, items).await
    }

    async fn update(&self, ctx: &Context, item: &Item, original: &Item) -> GraphResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(ctx, item, original).await
    }

    async fn delete(&self, ctx: &Context, item: &Item) -> GraphResult<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(ctx, item).await
    }

    async fn clear(&self, ctx: &Context, query: &Query) -> GraphResult<usize> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(ctx, query).await
    }

    fn multi_getter(&self) -> Option<&dyn MultiGetter> {
        if self.bulk { Some(self) } else { None }
    }

    fn name(&self) -> &str {
        "instrumented"
    }
}

#[async_trait]
impl MultiGetter for InstrumentedStorer {
    async fn multi_get(&self, ctx: &Context, ids: &[Value]) -> GraphResult<Vec<Option<Item>>> {
        self.counters.multi_gets.fetch_add(1, Ordering::SeqCst);
        let guard = CallGuard::enter(&self.counters);
        self.delay(&Query::new(Predicate::In {
            field: "id".to_string(),
            values: ids.to_vec(),
        }))
        .await;
        let result = self.inner.multi_get(ctx, ids).await;
        guard.finish();
        result
    }
}

/// Id looked up by a query of the form `{"id": value}`, if any
pub fn queried_id(query: &Query) -> Option<String> {
    match &query.predicate {
        Predicate::Equal { field, value } if field == "id" => Some(id_key(value)),
        _ => None,
    }
}

/// Parent id of a query scoped by `{field: value}` among its conjuncts
pub fn queried_parent(query: &Query, parent_field: &str) -> Option<String> {
    let conjuncts: Vec<&Predicate> = match &query.predicate {
        Predicate::And(items) => items.iter().collect(),
        other => vec![other],
    };
    conjuncts.into_iter().find_map(|p| match p {
        Predicate::Equal { field, value } if field == parent_field => Some(id_key(value)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Blog graph
// ---------------------------------------------------------------------------

pub struct Blog {
    pub host: GraphHost,
    pub users: Arc<InstrumentedStorer>,
    pub posts: Arc<InstrumentedStorer>,
    pub comments: Arc<InstrumentedStorer>,
}

impl Blog {
    pub fn reset(&self) {
        self.users.reset();
        self.posts.reset();
        self.comments.reset();
    }

    pub fn resource(&self, path: &str) -> &Resource {
        self.host.graph().get(path).unwrap()
    }
}

/// Field handler truncating strings to `max` characters
pub fn truncate() -> Params {
    Params::new(handler_fn(|value, params| {
        let max = params.get("max").and_then(Value::as_u64).unwrap_or(u64::MAX) as usize;
        match value {
            Value::String(s) => Ok(Value::String(s.chars().take(max).collect())),
            other => Err(format!("cannot truncate {}", other)),
        }
    }))
    .param("max", Param::new(IntegerValidator::range(0, 10_000)))
}

pub fn user_schema() -> Schema {
    Schema::new()
        .field("id", id_field())
        .field("created", created_field())
        .field(
            "name",
            Field::new()
                .required()
                .filterable()
                .sortable()
                .with_validator(StringValidator::default().min_len(1)),
        )
        .field(
            "email",
            Field::new()
                .hidden()
                .with_validator(StringValidator::default().format(FieldFormat::Email)),
        )
        .field(
            "age",
            Field::new()
                .filterable()
                .sortable()
                .with_validator(IntegerValidator::range(0, 150)),
        )
        .field(
            "tags",
            Field::new().filterable().with_validator(ArrayValidator::new(
                Field::new().with_validator(StringValidator::default()),
            )),
        )
        .field(
            "address",
            Field::new().with_schema(
                Schema::new()
                    .field("city", Field::new().filterable().with_validator(StringValidator::default()))
                    .field("zip", Field::new().with_validator(StringValidator::default())),
            ),
        )
        .field("secret", Field::new().hidden())
}

pub fn post_schema() -> Schema {
    Schema::new()
        .field("id", id_field())
        .field("updated", updated_field())
        .field(
            "user",
            Field::new()
                .required()
                .filterable()
                .with_validator(ReferenceValidator::new("users")),
        )
        .field(
            "title",
            Field::new()
                .required()
                .filterable()
                .sortable()
                .with_params(truncate())
                .with_validator(StringValidator::default().max_len(200)),
        )
        .field(
            "published",
            Field::new()
                .filterable()
                .with_default(json!(false))
                .with_validator(BoolValidator),
        )
        .field(
            "body",
            Field::new()
                .with_dependency(json!({"published": false}))
                .with_validator(StringValidator::default()),
        )
        .field(
            "rank",
            Field::new()
                .filterable()
                .sortable()
                .with_validator(IntegerValidator::default()),
        )
        .field(
            "published_at",
            Field::new().filterable().sortable().with_validator(TimeValidator),
        )
        .field(
            "reviews",
            Field::new().filterable().with_validator(ArrayValidator::new(
                Field::new().with_schema(
                    Schema::new()
                        .field("score", Field::new().filterable().with_validator(IntegerValidator::default()))
                        .field("by", Field::new().filterable().with_validator(StringValidator::default())),
                ),
            )),
        )
        .field(
            "coauthors",
            Field::new().with_validator(ArrayValidator::new(
                Field::new().with_validator(ReferenceValidator::new("users")),
            )),
        )
        .field("draft_notes", Field::new().hidden())
}

pub fn comment_schema() -> Schema {
    Schema::new()
        .field("id", id_field())
        .field("created", created_field())
        .field("post", Field::new().required().filterable())
        .field(
            "author",
            Field::new()
                .required()
                .filterable()
                .with_validator(ReferenceValidator::new("users")),
        )
        .field(
            "body",
            Field::new()
                .required()
                .with_params(truncate())
                .with_validator(StringValidator::default()),
        )
}

/// Blog graph with default configuration and plain storers
pub fn blog() -> Blog {
    blog_with(
        GraphConfig::default(),
        InstrumentedStorer::new(),
        InstrumentedStorer::new(),
        InstrumentedStorer::new(),
    )
}

pub fn blog_with(
    config: GraphConfig,
    users: InstrumentedStorer,
    posts: InstrumentedStorer,
    comments: InstrumentedStorer,
) -> Blog {
    let users = Arc::new(users);
    let posts = Arc::new(posts);
    let comments = Arc::new(comments);

    let mut graph = ResourceGraph::new();
    graph
        .bind("users", user_schema(), users.clone(), config.conf_for("users"))
        .unwrap()
        .bind("posts", "user", post_schema(), posts.clone(), config.conf_for("users.posts"))
        .unwrap()
        .bind(
            "comments",
            "post",
            comment_schema(),
            comments.clone(),
            config.conf_for("users.posts.comments"),
        )
        .unwrap();

    Blog {
        host: GraphHost::new(graph, config).unwrap(),
        users,
        posts,
        comments,
    }
}

pub fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Users u1..u3, posts p1..p3 and comments c1..c3; counters reset afterwards
pub async fn seed(blog: &Blog) {
    let ctx = Context::new();
    let host = &blog.host;
    for user in [
        json!({"id": "u1", "name": "Ann", "email": "ann@example.com", "age": 30, "tags": ["admin", "staff"], "address": {"city": "Paris", "zip": "75001"}, "secret": "s1"}),
        json!({"id": "u2", "name": "Bob", "email": "bob@example.com", "age": 25, "tags": ["staff"]}),
        json!({"id": "u3", "name": "Cid", "age": 40}),
    ] {
        host.create(&ctx, &["users"], obj(user), None).await.unwrap();
    }
    for (user, post) in [
        ("u1", json!({"id": "p1", "title": "First post", "published": true, "rank": 3, "published_at": "2024-03-01T10:00:00Z", "reviews": [{"score": 5, "by": "u2"}, {"score": 2, "by": "u3"}]})),
        ("u1", json!({"id": "p2", "title": "Second post", "body": "draft body", "rank": 1, "coauthors": ["u2", "ghost", "u3"], "draft_notes": "todo"})),
        ("u2", json!({"id": "p3", "title": "Third post", "published": true, "rank": 2, "published_at": "2024-01-15T08:00:00+01:00"})),
    ] {
        host.create(&ctx, &["users", user, "posts"], obj(post), None)
            .await
            .unwrap();
    }
    for (user, post, comment) in [
        ("u1", "p1", json!({"id": "c1", "author": "u2", "body": "Nice"})),
        ("u1", "p1", json!({"id": "c2", "author": "u3", "body": "Agreed"})),
        ("u2", "p3", json!({"id": "c3", "author": "u1", "body": "Thanks for sharing"})),
    ] {
        host.create(&ctx, &["users", user, "posts", post, "comments"], obj(comment), None)
            .await
            .unwrap();
    }
    blog.reset();
}
