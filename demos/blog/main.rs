//! Blog example: users, their posts and the comments on each post
//!
//! Run with `RUST_LOG=resgraph=debug cargo run --example blog` to see the
//! storage calls the resolver makes.

use anyhow::Result;
use resgraph::core::item::Item;
use resgraph::core::outcome::Outcome;
use resgraph::prelude::*;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
resolver:
  max_depth: 3
  fan_out: 8
resources:
  users.posts:
    default_limit: 10
  users.posts.comments:
    default_limit: 5
    force_total: always
"#;

/// Logs every stored post
struct AuditHook;

#[async_trait]
impl ResourceHook for AuditHook {
    async fn on_inserted(
        &self,
        _ctx: &Context,
        resource: &str,
        items: &[Item],
        outcome: Outcome<()>,
    ) -> Outcome<()> {
        if outcome.is_ok() {
            for item in items {
                tracing::info!(resource, id = %item.key(), etag = %item.etag, "stored");
            }
        }
        outcome
    }
}

fn excerpt() -> Params {
    Params::new(handler_fn(|value, params| {
        let words = params.get("words").and_then(Value::as_u64).unwrap_or(5) as usize;
        let text = value.as_str().ok_or("not a string")?;
        Ok(Value::String(
            text.split_whitespace().take(words).collect::<Vec<_>>().join(" "),
        ))
    }))
    .param("words", Param::new(IntegerValidator::range(1, 500)))
}

fn build_graph(config: &GraphConfig) -> GraphResult<ResourceGraph> {
    let mut graph = ResourceGraph::new();
    let users = graph.bind(
        "users",
        Schema::new()
            .field("id", id_field())
            .field("created", created_field())
            .field(
                "name",
                Field::new()
                    .required()
                    .sortable()
                    .filterable()
                    .with_on_init(filters::trim())
                    .with_validator(StringValidator::default().min_len(1).max_len(64)),
            )
            .field(
                "email",
                Field::new()
                    .hidden()
                    .with_on_init(filters::lowercase())
                    .with_validator(StringValidator::default().format(FieldFormat::Email)),
            ),
        Arc::new(MemoryStorer::new()),
        config.conf_for("users"),
    )?;

    let posts = users.bind(
        "posts",
        "user",
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
                    .sortable()
                    .with_validator(StringValidator::default().max_len(120)),
            )
            .field("published", Field::new().filterable().with_default(json!(false)).with_validator(BoolValidator))
            .field(
                "body",
                Field::new()
                    .with_dependency(json!({"published": false}))
                    .with_params(excerpt())
                    .with_validator(StringValidator::default()),
            ),
        Arc::new(MemoryStorer::new()),
        config.conf_for("users.posts"),
    )?;
    posts.use_hook(Arc::new(AuditHook));

    posts.bind(
        "comments",
        "post",
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
            .field("body", Field::new().required().with_validator(StringValidator::default())),
        Arc::new(MemoryStorer::new()),
        config.conf_for("users.posts.comments"),
    )?;

    Ok(graph)
}

fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resgraph=info")),
        )
        .init();

    let config = GraphConfig::from_yaml_str(CONFIG)?;
    let host = GraphHost::new(build_graph(&config)?, config)?;
    let ctx = Context::new().with_timeout(Duration::from_secs(5));

    println!("Creating users...\n");
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        let user = host
            .create(
                &ctx,
                &["users"],
                payload(json!({"id": id, "name": name, "email": format!("{}@EXAMPLE.com", id)})),
                None,
            )
            .await?;
        println!("  {}  etag={}", Value::Object(user.document), user.etag);
    }

    println!("\nCreating a post and its comments...\n");
    let post = host
        .create(
            &ctx,
            &["users", "alice", "posts"],
            payload(json!({
                "id": "hello",
                "title": "Hello, graph",
                "body": "Resources, sub-resources and embedded projections in one request"
            })),
            None,
        )
        .await?;
    for (author, body) in [("bob", "Nice post"), ("alice", "Thanks!"), ("bob", "Follow-up question")] {
        host.create(
            &ctx,
            &["users", "alice", "posts", "hello", "comments"],
            payload(json!({"author": author, "body": body})),
            None,
        )
        .await?;
    }

    println!("Projection with embedding:\n");
    let params = ListParams {
        fields: Some(
            "title,summary:body(words:3),user{name},comments(sort:\"-created\",limit:2){body,author{name}}"
                .to_string(),
        ),
        ..Default::default()
    };
    let list = host.list(&ctx, &["users", "alice", "posts"], &params).await?;
    println!("{}", serde_json::to_string_pretty(&list)?);

    println!("\nOptimistic concurrency:\n");
    let stale = format!("\"{}\"", post.etag);
    let updated = host
        .update(
            &ctx,
            &["users", "alice", "posts", "hello"],
            payload(json!({"title": "Hello, resource graph"})),
            Some(&stale),
            Some("title"),
        )
        .await?;
    println!("  updated: {}", Value::Object(updated.document));

    match host
        .update(
            &ctx,
            &["users", "alice", "posts", "hello"],
            payload(json!({"title": "Lost update"})),
            Some(&stale),
            None,
        )
        .await
    {
        Err(err) => println!("  second writer rejected: {} ({})", err, err.error_code()),
        Ok(_) => println!("  second writer unexpectedly succeeded"),
    }

    println!("\nDependency check:\n");
    let published = host
        .update(
            &ctx,
            &["users", "alice", "posts", "hello"],
            payload(json!({"published": true})),
            None,
            None,
        )
        .await?;
    println!("  published: {}", published.document["published"]);
    if let Err(err) = host
        .update(
            &ctx,
            &["users", "alice", "posts", "hello"],
            payload(json!({"body": "edit after publishing"})),
            None,
            None,
        )
        .await
    {
        println!("  body edit rejected: {}", err);
    }

    println!("\nCancellation:\n");
    let (cancellable, handle) = ctx.with_cancel();
    handle.cancel();
    match host.get(&cancellable, &["users", "alice"], None).await {
        Err(err) => println!("  cancelled request: {} ({:?})", err, err.kind()),
        Ok(_) => println!("  cancelled request unexpectedly succeeded"),
    }

    Ok(())
}
