//! Macro-generated test suite for the `Storer` contract.
//!
//! The `storer_contract_tests!` macro generates a test module validating any
//! `Storer` implementation: ordered finds with windows and totals, atomic
//! batch inserts, compare-and-swap updates and deletes, clears, bulk lookups
//! and context handling.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod harness;
//!
//! use harness::*;
//!
//! storer_contract_tests!(memory, MemoryStorer::new());
//! ```

/// Generate a `Storer` conformance test suite in module `$name`.
///
/// `$factory` is re-evaluated for each test so tests never share state.
#[macro_export]
macro_rules! storer_contract_tests {
    ($name:ident, $factory:expr) => {
        mod $name {
            use super::*;
            use resgraph::core::error::{ErrorKind, GraphError, ResourceError};
            use resgraph::core::item::Item;
            use resgraph::core::query::{Predicate, Query, Sort, SortField, Window};

            fn item(value: Value) -> Item {
                Item::new(value.as_object().cloned().unwrap()).unwrap()
            }

            fn items() -> Vec<Item> {
                vec![
                    item(json!({"id": "a", "rank": 2, "tag": "x"})),
                    item(json!({"id": "b", "rank": 3, "tag": "y"})),
                    item(json!({"id": "c", "rank": 1, "tag": "x"})),
                ]
            }

            fn by_id(id: &str) -> Query {
                Query::new(Predicate::Equal {
                    field: "id".to_string(),
                    value: json!(id),
                })
            }

            fn ids(list: &resgraph::core::item::ItemList) -> Vec<String> {
                list.items.iter().map(|i| i.key()).collect()
            }

            // ==============================================================
            // Find
            // ==============================================================

            #[tokio::test]
            async fn test_find_keeps_insertion_order() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();

                let list = storer.find(&ctx, &Query::default(), false).await.unwrap();
                assert_eq!(ids(&list), vec!["a", "b", "c"]);
            }

            #[tokio::test]
            async fn test_find_filters_sorts_and_windows() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();

                let query = Query::default()
                    .with_sort(Sort(vec![SortField {
                        name: "rank".to_string(),
                        reversed: true,
                    }]))
                    .with_window(Window {
                        offset: 1,
                        limit: Some(1),
                    });
                let list = storer.find(&ctx, &query, true).await.unwrap();
                assert_eq!(ids(&list), vec!["a"]);
                assert_eq!(list.total, Some(3));
                assert_eq!(list.offset, 1);

                let query = Query::new(Predicate::Equal {
                    field: "tag".to_string(),
                    value: json!("x"),
                });
                let list = storer.find(&ctx, &query, true).await.unwrap();
                assert_eq!(ids(&list), vec!["a", "c"]);
                assert_eq!(list.total, Some(2));
            }

            #[tokio::test]
            async fn test_find_without_match_is_empty() {
                let storer = $factory;
                let ctx = Context::new();
                let list = storer.find(&ctx, &by_id("zzz"), false).await.unwrap();
                assert!(list.is_empty());
            }

            // ==============================================================
            // Insert
            // ==============================================================

            #[tokio::test]
            async fn test_insert_batch_is_atomic() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()[..1]).await.unwrap();

                let err = storer
                    .insert(&ctx, &[item(json!({"id": "new"})), item(json!({"id": "a"}))])
                    .await
                    .unwrap_err();
                assert!(matches!(
                    err,
                    GraphError::Resource(ResourceError::AlreadyExists { .. })
                ));
                let list = storer.find(&ctx, &by_id("new"), false).await.unwrap();
                assert!(list.is_empty());
            }

            // ==============================================================
            // Compare-and-swap
            // ==============================================================

            #[tokio::test]
            async fn test_update_checks_fingerprint() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();
                let original = item(json!({"id": "a", "rank": 2, "tag": "x"}));

                let first = item(json!({"id": "a", "rank": 20, "tag": "x"}));
                storer.update(&ctx, &first, &original).await.unwrap();

                // A second writer still holding the original loses
                let second = item(json!({"id": "a", "rank": 99, "tag": "x"}));
                let err = storer.update(&ctx, &second, &original).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Conflict);

                let stored = storer.find(&ctx, &by_id("a"), false).await.unwrap();
                assert_eq!(stored.items[0], first);
            }

            #[tokio::test]
            async fn test_update_missing_item_is_not_found() {
                let storer = $factory;
                let ctx = Context::new();
                let ghost = item(json!({"id": "ghost"}));
                let err = storer.update(&ctx, &ghost, &ghost).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::NotFound);
            }

            #[tokio::test]
            async fn test_delete_checks_fingerprint() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();

                let stale = item(json!({"id": "b", "rank": 0}));
                let err = storer.delete(&ctx, &stale).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Conflict);

                let current = item(json!({"id": "b", "rank": 3, "tag": "y"}));
                storer.delete(&ctx, &current).await.unwrap();
                let list = storer.find(&ctx, &Query::default(), false).await.unwrap();
                assert_eq!(ids(&list), vec!["a", "c"]);
            }

            // ==============================================================
            // Clear and bulk lookup
            // ==============================================================

            #[tokio::test]
            async fn test_clear_by_predicate() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();
                let query = Query::new(Predicate::Equal {
                    field: "tag".to_string(),
                    value: json!("x"),
                });
                assert_eq!(storer.clear(&ctx, &query).await.unwrap(), 2);
                assert_eq!(storer.clear(&ctx, &query).await.unwrap(), 0);
                let list = storer.find(&ctx, &Query::default(), false).await.unwrap();
                assert_eq!(ids(&list), vec!["b"]);
            }

            #[tokio::test]
            async fn test_multi_get_aligns_with_ids() {
                let storer = $factory;
                let ctx = Context::new();
                storer.insert(&ctx, &items()).await.unwrap();
                let Some(getter) = storer.multi_getter() else {
                    return;
                };
                let found = getter
                    .multi_get(&ctx, &[json!("c"), json!("nope"), json!("a")])
                    .await
                    .unwrap();
                let keys: Vec<Option<String>> =
                    found.iter().map(|i| i.as_ref().map(|i| i.key())).collect();
                assert_eq!(
                    keys,
                    vec![Some("c".to_string()), None, Some("a".to_string())]
                );
            }

            // ==============================================================
            // Context
            // ==============================================================

            #[tokio::test]
            async fn test_cancelled_context_is_honored() {
                let storer = $factory;
                let (ctx, handle) = Context::new().with_cancel();
                handle.cancel();
                let err = ctx
                    .run(storer.find(&ctx, &Query::default(), false))
                    .await
                    .unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Cancelled);
            }
        }
    };
}
