//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors return correct HTTP status codes
//! - Error responses carry a stable code, a message and details
//! - Error conversions work correctly
//! - Errors surfaced by the host can be matched by kind

use axum::http::StatusCode;
use axum::response::IntoResponse;
use resgraph::core::error::{
    ConfigError, FieldValidationError, NotImplementedError, QueryError, ResourceError,
    StorageError, ValidationError,
};
use resgraph::prelude::*;

fn not_found() -> GraphError {
    GraphError::not_found("users", "u1")
}

fn field_errors() -> GraphError {
    GraphError::Validation(ValidationError::FieldErrors(vec![
        FieldValidationError::new("name", "required"),
        FieldValidationError::new("age", "must be at most 150"),
    ]))
}

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_resource_errors() {
        let cases = [
            (not_found(), StatusCode::NOT_FOUND),
            (GraphError::conflict("users", "u1"), StatusCode::CONFLICT),
            (
                ResourceError::PreconditionFailed {
                    resource: "users".to_string(),
                    id: "u1".to_string(),
                }
                .into(),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                ResourceError::AlreadyExists {
                    resource: "users".to_string(),
                    id: "u1".to_string(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                ResourceError::MethodNotAllowed {
                    resource: "users".to_string(),
                    mode: "delete".to_string(),
                }
                .into(),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                ResourceError::RouteNotFound {
                    path: "/users/u1/likes".to_string(),
                }
                .into(),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[test]
    fn test_validation_error_returns_422() {
        assert_eq!(field_errors().status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_query_errors_return_400() {
        let errs: [GraphError; 3] = [
            GraphError::query_parse(Some("age"), "bad operand"),
            QueryError::FieldNotFilterable {
                field: "email".to_string(),
            }
            .into(),
            QueryError::FieldNotSortable {
                field: "email".to_string(),
            }
            .into(),
        ];
        for err in errs {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_not_implemented_returns_501() {
        let err: GraphError = NotImplementedError::Operator {
            backend: "memory".to_string(),
            operator: "$regex".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);

        let err: GraphError = NotImplementedError::DepthExceeded { max_depth: 2 }.into();
        assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[test]
    fn test_cancellation_and_deadline() {
        assert_eq!(GraphError::Cancelled.status_code().as_u16(), 499);
        assert_eq!(GraphError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_server_side_errors_return_500() {
        let storage: GraphError = StorageError::Unavailable {
            backend: "memory".to_string(),
        }
        .into();
        let config: GraphError = ConfigError::InvalidValue {
            field: "resolver.fan_out".to_string(),
            value: "0".to_string(),
            message: "must be positive".to_string(),
        }
        .into();
        for err in [storage, config, GraphError::Internal("boom".to_string())] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

// =============================================================================
// Error Code Tests
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(not_found().error_code(), "ITEM_NOT_FOUND");
        assert_eq!(GraphError::conflict("users", "u1").error_code(), "CONFLICT");
        assert_eq!(field_errors().error_code(), "VALIDATION_ERROR");
        assert_eq!(
            GraphError::query_parse(None, "x").error_code(),
            "QUERY_PARSE_ERROR"
        );
        assert_eq!(GraphError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(GraphError::Timeout.error_code(), "TIMEOUT");
        let cycle: GraphError = NotImplementedError::EmbeddingCycle {
            path: "users > posts > users".to_string(),
        }
        .into();
        assert_eq!(cycle.error_code(), "EMBEDDING_CYCLE");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(not_found().kind(), ErrorKind::NotFound);
        assert_eq!(
            GraphError::from(ResourceError::PreconditionFailed {
                resource: "users".to_string(),
                id: "u1".to_string(),
            })
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(field_errors().kind(), ErrorKind::Validation);
        assert_eq!(GraphError::Timeout.kind(), ErrorKind::Timeout);
    }
}

// =============================================================================
// Error Response Tests
// =============================================================================

mod error_response_tests {
    use super::*;

    #[test]
    fn test_error_response_has_code_and_message() {
        let response = not_found().to_response();
        assert_eq!(response.code, "ITEM_NOT_FOUND");
        assert!(response.message.contains("u1"));
        assert_eq!(response.details, Some(json!({"resource": "users", "id": "u1"})));
    }

    #[test]
    fn test_validation_errors_include_field_details() {
        let response = field_errors().to_response();
        assert_eq!(
            response.details,
            Some(json!({"fields": [
                {"field": "name", "message": "required"},
                {"field": "age", "message": "must be at most 150"}
            ]}))
        );
    }

    #[test]
    fn test_timeout_has_no_details() {
        let response = GraphError::Timeout.to_response();
        assert!(response.details.is_none());
        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("details").is_none());
    }
}

// =============================================================================
// Error Conversion Tests
// =============================================================================

mod error_conversion_tests {
    use super::*;

    #[test]
    fn test_serde_json_error_is_a_validation_error() {
        let err: GraphError = serde_json::from_str::<Value>("{oops").unwrap_err().into();
        assert!(matches!(
            err,
            GraphError::Validation(ValidationError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_yaml_error_is_a_config_error() {
        let err: GraphError = serde_yaml::from_str::<Value>("a: [").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_io_error_is_a_config_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GraphError = io.into();
        assert!(matches!(err, GraphError::Config(ConfigError::IoError { .. })));
    }

    #[test]
    fn test_source_is_the_inner_error() {
        use std::error::Error;
        assert!(not_found().source().is_some());
        assert!(GraphError::Cancelled.source().is_none());
    }
}

// =============================================================================
// Host Error Tests
// =============================================================================

mod host_error_tests {
    use super::*;

    fn host() -> GraphHost {
        let mut graph = ResourceGraph::new();
        graph
            .bind(
                "users",
                Schema::new()
                    .field("id", id_field())
                    .field(
                        "name",
                        Field::new().required().with_validator(StringValidator::default()),
                    )
                    .field("age", Field::new().with_validator(IntegerValidator::range(0, 150))),
                Arc::new(MemoryStorer::new()),
                Conf::default(),
            )
            .unwrap();
        GraphHost::new(graph, GraphConfig::default()).unwrap()
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_invalid_payload_lists_every_field() {
        let host = host();
        let ctx = Context::new();
        let err = host
            .create(&ctx, &["users"], payload(json!({"age": 200})), None)
            .await
            .unwrap_err();
        match err {
            GraphError::Validation(ValidationError::FieldErrors(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"age"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let host = host();
        let ctx = Context::new();
        for path in [&["posts"][..], &["users", "u1", "posts"][..], &[][..]] {
            let err = host
                .list(&ctx, path, &ListParams::default())
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND, "{:?}", path);
        }
    }

    #[tokio::test]
    async fn test_missing_item() {
        let host = host();
        let ctx = Context::new();
        let err = host.get(&ctx, &["users", "nobody"], None).await.unwrap_err();
        match &err {
            GraphError::Resource(ResourceError::NotFound { resource, id }) => {
                assert_eq!(resource, "users");
                assert_eq!(id, "nobody");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

// =============================================================================
// IntoResponse Tests
// =============================================================================

mod into_response_tests {
    use super::*;

    #[test]
    fn test_into_response_status() {
        assert_eq!(not_found().into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            field_errors().into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(GraphError::Timeout.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = GraphError::conflict("users.posts", "p1").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], json!("CONFLICT"));
        assert_eq!(body["details"], json!({"resource": "users.posts", "id": "p1"}));
    }
}
