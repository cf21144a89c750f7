#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Router-level tests exercising the real routes and state.
//!
//! The pool is created lazily and never connects: everything tested here —
//! resource lookup, access gates, describe payloads — completes before any
//! query would run.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use tavola_engine::{
    AppState, ColumnInfo, ColumnMap, ColumnType, PageLimits, ResourceService, SchemaCatalog,
};

fn app() -> axum::Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/tavola_test")
        .unwrap();

    let mut columns = ColumnMap::new();
    columns.insert(
        "id".to_string(),
        ColumnInfo {
            data_type: ColumnType::Integer,
            nullable: false,
        },
    );
    columns.insert(
        "name".to_string(),
        ColumnInfo {
            data_type: ColumnType::String,
            nullable: true,
        },
    );
    let catalog = SchemaCatalog::new(HashMap::from([("public.users".to_string(), columns)]));

    let engine = ResourceService::new(pool, catalog, PageLimits::default(), None, Value::Null);
    engine
        .register(
            serde_json::from_value(json!({
                "table": "users",
                "hidden_fields": ["email"],
                "token_required": ["add"],
                "required_fields": {"name": "NAME_REQUIRED"}
            }))
            .unwrap(),
        )
        .unwrap();

    let state = AppState::new(engine);
    tavola_engine::routes::router().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unknown_resource_is_404() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/ghosts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collection_options_describes_list_and_create() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(response).await;
    let params = payload["list"]["queryParameters"].as_object().unwrap();
    assert!(params.contains_key("_sort"));
    assert!(params.contains_key("name~"));
    assert!(params.contains_key("_from_id"));

    assert_eq!(payload["create"]["tokenRequired"], json!(true));
    assert_eq!(payload["create"]["requiredFields"], json!(["name"]));
    let schema = payload["create"]["schema"].as_object().unwrap();
    assert!(schema.contains_key("name"));
    assert!(!schema.contains_key("id"));
}

#[tokio::test]
async fn item_options_describes_update_and_delete() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/users/5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payload = body_json(response).await;
    assert!(payload["update"]["readOnlyFields"]
        .as_array()
        .unwrap()
        .contains(&json!("id")));
    assert_eq!(payload["delete"]["tokenRequired"], json!(false));
}

#[tokio::test]
async fn create_without_token_is_unauthorized() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name": "Alice"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn integer_id_validation_runs_before_any_query() {
    // The pool never connects; a 400 here proves the id check is synchronous.
    let response = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/users/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let payload = body_json(response).await;
    assert_eq!(payload["error"], json!("INTEGER_REQUIRED"));
}
