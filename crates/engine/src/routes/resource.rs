//! REST routes for registered resources.
//!
//! Thin glue: resolves the resource from the path, enforces the token/root
//! flags, hands transport inputs to the engine and translates engine errors.
//! Caller identity arrives as a request extension installed by host
//! middleware; authentication itself lives outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::EngineError;
use crate::resource::service::{DeleteResult, ListResult, ResourceRequest};
use crate::resource::types::{Action, ResourceDef};
use crate::roles::Caller;
use crate::state::AppState;

/// Create the resource router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/{resource}",
            get(list).post(create).options(describe_collection),
        )
        .route(
            "/api/{resource}/{id}",
            get(get_one)
                .put(update)
                .patch(update)
                .delete(delete_one)
                .options(describe_item),
        )
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type Reject = (StatusCode, Json<ErrorResponse>);

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    caller: Option<Extension<Caller>>,
) -> Result<Json<ListResult>, Reject> {
    let def = lookup(&state, &resource)?;
    let req = request(pairs, HashMap::new(), caller);
    check_access(&def, Action::Get, req.caller.as_ref())?;

    state
        .engine()
        .list(&def, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn get_one(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    caller: Option<Extension<Caller>>,
) -> Result<Json<Value>, Reject> {
    let def = lookup(&state, &resource)?;
    let req = request(pairs, item_path(&id), caller);
    check_access(&def, Action::Get, req.caller.as_ref())?;

    let row = state
        .engine()
        .get_one(&def, &id, &req)
        .await
        .map_err(reject)?;
    row.map(Json).ok_or_else(not_found)
}

async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    caller: Option<Extension<Caller>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Reject> {
    let def = lookup(&state, &resource)?;
    let req = request(pairs, HashMap::new(), caller);
    check_access(&def, Action::Add, req.caller.as_ref())?;

    state
        .engine()
        .create(&def, &body, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    caller: Option<Extension<Caller>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, Reject> {
    let def = lookup(&state, &resource)?;
    let req = request(pairs, item_path(&id), caller);
    check_access(&def, Action::Update, req.caller.as_ref())?;

    let row = state
        .engine()
        .update(&def, &id, &body, &req)
        .await
        .map_err(reject)?;
    row.map(Json).ok_or_else(not_found)
}

async fn delete_one(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    caller: Option<Extension<Caller>>,
) -> Result<Json<DeleteResult>, Reject> {
    let def = lookup(&state, &resource)?;
    let req = request(Vec::new(), item_path(&id), caller);
    check_access(&def, Action::Delete, req.caller.as_ref())?;

    state
        .engine()
        .delete(&def, &id, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn describe_collection(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<Value>, Reject> {
    let def = lookup(&state, &resource)?;
    Ok(Json(json!({
        "list": state.engine().describe(&def, Action::Get, false),
        "create": state.engine().describe(&def, Action::Add, false),
    })))
}

async fn describe_item(
    State(state): State<AppState>,
    Path((resource, _id)): Path<(String, String)>,
) -> Result<Json<Value>, Reject> {
    let def = lookup(&state, &resource)?;
    Ok(Json(json!({
        "get": state.engine().describe(&def, Action::Get, true),
        "update": state.engine().describe(&def, Action::Update, true),
        "delete": state.engine().describe(&def, Action::Delete, true),
    })))
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn lookup(state: &AppState, resource: &str) -> Result<Arc<ResourceDef>, Reject> {
    state.engine().resource(resource).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "unknown resource".to_string(),
            }),
        )
    })
}

fn request(
    pairs: Vec<(String, String)>,
    path: HashMap<String, String>,
    caller: Option<Extension<Caller>>,
) -> ResourceRequest {
    ResourceRequest {
        query: pairs,
        path,
        caller: caller.map(|Extension(caller)| caller),
    }
}

fn item_path(id: &str) -> HashMap<String, String> {
    HashMap::from([("id".to_string(), id.to_string())])
}

fn check_access(def: &ResourceDef, action: Action, caller: Option<&Caller>) -> Result<(), Reject> {
    if def.requires_token(action) && caller.is_none() {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "authentication required".to_string(),
            }),
        ));
    }
    if def.requires_root(action) && !caller.is_some_and(|caller| caller.is_root) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "root required".to_string(),
            }),
        ));
    }
    Ok(())
}

fn not_found() -> Reject {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not found".to_string(),
        }),
    )
}

/// Translate engine errors: construction-time codes pass through verbatim as
/// 400s, execution failures are logged and hidden behind a 500.
fn reject(err: EngineError) -> Reject {
    let (status, message) = match &err {
        EngineError::IntegerRequired
        | EngineError::QueryValue
        | EngineError::RequiredField(_)
        | EngineError::InvalidDefinition(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        EngineError::UnknownResource => (StatusCode::NOT_FOUND, err.to_string()),
        EngineError::Database(e) => {
            tracing::error!(error = %e, "database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
        EngineError::Internal(e) => {
            tracing::error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse { error: message }))
}
