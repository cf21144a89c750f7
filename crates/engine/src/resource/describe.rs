//! Self-describing OPTIONS payloads for each operation.
//!
//! Clients (and generated API clients) read these to learn the accepted
//! query parameters, body schema and access requirements of a resource.

use serde_json::{Map, Value as Json, json};

use crate::catalog::{ColumnMap, ColumnType};
use crate::resource::types::{Action, ResourceDef};

pub fn describe_list(def: &ResourceDef, columns: &ColumnMap) -> Json {
    json!({
        "tokenRequired": def.requires_token(Action::Get),
        "ownerRequired": def.requires_owner(Action::Get),
        "rootRequired": def.requires_root(Action::Get),
        "joinFields": join_fields(def),
        "joinOnDemand": def.joins_on_demand,
        "accessByStatuses": def.access_by_statuses.rule(Action::Get),
        "additionalFields": def.describe_extras.get(&Action::Get),
        "cache": def.cache,
        "relations": def.relations.keys().collect::<Vec<_>>(),
        "queryParameters": query_parameters(def, columns),
        "apiClientMethodNames": def.client_method_names,
    })
}

pub fn describe_get_one(def: &ResourceDef) -> Json {
    json!({
        "tokenRequired": def.requires_token(Action::Get),
        "ownerRequired": def.requires_owner(Action::Get),
        "rootRequired": def.requires_root(Action::Get),
        "joinFields": join_fields(def),
        "joinOnDemand": def.joins_on_demand,
        "accessByStatuses": def.access_by_statuses.rule(Action::Get),
        "additionalFields": def.describe_extras.get(&Action::Get),
        "cache": def.cache,
        "apiClientMethodNames": def.client_method_names,
    })
}

pub fn describe_create(def: &ResourceDef, columns: &ColumnMap) -> Json {
    json!({
        "tokenRequired": def.requires_token(Action::Add),
        "ownerRequired": def.requires_owner(Action::Add),
        "rootRequired": def.requires_root(Action::Add),
        "readOnlyFields": def.read_only_fields,
        "requiredFields": sorted_keys(&def.required_fields),
        "accessByStatuses": def.access_by_statuses.rule(Action::Add),
        "apiClientMethodNames": def.client_method_names,
        "schema": body_schema(def, columns, Action::Add),
    })
}

pub fn describe_update(def: &ResourceDef, columns: &ColumnMap) -> Json {
    json!({
        "tokenRequired": def.requires_token(Action::Update),
        "ownerRequired": def.requires_owner(Action::Update),
        "rootRequired": def.requires_root(Action::Update),
        "readOnlyFields": def.read_only_fields,
        "accessByStatuses": def.access_by_statuses.rule(Action::Update),
        "additionalFields": def.describe_extras.get(&Action::Update),
        "apiClientMethodNames": def.client_method_names,
        "schema": body_schema(def, columns, Action::Update),
    })
}

pub fn describe_delete(def: &ResourceDef) -> Json {
    json!({
        "tokenRequired": def.requires_token(Action::Delete),
        "ownerRequired": def.requires_owner(Action::Delete),
        "rootRequired": def.requires_root(Action::Delete),
        "accessByStatuses": def.access_by_statuses.rule(Action::Delete),
        "apiClientMethodNames": def.client_method_names,
    })
}

/// Output type of each computed join, inferred from its projection: raw
/// scalar expressions advertise their cast, aggregations are arrays.
fn join_fields(def: &ResourceDef) -> Map<String, Json> {
    let mut map = Map::new();
    for join in &def.joins {
        let kind = match &join.field {
            None => "ARRAY",
            Some(field) if field.ends_with("::bool") => "boolean",
            Some(field) if field.ends_with("::int") => "integer",
            Some(_) => "string",
        };
        map.insert(join.name().to_string(), Json::String(kind.to_string()));
    }
    map
}

/// Per-column filter spellings accepted by the list grammar, plus the
/// reserved parameters.
fn query_parameters(def: &ResourceDef, columns: &ColumnMap) -> Map<String, Json> {
    let mut params = Map::new();

    let mut names: Vec<&String> = columns.keys().collect();
    names.sort();
    for name in names {
        let Some(info) = columns.get(name.as_str()) else {
            continue;
        };
        let type_label = type_label(info.data_type);
        params.insert(name.clone(), json!(type_label));
        if info.data_type == ColumnType::String || info.data_type == ColumnType::Text {
            params.insert(format!("{name}~"), json!(type_label));
        }
        if info.nullable {
            params.insert(format!("_null_{name}"), json!("string"));
            params.insert(format!("_not_null_{name}"), json!("string"));
        }
        if info.data_type != ColumnType::Boolean && info.data_type != ColumnType::File {
            for prefix in ["_from_", "_to_", "_in_", "_not_in_"] {
                params.insert(format!("{prefix}{name}"), json!(type_label));
            }
        }
    }

    if let Some(Json::Object(extra)) = def.describe_extras.get(&Action::Get) {
        for (key, value) in extra {
            params.insert(key.clone(), value.clone());
        }
    }

    params.insert(
        "_fields".into(),
        json!({"type": "string", "example": "id,name"}),
    );
    params.insert(
        "_sort".into(),
        json!({"type": "string", "example": "-created,name,random()"}),
    );
    params.insert(
        "_join".into(),
        json!({"type": "string", "example": "table1,alias1"}),
    );
    params.insert("_limit".into(), json!("integer"));
    params.insert("_page".into(), json!("integer"));
    params.insert("_skip".into(), json!("integer"));
    params.insert("_lang".into(), json!("string"));
    if !def.search_fields.is_empty() {
        params.insert("_search".into(), json!("string"));
    }

    params
}

/// Mutable body schema: every catalog column that is not read-only.
fn body_schema(def: &ResourceDef, columns: &ColumnMap, action: Action) -> Map<String, Json> {
    let mut schema = Map::new();
    if let Some(Json::Object(extra)) = def.describe_extras.get(&action) {
        for (key, value) in extra {
            schema.insert(key.clone(), value.clone());
        }
    }
    let mut names: Vec<&String> = columns.keys().collect();
    names.sort();
    for name in names {
        if def.read_only_fields.contains(name) {
            continue;
        }
        if let Some(info) = columns.get(name.as_str()) {
            schema.insert(
                name.clone(),
                json!({"data_type": type_label(info.data_type), "nullable": info.nullable}),
            );
        }
    }
    schema
}

fn type_label(data_type: ColumnType) -> String {
    match serde_json::to_value(data_type) {
        Ok(Json::String(label)) => label,
        _ => "string".to_string(),
    }
}

fn sorted_keys(map: &std::collections::HashMap<String, String>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
