//! Mutation pipeline: turning request bodies into validated row payloads.
//!
//! Bodies are whitelisted against the schema catalog, stripped of read-only
//! fields, coerced per column type, and never merged with path parameters.

use std::collections::{BTreeMap, BTreeSet};

use sea_query::Value;
use serde_json::Value as Json;

use crate::catalog::{ColumnMap, ColumnType, column_type};
use crate::error::{EngineError, EngineResult};
use crate::resource::types::{ID_COLUMN, ResourceDef};
use crate::roles::Caller;

/// Prepared INSERT payload: aligned columns and one value row per record.
#[derive(Debug)]
pub struct InsertPayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Whether the body was a single object (the response returns one row).
    pub single: bool,
}

/// Build the INSERT payload for a create body.
///
/// Array detection is structural — an actual JSON array — so a single object
/// whose keys happen to be `"0"`, `"1"` still inserts one row.
pub fn insert_payload(
    body: &Json,
    def: &ResourceDef,
    columns: &ColumnMap,
    caller: Option<&Caller>,
) -> EngineResult<InsertPayload> {
    let (objects, single) = match body {
        Json::Array(items) => (items.as_slice(), false),
        single => (std::slice::from_ref(single), true),
    };

    let mut prepared: Vec<BTreeMap<String, Json>> = Vec::with_capacity(objects.len());
    for object in objects {
        prepared.push(prepare_record(object, def, columns, caller)?);
    }

    // Batch rows align on the union of provided columns; a column receives
    // its database default only when no row in the batch names it.
    let names: BTreeSet<String> = prepared
        .iter()
        .flat_map(|record| record.keys().cloned())
        .collect();

    let mut rows = Vec::with_capacity(prepared.len());
    for record in &prepared {
        let mut row = Vec::with_capacity(names.len());
        for name in &names {
            let value = record.get(name).unwrap_or(&Json::Null);
            row.push(coerce_field(columns, name, value)?);
        }
        rows.push(row);
    }

    Ok(InsertPayload {
        columns: names.into_iter().collect(),
        rows,
        single,
    })
}

/// Build the SET list for an update body. Returns an empty list when nothing
/// mutable remains, in which case the UPDATE is skipped entirely.
pub fn update_payload(
    body: &Json,
    def: &ResourceDef,
    columns: &ColumnMap,
) -> EngineResult<Vec<(String, Value)>> {
    let Json::Object(object) = body else {
        return Err(anyhow::anyhow!("update body must be a JSON object").into());
    };

    let mut entries: Vec<(&String, &Json)> = object.iter().collect();
    entries.sort_by_key(|(name, _)| name.as_str());

    let mut values = Vec::new();
    for (name, value) in entries {
        if !columns.contains_key(name.as_str()) || def.read_only_fields.contains(name) {
            continue;
        }
        values.push((name.clone(), coerce_field(columns, name, value)?));
    }
    Ok(values)
}

/// Validate and coerce a path-supplied id for the primary key column.
pub fn validate_id(id: &str, columns: &ColumnMap) -> EngineResult<Value> {
    crate::catalog::coerce_for_column(columns, ID_COLUMN, &Json::String(id.to_string()))
}

fn prepare_record(
    body: &Json,
    def: &ResourceDef,
    columns: &ColumnMap,
    caller: Option<&Caller>,
) -> EngineResult<BTreeMap<String, Json>> {
    let Json::Object(object) = body else {
        return Err(anyhow::anyhow!("create body must be a JSON object").into());
    };

    let mut required: Vec<(&String, &String)> = def.required_fields.iter().collect();
    required.sort();
    for (field, code) in required {
        let absent = match object.get(field) {
            None | Some(Json::Null) => true,
            Some(Json::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if absent {
            return Err(EngineError::RequiredField(code.clone()));
        }
    }

    let mut record = BTreeMap::new();
    for (name, value) in object {
        if columns.contains_key(name.as_str()) && !def.read_only_fields.contains(name) {
            record.insert(name.clone(), value.clone());
        }
    }

    // Ownership is stamped from the caller, never taken from the body.
    if columns.contains_key(&def.owner_field)
        && let Some(caller) = caller
    {
        record.insert(def.owner_field.clone(), caller.id.clone());
    }

    Ok(record)
}

/// Per-column coercion for mutation values. Arrays destined for integer
/// columns validate every element; other array/object values bind as JSON.
fn coerce_field(columns: &ColumnMap, name: &str, value: &Json) -> EngineResult<Value> {
    if let Json::Array(items) = value {
        if column_type(columns, name).is_some_and(ColumnType::is_integer) {
            for item in items {
                ColumnType::Integer.coerce(item)?;
            }
        }
        return Ok(Value::Json(Some(Box::new(value.clone()))));
    }
    crate::catalog::coerce_for_column(columns, name, value)
}
