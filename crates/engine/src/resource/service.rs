//! Resource service: registry plus the five public operations.
//!
//! The service itself is immutable and `Arc`-shared; everything request
//! scoped lives in a fresh [`RequestState`] built at the top of each
//! operation. Query building is synchronous; the only awaits are the COUNT,
//! the main SELECT, and the mutation statements — in that order, so
//! pagination metadata always matches the filtered set.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use sea_query::{Alias, Asterisk, Expr, ExprTrait, Query, SelectStatement, SimpleExpr};
use serde::Serialize;
use serde_json::{Value as Json, json};
use sqlx::PgPool;
use tracing::info;

use crate::catalog::{ColumnMap, SchemaCatalog, coerce_for_column, column_type};
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::limits::PageLimits;
use crate::resource::context::RequestState;
use crate::resource::describe;
use crate::resource::expr::{flatten, search_predicate};
use crate::resource::filter::apply_filters;
use crate::resource::mutation::{insert_payload, update_payload, validate_id};
use crate::resource::pagination::{
    PaginationMeta, apply_cursor, apply_offset, clamp_page, clamp_skip, cursor_meta, cursor_spec,
    next_after_token, offset_meta,
};
use crate::resource::params::ListParams;
use crate::resource::projection::{ProjectionInput, apply_projection};
use crate::resource::sort::apply_sort;
use crate::resource::types::{
    Action, DELETE_FLAG_COLUMN, ID_COLUMN, ResourceDef, UPDATE_STAMP_COLUMN,
};
use crate::resource::visibility::{hidden_field_sets, strip_hidden};
use crate::roles::{Caller, RoleService};

/// Transport-level inputs for one operation.
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// Raw query pairs, duplicates preserved.
    pub query: Vec<(String, String)>,

    /// Path parameters.
    pub path: HashMap<String, String>,

    pub caller: Option<Caller>,
}

/// List envelope: rows plus pagination metadata.
#[derive(Debug, Serialize)]
pub struct ListResult {
    pub result: Vec<Json>,
    pub meta: PaginationMeta,
}

/// Delete outcome.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub ok: bool,
    pub count_deleted: u64,
}

/// Service executing resource operations against a PostgreSQL pool.
pub struct ResourceService {
    pool: PgPool,
    catalog: SchemaCatalog,
    limits: PageLimits,
    roles: Option<Arc<dyn RoleService>>,
    /// Host-supplied context values exposed to computed-join bindings under
    /// `env.`; keep secrets out of it.
    bind_context: Json,
    /// Registered resources by route prefix.
    resources: DashMap<String, Arc<ResourceDef>>,
}

impl ResourceService {
    pub fn new(
        pool: PgPool,
        catalog: SchemaCatalog,
        limits: PageLimits,
        roles: Option<Arc<dyn RoleService>>,
        bind_context: Json,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            catalog,
            limits,
            roles,
            bind_context,
            resources: DashMap::new(),
        })
    }

    /// Register a resource definition under its route prefix.
    pub fn register(&self, def: ResourceDef) -> EngineResult<()> {
        def.validate()?;
        let prefix = def.route_prefix().to_string();
        info!(resource = %prefix, table = %def.table, "resource registered");
        self.resources.insert(prefix, Arc::new(def));
        Ok(())
    }

    /// Look up a resource by route prefix.
    pub fn resource(&self, prefix: &str) -> Option<Arc<ResourceDef>> {
        self.resources.get(prefix).map(|entry| entry.clone())
    }

    /// All registered resources.
    pub fn resources(&self) -> Vec<Arc<ResourceDef>> {
        self.resources.iter().map(|entry| entry.clone()).collect()
    }

    /// Describe payload for an action (served on OPTIONS).
    pub fn describe(&self, def: &ResourceDef, action: Action, item: bool) -> Json {
        let columns = self.columns(def);
        match (action, item) {
            (Action::Get, false) => describe::describe_list(def, &columns),
            (Action::Get, true) => describe::describe_get_one(def),
            (Action::Add, _) => describe::describe_create(def, &columns),
            (Action::Update, _) => describe::describe_update(def, &columns),
            (Action::Delete, _) => describe::describe_delete(def),
        }
    }

    /// List rows: filtered, sorted, paginated, joined, visibility-filtered.
    pub async fn list(&self, def: &ResourceDef, req: &ResourceRequest) -> EngineResult<ListResult> {
        let params = ListParams::from_pairs(&req.query);
        let columns = self.columns(def);
        let lang = params.lang.clone().unwrap_or_else(|| def.lang.clone());
        let mut state = RequestState::new(&columns, req.caller.as_ref(), lang);

        let bindings = self.binding_source(req);
        let mut stmt = base_select(def);
        apply_projection(
            &mut stmt,
            def,
            &mut state,
            &ProjectionInput {
                fields: params.fields.as_deref(),
                join: &params.join,
                sort: params.sort.as_deref(),
                search: params.search.as_deref(),
                bindings: &bindings,
            },
        )?;

        let mut default_filters: Vec<(String, Json)> = def
            .default_filters
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        default_filters.sort_by(|a, b| a.0.cmp(&b.0));
        apply_filters(&mut stmt, &default_filters, def, &state, true)?;
        apply_filters(&mut stmt, &params.filters, def, &state, false)?;

        if let Some(raw) = &def.default_filters_raw {
            stmt.and_where(Expr::cust(format!("({raw})")));
        }

        if let Some(term) = &params.search
            && !def.search_fields.is_empty()
        {
            stmt.and_where(search_predicate(&def.search_fields, &state.lang_joins, term).expr());
        }

        exclude_deleted(&mut stmt, def, &columns);

        // COUNT runs to completion before the main query.
        let total = db::fetch_count(&self.pool, &count_of(&stmt)).await?.max(0) as u64;

        apply_sort(&mut stmt, params.sort.as_deref(), def, &state);

        let limit = self
            .limits
            .resolve(params.limit.as_deref(), params.unlimited.as_deref());
        let spec = cursor_spec(params.sort.as_deref(), def.default_sort.as_deref(), &columns);

        let page = clamp_page(params.page.as_deref());
        let skip = clamp_skip(params.skip.as_deref());

        if let (Some(after), Some(limit), Some(spec)) = (&params.after, limit, spec) {
            let boundary =
                coerce_for_column(&columns, spec.column, &Json::String(after.clone()))?;
            apply_cursor(&mut stmt, spec, boundary, limit);
        } else {
            apply_offset(&mut stmt, limit, page, skip);
        }

        let mut rows = db::fetch_rows(&self.pool, &stmt).await?;

        let next_after =
            spec.and_then(|spec| next_after_token(&rows, spec.column, &columns, spec.descending));

        // Meta shape follows `_after` presence alone.
        let meta = match &params.after {
            Some(after) => cursor_meta(total, after.clone(), next_after, rows.len(), limit),
            None => offset_meta(total, limit, page, skip, next_after),
        };

        let sets = hidden_field_sets(def, self.roles.as_ref(), req.caller.as_ref()).await;
        strip_hidden(&mut rows, &sets, def, req.caller.as_ref());

        info!(resource = %def.table, total, returned = rows.len(), "list executed");
        Ok(ListResult { result: rows, meta })
    }

    /// Fetch a single row by id, with the same projection and visibility
    /// rules as list.
    pub async fn get_one(
        &self,
        def: &ResourceDef,
        id: &str,
        req: &ResourceRequest,
    ) -> EngineResult<Option<Json>> {
        let params = ListParams::from_pairs(&req.query);
        let columns = self.columns(def);
        let lang = params.lang.clone().unwrap_or_else(|| def.lang.clone());
        let mut state = RequestState::new(&columns, req.caller.as_ref(), lang);

        let id_value = validate_id(id, &columns)?;

        // Extra query filters: known physical columns only, validated
        // strictly (the id route is not fail-open about integer values).
        let mut filters: Vec<(String, Json)> = Vec::new();
        for (key, value) in &params.filters {
            if key.starts_with('_') || !columns.contains_key(key.as_str()) {
                continue;
            }
            if column_type(&columns, key).is_some_and(crate::catalog::ColumnType::is_integer) {
                let items = match value {
                    Json::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                for item in items {
                    crate::catalog::ColumnType::Integer.coerce(item)?;
                }
            }
            filters.push((key.clone(), value.clone()));
        }

        let bindings = self.binding_source(req);
        let mut stmt = base_select(def);
        apply_projection(
            &mut stmt,
            def,
            &mut state,
            &ProjectionInput {
                fields: params.fields.as_deref(),
                join: &params.join,
                bindings: &bindings,
                ..ProjectionInput::default()
            },
        )?;

        apply_filters(&mut stmt, &filters, def, &state, true)?;
        stmt.and_where(
            Expr::col((Alias::new(&def.table), Alias::new(ID_COLUMN))).eq(id_value),
        );
        if let Some(raw) = &def.default_filters_raw {
            stmt.and_where(Expr::cust(format!("({raw})")));
        }
        exclude_deleted(&mut stmt, def, &columns);
        stmt.limit(1);

        let row = db::fetch_optional_row(&self.pool, &stmt).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let sets = hidden_field_sets(def, self.roles.as_ref(), req.caller.as_ref()).await;
        let mut rows = [row];
        strip_hidden(&mut rows, &sets, def, req.caller.as_ref());
        let [row] = rows;
        Ok(Some(row))
    }

    /// Insert one record or a batch; returns the inserted row(s).
    pub async fn create(
        &self,
        def: &ResourceDef,
        body: &Json,
        req: &ResourceRequest,
    ) -> EngineResult<Json> {
        let columns = self.columns(def);
        let payload = insert_payload(body, def, &columns, req.caller.as_ref())?;

        let mut stmt = Query::insert();
        stmt.into_table((Alias::new(&def.schema), Alias::new(&def.table)));
        if payload.columns.is_empty() {
            stmt.or_default_values();
        } else {
            stmt.columns(payload.columns.iter().map(Alias::new).collect::<Vec<_>>());
            for row in payload.rows {
                stmt.values(row.into_iter().map(SimpleExpr::from))
                    .map_err(|e| EngineError::Internal(anyhow::anyhow!(e)))?;
            }
        }
        stmt.returning_all();

        let rows = db::insert_returning(&self.pool, &stmt).await?;
        info!(resource = %def.table, inserted = rows.len(), "rows inserted");

        Ok(if payload.single {
            rows.into_iter().next().unwrap_or(Json::Null)
        } else {
            Json::Array(rows)
        })
    }

    /// Update the path-identified row, then re-read it through `get_one` so
    /// the caller gets the canonical, visibility-filtered representation.
    pub async fn update(
        &self,
        def: &ResourceDef,
        id: &str,
        body: &Json,
        req: &ResourceRequest,
    ) -> EngineResult<Option<Json>> {
        let columns = self.columns(def);
        let id_value = validate_id(id, &columns)?;
        let values = update_payload(body, def, &columns)?;

        if !values.is_empty() {
            let stmt = update_statement(def, &columns, id_value, values);
            let affected = db::execute_update(&self.pool, &stmt).await?;
            info!(resource = %def.table, id, affected, "row updated");
        }

        self.get_one(def, id, req).await
    }

    /// Soft-delete when the table carries the delete flag, hard DELETE
    /// otherwise.
    pub async fn delete(
        &self,
        def: &ResourceDef,
        id: &str,
        _req: &ResourceRequest,
    ) -> EngineResult<DeleteResult> {
        let columns = self.columns(def);
        let id_value = validate_id(id, &columns)?;

        let count_deleted = if columns.contains_key(DELETE_FLAG_COLUMN) {
            let stmt = soft_delete_statement(def, id_value);
            db::execute_update(&self.pool, &stmt).await?
        } else {
            let stmt = hard_delete_statement(def, id_value);
            db::execute_delete(&self.pool, &stmt).await?
        };

        info!(resource = %def.table, id, count_deleted, "row deleted");
        Ok(DeleteResult {
            ok: true,
            count_deleted,
        })
    }

    fn columns(&self, def: &ResourceDef) -> ColumnMap {
        self.catalog
            .columns(&def.schema, &def.table)
            .cloned()
            .unwrap_or_default()
    }

    /// Flattened binding source for computed-join where bindings: host
    /// context under `env.`, path parameters under `params.`, query
    /// parameters under `query.`.
    fn binding_source(&self, req: &ResourceRequest) -> HashMap<String, Json> {
        let mut query = serde_json::Map::new();
        for (key, value) in &req.query {
            query
                .entry(key.clone())
                .or_insert_with(|| Json::String(value.clone()));
        }
        let params: serde_json::Map<String, Json> = req
            .path
            .iter()
            .map(|(key, value)| (key.clone(), Json::String(value.clone())))
            .collect();

        let mut out = HashMap::new();
        flatten(
            &json!({
                "env": self.bind_context,
                "params": params,
                "query": query,
            }),
            "",
            &mut out,
        );
        out
    }
}

fn base_select(def: &ResourceDef) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.from((Alias::new(&def.schema), Alias::new(&def.table)));
    stmt
}

/// Wrap the filtered statement in `SELECT COUNT(*) FROM (…) w`.
fn count_of(stmt: &SelectStatement) -> SelectStatement {
    let mut count = Query::select();
    count
        .expr(Expr::col(Asterisk).count())
        .from_subquery(stmt.clone(), Alias::new("w"));
    count
}

/// UPDATE for the path-identified row: whitelisted values, an update stamp
/// when the column exists, and — on soft-deletable tables — a WHERE that
/// keeps deleted rows untouchable.
fn update_statement(
    def: &ResourceDef,
    columns: &ColumnMap,
    id_value: sea_query::Value,
    values: Vec<(String, sea_query::Value)>,
) -> sea_query::UpdateStatement {
    let mut stmt = Query::update();
    stmt.table((Alias::new(&def.schema), Alias::new(&def.table)));
    for (name, value) in values {
        stmt.value(Alias::new(&name), value);
    }
    if columns.contains_key(UPDATE_STAMP_COLUMN) {
        stmt.value(Alias::new(UPDATE_STAMP_COLUMN), Expr::current_timestamp());
    }
    stmt.and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id_value));
    // A soft-deleted row can be neither mutated nor resurrected.
    if columns.contains_key(DELETE_FLAG_COLUMN) {
        stmt.and_where(Expr::col(Alias::new(DELETE_FLAG_COLUMN)).eq(false));
    }
    stmt
}

/// Flag-set UPDATE scoped to rows that are not already deleted.
fn soft_delete_statement(def: &ResourceDef, id_value: sea_query::Value) -> sea_query::UpdateStatement {
    let mut stmt = Query::update();
    stmt.table((Alias::new(&def.schema), Alias::new(&def.table)));
    stmt.value(Alias::new(DELETE_FLAG_COLUMN), true);
    stmt.and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id_value));
    stmt.and_where(Expr::col(Alias::new(DELETE_FLAG_COLUMN)).eq(false));
    stmt
}

fn hard_delete_statement(def: &ResourceDef, id_value: sea_query::Value) -> sea_query::DeleteStatement {
    let mut stmt = Query::delete();
    stmt.from_table((Alias::new(&def.schema), Alias::new(&def.table)));
    stmt.and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id_value));
    stmt
}

/// Hide soft-deleted rows unless the resource keeps them.
fn exclude_deleted(stmt: &mut SelectStatement, def: &ResourceDef, columns: &ColumnMap) {
    if def.keeps_deleted() || !columns.contains_key(DELETE_FLAG_COLUMN) {
        return;
    }
    stmt.and_where(
        Expr::col((Alias::new(&def.table), Alias::new(DELETE_FLAG_COLUMN))).eq(false),
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnInfo, ColumnType};
    use sea_query::PostgresQueryBuilder;

    fn columns() -> ColumnMap {
        let mut map = ColumnMap::new();
        for (name, data_type) in [
            ("id", ColumnType::Integer),
            ("name", ColumnType::String),
            ("is_deleted", ColumnType::Boolean),
        ] {
            map.insert(
                name.to_string(),
                ColumnInfo {
                    data_type,
                    nullable: false,
                },
            );
        }
        map
    }

    #[test]
    fn count_wraps_the_filtered_statement() {
        let mut stmt = Query::select();
        stmt.column(Alias::new("id"))
            .from(Alias::new("users"))
            .and_where(Expr::col(Alias::new("name")).eq("x"));
        let sql = count_of(&stmt).to_string(PostgresQueryBuilder);
        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains("FROM (SELECT"), "{sql}");
        assert!(sql.contains("\"name\" = 'x'"), "{sql}");
        assert!(sql.contains(") AS \"w\""), "{sql}");
    }

    #[test]
    fn soft_delete_filter_applies_only_with_flag_column() {
        let def = ResourceDef {
            table: "users".into(),
            ..ResourceDef::default()
        };

        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        exclude_deleted(&mut stmt, &def, &columns());
        let sql = stmt.to_string(PostgresQueryBuilder);
        assert!(sql.contains("\"users\".\"is_deleted\" = FALSE"), "{sql}");

        let mut bare = ColumnMap::new();
        bare.insert(
            "id".to_string(),
            ColumnInfo {
                data_type: ColumnType::Integer,
                nullable: false,
            },
        );
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        exclude_deleted(&mut stmt, &def, &bare);
        assert!(!stmt.to_string(PostgresQueryBuilder).contains("is_deleted"));
    }

    #[test]
    fn include_deleted_skips_the_filter() {
        let def = ResourceDef {
            table: "users".into(),
            include_deleted: Some(true),
            ..ResourceDef::default()
        };
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        exclude_deleted(&mut stmt, &def, &columns());
        assert!(!stmt.to_string(PostgresQueryBuilder).contains("is_deleted"));
    }

    #[test]
    fn soft_delete_issues_a_flag_update_scoped_to_live_rows() {
        let def = ResourceDef {
            table: "users".into(),
            ..ResourceDef::default()
        };
        let sql = soft_delete_statement(&def, sea_query::Value::BigInt(Some(5)))
            .to_string(PostgresQueryBuilder);
        assert!(sql.starts_with("UPDATE"), "{sql}");
        assert!(sql.contains("\"is_deleted\" = TRUE"), "{sql}");
        assert!(sql.contains("\"id\" = 5"), "{sql}");
        assert!(sql.contains("\"is_deleted\" = FALSE"), "{sql}");
    }

    #[test]
    fn hard_delete_without_flag_column() {
        let def = ResourceDef {
            table: "logs".into(),
            ..ResourceDef::default()
        };
        let sql = hard_delete_statement(&def, sea_query::Value::BigInt(Some(5)))
            .to_string(PostgresQueryBuilder);
        assert!(sql.starts_with("DELETE FROM"), "{sql}");
        assert!(sql.contains("\"id\" = 5"), "{sql}");
    }

    #[test]
    fn update_stamps_and_protects_deleted_rows() {
        let def = ResourceDef {
            table: "users".into(),
            ..ResourceDef::default()
        };
        let mut cols = columns();
        cols.insert(
            "changed".to_string(),
            ColumnInfo {
                data_type: ColumnType::Timestamp,
                nullable: false,
            },
        );
        let values = vec![(
            "name".to_string(),
            sea_query::Value::String(Some(Box::new("Alice".into()))),
        )];
        let sql = update_statement(&def, &cols, sea_query::Value::BigInt(Some(5)), values)
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains("\"name\" = 'Alice'"), "{sql}");
        assert!(sql.contains("\"changed\" = CURRENT_TIMESTAMP"), "{sql}");
        assert!(sql.contains("\"id\" = 5"), "{sql}");
        assert!(sql.contains("\"is_deleted\" = FALSE"), "{sql}");
        // The path id lands in the WHERE clause only, never in SET.
        assert!(!sql.contains("\"id\" = 5,"), "{sql}");
    }
}
