//! Join/projection builder: computes the SELECT list for list/get-one.
//!
//! Resolves `_fields` and `_join` against the definition, emits plain left
//! joins, computed coalesce joins, alias columns, translation lookups,
//! soft-delete replacements and the search-distance column. Computed-join
//! and translation fragments are registered on the request state so the
//! filter translator can target them afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

use sea_query::{Alias, Expr, IntoColumnRef, Order, SelectStatement};
use serde_json::Value as Json;

use crate::catalog::coerce_for_column;
use crate::error::EngineResult;
use crate::resource::context::RequestState;
use crate::resource::expr::{
    coalesce_join, quote_ident, search_distance, sql_literal, translation_lookup,
};
use crate::resource::types::{DELETE_FLAG_COLUMN, JoinDef, ResourceDef};

static EMPTY_BINDINGS: LazyLock<HashMap<String, Json>> = LazyLock::new(HashMap::new);

/// Query-string inputs the projection depends on.
#[derive(Debug)]
pub struct ProjectionInput<'a> {
    pub fields: Option<&'a str>,
    pub join: &'a [String],
    pub sort: Option<&'a str>,
    pub search: Option<&'a str>,
    /// Flattened binding source for computed-join where bindings.
    pub bindings: &'a HashMap<String, Json>,
}

impl Default for ProjectionInput<'_> {
    fn default() -> Self {
        Self {
            fields: None,
            join: &[],
            sort: None,
            search: None,
            bindings: &EMPTY_BINDINGS,
        }
    }
}

pub fn apply_projection(
    stmt: &mut SelectStatement,
    def: &ResourceDef,
    state: &mut RequestState<'_>,
    input: &ProjectionInput<'_>,
) -> EngineResult<()> {
    // `-relations` is a marker for the relation expansion layer, not a column.
    let mut fields: Option<Vec<String>> = input.fields.map(|raw| {
        raw.split(',')
            .filter(|token| !token.is_empty() && *token != "-relations")
            .map(String::from)
            .collect()
    });

    apply_left_joins(stmt, def, &fields, input.sort);

    // Static joins plus any requested on-demand joins, deduplicated.
    let mut joins: Vec<&JoinDef> = def.joins.iter().collect();
    for name in input.join {
        for candidate in def.joins_on_demand.iter().filter(|join| join.matches(name)) {
            if !joins
                .iter()
                .any(|join| join.table == candidate.table && join.alias == candidate.alias)
            {
                joins.push(candidate);
            }
        }
    }

    // A `_fields` whitelist selects joins by name and loses those names from
    // the scalar column list.
    if let Some(f) = &mut fields {
        joins.retain(|join| f.iter().any(|name| join.matches(name)));
        f.retain(|name| !joins.iter().any(|join| join.matches(name)));
    }

    let replacements_active = def.keeps_deleted()
        && !def.deleted_replacements.is_empty()
        && state.columns.contains_key(DELETE_FLAG_COLUMN);
    let translating = state.translating(&def.lang);

    // Scalar columns: the whitelist or every known column, unknown names
    // dropped fail-open like everywhere else.
    let mut scalar: Vec<String> = match &fields {
        Some(f) => f.clone(),
        None => state.columns.keys().cloned().collect(),
    };
    scalar.sort();

    for name in scalar {
        if !state.columns.contains_key(&name) {
            continue;
        }
        if translating && def.translate.contains(&name) {
            // Replaced by the translation lookup below.
            continue;
        }
        match def
            .deleted_replacements
            .get(&name)
            .filter(|_| replacements_active)
        {
            Some(replacement) => {
                let sql = format!(
                    "CASE WHEN {table}.{flag} THEN ? ELSE {table}.{column} END",
                    table = quote_ident(&def.table),
                    flag = quote_ident(DELETE_FLAG_COLUMN),
                    column = quote_ident(&name),
                );
                let value = coerce_for_column(state.columns, &name, replacement)?;
                stmt.expr_as(Expr::cust_with_values(sql, [value]), Alias::new(&name));
            }
            None => {
                stmt.column((Alias::new(&def.table), Alias::new(&name)));
            }
        }
    }

    let mut alias_pairs: Vec<(&String, &String)> = def.aliases.iter().collect();
    alias_pairs.sort();
    for (source, alias) in alias_pairs {
        stmt.expr_as(
            Expr::col((Alias::new(&def.table), Alias::new(source))),
            Alias::new(alias),
        );
    }

    if translating {
        for field in &def.translate {
            let fragment = translation_lookup(&def.table, field, &state.lang);
            stmt.expr_as(fragment.expr(), Alias::new(field));
            state.lang_joins.insert(field.clone(), fragment);
        }
    }

    for join in joins {
        if join.table.is_empty() {
            if let Some(field) = &join.field {
                let name = join.alias.as_deref().unwrap_or(field);
                stmt.expr_as(Expr::cust(field.clone()), Alias::new(name));
            }
            continue;
        }

        let fragment = coalesce_join(join, &state.lang, input.bindings);
        let name = join.name().to_string();

        let replacement = replacements_active
            .then(|| {
                def.deleted_replacements.get(&join.table).or_else(|| {
                    join.subquery_alias
                        .as_ref()
                        .and_then(|alias| def.deleted_replacements.get(alias))
                        .or_else(|| {
                            join.alias
                                .as_ref()
                                .and_then(|alias| def.deleted_replacements.get(alias))
                        })
                })
            })
            .flatten();

        match replacement {
            Some(replacement) => {
                let sql = format!(
                    "CASE WHEN {table}.{flag} THEN {literal} ELSE {inner} END",
                    table = quote_ident(&def.table),
                    flag = quote_ident(DELETE_FLAG_COLUMN),
                    literal = sql_literal(replacement),
                    inner = fragment.sql,
                );
                stmt.expr_as(
                    Expr::cust_with_values(sql, fragment.values.clone()),
                    Alias::new(&name),
                );
            }
            None => {
                stmt.expr_as(fragment.expr(), Alias::new(&name));
            }
        }

        state.coalesce.insert(name, fragment);
    }

    if let Some(term) = input.search
        && !def.search_fields.is_empty()
    {
        let fragment = search_distance(&def.search_fields, &state.lang_joins, term);
        stmt.expr_as(fragment.expr(), Alias::new("_search_distance"));
        if input.sort.is_none() {
            stmt.order_by(Alias::new("_search_distance"), Order::Asc);
        }
    }

    for raw in &def.fields_raw {
        stmt.expr(Expr::cust(raw.clone()));
    }

    Ok(())
}

fn apply_left_joins(
    stmt: &mut SelectStatement,
    def: &ResourceDef,
    fields: &Option<Vec<String>>,
    sort: Option<&str>,
) {
    if def.left_joins.is_empty() {
        return;
    }

    for [table, left, right] in &def.left_joins {
        stmt.left_join(
            Alias::new(table),
            Expr::col(split_column(left)).equals(split_column(right)),
        );
    }

    if !def.left_join_distinct {
        return;
    }

    // DISTINCT ON the active sort columns that are not already projected;
    // without a whitelist a plain DISTINCT suffices.
    match fields {
        None => {
            stmt.distinct();
        }
        Some(f) => {
            let sort_source = sort
                .map(str::to_string)
                .or_else(|| def.default_sort.clone())
                .unwrap_or_default();
            let columns: Vec<sea_query::ColumnRef> = sort_source
                .split(',')
                .filter(|token| !token.is_empty())
                .map(|token| token.trim_start_matches('-'))
                .filter(|column| !f.iter().any(|name| name == column))
                .map(|column| (Alias::new(&def.table), Alias::new(column)).into_column_ref())
                .collect();
            if columns.is_empty() {
                stmt.distinct();
            } else {
                stmt.distinct_on(columns);
            }
        }
    }
}

fn split_column(name: &str) -> sea_query::ColumnRef {
    match name.split_once('.') {
        Some((table, column)) => (Alias::new(table), Alias::new(column)).into_column_ref(),
        None => Alias::new(name).into_column_ref(),
    }
}
