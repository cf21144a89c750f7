//! Filter translator: the reserved-suffix/prefix query grammar.
//!
//! Each query key is classified by [`classify`] — an ordered rule list, first
//! match wins — and then emitted as a predicate by [`emit`]. Untrusted input
//! is validated against the known columns, registered coalesce joins and
//! language joins first; unknown keys are dropped silently. That fail-open
//! posture is deliberate (stray query parameters must not break listings) and
//! pinned by tests.

use sea_query::{Alias, Cond, Expr, ExprTrait, SelectStatement};
use sea_query::extension::postgres::PgExpr;
use serde_json::Value as Json;

use crate::catalog::coerce_for_column;
use crate::error::{EngineError, EngineResult};
use crate::resource::context::RequestState;
use crate::resource::expr::loose_value;
use crate::resource::types::ResourceDef;

const STRIPPED_PREFIXES: [&str; 6] = ["_not_null_", "_null_", "_not_in_", "_in_", "_from_", "_to_"];

/// How a single query key translates into a predicate. Variants are listed in
/// precedence order; [`classify`] returns the first that applies.
#[derive(Debug, PartialEq, Eq)]
enum FilterRule {
    /// Equality against a registered language-coalesce expression.
    LangEquals { field: String },
    /// Equality against a registered computed-join expression; `!` negates.
    CoalesceEquals { name: String, negated: bool },
    /// `~` suffix: case-insensitive LIKE.
    ILike { column: String },
    /// `!` suffix: not-equals, or NOT IN for array values.
    NotEquals { column: String },
    IsNull { column: String },
    IsNotNull { column: String },
    /// `_in_` / `_not_in_`: JSON-array-encoded value.
    InList { column: String, negated: bool },
    /// `_from_` / `_to_`: `>=` / `<=`.
    Range { column: String, lower: bool },
    /// Bare key with an array value.
    ArrayIn { column: String },
    /// Bare key with a null value.
    NullEquals { column: String },
    /// Bare key qualified by the primary table (left joins configured).
    TableQualified { column: String },
    Equals { column: String },
}

/// Apply a set of filters to the statement.
///
/// `trusted` skips key validation and is reserved for engine-supplied
/// default filters.
pub fn apply_filters(
    stmt: &mut SelectStatement,
    filters: &[(String, Json)],
    def: &ResourceDef,
    state: &RequestState<'_>,
    trusted: bool,
) -> EngineResult<()> {
    for (key, value) in filters {
        if !trusted && !is_known_key(key, state) {
            continue;
        }
        emit(stmt, classify(key, value, def, state), value, def, state)?;
    }
    Ok(())
}

fn classify(key: &str, value: &Json, def: &ResourceDef, state: &RequestState<'_>) -> FilterRule {
    if state.lang_joins.contains_key(key) {
        return FilterRule::LangEquals {
            field: key.to_string(),
        };
    }

    let unbanged = key.strip_suffix('!').unwrap_or(key);
    if state.coalesce.contains_key(key) || state.coalesce.contains_key(unbanged) {
        return FilterRule::CoalesceEquals {
            name: unbanged.to_string(),
            negated: key.ends_with('!'),
        };
    }

    if let Some(column) = key.strip_suffix('~') {
        return FilterRule::ILike {
            column: column.to_string(),
        };
    }
    if let Some(column) = key.strip_suffix('!') {
        return FilterRule::NotEquals {
            column: column.to_string(),
        };
    }
    if let Some(column) = key.strip_prefix("_not_null_") {
        return FilterRule::IsNotNull {
            column: column.to_string(),
        };
    }
    if let Some(column) = key.strip_prefix("_null_") {
        return FilterRule::IsNull {
            column: column.to_string(),
        };
    }
    if let Some(column) = key.strip_prefix("_not_in_") {
        return FilterRule::InList {
            column: column.to_string(),
            negated: true,
        };
    }
    if let Some(column) = key.strip_prefix("_in_") {
        return FilterRule::InList {
            column: column.to_string(),
            negated: false,
        };
    }
    if let Some(column) = key.strip_prefix("_from_") {
        return FilterRule::Range {
            column: column.to_string(),
            lower: true,
        };
    }
    if let Some(column) = key.strip_prefix("_to_") {
        return FilterRule::Range {
            column: column.to_string(),
            lower: false,
        };
    }

    if value.is_array() {
        return FilterRule::ArrayIn {
            column: key.to_string(),
        };
    }
    if value.is_null() {
        return FilterRule::NullEquals {
            column: key.to_string(),
        };
    }
    if !def.left_joins.is_empty() && !key.contains('.') {
        return FilterRule::TableQualified {
            column: key.to_string(),
        };
    }

    FilterRule::Equals {
        column: key.to_string(),
    }
}

fn emit(
    stmt: &mut SelectStatement,
    rule: FilterRule,
    value: &Json,
    def: &ResourceDef,
    state: &RequestState<'_>,
) -> EngineResult<()> {
    match rule {
        FilterRule::LangEquals { field } => {
            if let Some(fragment) = state.lang_joins.get(&field) {
                stmt.and_where(fragment.compare("=", loose_value(value), false));
            }
        }
        FilterRule::CoalesceEquals { name, negated } => {
            let Some(fragment) = state.coalesce.get(&name) else {
                return Ok(());
            };
            match value {
                Json::Array(items) => {
                    let mut any = Cond::any();
                    for item in items {
                        any = any.add(fragment.compare("=", loose_value(item), negated));
                    }
                    stmt.cond_where(any);
                }
                single => {
                    stmt.and_where(fragment.compare("=", loose_value(single), negated));
                }
            }
        }
        FilterRule::ILike { column } => {
            let pattern = match value {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            stmt.and_where(column_expr(&column).ilike(pattern));
        }
        FilterRule::NotEquals { column } => match value {
            Json::Array(items) => {
                stmt.and_where(
                    column_expr(&column).is_not_in(coerce_all(&column, items, state)?),
                );
            }
            single => {
                stmt.and_where(
                    column_expr(&column).ne(coerce_for_column(state.columns, &column, single)?),
                );
            }
        },
        FilterRule::IsNull { column } => {
            stmt.and_where(column_expr(&column).is_null());
        }
        FilterRule::IsNotNull { column } => {
            stmt.and_where(column_expr(&column).is_not_null());
        }
        FilterRule::InList { column, negated } => {
            let items = parse_in_list(value)?;
            let values = coerce_all(&column, &items, state)?;
            if negated {
                stmt.and_where(column_expr(&column).is_not_in(values));
            } else {
                stmt.and_where(column_expr(&column).is_in(values));
            }
        }
        FilterRule::Range { column, lower } => {
            if value == &Json::String(String::new()) {
                return Ok(());
            }
            let op = if lower { ">=" } else { "<=" };
            if let Some(fragment) = state.coalesce.get(&column) {
                stmt.and_where(fragment.compare(op, loose_value(value), false));
            } else {
                let coerced = coerce_for_column(state.columns, &column, value)?;
                let expr = column_expr(&column);
                stmt.and_where(if lower {
                    expr.gte(coerced)
                } else {
                    expr.lte(coerced)
                });
            }
        }
        FilterRule::ArrayIn { column } => {
            let Json::Array(items) = value else {
                return Ok(());
            };
            stmt.and_where(column_expr(&column).is_in(coerce_all(&column, items, state)?));
        }
        FilterRule::NullEquals { column } => {
            stmt.and_where(column_expr(&column).is_null());
        }
        FilterRule::TableQualified { column } => {
            let coerced = coerce_for_column(state.columns, &column, value)?;
            stmt.and_where(
                Expr::col((Alias::new(&def.table), Alias::new(column))).eq(coerced),
            );
        }
        FilterRule::Equals { column } => {
            let coerced = coerce_for_column(state.columns, &column, value)?;
            stmt.and_where(column_expr(&column).eq(coerced));
        }
    }
    Ok(())
}

/// Column reference, splitting dotted keys into `table.column`.
fn column_expr(key: &str) -> Expr {
    match key.split_once('.') {
        Some((table, column)) => Expr::col((Alias::new(table), Alias::new(column))),
        None => Expr::col(Alias::new(key)),
    }
}

fn coerce_all(
    column: &str,
    items: &[Json],
    state: &RequestState<'_>,
) -> EngineResult<Vec<sea_query::Value>> {
    items
        .iter()
        .map(|item| coerce_for_column(state.columns, column, item))
        .collect()
}

/// `_in_` / `_not_in_` values arrive as a JSON-array-encoded string.
fn parse_in_list(value: &Json) -> EngineResult<Vec<Json>> {
    let Json::String(raw) = value else {
        return Err(EngineError::QueryValue);
    };
    match serde_json::from_str::<Json>(raw) {
        Ok(Json::Array(items)) => Ok(items),
        _ => Err(EngineError::QueryValue),
    }
}

/// Whether an untrusted key resolves to something queryable.
fn is_known_key(key: &str, state: &RequestState<'_>) -> bool {
    let clean = clean_key(key);
    if state.columns.contains_key(clean) {
        return true;
    }
    if clean.contains('.') {
        let column = clean.rsplit('.').next().unwrap_or(clean);
        if state.columns.contains_key(column) {
            return true;
        }
    }
    state.coalesce.contains_key(clean) || state.lang_joins.contains_key(clean)
}

fn clean_key(key: &str) -> &str {
    let mut clean = key;
    for prefix in STRIPPED_PREFIXES {
        if let Some(stripped) = clean.strip_prefix(prefix) {
            clean = stripped;
            break;
        }
    }
    clean
        .strip_suffix(['!', '~'])
        .unwrap_or(clean)
}
