//! Raw SQL fragment construction for computed joins, translation lookups and
//! search ranking.
//!
//! This is the only module in the crate that assembles SQL text by hand.
//! Its inputs are configuration-time values (trusted identifiers and
//! fragments from a [`JoinDef`]) and bound parameters; request strings are
//! never spliced into the text. Fragments carry their bind values alongside
//! the SQL so callers can only use them parameterized.

use std::collections::HashMap;

use sea_query::{Expr, SimpleExpr, Value};
use serde_json::Value as Json;

use crate::resource::types::{JoinDef, JoinField, SubqueryJoin};

/// Table holding translated strings: `(lang, source, text)`.
pub const TRANSLATION_TABLE: &str = "translation";

/// A raw SQL fragment plus the values bound to its `?` placeholders.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub values: Vec<Value>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// The fragment as a parameterized expression.
    pub fn expr(&self) -> SimpleExpr {
        Expr::cust_with_values(self.sql.clone(), self.values.clone())
    }

    /// `[NOT] <fragment> <op> ?` with one extra bound value.
    pub fn compare(&self, op: &str, value: Value, negated: bool) -> SimpleExpr {
        let not = if negated { "NOT " } else { "" };
        let mut values = self.values.clone();
        values.push(value);
        Expr::cust_with_values(format!("{not}{} {op} ?", self.sql), values)
    }
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a trusted configuration value as a SQL literal.
///
/// Only ever called with values from the resource definition; request values
/// always go through binds.
pub fn sql_literal(value: &Json) -> String {
    match value {
        Json::Null => "NULL".to_string(),
        Json::Bool(true) => "TRUE".to_string(),
        Json::Bool(false) => "FALSE".to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Convert a JSON value to a bind value without catalog knowledge.
pub fn loose_value(value: &Json) -> Value {
    match value {
        Json::Null => Value::String(None),
        Json::Bool(b) => Value::Bool(Some(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::BigInt(Some(i))
            } else {
                Value::Double(n.as_f64())
            }
        }
        Json::String(s) => Value::String(Some(Box::new(s.clone()))),
        other => Value::Json(Some(Box::new(other.clone()))),
    }
}

/// Flatten a JSON tree into dotted-path keys (`env.site`, `params.id`).
pub fn flatten(value: &Json, prefix: &str, out: &mut HashMap<String, Json>) {
    match value {
        Json::Object(map) => {
            for (key, nested) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(nested, &path, out);
            }
        }
        Json::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(nested, &format!("{prefix}.{index}"), out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

/// Substitute `:name` tokens in a configured WHERE clause with `?`
/// placeholders, resolving each name through the declared binding map against
/// the flattened binding source. `::` type casts are left untouched; a
/// binding that resolves to nothing binds NULL.
pub fn resolve_bindings(
    clause: &str,
    bindings: &HashMap<String, String>,
    source: &HashMap<String, Json>,
) -> SqlFragment {
    let mut sql = String::with_capacity(clause.len());
    let mut values = Vec::new();
    let chars: Vec<char> = clause.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let is_token = chars[i] == ':'
            && (i == 0 || chars[i - 1] != ':')
            && chars
                .get(i + 1)
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_');
        if is_token {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            let name: String = chars[start..end].iter().collect();
            let resolved = bindings
                .get(&name)
                .and_then(|path| source.get(path))
                .cloned()
                .unwrap_or(Json::Null);
            sql.push('?');
            values.push(loose_value(&resolved));
            i = end;
            continue;
        }
        sql.push(chars[i]);
        i += 1;
    }

    SqlFragment::new(sql, values)
}

/// Build the COALESCE subquery for a computed join.
///
/// ```text
/// COALESCE( ( SELECT <projection> FROM (
///     SELECT * FROM <schema>."table" AS "inner"
///     [LEFT JOIN ...]
///     WHERE <declared-where> [AND lang = ?]
///     [ORDER BY ...] [LIMIT n]
/// ) "inner")[index], <default|NULL>)
/// ```
pub fn coalesce_join(
    join: &JoinDef,
    lang: &str,
    source: &HashMap<String, Json>,
) -> SqlFragment {
    let inner = quote_ident(join.inner_alias());
    let projection = join_projection(join, &inner);

    let clause = if join.where_clause.trim().is_empty() {
        "TRUE"
    } else {
        join.where_clause.as_str()
    };
    let mut where_frag = resolve_bindings(clause, &join.where_bindings, source);

    // Joining the translation table scopes rows to the active language.
    if join.table == TRANSLATION_TABLE && is_lang_code(lang) {
        where_frag.sql.push_str(" AND lang = ?");
        where_frag
            .values
            .push(Value::String(Some(Box::new(lang.to_string()))));
    }

    let left_join = match &join.left_join {
        None => String::new(),
        Some(SubqueryJoin::Raw(raw)) => format!(" LEFT JOIN {raw}"),
        Some(SubqueryJoin::On([table, left, right])) => {
            format!(" LEFT JOIN {} ON {left} = {right}", quote_ident(table))
        }
    };

    let order_by = join
        .order_by
        .as_ref()
        .map(|order| format!(" ORDER BY {order}"))
        .unwrap_or_default();
    let limit = join
        .limit
        .map(|limit| format!(" LIMIT {limit}"))
        .unwrap_or_default();

    let schema = join
        .schema
        .as_ref()
        .map(|schema| format!("{}.", quote_ident(schema)))
        .unwrap_or_default();

    let index = join
        .by_index
        .map(|index| format!("[{index}]"))
        .unwrap_or_default();

    let default = join
        .default_value
        .as_ref()
        .map(sql_literal)
        .unwrap_or_else(|| "NULL".to_string());

    let sql = format!(
        "COALESCE(( SELECT {projection} FROM ( SELECT * FROM {schema}{table} AS {inner}{left_join} WHERE {where_sql}{order_by}{limit} ) {inner}){index}, {default})",
        table = quote_ident(&join.table),
        where_sql = where_frag.sql,
    );

    SqlFragment::new(sql, where_frag.values)
}

fn join_projection(join: &JoinDef, inner: &str) -> String {
    if let Some(field) = &join.field {
        return field.clone();
    }

    if join.fields.is_empty() {
        return format!("jsonb_agg({inner})");
    }

    let pairs: Vec<String> = join
        .fields
        .iter()
        .flat_map(|field| match field {
            JoinField::Column(name) => {
                vec![format!("'{name}', {inner}.{}", quote_ident(name))]
            }
            JoinField::Expr(map) => map
                .iter()
                .map(|(name, expr)| format!("'{name}', {expr}"))
                .collect(),
        })
        .collect();

    format!("jsonb_agg(json_build_object({}))", pairs.join(", "))
}

/// Language-coalesce expression for a translatable column: the translated
/// text when a row for the active language exists, else the original value.
pub fn translation_lookup(table: &str, field: &str, lang: &str) -> SqlFragment {
    let qualified = format!("{}.{}", quote_ident(table), quote_ident(field));
    let sql = format!(
        "COALESCE((SELECT t.text FROM {translation} t WHERE t.lang = ? AND t.source = {qualified} LIMIT 1), {qualified})",
        translation = quote_ident(TRANSLATION_TABLE),
    );
    SqlFragment::new(sql, vec![Value::String(Some(Box::new(lang.to_string())))])
}

/// Normalized trigram distance over the configured search fields: the average
/// of per-field `<->` distances, lower is closer.
pub fn search_distance(
    search_fields: &[String],
    lang_joins: &HashMap<String, SqlFragment>,
    term: &str,
) -> SqlFragment {
    let mut parts = Vec::with_capacity(search_fields.len());
    let mut values = Vec::new();

    for field in search_fields {
        let target = field_target(field, lang_joins, &mut values);
        parts.push(format!("COALESCE({target} <-> ?, 1)"));
        values.push(Value::String(Some(Box::new(term.to_string()))));
    }

    SqlFragment::new(
        format!("({}) / {}", parts.join(" + "), search_fields.len()),
        values,
    )
}

/// Trigram match predicate over the configured search fields.
pub fn search_predicate(
    search_fields: &[String],
    lang_joins: &HashMap<String, SqlFragment>,
    term: &str,
) -> SqlFragment {
    let mut parts = Vec::with_capacity(search_fields.len());
    let mut values = Vec::new();

    for field in search_fields {
        let target = field_target(field, lang_joins, &mut values);
        parts.push(format!("{target} % ?"));
        values.push(Value::String(Some(Box::new(term.to_string()))));
    }

    SqlFragment::new(format!("({})", parts.join(" OR ")), values)
}

fn field_target(
    field: &str,
    lang_joins: &HashMap<String, SqlFragment>,
    values: &mut Vec<Value>,
) -> String {
    match lang_joins.get(field) {
        Some(fragment) => {
            values.extend(fragment.values.iter().cloned());
            fragment.sql.clone()
        }
        None => quote_ident(field),
    }
}

fn is_lang_code(lang: &str) -> bool {
    lang.len() == 2 && lang.chars().all(|c| c.is_ascii_alphabetic())
}
