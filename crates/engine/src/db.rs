//! SQL execution helpers.
//!
//! Statements are built with sea-query, rendered with `$n` placeholders and
//! executed through sqlx with every value bound — never inlined. Dynamic
//! result rows come back as JSON by wrapping the SELECT in
//! `SELECT row_to_json(t) FROM (…) t`.

use sea_query::{
    DeleteStatement, InsertStatement, PostgresQueryBuilder, SelectStatement, UpdateStatement,
    Value,
};
use serde_json::Value as Json;
use sqlx::PgPool;

/// Bind a sea-query value list onto an sqlx query or query_scalar.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values.iter() {
            query = match value {
                Value::Bool(v) => query.bind(*v),
                Value::TinyInt(v) => query.bind(v.map(i16::from)),
                Value::SmallInt(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::BigInt(v) => query.bind(*v),
                Value::TinyUnsigned(v) => query.bind(v.map(i16::from)),
                Value::SmallUnsigned(v) => query.bind(v.map(i32::from)),
                Value::Unsigned(v) => query.bind(v.map(i64::from)),
                Value::BigUnsigned(v) => query.bind(v.map(|n| n as i64)),
                Value::Float(v) => query.bind(*v),
                Value::Double(v) => query.bind(*v),
                Value::String(v) => query.bind(v.as_deref().cloned()),
                Value::Bytes(v) => query.bind(v.as_deref().cloned()),
                Value::Json(v) => query.bind(v.as_deref().cloned()),
                Value::Uuid(v) => query.bind(v.as_deref().copied()),
                Value::ChronoDate(v) => query.bind(v.as_deref().copied()),
                Value::ChronoDateTime(v) => query.bind(v.as_deref().copied()),
                Value::ChronoDateTimeUtc(v) => query.bind(v.as_deref().copied()),
                _ => query.bind(Option::<String>::None),
            };
        }
        query
    }};
}

/// Fetch all rows of a SELECT as JSON objects.
pub async fn fetch_rows(pool: &PgPool, stmt: &SelectStatement) -> Result<Vec<Json>, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    let wrapped = format!("SELECT row_to_json(t) FROM ({sql}) t");
    bind_values!(sqlx::query_scalar::<_, Json>(&wrapped), values.0)
        .fetch_all(pool)
        .await
}

/// Fetch at most one row of a SELECT as a JSON object.
pub async fn fetch_optional_row(
    pool: &PgPool,
    stmt: &SelectStatement,
) -> Result<Option<Json>, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    let wrapped = format!("SELECT row_to_json(t) FROM ({sql}) t");
    bind_values!(sqlx::query_scalar::<_, Json>(&wrapped), values.0)
        .fetch_optional(pool)
        .await
}

/// Run a COUNT statement.
pub async fn fetch_count(pool: &PgPool, stmt: &SelectStatement) -> Result<i64, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    bind_values!(sqlx::query_scalar::<_, i64>(&sql), values.0)
        .fetch_one(pool)
        .await
}

/// Execute an INSERT … RETURNING and fetch the inserted rows as JSON.
pub async fn insert_returning(
    pool: &PgPool,
    stmt: &InsertStatement,
) -> Result<Vec<Json>, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    let wrapped = format!("WITH t AS ({sql}) SELECT row_to_json(t) FROM t");
    bind_values!(sqlx::query_scalar::<_, Json>(&wrapped), values.0)
        .fetch_all(pool)
        .await
}

/// Execute an UPDATE, returning the affected row count.
pub async fn execute_update(pool: &PgPool, stmt: &UpdateStatement) -> Result<u64, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    let result = bind_values!(sqlx::query(&sql), values.0)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Execute a DELETE, returning the affected row count.
pub async fn execute_delete(pool: &PgPool, stmt: &DeleteStatement) -> Result<u64, sqlx::Error> {
    let (sql, values) = stmt.build(PostgresQueryBuilder);
    let result = bind_values!(sqlx::query(&sql), values.0)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
