//! Pagination: offset and cursor modes, plus response metadata.
//!
//! The mode is chosen solely by presence of `_after`. Offset inputs clamp
//! rather than error: a garbage `_page` resolves to 1, a negative `_skip` to
//! 0. Cursor mode pages by `column <|> value` on the first sort field.

use sea_query::{Alias, Expr, ExprTrait, SelectStatement, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::catalog::{ColumnMap, ColumnType, column_type};

/// Pagination metadata returned in the list envelope.
///
/// Exactly one of the offset-mode set (`limit`/`skip`/`page`/`pages`/
/// `nextPage`) or the cursor-mode set (`after`) is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_after: Option<String>,

    pub is_first_page: bool,
    pub is_last_page: bool,
}

/// Cursor pagination target: the first sort token, resolved to a physical
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSpec<'a> {
    pub column: &'a str,
    pub descending: bool,
}

/// Resolve the cursor column from the request or default sort.
pub fn cursor_spec<'a>(
    sort: Option<&'a str>,
    default_sort: Option<&'a str>,
    columns: &ColumnMap,
) -> Option<CursorSpec<'a>> {
    let sort = sort.or(default_sort)?;
    let first = sort.split(',').next().filter(|token| !token.is_empty())?;
    let (column, descending) = match first.strip_prefix('-') {
        Some(name) => (name, true),
        None => (first, false),
    };
    columns
        .contains_key(column)
        .then_some(CursorSpec { column, descending })
}

/// Emit the cursor predicate and limit.
pub fn apply_cursor(stmt: &mut SelectStatement, spec: CursorSpec<'_>, after: Value, limit: u64) {
    let column = Expr::col(Alias::new(spec.column));
    stmt.and_where(if spec.descending {
        column.lt(after)
    } else {
        column.gt(after)
    });
    stmt.limit(limit);
}

/// Emit LIMIT/OFFSET; a `None` limit leaves the query unpaginated.
pub fn apply_offset(stmt: &mut SelectStatement, limit: Option<u64>, page: u64, skip: u64) {
    let Some(limit) = limit else {
        return;
    };
    stmt.limit(limit);
    stmt.offset(page.saturating_sub(1) * limit + skip);
}

/// Clamp `_page`: floor 1, garbage input resolves to the floor.
pub fn clamp_page(value: Option<&str>) -> u64 {
    clamp(value, 1)
}

/// Clamp `_skip`: floor 0.
pub fn clamp_skip(value: Option<&str>) -> u64 {
    clamp(value, 0)
}

fn clamp(value: Option<&str>, floor: u64) -> u64 {
    match value.and_then(|raw| raw.parse::<f64>().ok()) {
        Some(n) if n.is_finite() && n >= floor as f64 => n.floor() as u64,
        _ => floor,
    }
}

/// Metadata for offset mode.
pub fn offset_meta(
    total: u64,
    limit: Option<u64>,
    page: u64,
    skip: u64,
    next_after: Option<String>,
) -> PaginationMeta {
    let limit = limit.unwrap_or(0);
    let pages = if limit == 0 {
        1
    } else {
        (total.saturating_sub(skip)).div_ceil(limit).max(1)
    };

    PaginationMeta {
        total,
        limit: Some(limit),
        skip: Some(skip),
        page: Some(page),
        pages: Some(pages),
        next_page: (page < pages).then(|| page + 1),
        // Cursor hand-off is only offered from the first page.
        next_after: if page == 1 { next_after } else { None },
        after: None,
        is_first_page: page <= 1,
        is_last_page: page >= pages,
    }
}

/// Metadata for cursor mode.
pub fn cursor_meta(
    total: u64,
    after: String,
    next_after: Option<String>,
    returned: usize,
    limit: Option<u64>,
) -> PaginationMeta {
    PaginationMeta {
        total,
        after: Some(after),
        next_after,
        is_first_page: false,
        is_last_page: returned == 0 || limit.is_some_and(|l| (returned as u64) < l),
        ..PaginationMeta::default()
    }
}

/// Cursor token for the next page: the last row's cursor value.
///
/// Temporal values are ISO-formatted with a `999`/`000` microsecond suffix so
/// the boundary is exclusive in the right direction for `<`/`>` paging.
/// The token is URL-encoded.
pub fn next_after_token(
    rows: &[Json],
    column: &str,
    columns: &ColumnMap,
    descending: bool,
) -> Option<String> {
    let value = rows.last()?.get(column)?;
    let temporal = column_type(columns, column).is_some_and(ColumnType::is_temporal);

    let token = match value {
        Json::Null => return None,
        Json::String(s) if temporal => match parse_row_timestamp(s) {
            Some(timestamp) => {
                let suffix = if descending { "000" } else { "999" };
                format!("{}{suffix}Z", timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"))
            }
            None => s.clone(),
        },
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    };

    Some(urlencoding::encode(&token).into_owned())
}

/// Timestamps come back from `row_to_json` in a few spellings.
fn parse_row_timestamp(raw: &str) -> Option<chrono::NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::ColumnInfo;
    use sea_query::{PostgresQueryBuilder, Query};
    use serde_json::json;

    fn columns() -> ColumnMap {
        let mut map = ColumnMap::new();
        map.insert(
            "created".to_string(),
            ColumnInfo {
                data_type: ColumnType::Timestamp,
                nullable: false,
            },
        );
        map.insert(
            "name".to_string(),
            ColumnInfo {
                data_type: ColumnType::String,
                nullable: false,
            },
        );
        map
    }

    #[test]
    fn page_and_skip_clamp_instead_of_erroring() {
        assert_eq!(clamp_page(Some("-5")), 1);
        assert_eq!(clamp_page(Some("abc")), 1);
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some("3")), 3);
        assert_eq!(clamp_page(Some("2.9")), 2);

        assert_eq!(clamp_skip(Some("-1")), 0);
        assert_eq!(clamp_skip(Some("7")), 7);
    }

    #[test]
    fn offset_is_page_times_limit_plus_skip() {
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        apply_offset(&mut stmt, Some(10), 3, 5);
        let sql = stmt.to_string(PostgresQueryBuilder);
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 25"), "{sql}");
    }

    #[test]
    fn no_limit_means_no_pagination() {
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        apply_offset(&mut stmt, None, 3, 5);
        let sql = stmt.to_string(PostgresQueryBuilder);
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert!(!sql.contains("OFFSET"), "{sql}");
    }

    #[test]
    fn pages_is_floored_at_one() {
        let meta = offset_meta(3, Some(10), 1, 100, None);
        assert_eq!(meta.pages, Some(1));
        assert!(meta.is_last_page);
    }

    #[test]
    fn offset_meta_middle_page() {
        let meta = offset_meta(45, Some(10), 2, 0, None);
        assert_eq!(meta.pages, Some(5));
        assert_eq!(meta.next_page, Some(3));
        assert!(!meta.is_first_page);
        assert!(!meta.is_last_page);
    }

    #[test]
    fn next_after_only_on_first_page() {
        let first = offset_meta(45, Some(10), 1, 0, Some("tok".into()));
        assert_eq!(first.next_after.as_deref(), Some("tok"));

        let second = offset_meta(45, Some(10), 2, 0, Some("tok".into()));
        assert!(second.next_after.is_none());
    }

    #[test]
    fn cursor_spec_uses_first_sort_field_only() {
        let cols = columns();
        let spec = cursor_spec(Some("-created,name"), None, &cols).unwrap();
        assert_eq!(spec.column, "created");
        assert!(spec.descending);
    }

    #[test]
    fn cursor_spec_requires_known_column() {
        let cols = columns();
        assert!(cursor_spec(Some("-bogus,name"), None, &cols).is_none());
        assert!(cursor_spec(None, None, &cols).is_none());
    }

    #[test]
    fn cursor_predicate_direction_follows_sort() {
        let cols = columns();
        let spec = cursor_spec(Some("-created"), None, &cols).unwrap();
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        apply_cursor(
            &mut stmt,
            spec,
            Value::String(Some(Box::new("T".into()))),
            10,
        );
        let sql = stmt.to_string(PostgresQueryBuilder);
        assert!(sql.contains("\"created\" < 'T'"), "{sql}");
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(!sql.contains("name"), "{sql}");
    }

    #[test]
    fn cursor_meta_last_page_detection() {
        let meta = cursor_meta(100, "T".into(), Some("U".into()), 10, Some(10));
        assert!(!meta.is_last_page);
        assert!(!meta.is_first_page);

        let short = cursor_meta(100, "T".into(), None, 3, Some(10));
        assert!(short.is_last_page);

        let empty = cursor_meta(100, "T".into(), None, 0, None);
        assert!(empty.is_last_page);
    }

    #[test]
    fn meta_modes_are_mutually_exclusive() {
        let offset = offset_meta(10, Some(5), 1, 0, None);
        assert!(offset.after.is_none());
        assert!(offset.page.is_some());

        let cursor = cursor_meta(10, "T".into(), None, 5, Some(5));
        assert!(cursor.page.is_none());
        assert!(cursor.limit.is_none());
        assert!(cursor.after.is_some());
    }

    #[test]
    fn temporal_next_after_gets_boundary_suffix() {
        let cols = columns();
        let rows = vec![json!({"created": "2025-03-01T10:20:30.123456"})];

        let ascending = next_after_token(&rows, "created", &cols, false).unwrap();
        assert_eq!(
            urlencoding::decode(&ascending).unwrap(),
            "2025-03-01T10:20:30.123999Z"
        );

        let descending = next_after_token(&rows, "created", &cols, true).unwrap();
        assert_eq!(
            urlencoding::decode(&descending).unwrap(),
            "2025-03-01T10:20:30.123000Z"
        );
    }

    #[test]
    fn non_temporal_next_after_passes_value_through() {
        let cols = columns();
        let rows = vec![json!({"name": "zeta"})];
        assert_eq!(
            next_after_token(&rows, "name", &cols, false).as_deref(),
            Some("zeta")
        );
    }

    #[test]
    fn empty_result_has_no_next_after() {
        let cols = columns();
        assert!(next_after_token(&[], "created", &cols, false).is_none());
    }
}
