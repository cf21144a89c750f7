//! Sort token validation and ORDER BY emission.

use std::collections::HashSet;

use sea_query::{Alias, Expr, NullOrdering, Order, SelectStatement};

use crate::resource::context::RequestState;
use crate::resource::types::ResourceDef;

/// Apply the configured raw sort and the request's sort tokens.
///
/// Unknown tokens are dropped silently, mirroring the filter translator's
/// fail-open posture; valid tokens sort NULLS LAST.
pub fn apply_sort(
    stmt: &mut SelectStatement,
    sort_param: Option<&str>,
    def: &ResourceDef,
    state: &RequestState<'_>,
) {
    if let Some(raw) = &def.sort_raw {
        stmt.order_by_expr(Expr::cust(raw.clone()), Order::Asc);
    }

    let Some(sort) = sort_param
        .map(str::to_string)
        .or_else(|| def.default_sort.clone())
    else {
        return;
    };

    let known = sortable_names(def, state);

    for token in sort.split(',') {
        if token.is_empty() {
            continue;
        }
        if token.eq_ignore_ascii_case("random()") {
            stmt.order_by_expr(Expr::cust("RANDOM()"), Order::Asc);
            continue;
        }

        let (name, order) = match token.strip_prefix('-') {
            Some(name) => (name, Order::Desc),
            None => (token, Order::Asc),
        };
        if !known.contains(name) {
            continue;
        }
        stmt.order_by_with_nulls(Alias::new(name), order, NullOrdering::Last);
    }
}

/// Names a sort token may reference: table columns, alias output names, and
/// join output names.
fn sortable_names(def: &ResourceDef, state: &RequestState<'_>) -> HashSet<String> {
    let mut names: HashSet<String> = state.columns.keys().cloned().collect();
    for (source, alias) in &def.aliases {
        names.insert(source.clone());
        names.insert(alias.clone());
    }
    for join in def.joins.iter().chain(&def.joins_on_demand) {
        names.insert(join.name().to_string());
    }
    names
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnInfo, ColumnMap, ColumnType};
    use sea_query::{PostgresQueryBuilder, Query};

    fn columns() -> ColumnMap {
        let mut map = ColumnMap::new();
        for name in ["id", "name", "created"] {
            map.insert(
                name.to_string(),
                ColumnInfo {
                    data_type: ColumnType::String,
                    nullable: true,
                },
            );
        }
        map
    }

    fn sql_for(sort: Option<&str>, def: &ResourceDef) -> String {
        let cols = columns();
        let state = RequestState::new(&cols, None, "en");
        let mut stmt = Query::select();
        stmt.column(Alias::new("id")).from(Alias::new("users"));
        apply_sort(&mut stmt, sort, def, &state);
        stmt.to_string(PostgresQueryBuilder)
    }

    fn users() -> ResourceDef {
        ResourceDef {
            table: "users".into(),
            ..ResourceDef::default()
        }
    }

    #[test]
    fn valid_tokens_sort_nulls_last() {
        let sql = sql_for(Some("name,-created"), &users());
        assert!(sql.contains("\"name\" ASC NULLS LAST"), "{sql}");
        assert!(sql.contains("\"created\" DESC NULLS LAST"), "{sql}");
    }

    #[test]
    fn unknown_sort_is_dropped() {
        // Fail-open on purpose, like unknown filters.
        let sql = sql_for(Some("name; DROP TABLE users--"), &users());
        assert!(!sql.contains("DROP TABLE"), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
    }

    #[test]
    fn mixed_tokens_keep_only_known() {
        let sql = sql_for(Some("-name,bogus,created"), &users());
        assert!(sql.contains("\"name\" DESC NULLS LAST"), "{sql}");
        assert!(sql.contains("\"created\" ASC NULLS LAST"), "{sql}");
        assert!(!sql.contains("bogus"), "{sql}");
    }

    #[test]
    fn random_always_passes() {
        let sql = sql_for(Some("RANDOM()"), &users());
        assert!(sql.contains("RANDOM()"), "{sql}");
    }

    #[test]
    fn default_sort_applies_without_request_sort() {
        let def = ResourceDef {
            default_sort: Some("-created".into()),
            ..users()
        };
        let sql = sql_for(None, &def);
        assert!(sql.contains("\"created\" DESC NULLS LAST"), "{sql}");
    }

    #[test]
    fn raw_sort_is_emitted_first() {
        let def = ResourceDef {
            sort_raw: Some("priority IS NULL".into()),
            ..users()
        };
        let sql = sql_for(Some("name"), &def);
        let raw_pos = sql.find("priority IS NULL").unwrap();
        let name_pos = sql.find("\"name\"").unwrap();
        assert!(raw_pos < name_pos, "{sql}");
    }

    #[test]
    fn alias_and_join_names_are_sortable() {
        let mut def = users();
        def.aliases.insert("name".into(), "display_name".into());
        def.joins.push(crate::resource::types::JoinDef {
            table: "comments".into(),
            alias: Some("last_comment".into()),
            where_clause: "1 = 1".into(),
            ..Default::default()
        });
        let sql = sql_for(Some("display_name,last_comment"), &def);
        assert!(sql.contains("\"display_name\" ASC NULLS LAST"), "{sql}");
        assert!(sql.contains("\"last_comment\" ASC NULLS LAST"), "{sql}");
    }
}
