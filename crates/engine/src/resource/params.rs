//! Reserved query parameters and filter extraction.
//!
//! The reserved names are case-sensitive and all optional; any other
//! parameter is handed to the filter translator. Repeated filter keys merge
//! into a JSON array so `status=a&status=b` becomes an IN filter.

use serde_json::Value as Json;

/// Parsed query-string input for the list/get operations.
#[derive(Debug, Default)]
pub struct ListParams {
    pub fields: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub unlimited: Option<String>,
    pub after: Option<String>,
    pub lang: Option<String>,
    pub search: Option<String>,
    /// `_join` accepts a comma list and repeats; both accumulate here.
    pub join: Vec<String>,
    /// Everything that is not a reserved parameter, in arrival order.
    pub filters: Vec<(String, Json)>,
}

impl ListParams {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut params = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "_fields" => set_first(&mut params.fields, value),
                "_sort" => set_first(&mut params.sort, value),
                "_page" => set_first(&mut params.page, value),
                "_skip" => set_first(&mut params.skip, value),
                "_limit" => set_first(&mut params.limit, value),
                "_unlimited" => set_first(&mut params.unlimited, value),
                "_after" => set_first(&mut params.after, value),
                "_lang" => set_first(&mut params.lang, value),
                "_search" => set_first(&mut params.search, value),
                "_join" => params
                    .join
                    .extend(value.split(',').filter(|s| !s.is_empty()).map(String::from)),
                _ => push_filter(&mut params.filters, key, value),
            }
        }

        params
    }
}

fn set_first(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn push_filter(filters: &mut Vec<(String, Json)>, key: &str, value: &str) {
    if let Some((_, existing)) = filters.iter_mut().find(|(name, _)| name == key) {
        match existing {
            Json::Array(items) => items.push(Json::String(value.to_string())),
            ref single => {
                *existing = Json::Array(vec![(*single).clone(), Json::String(value.to_string())]);
            }
        }
    } else {
        filters.push((key.to_string(), Json::String(value.to_string())));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn pairs(input: &[(&str, &str)]) -> Vec<(String, String)> {
        input
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reserved_parameters_are_split_out() {
        let params = ListParams::from_pairs(&pairs(&[
            ("_sort", "-created"),
            ("_limit", "10"),
            ("status", "active"),
        ]));
        assert_eq!(params.sort.as_deref(), Some("-created"));
        assert_eq!(params.limit.as_deref(), Some("10"));
        assert_eq!(params.filters.len(), 1);
        assert_eq!(params.filters[0].0, "status");
    }

    #[test]
    fn repeated_filter_keys_merge_into_arrays() {
        let params = ListParams::from_pairs(&pairs(&[
            ("status", "active"),
            ("status", "pending"),
            ("status", "archived"),
        ]));
        assert_eq!(params.filters.len(), 1);
        let Json::Array(values) = &params.filters[0].1 else {
            panic!("expected array value");
        };
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn join_accepts_comma_list_and_repeats() {
        let params =
            ListParams::from_pairs(&pairs(&[("_join", "authors,comments"), ("_join", "tags")]));
        assert_eq!(params.join, vec!["authors", "comments", "tags"]);
    }

    #[test]
    fn reserved_names_are_case_sensitive() {
        let params = ListParams::from_pairs(&pairs(&[("_SORT", "name")]));
        assert!(params.sort.is_none());
        assert_eq!(params.filters.len(), 1);
    }
}
