//! Abstract role/permission interface and caller identity.
//!
//! The engine never computes permissions itself; the host supplies an
//! implementation of [`RoleService`] (or none, in which case hidden fields
//! stay hidden for everyone).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Caller identity, resolved by host middleware before the engine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    /// Row-owner comparisons use this value; string or number, matching
    /// whatever the owner-id column holds.
    pub id: Json,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub is_root: bool,
}

impl Caller {
    /// Whether `value` (a row's owner-id column) identifies this caller.
    ///
    /// Numbers and their string spellings compare equal, so a JSON row with
    /// `author_id: 7` matches a caller whose id arrived as `"7"`.
    pub fn owns(&self, value: &Json) -> bool {
        if self.id == *value {
            return true;
        }
        match (&self.id, value) {
            (Json::String(a), Json::Number(b)) => *a == b.to_string(),
            (Json::Number(a), Json::String(b)) => a.to_string() == *b,
            _ => false,
        }
    }
}

/// Capability-check interface consumed by the visibility filter.
#[async_trait]
pub trait RoleService: Send + Sync {
    /// Aggregate permission set for the given role names.
    async fn permissions(&self, roles: &[String]) -> HashMap<String, bool>;

    /// Whether `key` is granted by `permissions`, honoring whatever wildcard
    /// scheme the host uses (e.g. `users.*` matching `users.view_email`).
    fn check_wildcard(&self, key: &str, permissions: &HashMap<String, bool>) -> bool;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owner_match_is_tolerant_of_number_strings() {
        let caller = Caller {
            id: json!(7),
            roles: vec![],
            is_root: false,
        };
        assert!(caller.owns(&json!(7)));
        assert!(caller.owns(&json!("7")));
        assert!(!caller.owns(&json!(8)));
        assert!(!caller.owns(&Json::Null));
    }

    #[test]
    fn uuid_ids_compare_as_strings() {
        let caller = Caller {
            id: json!("0192f0c1-2345-7000-8000-000000000000"),
            roles: vec![],
            is_root: false,
        };
        assert!(caller.owns(&json!("0192f0c1-2345-7000-8000-000000000000")));
        assert!(!caller.owns(&json!("0192f0c1-2345-7000-8000-000000000001")));
    }
}
