//! Field-level visibility: hidden fields, permission grants, ownership.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::resource::types::ResourceDef;
use crate::roles::{Caller, RoleService};

/// The two hidden-field sets resolved for a request: what gets stripped for
/// arbitrary callers and what gets stripped for the row's owner.
#[derive(Debug, Clone, Default)]
pub struct HiddenFieldSets {
    pub regular: Vec<String>,
    pub owner: Vec<String>,
}

/// Resolve the hidden-field sets for this caller.
///
/// Starts from the full hidden list and removes every field granted through
/// the `viewable` permission-key map — once against the caller's role
/// permissions, once against the static owner permission set. Without a role
/// service both sets equal the full hidden list.
pub async fn hidden_field_sets(
    def: &ResourceDef,
    roles: Option<&Arc<dyn RoleService>>,
    caller: Option<&Caller>,
) -> HiddenFieldSets {
    let Some(roles) = roles else {
        return HiddenFieldSets {
            regular: def.hidden_fields.clone(),
            owner: def.hidden_fields.clone(),
        };
    };

    let caller_roles = caller.map(|c| c.roles.as_slice()).unwrap_or_default();
    let permissions = roles.permissions(caller_roles).await;
    let owner_permissions: HashMap<String, bool> = def
        .permissions
        .owner
        .iter()
        .map(|key| (key.clone(), true))
        .collect();

    let mut shown: Vec<&str> = Vec::new();
    let mut owner_shown: Vec<&str> = Vec::new();
    for (key, fields) in &def.permissions.viewable {
        if roles.check_wildcard(key, &permissions) {
            shown.extend(fields.iter().map(String::as_str));
        }
        if roles.check_wildcard(key, &owner_permissions) {
            owner_shown.extend(fields.iter().map(String::as_str));
        }
    }

    HiddenFieldSets {
        regular: def
            .hidden_fields
            .iter()
            .filter(|field| !shown.contains(&field.as_str()))
            .cloned()
            .collect(),
        owner: def
            .hidden_fields
            .iter()
            .filter(|field| !owner_shown.contains(&field.as_str()))
            .cloned()
            .collect(),
    }
}

/// Strip hidden fields from result rows, using the `owner` set for rows the
/// caller owns and the `regular` set for everything else.
pub fn strip_hidden(rows: &mut [Json], sets: &HiddenFieldSets, def: &ResourceDef, caller: Option<&Caller>) {
    if sets.regular.is_empty() && sets.owner.is_empty() {
        return;
    }
    for row in rows {
        let Some(object) = row.as_object_mut() else {
            continue;
        };
        let is_owner = caller.is_some_and(|caller| {
            object
                .get(&def.owner_field)
                .is_some_and(|value| caller.owns(value))
        });
        let fields = if is_owner { &sets.owner } else { &sets.regular };
        for field in fields {
            object.remove(field);
        }
    }
}
