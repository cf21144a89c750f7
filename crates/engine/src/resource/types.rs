//! Resource definition types.
//!
//! A [`ResourceDef`] is the constructor-supplied descriptor for one exposed
//! table: names, joins, visibility rules, mutation rules. It is built once,
//! registered process-wide, and shared immutably across requests; everything
//! request-scoped lives in [`crate::resource::context::RequestState`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{EngineError, EngineResult};

/// Soft-delete flag column. A table that has it is soft-deletable.
pub const DELETE_FLAG_COLUMN: &str = "is_deleted";

/// Update-stamp column, set on every successful update when present.
pub const UPDATE_STAMP_COLUMN: &str = "changed";

/// Primary key column assumed by the item operations.
pub const ID_COLUMN: &str = "id";

/// Maximum nesting depth for relation definitions, to prevent unbounded
/// recursion (same bound the include machinery uses elsewhere).
pub const MAX_RELATION_DEPTH: usize = 3;

/// The four operations a resource exposes (list and get-one share `get`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Add,
    Update,
    Delete,
}

/// An access requirement: a plain flag or a named permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccessRule {
    Flag(bool),
    Permission(String),
}

impl AccessRule {
    /// Whether this rule imposes any requirement at all.
    pub fn is_set(&self) -> bool {
        match self {
            AccessRule::Flag(flag) => *flag,
            AccessRule::Permission(_) => true,
        }
    }
}

/// Per-operation access requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRecord {
    pub read: Option<AccessRule>,
    pub create: Option<AccessRule>,
    pub update: Option<AccessRule>,
    pub delete: Option<AccessRule>,
}

impl AccessRecord {
    pub fn rule(&self, action: Action) -> Option<&AccessRule> {
        match action {
            Action::Get => self.read.as_ref(),
            Action::Add => self.create.as_ref(),
            Action::Update => self.update.as_ref(),
            Action::Delete => self.delete.as_ref(),
        }
    }

    fn is_set(&self, action: Action) -> bool {
        self.rule(action).is_some_and(AccessRule::is_set)
    }
}

/// Field-level permission configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcePermissions {
    /// HTTP methods the host should gate behind route permissions
    /// (`"*"` for all); surfaced to the host, not enforced here.
    #[serde(default)]
    pub protected_methods: Vec<String>,

    /// Permission keys a record owner is assumed to hold when resolving
    /// owner-visible fields.
    #[serde(default)]
    pub owner: Vec<String>,

    /// Permission key → hidden fields it makes visible.
    #[serde(default)]
    pub viewable: HashMap<String, Vec<String>>,
}

/// One entry of a computed join's sub-field projection: a plain column name,
/// or a single-entry map of output name → raw expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinField {
    Column(String),
    Expr(HashMap<String, String>),
}

/// LEFT JOIN inside a computed-join subquery: a raw fragment, or
/// `[table, left_column, right_column]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubqueryJoin {
    Raw(String),
    On([String; 3]),
}

/// Declarative computed join: a correlated subquery (or raw scalar
/// expression) projected as one output column and usable as a filter target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinDef {
    /// Joined table; empty when `field` carries a raw scalar expression.
    #[serde(default)]
    pub table: String,

    pub schema: Option<String>,

    /// Alias the subquery's inner SELECT runs under (defaults to `table`).
    #[serde(rename = "as")]
    pub subquery_alias: Option<String>,

    /// Output column name (defaults to `table`).
    pub alias: Option<String>,

    /// Correlated WHERE clause, written at configuration time. May contain
    /// `:name` tokens resolved through `where_bindings`.
    #[serde(rename = "where", default)]
    pub where_clause: String,

    /// Binding name → dotted path into the request's binding source
    /// (`params.…`, `query.…`, `env.…`).
    #[serde(default)]
    pub where_bindings: HashMap<String, String>,

    /// COALESCE fallback when the subquery yields no row.
    pub default_value: Option<Json>,

    /// Sub-fields aggregated with `jsonb_agg(json_build_object(…))`.
    #[serde(default)]
    pub fields: Vec<JoinField>,

    /// Raw scalar projection (wins over `fields`).
    pub field: Option<String>,

    pub limit: Option<u64>,
    pub order_by: Option<String>,

    /// Index into the aggregated array, e.g. `0` for "first related row".
    pub by_index: Option<u32>,

    pub left_join: Option<SubqueryJoin>,
}

impl JoinDef {
    /// Output column name for this join.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Alias the inner SELECT runs under.
    pub fn inner_alias(&self) -> &str {
        self.subquery_alias.as_deref().unwrap_or(&self.table)
    }

    /// Whether a `_join`/`_fields` token addresses this join.
    pub fn matches(&self, name: &str) -> bool {
        name == self.table || self.alias.as_deref() == Some(name)
    }
}

/// Cache hint surfaced through the describe payloads; the engine itself never
/// caches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheHint {
    pub ttl: Option<u64>,
}

/// Immutable descriptor for one REST resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub table: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    /// Route prefix; defaults to the table name.
    pub prefix: Option<String>,

    /// Source column → output alias, projected alongside the source column.
    #[serde(default)]
    pub aliases: HashMap<String, String>,

    /// Computed joins always present in the projection.
    #[serde(default)]
    pub joins: Vec<JoinDef>,

    /// Computed joins added only when requested via `_join`.
    #[serde(default)]
    pub joins_on_demand: Vec<JoinDef>,

    /// Plain LEFT JOINs: `[table, left_column, right_column]`.
    #[serde(default)]
    pub left_joins: Vec<[String; 3]>,

    /// Deduplicate rows fanned out by `left_joins` (DISTINCT ON the active
    /// sort columns).
    #[serde(default)]
    pub left_join_distinct: bool,

    /// Default language; translation lookups only fire for other languages.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Columns with translated values in the translation table.
    #[serde(default)]
    pub translate: Vec<String>,

    /// Columns scored by trigram distance for `_search`.
    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Required-on-create field → error code raised when it is absent.
    #[serde(default)]
    pub required_fields: HashMap<String, String>,

    /// Engine-supplied filters, applied in trusted mode.
    #[serde(default)]
    pub default_filters: HashMap<String, Json>,

    /// Raw filter fragment ANDed into every list/get query.
    pub default_filters_raw: Option<String>,

    /// Sort applied when the request carries no `_sort`.
    pub default_sort: Option<String>,

    /// Raw sort expression, always emitted first.
    pub sort_raw: Option<String>,

    /// Raw projection fragments appended to every SELECT.
    #[serde(default)]
    pub fields_raw: Vec<String>,

    /// Keep soft-deleted rows in results. Defaults to true when
    /// `deleted_replacements` is configured, else false.
    pub include_deleted: Option<bool>,

    /// Column (or join name) → replacement value projected for soft-deleted
    /// rows.
    #[serde(default)]
    pub deleted_replacements: HashMap<String, Json>,

    /// Fields stripped from result rows unless a permission restores them.
    #[serde(default)]
    pub hidden_fields: Vec<String>,

    /// Fields never accepted from request bodies.
    #[serde(default = "default_read_only_fields")]
    pub read_only_fields: Vec<String>,

    #[serde(default)]
    pub permissions: ResourcePermissions,

    #[serde(default)]
    pub token_required: Vec<Action>,

    #[serde(default)]
    pub owner_required: Vec<Action>,

    #[serde(default)]
    pub root_required: Vec<Action>,

    #[serde(default)]
    pub access: AccessRecord,

    #[serde(default)]
    pub access_by_statuses: AccessRecord,

    pub cache: Option<CacheHint>,

    /// Column identifying the owning user.
    #[serde(default = "default_owner_field")]
    pub owner_field: String,

    /// Extra entries merged into the describe payload per action.
    #[serde(default)]
    pub describe_extras: HashMap<Action, Json>,

    /// Generated-client method name hints, surfaced through describe.
    #[serde(default)]
    pub client_method_names: HashMap<String, String>,

    /// Nested relation definitions, surfaced to the host for expansion.
    /// Bounded by [`MAX_RELATION_DEPTH`].
    #[serde(default)]
    pub relations: HashMap<String, ResourceDef>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_read_only_fields() -> Vec<String> {
    ["id", "created", "changed", "deleted", "is_deleted"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_owner_field() -> String {
    "author_id".to_string()
}

impl Default for ResourceDef {
    fn default() -> Self {
        Self {
            table: String::new(),
            schema: default_schema(),
            prefix: None,
            aliases: HashMap::new(),
            joins: Vec::new(),
            joins_on_demand: Vec::new(),
            left_joins: Vec::new(),
            left_join_distinct: false,
            lang: default_lang(),
            translate: Vec::new(),
            search_fields: Vec::new(),
            required_fields: HashMap::new(),
            default_filters: HashMap::new(),
            default_filters_raw: None,
            default_sort: None,
            sort_raw: None,
            fields_raw: Vec::new(),
            include_deleted: None,
            deleted_replacements: HashMap::new(),
            hidden_fields: Vec::new(),
            read_only_fields: default_read_only_fields(),
            permissions: ResourcePermissions::default(),
            token_required: Vec::new(),
            owner_required: Vec::new(),
            root_required: Vec::new(),
            access: AccessRecord::default(),
            access_by_statuses: AccessRecord::default(),
            cache: None,
            owner_field: default_owner_field(),
            describe_extras: HashMap::new(),
            client_method_names: HashMap::new(),
            relations: HashMap::new(),
        }
    }
}

impl ResourceDef {
    /// Route prefix for this resource.
    pub fn route_prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(&self.table)
    }

    /// Whether soft-deleted rows stay visible in results.
    pub fn keeps_deleted(&self) -> bool {
        self.include_deleted
            .unwrap_or(!self.deleted_replacements.is_empty())
    }

    /// Whether the action needs an authenticated caller: an explicit
    /// `token_required` entry, or any access rule for the action.
    pub fn requires_token(&self, action: Action) -> bool {
        self.token_required.contains(&action)
            || self.access.is_set(action)
            || self.access_by_statuses.is_set(action)
    }

    pub fn requires_root(&self, action: Action) -> bool {
        self.root_required.contains(&action)
    }

    pub fn requires_owner(&self, action: Action) -> bool {
        self.owner_required.contains(&action)
    }

    /// Validate the definition at registration time.
    pub fn validate(&self) -> EngineResult<()> {
        if self.table.is_empty() {
            return Err(EngineError::InvalidDefinition("table is required".into()));
        }
        for join in self.joins.iter().chain(&self.joins_on_demand) {
            if join.table.is_empty() && join.field.is_none() {
                return Err(EngineError::InvalidDefinition(format!(
                    "join '{}' needs a table or a raw field expression",
                    join.name()
                )));
            }
        }
        self.check_relation_depth(1)
    }

    fn check_relation_depth(&self, depth: usize) -> EngineResult<()> {
        if self.relations.is_empty() {
            return Ok(());
        }
        if depth >= MAX_RELATION_DEPTH {
            return Err(EngineError::InvalidDefinition(format!(
                "relations nest deeper than {MAX_RELATION_DEPTH} levels"
            )));
        }
        for relation in self.relations.values() {
            relation.check_relation_depth(depth + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_definition_deserializes_with_defaults() {
        let def: ResourceDef = serde_json::from_value(json!({"table": "users"})).unwrap();
        assert_eq!(def.schema, "public");
        assert_eq!(def.lang, "en");
        assert_eq!(def.owner_field, "author_id");
        assert!(def.read_only_fields.contains(&"is_deleted".to_string()));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn join_names_fall_back_to_table() {
        let join: JoinDef = serde_json::from_value(json!({
            "table": "comments",
            "where": "comments.item_id = items.id"
        }))
        .unwrap();
        assert_eq!(join.name(), "comments");
        assert_eq!(join.inner_alias(), "comments");
        assert!(join.matches("comments"));
        assert!(!join.matches("authors"));
    }

    #[test]
    fn join_without_table_or_field_is_rejected() {
        let def: ResourceDef = serde_json::from_value(json!({
            "table": "users",
            "joins": [{"alias": "broken", "where": "1 = 1"}]
        }))
        .unwrap();
        assert!(matches!(
            def.validate(),
            Err(EngineError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn access_rule_counts_as_token_requirement() {
        let def: ResourceDef = serde_json::from_value(json!({
            "table": "users",
            "access": {"read": true, "update": "users.update"}
        }))
        .unwrap();
        assert!(def.requires_token(Action::Get));
        assert!(def.requires_token(Action::Update));
        assert!(!def.requires_token(Action::Delete));
    }

    #[test]
    fn deleted_replacements_imply_include_deleted() {
        let def: ResourceDef = serde_json::from_value(json!({
            "table": "users",
            "deleted_replacements": {"name": "deleted user"}
        }))
        .unwrap();
        assert!(def.keeps_deleted());
    }

    #[test]
    fn relation_depth_is_bounded() {
        let mut leaf = ResourceDef {
            table: "d".into(),
            ..ResourceDef::default()
        };
        for table in ["c", "b", "a"] {
            let mut parent = ResourceDef {
                table: table.into(),
                ..ResourceDef::default()
            };
            parent.relations.insert(leaf.table.clone(), leaf);
            leaf = parent;
        }
        assert!(matches!(
            leaf.validate(),
            Err(EngineError::InvalidDefinition(_))
        ));

        let shallow: ResourceDef = serde_json::from_value(json!({
            "table": "a",
            "relations": {"b": {"table": "b"}}
        }))
        .unwrap();
        assert!(shallow.validate().is_ok());
    }
}
