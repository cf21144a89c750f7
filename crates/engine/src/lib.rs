//! Tavola engine — declarative REST resources over PostgreSQL tables.
//!
//! A [`ResourceDef`] plus the host-supplied [`SchemaCatalog`] turn a table
//! into list/get/create/update/delete endpoints: query strings compile into
//! filtered, sorted, paginated, joined SELECTs; request bodies into
//! column-whitelisted, type-checked mutations. All SQL goes through
//! sea-query with bound parameters; execution runs on sqlx.

pub mod catalog;
pub mod db;
pub mod error;
pub mod limits;
pub mod resource;
pub mod roles;
pub mod routes;
pub mod state;

pub use catalog::{ColumnInfo, ColumnMap, ColumnType, SchemaCatalog};
pub use error::{EngineError, EngineResult};
pub use limits::PageLimits;
pub use resource::{
    Action, DeleteResult, JoinDef, ListResult, PaginationMeta, ResourceDef, ResourceRequest,
    ResourceService,
};
pub use roles::{Caller, RoleService};
pub use state::AppState;
