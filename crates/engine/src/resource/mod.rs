//! Resource engine: query/mutation translation for REST resources.
//!
//! - `types`: the resource descriptor ([`ResourceDef`]) and join definitions
//! - `filter` / `sort` / `pagination` / `projection`: query compilation
//! - `mutation`: body validation for create/update/delete
//! - `visibility`: hidden-field resolution and row stripping
//! - `service`: the registry and the five public operations

pub mod context;
pub mod describe;
pub mod expr;
pub mod filter;
pub mod mutation;
pub mod pagination;
pub mod params;
pub mod projection;
pub mod service;
pub mod sort;
pub mod types;
pub mod visibility;

pub use pagination::PaginationMeta;
pub use service::{DeleteResult, ListResult, ResourceRequest, ResourceService};
pub use types::{Action, JoinDef, ResourceDef};
