//! HTTP route registration.

pub mod resource;

pub use resource::router;
