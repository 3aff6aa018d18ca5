#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Sources, posts and images.
//!
//! Entity models bound to their tables, the [`PostsService`] that REST
//! handlers call, and the axum routes exposing it.

pub mod api;
pub mod contract;
pub mod domain;

pub use api::rest::routes::register_routes;
pub use contract::model::{
    ALL_SCHEMAS, Image, ImageType, Post, PostData, PostImage, Source,
};
pub use domain::error::PostsError;
pub use domain::service::PostsService;

/// Check every table binding of this module.
///
/// # Errors
/// Returns the first `DbError::Configuration` found.
pub fn verify_schemas() -> booru_db::Result<()> {
    booru_db::schema::verify_all(ALL_SCHEMAS)
}
