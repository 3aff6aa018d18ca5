use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use booru_db::DbSource;

use super::handlers;
use crate::domain::service::PostsService;

/// `GET /sources`, `GET /sources/{id}` and `POST /post`.
#[must_use]
pub fn register_routes<S: DbSource + 'static>(router: Router, service: Arc<PostsService<S>>) -> Router {
    router
        .route("/sources", get(handlers::list_sources::<S>))
        .route("/sources/{id}", get(handlers::get_source::<S>))
        .route("/post", post(handlers::create_post::<S>))
        .layer(Extension(service))
}
