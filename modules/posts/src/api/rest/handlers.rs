use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path};
use booru_db::DbSource;
use serde_json::Value;

use crate::contract::model::{PostData, Source};
use crate::domain::error::PostsError;
use crate::domain::service::PostsService;

pub async fn list_sources<S: DbSource + 'static>(
    Extension(svc): Extension<Arc<PostsService<S>>>,
) -> Result<Json<Vec<Source>>, PostsError> {
    Ok(Json(svc.all_sources().await?))
}

pub async fn get_source<S: DbSource + 'static>(
    Extension(svc): Extension<Arc<PostsService<S>>>,
    Path(id): Path<u64>,
) -> Result<Json<Source>, PostsError> {
    Ok(Json(svc.source_by_id(id).await?))
}

pub async fn create_post<S: DbSource + 'static>(
    Extension(svc): Extension<Arc<PostsService<S>>>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<PostData>>, PostsError> {
    Ok(Json(svc.create_post(&body).await?))
}
