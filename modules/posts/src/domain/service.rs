use booru_cache::{Cache, CacheDuration, CacheKey};
use booru_db::{DbError, DbSource, Entity, Record, TxError, entity, persist, tx};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use super::error::PostsError;
use crate::contract::model::{Image, Post, PostData, PostImage, Source};

/// Rebuilds the `post_data` rows of one post.
const DENORMALIZE_PROC: &str = "proc_UpdateDenormalizedPostData";

const ALL_SOURCES: CacheKey = CacheKey::fixed("allSources");
const SOURCE_BY_ID: CacheKey = CacheKey::new("sourceById", &["sourceId"]);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceLookup {
    source_id: u64,
}

pub struct PostsService<S> {
    db: S,
    cache: Cache,
}

impl<S: DbSource> PostsService<S> {
    #[must_use]
    pub fn new(db: S, cache: Cache) -> Self {
        Self { db, cache }
    }

    /// Every source, memoized under `allSources`.
    ///
    /// # Errors
    /// `PostsError::Storage` when the query fails.
    pub async fn all_sources(&self) -> Result<Vec<Source>, PostsError> {
        self.cache
            .memoize(&ALL_SOURCES, &(), CacheDuration::Medium, || async {
                let mut conn = self.db.conn();
                let sources = entity::select_all::<Source, _>(&mut conn).await?;
                Ok::<_, PostsError>(sources)
            })
            .await
    }

    /// One source, memoized under `sourceById_<id>`. Absence is cached too.
    ///
    /// # Errors
    /// `PostsError::SourceNotFound` for an unknown id, `PostsError::Storage`
    /// when the query fails.
    pub async fn source_by_id(&self, id: u64) -> Result<Source, PostsError> {
        let lookup = SourceLookup { source_id: id };
        let found: Option<Source> = self
            .cache
            .memoize(&SOURCE_BY_ID, &lookup, CacheDuration::Medium, || async {
                let mut conn = self.db.conn();
                let source = entity::select_by_id::<Source, _>(&mut conn, id).await?;
                Ok::<_, PostsError>(source)
            })
            .await?;
        found.ok_or(PostsError::SourceNotFound(id))
    }

    /// Store a post with its images and return the denormalized rows.
    ///
    /// `raw` is `{ "post": {..}, "images": [{..}, ..] }`. Everything is
    /// validated before anything is written. The post and its images are
    /// written in one transaction and the links between them in a second
    /// one; the denormalized rows are rebuilt afterwards by a stored
    /// procedure. A failure in a later step leaves the earlier steps
    /// committed.
    ///
    /// # Errors
    /// `PostsError::InvalidPayload` or `PostsError::Validation` for bad input,
    /// `PostsError::Storage` when any write fails.
    pub async fn create_post(&self, raw: &Value) -> Result<Vec<PostData>, PostsError> {
        let (mut post, mut images) = parse_new_post(raw).inspect_err(|e| {
            warn!(error = %e, "rejected post payload");
        })?;

        let (post, images) = tx::transaction(&self.db, move |tx| {
            Box::pin(async move {
                entity::sync(tx, &mut post).await?;
                for image in &mut images {
                    entity::sync(tx, image).await?;
                }
                Ok::<_, DbError>((post, images))
            })
        })
        .await
        .map_err(TxError::into_domain)
        .map_err(storage_failure("creating models"))?;

        let post_id = post.id.ok_or(PostsError::MissingId("post"))?;
        let links = images
            .iter()
            .map(|image| image.id.map(|image_id| PostImage { post_id, image_id }))
            .collect::<Option<Vec<_>>>()
            .ok_or(PostsError::MissingId("image"))?;

        tx::transaction(&self.db, move |tx| {
            Box::pin(async move {
                for mut link in links {
                    entity::sync(tx, &mut link).await?;
                }
                Ok::<_, DbError>(())
            })
        })
        .await
        .map_err(TxError::into_domain)
        .map_err(storage_failure("creating relationships"))?;

        let mut conn = self.db.conn();
        let params = Record::new().with("postId", post_id);
        persist::call_procedure(&mut conn, DENORMALIZE_PROC, &["postId"], &params)
            .await
            .map_err(storage_failure("creating denormalized data"))?;
        let rows = entity::select_where::<PostData, _>(&mut conn, "postId", post_id)
            .await
            .map_err(storage_failure("reading denormalized data"))?;

        info!(post_id, images = images.len(), rows = rows.len(), "post created");
        Ok(rows)
    }
}

fn parse_new_post(raw: &Value) -> Result<(Post, Vec<Image>), PostsError> {
    let Some(post) = raw.get("post").filter(|p| p.is_object()) else {
        return Err(PostsError::invalid("`post` must be an object"));
    };
    let images = match raw.get("images") {
        Some(Value::Array(images)) if !images.is_empty() => images,
        _ => return Err(PostsError::invalid("`images` must be a non-empty array")),
    };

    let post = Post::create(post).map_err(|e| PostsError::validation("post", e))?;
    let images = images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            Image::create(image).map_err(|e| PostsError::validation(format!("images[{i}]"), e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((post, images))
}

fn storage_failure(stage: &'static str) -> impl FnOnce(DbError) -> PostsError {
    move |e| {
        error!(stage, error = %e, "post creation failed");
        PostsError::Storage(e)
    }
}
