use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use booru_db::{Db, DbSource};
use booru_posts::PostsService;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::signals;

/// Every route the server exposes.
#[must_use]
pub fn router<S: DbSource + 'static>(posts: Arc<PostsService<S>>) -> Router {
    booru_posts::register_routes(Router::new(), posts).layer(TraceLayer::new_for_http())
}

/// Connect, serve until a shutdown signal, then drain the pool.
///
/// # Errors
/// Schema, connection, cache setup and bind failures.
pub async fn run(config: &AppConfig) -> Result<()> {
    booru_posts::verify_schemas().context("entity schema check failed")?;

    let db = Db::connect(&config.database)
        .await
        .with_context(|| format!("cannot connect to {}", config.database.redacted_url()))?;
    let cache = config.cache.build().context("cannot set up the cache")?;
    let posts = Arc::new(PostsService::new(db.clone(), cache));

    let listener = TcpListener::bind(config.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.http.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(posts))
        .with_graceful_shutdown(async {
            if let Err(e) = signals::wait_for_shutdown().await {
                tracing::warn!(error = %e, "signal handling failed; shutting down");
            }
        })
        .await?;

    db.close().await;
    tracing::info!("server stopped");
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use booru_cache::Cache;
    use booru_db::testing::ScriptedDb;
    use tower::ServiceExt;

    fn app(db: &ScriptedDb) -> Router {
        router(Arc::new(PostsService::new(db.clone(), Cache::disabled())))
    }

    #[tokio::test]
    async fn serves_posts_routes() {
        let db = ScriptedDb::new();
        let response = app(&db)
            .oneshot(Request::get("/sources").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(db.log(), ["SELECT * FROM `sources`"]);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let db = ScriptedDb::new();
        let response = app(&db)
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(db.log().is_empty());
    }
}
