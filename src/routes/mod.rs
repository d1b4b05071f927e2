pub mod assets;
pub mod comments;
pub mod media;
pub mod posts;

use askama::Template;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Full application router with state and middleware attached.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(posts::post_list))
        .route("/search/{q}/", get(posts::search))
        .route(
            "/delete_comment/{id}/",
            get(comments::delete_comment).post(comments::delete_comment),
        )
        .route(
            "/update_comment/{id}/",
            get(comments::edit_comment).post(comments::update_comment),
        )
        .route(
            "/update_post/{id}/",
            get(posts::edit_post).post(posts::update_post),
        )
        .route(
            "/create_post/",
            get(posts::new_post).post(posts::create_post),
        )
        .route("/tag/{slug}/", get(posts::tag_page))
        .route("/category/{slug}/", get(posts::category_page))
        .route(
            "/{id}/new_comment/",
            get(comments::new_comment_redirect).post(comments::new_comment),
        )
        .route("/{id}/", get(posts::post_detail))
        .route("/media/{*path}", get(media::serve))
        .route("/assets/{*path}", get(assets::serve))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        app(AppState {
            db: pool,
            config: Config::default(),
        })
    }

    async fn status_of(uri: &str) -> StatusCode {
        test_app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn listing_routes_resolve() {
        assert_eq!(status_of("/").await, StatusCode::OK);
        assert_eq!(status_of("/category/no_category/").await, StatusCode::OK);
        assert_eq!(status_of("/search/anything/").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_ids_are_404() {
        assert_eq!(status_of("/5/").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("/tag/missing/").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("/category/missing/").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn anonymous_comment_edit_is_404_before_403() {
        assert_eq!(status_of("/update_comment/1/").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("/delete_comment/1/").await, StatusCode::NOT_FOUND);
    }
}
