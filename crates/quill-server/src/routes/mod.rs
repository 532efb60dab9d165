//! Route definitions for the REST API.

mod comments;
mod health;
mod posts;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Posts
        .route("/posts", get(posts::latest_posts))
        .route("/posts", post(posts::create_post))
        .route("/posts/:id", get(posts::get_post))
        .route("/posts/:id", put(posts::update_post))
        .route("/posts/:id/history", get(posts::post_history))
        // Comments
        .route("/posts/:id/comments", get(comments::list_comments))
        .route("/posts/:id/comments", post(comments::submit_comment))
        .route("/posts/:id/unsubscribe", get(comments::unsubscribe_link))
        .route("/posts/:id/unsubscribe", post(comments::unsubscribe))
        // Date archives and permalinks
        .route("/archive/:year", get(posts::year_archive))
        .route("/archive/:year/:month", get(posts::month_archive))
        .route("/archive/:year/:month/:day", get(posts::day_archive))
        .route("/archive/:year/:month/:day/:slug", get(posts::post_detail))
        .route(
            "/archive/:year/:month/:day/:slug/history",
            get(posts::post_detail_history),
        )
        // Tags
        .route("/tags/:tag", get(posts::tagged_posts))
        // Attach state
        .with_state(state)
}

pub use comments::*;
pub use health::*;
pub use posts::*;
