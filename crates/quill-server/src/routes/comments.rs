//! Comment submission and notification opt-out endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use quill_core::{Comment, CommentForm, Submission};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Access;
use crate::state::AppState;

/// Query string of the opt-out link mailed to each recipient.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeLink {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub post_id: i64,
    pub unsubscribed: usize,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<Comment>,
    pub count: usize,
}

/// Comments on a post, oldest first.
/// GET /posts/:id/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommentListResponse>> {
    let comments = state
        .run(move |site| {
            match site.posts().get_visible(id, access.is_privileged())? {
                Some(_) => site.comments().comments_for(id).map(Some),
                None => Ok(None),
            }
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;
    Ok(Json(CommentListResponse {
        count: comments.len(),
        comments,
    }))
}

/// Submit a comment and notify opted-in readers.
/// POST /posts/:id/comments
pub async fn submit_comment(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
    Json(form): Json<CommentForm>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let (post, accepted) = state
        .run(move |site| {
            let Some(post) = site.posts().get_visible(id, access.is_privileged())? else {
                return Ok(None);
            };
            let accepted = site.comments().accept(&post, form)?;
            Ok(Some((post, accepted)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;

    let notifications = state.site.comments().notify(&post, &accepted).await;
    Ok((
        StatusCode::CREATED,
        Json(Submission {
            comment: accepted.comment,
            notifications,
        }),
    ))
}

/// Opt-out link sent in notification mail.
/// GET /posts/:id/unsubscribe?token=...
pub async fn unsubscribe_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(link): Query<UnsubscribeLink>,
) -> ApiResult<Json<UnsubscribeResponse>> {
    if link.token.trim().is_empty() {
        return Err(ApiError::validation("token is required"));
    }
    let unsubscribed = state
        .run(move |site| site.comments().unsubscribe_with_token(id, &link.token))
        .await?;
    info!(post_id = id, unsubscribed, "Processed unsubscribe link");
    Ok(Json(UnsubscribeResponse {
        post_id: id,
        unsubscribed,
    }))
}

/// Stop notifications for an address (requires API key).
/// POST /posts/:id/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
    Json(request): Json<UnsubscribeRequest>,
) -> ApiResult<Json<UnsubscribeResponse>> {
    access.require_privileged()?;
    let email = request.email;
    if email.trim().is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    let unsubscribed = state
        .run(move |site| site.comments().unsubscribe(id, &email))
        .await?;
    info!(post_id = id, unsubscribed, "Processed unsubscribe request");
    Ok(Json(UnsubscribeResponse {
        post_id: id,
        unsubscribed,
    }))
}
