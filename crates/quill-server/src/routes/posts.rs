//! Post, archive and revision history endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use quill_core::blog::parse_month;
use quill_core::{Archive, MarkupType, Post, QuillError, QuillResult, Snapshot};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Access;
use crate::state::AppState;

/// Request body for creating a post.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub body: String,
    /// Derived from the title when absent.
    pub slug: Option<String>,
    pub tags: Option<String>,
    pub markup_type: Option<MarkupType>,
    pub active: Option<bool>,
    pub pub_date: Option<DateTime<Utc>>,
    pub enable_comments: Option<bool>,
}

impl CreatePostRequest {
    fn into_post(self) -> Post {
        let mut post = Post::new(self.title, self.body);
        if let Some(slug) = self.slug {
            post = post.with_slug(slug);
        }
        if let Some(tags) = self.tags {
            post = post.with_tags(tags);
        }
        if let Some(markup_type) = self.markup_type {
            post = post.with_markup(markup_type);
        }
        if let Some(active) = self.active {
            post = post.active(active);
        }
        if let Some(pub_date) = self.pub_date {
            post = post.published_at(pub_date);
        }
        if let Some(enabled) = self.enable_comments {
            post = post.comments_enabled(enabled);
        }
        post
    }
}

/// Request body for updating a post. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub slug: Option<String>,
    pub tags: Option<String>,
    pub markup_type: Option<MarkupType>,
    pub active: Option<bool>,
    pub pub_date: Option<DateTime<Utc>>,
    pub enable_comments: Option<bool>,
}

impl UpdatePostRequest {
    fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(body) = self.body {
            post.body = body;
        }
        if let Some(slug) = self.slug {
            post.slug = slug;
        }
        if let Some(tags) = self.tags {
            post.tags = tags;
        }
        if let Some(markup_type) = self.markup_type {
            post.markup_type = markup_type;
        }
        if let Some(active) = self.active {
            post.active = active;
        }
        if let Some(pub_date) = self.pub_date {
            post.pub_date = pub_date;
        }
        if let Some(enabled) = self.enable_comments {
            post.enable_comments = enabled;
        }
    }
}

/// A post with its derived link, tag list and rendered body.
///
/// Building one renders the body, so do it inside [`AppState::run`].
#[derive(Debug, Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub permalink: String,
    pub tag_list: Vec<String>,
    pub body_html: String,
}

impl TryFrom<Post> for PostResponse {
    type Error = QuillError;

    fn try_from(post: Post) -> QuillResult<Self> {
        Ok(Self {
            permalink: post.permalink(),
            tag_list: post.tag_list(),
            body_html: post.render_body()?,
            post,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<PostResponse>,
    pub count: usize,
}

impl TryFrom<Vec<Post>> for PostListResponse {
    type Error = QuillError;

    fn try_from(posts: Vec<Post>) -> QuillResult<Self> {
        let posts = posts
            .into_iter()
            .map(PostResponse::try_from)
            .collect::<QuillResult<Vec<_>>>()?;
        Ok(Self {
            count: posts.len(),
            posts,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub post_id: i64,
    /// Earlier states of the post, newest first.
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<usize>,
}

/// Latest published posts.
/// GET /posts
pub async fn latest_posts(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Json<PostListResponse>> {
    let limit = query.limit.unwrap_or(state.config.site.latest_posts);
    let posts: PostListResponse = state
        .run(move |site| site.posts().latest(limit, access.is_privileged())?.try_into())
        .await?;
    Ok(Json(posts))
}

/// Create a post.
/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<PostResponse>)> {
    access.require_privileged()?;
    let post = request.into_post();
    let post: PostResponse = state
        .run(move |site| site.posts().create(post)?.try_into())
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Get a post by id.
/// GET /posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PostResponse>> {
    let post = state
        .run(move |site| {
            site.posts()
                .get_visible(id, access.is_privileged())?
                .map(PostResponse::try_from)
                .transpose()
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;
    Ok(Json(post))
}

/// Update a post. The previous state is kept in its revision history.
/// PUT /posts/:id
pub async fn update_post(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePostRequest>,
) -> ApiResult<Json<PostResponse>> {
    access.require_privileged()?;
    let post: PostResponse = state
        .run(move |site| {
            let mut post = site
                .posts()
                .get(id)?
                .ok_or_else(|| QuillError::not_found("blog.post", id))?;
            request.apply(&mut post);
            site.posts().update(&mut post)?;
            post.try_into()
        })
        .await?;
    Ok(Json(post))
}

/// Revision history of any post.
/// GET /posts/:id/history
pub async fn post_history(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(id): Path<i64>,
) -> ApiResult<Json<HistoryResponse>> {
    access.require_privileged()?;
    let snapshots = state
        .run(move |site| {
            let post = site
                .posts()
                .get(id)?
                .ok_or_else(|| QuillError::not_found("blog.post", id))?;
            site.posts().history(&post).fetch_all()
        })
        .await?;
    Ok(Json(HistoryResponse {
        post_id: id,
        snapshots,
    }))
}

/// Posts published in a year.
/// GET /archive/:year
pub async fn year_archive(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(year): Path<i32>,
) -> ApiResult<Json<PostListResponse>> {
    archive(state, access, Archive::Year(year)).await
}

/// Posts published in a month (`jan` or `1`).
/// GET /archive/:year/:month
pub async fn month_archive(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path((year, month)): Path<(i32, String)>,
) -> ApiResult<Json<PostListResponse>> {
    let month = month_number(&month)?;
    archive(state, access, Archive::Month(year, month)).await
}

/// Posts published on a day.
/// GET /archive/:year/:month/:day
pub async fn day_archive(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path((year, month, day)): Path<(i32, String, u32)>,
) -> ApiResult<Json<PostListResponse>> {
    let month = month_number(&month)?;
    archive(state, access, Archive::Day(year, month, day)).await
}

async fn archive(
    state: AppState,
    access: Access,
    archive: Archive,
) -> ApiResult<Json<PostListResponse>> {
    let posts: PostListResponse = state
        .run(move |site| site.posts().archive(archive, access.is_privileged())?.try_into())
        .await?;
    Ok(Json(posts))
}

/// A single post at its permalink.
/// GET /archive/:year/:month/:day/:slug
pub async fn post_detail(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path((year, month, day, slug)): Path<(i32, String, u32, String)>,
) -> ApiResult<Json<PostResponse>> {
    let month = month_number(&month)?;
    let post = find_post(&state, access, year, month, day, slug).await?;
    let post: PostResponse = state.run(move |_| post.try_into()).await?;
    Ok(Json(post))
}

/// Revision history of a post at its permalink.
/// GET /archive/:year/:month/:day/:slug/history
pub async fn post_detail_history(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path((year, month, day, slug)): Path<(i32, String, u32, String)>,
) -> ApiResult<Json<HistoryResponse>> {
    let month = month_number(&month)?;
    let post = find_post(&state, access, year, month, day, slug).await?;
    let post_id = post.id.unwrap_or_default();
    let snapshots = state
        .run(move |site| site.posts().history(&post).fetch_all())
        .await?;
    Ok(Json(HistoryResponse { post_id, snapshots }))
}

async fn find_post(
    state: &AppState,
    access: Access,
    year: i32,
    month: u32,
    day: u32,
    slug: String,
) -> ApiResult<Post> {
    let not_found = format!("No post '{}' on {:04}-{:02}-{:02}", slug, year, month, day);
    state
        .run(move |site| {
            site.posts()
                .detail(year, month, day, &slug, access.is_privileged())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(not_found))
}

fn month_number(value: &str) -> ApiResult<u32> {
    parse_month(value).ok_or_else(|| ApiError::bad_request(format!("Unknown month '{}'", value)))
}

/// Posts carrying a tag.
/// GET /tags/:tag
pub async fn tagged_posts(
    State(state): State<AppState>,
    Extension(access): Extension<Access>,
    Path(tag): Path<String>,
) -> ApiResult<Json<PostListResponse>> {
    let posts: PostListResponse = state
        .run(move |site| site.posts().tagged(&tag, access.is_privileged())?.try_into())
        .await?;
    Ok(Json(posts))
}
