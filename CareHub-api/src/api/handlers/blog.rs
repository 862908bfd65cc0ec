use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::blog::BlogPost;
use care_hub_data::repository::BlogPostPage;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::blog::{CreatePostRequest, UpdatePostRequest};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::entities::common::PageParams;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TagQueryParams {
    /// Only posts carrying this tag
    pub tag: Option<String>,
}

/// Published posts, newest first
#[utoipa::path(
    get,
    path = "/api/v1/blog/posts",
    params(TagQueryParams, PageParams),
    responses(
        (status = 200, description = "One page of posts", body = BlogPostPage),
        (status = 400, description = "Unknown cursor", body = ErrorResponse)
    ),
    tag = "blog"
)]
#[instrument(skip(state))]
pub async fn list_published_posts(
    State(state): State<AppState>,
    Query(params): Query<TagQueryParams>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<BlogPostPage>> {
    let page = state
        .services
        .blog
        .list_published(params.tag.as_deref(), &page.into())
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/blog/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Published post", body = BlogPost),
        (status = 404, description = "No published post with this slug", body = ErrorResponse)
    ),
    tag = "blog"
)]
#[instrument(skip(state))]
pub async fn get_post(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<BlogPost>> {
    Ok(Json(state.services.blog.get_by_slug(&slug).await?))
}

/// Write a post
#[utoipa::path(
    post,
    path = "/api/v1/blog/articles",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = BlogPost),
        (status = 400, description = "Invalid post", body = ErrorResponse),
        (status = 403, description = "Doctors and admins only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let post = state.services.blog.create_post(&user, request).await?;
    info!("Created post {} ({})", post.id, post.slug);
    Ok((StatusCode::CREATED, Json(post)))
}

#[utoipa::path(
    put,
    path = "/api/v1/blog/articles/{id}",
    params(("id" = String, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = BlogPost),
        (status = 403, description = "Not the author", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_post(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdatePostRequest>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(state.services.blog.update_post(&user, &id, request).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/blog/articles/{id}/publish",
    params(("id" = String, Path, description = "Post ID")),
    responses((status = 200, description = "Post published", body = BlogPost)),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn publish_post(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(state.services.blog.publish(&user, &id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/blog/articles/{id}/unpublish",
    params(("id" = String, Path, description = "Post ID")),
    responses((status = 200, description = "Post withdrawn", body = BlogPost)),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn unpublish_post(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<BlogPost>> {
    Ok(Json(state.services.blog.unpublish(&user, &id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/blog/articles/{id}",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not the author", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.blog.delete_post(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Every post of an author, drafts included
#[utoipa::path(
    get,
    path = "/api/v1/blog/authors/{id}/articles",
    params(("id" = String, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Posts, newest first", body = [BlogPost]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "blog"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, author_id = %id))]
pub async fn author_posts(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BlogPost>>> {
    Ok(Json(state.services.blog.list_by_author(&user, &id).await?))
}
