//! Health blog posts written by doctors and admins.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, instrument};
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::blog::BlogPost;
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, FilterOp, Query};
use care_hub_data::{Collection, Entity, Page, PageRequest};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct CreatePostRequest {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub summary: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub content: String,
    #[serde(default)]
    #[validate(url)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 tags"))]
    pub tags: Vec<String>,
    /// Publish immediately
    #[serde(default)]
    pub publish: bool,
}

/// Partial post update; the slug never changes
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UpdatePostRequest {
    #[validate(length(min = 3, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub summary: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    #[validate(length(max = 10))]
    pub tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct BlogService {
    posts: Collection<BlogPost>,
    audit: AuditLogger,
}

impl BlogService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger) -> Self {
        Self {
            posts: Collection::new(store),
            audit,
        }
    }

    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn create_post(&self, user: &UserInfo, request: CreatePostRequest) -> ServiceResult<BlogPost> {
        if user.is_patient() {
            return Err(forbidden("write blog posts"));
        }
        request.validate()?;

        let slug = self.unique_slug(&request.title).await?;
        let now = Utc::now();
        let post = self
            .posts
            .create(BlogPost {
                id: String::new(),
                author_id: user.user_id.clone(),
                title: request.title.trim().to_string(),
                slug,
                summary: request.summary,
                content: request.content,
                cover_image_url: request.cover_image_url,
                tags: normalize_tags(request.tags),
                published: request.publish,
                published_at: request.publish.then_some(now),
                created_at: now,
                updated_at: now,
                deleted: false,
                deleted_at: None,
            })
            .await?;

        info!("Created blog post {} ({})", post.id, post.slug);
        self.log(user, SecurityEventType::BlogPostCreated, &post.id).await;
        Ok(post)
    }

    pub async fn update_post(&self, user: &UserInfo, id: &str, request: UpdatePostRequest) -> ServiceResult<BlogPost> {
        request.validate()?;
        self.editable(user, id).await?;

        let mut patch = Map::new();
        if let Some(title) = request.title {
            patch.insert("title".into(), Value::String(title.trim().to_string()));
        }
        if let Some(summary) = request.summary {
            patch.insert("summary".into(), Value::String(summary));
        }
        if let Some(content) = request.content {
            patch.insert("content".into(), Value::String(content));
        }
        if let Some(url) = request.cover_image_url {
            patch.insert("cover_image_url".into(), Value::String(url));
        }
        if let Some(tags) = request.tags {
            patch.insert("tags".into(), json!(normalize_tags(tags)));
        }
        patch.insert("updated_at".into(), timestamp_value(Utc::now()));

        let post = self.posts.update(id, Value::Object(patch)).await?;
        self.log(user, SecurityEventType::BlogPostUpdated, id).await;
        Ok(post)
    }

    /// Publish a post; the first publication time is kept on republish
    pub async fn publish(&self, user: &UserInfo, id: &str) -> ServiceResult<BlogPost> {
        let post = self.editable(user, id).await?;
        if post.published {
            return Ok(post);
        }
        let now = Utc::now();
        let post = self
            .posts
            .update(
                id,
                json!({
                    "published": true,
                    "published_at": timestamp_value(post.published_at.unwrap_or(now)),
                    "updated_at": timestamp_value(now),
                }),
            )
            .await?;
        self.log(user, SecurityEventType::BlogPostUpdated, id).await;
        Ok(post)
    }

    pub async fn unpublish(&self, user: &UserInfo, id: &str) -> ServiceResult<BlogPost> {
        self.editable(user, id).await?;
        let post = self
            .posts
            .update(id, json!({ "published": false, "updated_at": timestamp_value(Utc::now()) }))
            .await?;
        self.log(user, SecurityEventType::BlogPostUpdated, id).await;
        Ok(post)
    }

    /// Soft delete
    pub async fn delete_post(&self, user: &UserInfo, id: &str) -> ServiceResult<()> {
        self.editable(user, id).await?;
        let now = timestamp_value(Utc::now());
        self.posts
            .update(
                id,
                json!({ "deleted": true, "deleted_at": now, "published": false, "updated_at": now }),
            )
            .await?;
        self.log(user, SecurityEventType::BlogPostDeleted, id).await;
        Ok(())
    }

    /// Public read of a published post
    pub async fn get_by_slug(&self, slug: &str) -> ServiceResult<BlogPost> {
        self.posts
            .find_one(published().where_eq("slug", slug))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", slug)))
    }

    /// Published posts, newest first
    pub async fn list_published(&self, tag: Option<&str>, page: &PageRequest) -> ServiceResult<Page<BlogPost>> {
        let mut query = published();
        if let Some(tag) = tag {
            query = query.where_op("tags", FilterOp::ArrayContains, tag.trim().to_lowercase());
        }
        Ok(self.posts.page(query.order_by("published_at", Direction::Desc), page).await?)
    }

    /// All of an author's posts, drafts included; visible to the author and admins
    pub async fn list_by_author(&self, user: &UserInfo, author_id: &str) -> ServiceResult<Vec<BlogPost>> {
        if !user.is_self_or_admin(author_id) {
            return Err(forbidden("view this author's drafts"));
        }
        let query = Query::new()
            .where_eq("author_id", author_id)
            .where_eq("deleted", false)
            .order_by("created_at", Direction::Desc);
        Ok(self.posts.find(query).await?)
    }

    async fn editable(&self, user: &UserInfo, id: &str) -> ServiceResult<BlogPost> {
        let post = self
            .posts
            .get(id)
            .await?
            .filter(|p| !p.deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", id)))?;
        if !user.is_self_or_admin(&post.author_id) {
            return Err(forbidden("edit this post"));
        }
        Ok(post)
    }

    async fn unique_slug(&self, title: &str) -> ServiceResult<String> {
        let base = slugify(title);
        if base.is_empty() {
            return Err(ServiceError::Validation("title must contain letters or digits".to_string()));
        }

        let mut candidate = base.clone();
        let mut suffix = 2;
        // Deleted posts keep their slug so old links never point somewhere new
        while self.posts.find_one(Query::new().where_eq("slug", candidate.as_str())).await?.is_some() {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        Ok(candidate)
    }

    async fn log(&self, user: &UserInfo, event_type: SecurityEventType, id: &str) {
        self.audit
            .log(
                SecurityEvent::success(event_type, &user.user_id)
                    .with_resource(format!("{}/{}", BlogPost::COLLECTION, id)),
            )
            .await;
    }
}

fn published() -> Query {
    Query::new().where_eq("published", true).where_eq("deleted", false)
}

/// Lowercase ASCII words joined by single hyphens
pub fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::services::test_support::{user_info, TestStore};

    fn request(title: &str, publish: bool) -> CreatePostRequest {
        CreatePostRequest {
            title: title.to_string(),
            summary: None,
            content: "Drink water.".to_string(),
            cover_image_url: None,
            tags: vec!["Wellness".to_string(), " hydration ".to_string()],
            publish,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Ten Tips: Better Sleep!  "), "ten-tips-better-sleep");
        assert_eq!(slugify("COVID-19 & you"), "covid-19-you");
        assert_eq!(slugify("!!!"), "");
    }

    #[tokio::test]
    async fn test_slugs_are_unique() {
        let store = TestStore::new();
        let service = BlogService::new(store.dyn_store(), store.audit());
        let doctor = user_info("d1", Role::Doctor);

        let first = service.create_post(&doctor, request("Stay Hydrated", true)).await.unwrap();
        let second = service.create_post(&doctor, request("Stay hydrated!", true)).await.unwrap();
        let third = service.create_post(&doctor, request("stay  hydrated", false)).await.unwrap();
        assert_eq!(first.slug, "stay-hydrated");
        assert_eq!(second.slug, "stay-hydrated-2");
        assert_eq!(third.slug, "stay-hydrated-3");
        assert_eq!(first.tags, vec!["hydration", "wellness"]);
        assert!(first.published_at.is_some());
        assert!(third.published_at.is_none());

        assert!(matches!(
            service.create_post(&user_info("p1", Role::Patient), request("Mine", true)).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_public_reads_hide_drafts_and_deleted() {
        let store = TestStore::new();
        let service = BlogService::new(store.dyn_store(), store.audit());
        let doctor = user_info("d1", Role::Doctor);

        let live = service.create_post(&doctor, request("Sleep Well", true)).await.unwrap();
        let draft = service.create_post(&doctor, request("Draft Notes", false)).await.unwrap();
        let mut tagged = request("Run Daily", true);
        tagged.tags = vec!["Fitness".to_string()];
        let gone = service.create_post(&doctor, tagged).await.unwrap();

        assert!(service.get_by_slug(&live.slug).await.is_ok());
        assert!(matches!(service.get_by_slug(&draft.slug).await, Err(ServiceError::NotFound(_))));

        let fitness = service.list_published(Some("fitness"), &PageRequest::default()).await.unwrap();
        assert_eq!(fitness.items.len(), 1);

        service.delete_post(&doctor, &gone.id).await.unwrap();
        assert!(matches!(service.get_by_slug(&gone.slug).await, Err(ServiceError::NotFound(_))));
        let page = service.list_published(None, &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, live.id);

        service.publish(&doctor, &draft.id).await.unwrap();
        assert!(service.get_by_slug("draft-notes").await.is_ok());

        let mine = service.list_by_author(&doctor, "d1").await.unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_only_author_or_admin_edits() {
        let store = TestStore::new();
        let service = BlogService::new(store.dyn_store(), store.audit());
        let post = service.create_post(&user_info("d1", Role::Doctor), request("Heart Health", true)).await.unwrap();

        let edit = UpdatePostRequest { title: Some("Heart Health 101".to_string()), ..Default::default() };
        assert!(matches!(
            service.update_post(&user_info("d2", Role::Doctor), &post.id, edit.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));

        let updated = service.update_post(&user_info("a1", Role::Admin), &post.id, edit).await.unwrap();
        assert_eq!(updated.title, "Heart Health 101");
        assert_eq!(updated.slug, "heart-health");

        let hidden = service.unpublish(&user_info("d1", Role::Doctor), &post.id).await.unwrap();
        assert!(!hidden.published);
        assert!(hidden.published_at.is_some());
    }
}
