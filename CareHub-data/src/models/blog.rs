use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// Health blog article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct BlogPost {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Author user id
    pub author_id: String,
    /// Title
    pub title: String,
    /// URL slug, unique across posts
    pub slug: String,
    /// Teaser text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Markdown body
    pub content: String,
    /// Cover image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    /// Topic tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Visible to readers
    pub published: bool,
    /// First publication time
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    #[serde(default)]
    pub deleted: bool,
    /// Soft-delete time
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for BlogPost {
    const COLLECTION: &'static str = "blog_posts";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
