use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::nullable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContentType {
    Audio,
    Video,
    Image,
    Text,
    Download,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ExclusiveContent {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: Option<String>,
    pub content_type: ContentType,
    pub content_url: Option<String>,
    pub is_public: bool,
    pub minimum_tier_id: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateExclusiveContent {
    pub artist_id: String,
    pub title: String,
    pub description: Option<String>,
    pub content_type: ContentType,
    pub content_url: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    pub minimum_tier_id: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateExclusiveContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content_type: Option<ContentType>,
    pub content_url: Option<String>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub minimum_tier_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub release_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateExclusiveContent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.content_type.is_none()
            && self.content_url.is_none()
            && self.is_public.is_none()
            && self.minimum_tier_id.is_none()
            && self.release_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ArtistEvent {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub event_date: DateTime<Utc>,
    pub ticket_url: Option<String>,
    pub is_public: bool,
    pub minimum_tier_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEvent {
    pub title: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub event_date: DateTime<Utc>,
    pub ticket_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub minimum_tier_id: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub location: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub ticket_url: Option<String>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub minimum_tier_id: Option<Option<String>>,
}

impl UpdateEvent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.venue.is_none()
            && self.location.is_none()
            && self.event_date.is_none()
            && self.ticket_url.is_none()
            && self.is_public.is_none()
            && self.minimum_tier_id.is_none()
    }
}

/// A gated item with its access decision applied for the caller.
#[derive(Debug, Serialize)]
pub struct Gated<T> {
    #[serde(flatten)]
    pub item: T,
    pub locked: bool,
}

impl Gated<ExclusiveContent> {
    pub fn content(mut item: ExclusiveContent, granted: bool) -> Self {
        if !granted {
            item.content_url = None;
        }
        Self {
            item,
            locked: !granted,
        }
    }
}

impl Gated<ArtistEvent> {
    pub fn event(mut item: ArtistEvent, granted: bool) -> Self {
        if !granted {
            item.ticket_url = None;
            item.venue = None;
        }
        Self {
            item,
            locked: !granted,
        }
    }
}
