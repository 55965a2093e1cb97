use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

use super::common::nullable;

pub const UNKNOWN_GENRE: &str = "Unknown";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub genres: Json<Vec<String>>,
    pub social_links: Json<BTreeMap<String, String>>,
    pub image_url: Option<String>,
    pub accepts_subscriptions: bool,
    pub follower_count: i64,
    pub subscriber_count: i64,
    pub total_plays: i64,
    pub listener_count: i64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Manager,
    Member,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ArtistMember {
    pub artist_id: String,
    pub user_id: String,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ArtistDetail {
    #[serde(flatten)]
    pub artist: Artist,
    pub members: Vec<ArtistMember>,
    pub albums: Vec<Album>,
    pub top_tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArtist {
    pub name: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub accepts_subscriptions: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateArtist {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub genres: Option<Vec<String>>,
    pub social_links: Option<BTreeMap<String, String>>,
    pub image_url: Option<String>,
    pub accepts_subscriptions: Option<bool>,
}

impl UpdateArtist {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.bio.is_none()
            && self.genres.is_none()
            && self.social_links.is_none()
            && self.image_url.is_none()
            && self.accepts_subscriptions.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default = "default_member_role")]
    pub role: MemberRole,
}

fn default_member_role() -> MemberRole {
    MemberRole::Member
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AlbumType {
    Album,
    Single,
    Ep,
    Compilation,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist_id: String,
    pub release_date: NaiveDate,
    pub cover_url: Option<String>,
    pub album_type: AlbumType,
    pub genre: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: Album,
    pub artist_name: String,
    pub total_duration: i64,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAlbum {
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub cover_url: Option<String>,
    pub album_type: Option<AlbumType>,
    pub genre: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAlbum {
    pub title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub cover_url: Option<String>,
    pub album_type: Option<AlbumType>,
    pub genre: Option<String>,
}

impl UpdateAlbum {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.release_date.is_none()
            && self.cover_url.is_none()
            && self.album_type.is_none()
            && self.genre.is_none()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist_id: String,
    pub album_id: Option<String>,
    pub file_url: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub duration: i64,
    pub track_number: Option<i64>,
    pub genre: String,
    pub play_count: i64,
    pub is_exclusive: bool,
    pub distributor_name: Option<String>,
    pub uploaded_by: Option<String>,
    pub original_filename: Option<String>,
    pub mime_type: String,
    pub file_size: i64,
    pub release_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A track as shown to a particular caller; exclusive audio may be withheld.
#[derive(Debug, Serialize)]
pub struct TrackView {
    #[serde(flatten)]
    pub track: Track,
    pub locked: bool,
}

impl TrackView {
    pub fn new(mut track: Track, unlocked: bool) -> Self {
        let locked = track.is_exclusive && !unlocked;
        if locked {
            track.file_url = String::new();
        }
        Self { track, locked }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTrack {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub album_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub track_number: Option<Option<i64>>,
    pub genre: Option<String>,
    pub duration: Option<i64>,
    pub is_exclusive: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub release_date: Option<Option<NaiveDate>>,
}

impl UpdateTrack {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.album_id.is_none()
            && self.track_number.is_none()
            && self.genre.is_none()
            && self.duration.is_none()
            && self.is_exclusive.is_none()
            && self.release_date.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackFilter {
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub genre: Option<String>,
}

/// Sort tracks the way an album lists them: numbered tracks first, then by title.
pub fn sort_album_tracks(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| match (a.track_number, b.track_number) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.title.cmp(&b.title)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.title.cmp(&b.title),
    });
}
