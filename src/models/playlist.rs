use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::nullable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub is_public: bool,
    pub is_system: bool,
    pub folder_id: Option<String>,
    pub cover_url: Option<String>,
    pub follower_count: i64,
    pub track_count: i64,
    pub total_duration: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PlaylistEntry {
    pub track_id: String,
    pub position: i64,
    pub added_at: DateTime<Utc>,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: Option<String>,
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaylistWithTracks {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub tracks: Vec<PlaylistEntry>,
    pub is_following: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    pub folder_id: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePlaylist {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub cover_url: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub folder_id: Option<Option<String>>,
}

impl UpdatePlaylist {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_public.is_none()
            && self.cover_url.is_none()
            && self.folder_id.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddTrackRequest {
    pub track_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DuplicatePlaylistRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchUpdatePlaylists {
    pub playlist_ids: Vec<String>,
    pub is_public: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub folder_id: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct FollowToggleResponse {
    pub following: bool,
    pub follower_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlaylistFolder {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateFolder {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteFolderQuery {
    #[serde(default)]
    pub orphan: bool,
}

#[derive(Debug, Serialize)]
pub struct FolderDetail {
    #[serde(flatten)]
    pub folder: PlaylistFolder,
    pub playlists: Vec<Playlist>,
    pub subfolders: Vec<PlaylistFolder>,
}
