//! Lookups and writes shared by several handlers.

use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::{AppError, Result};
use crate::models::{
    Album, AlbumType, Artist, MemberRole, Playlist, PlaylistFolder, SubscriptionTier, Track,
    User, UserSubscription, LIKED_SONGS_NAME,
};

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds a `LIKE` pattern matching `needle` anywhere, with its wildcards escaped.
/// Use together with `ESCAPE '\'`.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

pub async fn fetch_user(pool: &SqlitePool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn fetch_artist(pool: &SqlitePool, id: &str) -> Result<Artist> {
    sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Artist"))
}

pub async fn fetch_album(pool: &SqlitePool, id: &str) -> Result<Album> {
    sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Album"))
}

pub async fn fetch_track(pool: &SqlitePool, id: &str) -> Result<Track> {
    sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Track"))
}

pub async fn fetch_playlist(pool: &SqlitePool, id: &str) -> Result<Playlist> {
    sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Playlist"))
}

/// Loads a playlist and checks the caller owns it.
pub async fn fetch_owned_playlist(pool: &SqlitePool, id: &str, user_id: &str) -> Result<Playlist> {
    let playlist = fetch_playlist(pool, id).await?;
    if playlist.owner_id != user_id {
        return Err(AppError::Forbidden(
            "Not authorized to modify this playlist".to_string(),
        ));
    }
    Ok(playlist)
}

/// Loads a folder owned by the caller. Other users' folders read as missing.
pub async fn fetch_owned_folder(pool: &SqlitePool, id: &str, user_id: &str) -> Result<PlaylistFolder> {
    sqlx::query_as::<_, PlaylistFolder>(
        "SELECT * FROM playlist_folders WHERE id = ? AND owner_id = ?",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Folder"))
}

pub async fn fetch_tier(pool: &SqlitePool, id: &str) -> Result<SubscriptionTier> {
    sqlx::query_as::<_, SubscriptionTier>("SELECT * FROM subscription_tiers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Subscription tier"))
}

pub async fn member_role(pool: &SqlitePool, artist_id: &str, user_id: &str) -> Result<Option<MemberRole>> {
    let role = sqlx::query_scalar::<_, MemberRole>(
        "SELECT role FROM artist_members WHERE artist_id = ? AND user_id = ?",
    )
    .bind(artist_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(role)
}

/// Whether the caller may see everything an artist publishes.
pub async fn is_artist_insider(pool: &SqlitePool, ctx: Option<&AuthContext>, artist_id: &str) -> Result<bool> {
    match ctx {
        Some(ctx) if ctx.is_admin => Ok(true),
        Some(ctx) => Ok(member_role(pool, artist_id, &ctx.user_id).await?.is_some()),
        None => Ok(false),
    }
}

/// Any member of the artist, or an admin.
pub async fn require_artist_member(pool: &SqlitePool, ctx: &AuthContext, artist_id: &str) -> Result<()> {
    if is_artist_insider(pool, Some(ctx), artist_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Not a member of this artist".to_string(),
        ))
    }
}

/// Owners and managers of the artist, or an admin.
pub async fn require_artist_manager(pool: &SqlitePool, ctx: &AuthContext, artist_id: &str) -> Result<()> {
    if ctx.is_admin {
        return Ok(());
    }
    match member_role(pool, artist_id, &ctx.user_id).await? {
        Some(MemberRole::Owner) | Some(MemberRole::Manager) => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only artist owners or managers can do this".to_string(),
        )),
    }
}

pub async fn require_artist_owner(pool: &SqlitePool, ctx: &AuthContext, artist_id: &str) -> Result<()> {
    if ctx.is_admin {
        return Ok(());
    }
    match member_role(pool, artist_id, &ctx.user_id).await? {
        Some(MemberRole::Owner) => Ok(()),
        _ => Err(AppError::Forbidden(
            "Only artist owners can do this".to_string(),
        )),
    }
}

pub async fn find_subscription(
    pool: &SqlitePool,
    user_id: &str,
    artist_id: &str,
) -> Result<Option<UserSubscription>> {
    let sub = sqlx::query_as::<_, UserSubscription>(
        "SELECT * FROM user_subscriptions WHERE user_id = ? AND artist_id = ?",
    )
    .bind(user_id)
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;
    Ok(sub)
}

pub async fn artist_name_taken(pool: &SqlitePool, name: &str, except_id: Option<&str>) -> Result<bool> {
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT id FROM artists WHERE name = ? COLLATE NOCASE",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(matches!(existing, Some(id) if Some(id.as_str()) != except_id))
}

pub async fn insert_artist(
    pool: &SqlitePool,
    name: &str,
    bio: Option<&str>,
    genres: Vec<String>,
    social_links: BTreeMap<String, String>,
    image_url: Option<&str>,
    accepts_subscriptions: bool,
    created_by: Option<&str>,
) -> Result<Artist> {
    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO artists (id, name, bio, genres, social_links, image_url, accepts_subscriptions,
            created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(bio)
    .bind(Json(genres))
    .bind(Json(social_links))
    .bind(image_url)
    .bind(accepts_subscriptions)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if let Some(user_id) = created_by {
        add_member(pool, &id, user_id, MemberRole::Owner).await?;
    }

    fetch_artist(pool, &id).await
}

pub async fn add_member(pool: &SqlitePool, artist_id: &str, user_id: &str, role: MemberRole) -> Result<()> {
    sqlx::query(
        "INSERT INTO artist_members (artist_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (artist_id, user_id) DO UPDATE SET role = excluded.role",
    )
    .bind(artist_id)
    .bind(user_id)
    .bind(role)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    sqlx::query("UPDATE users SET is_artist = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_or_create_artist(pool: &SqlitePool, name: &str, created_by: Option<&str>) -> Result<Artist> {
    let existing = sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE name = ? COLLATE NOCASE")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some(artist) = existing {
        return Ok(artist);
    }

    tracing::info!(artist = %name, "Creating artist from upload metadata");
    insert_artist(pool, name, None, Vec::new(), BTreeMap::new(), None, false, created_by).await
}

pub async fn insert_album(
    pool: &SqlitePool,
    title: &str,
    artist_id: &str,
    release_date: NaiveDate,
    cover_url: Option<&str>,
    album_type: AlbumType,
    genre: Option<&str>,
) -> Result<Album> {
    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO albums (id, title, artist_id, release_date, cover_url, album_type, genre,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(title)
    .bind(artist_id)
    .bind(release_date)
    .bind(cover_url)
    .bind(album_type)
    .bind(genre)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    fetch_album(pool, &id).await
}

/// Albums discovered from tags default to singles released today.
pub async fn find_or_create_album(
    pool: &SqlitePool,
    artist_id: &str,
    title: &str,
    genre: Option<&str>,
) -> Result<Album> {
    let existing = sqlx::query_as::<_, Album>(
        "SELECT * FROM albums WHERE artist_id = ? AND title = ? COLLATE NOCASE",
    )
    .bind(artist_id)
    .bind(title)
    .fetch_optional(pool)
    .await?;
    if let Some(album) = existing {
        return Ok(album);
    }

    tracing::info!(album = %title, artist_id = %artist_id, "Creating album from upload metadata");
    insert_album(
        pool,
        title,
        artist_id,
        Utc::now().date_naive(),
        None,
        AlbumType::Single,
        genre,
    )
    .await
}

/// Column values for a freshly stored audio file.
#[derive(Debug)]
pub struct NewTrack<'a> {
    pub title: &'a str,
    pub artist_id: &'a str,
    pub album_id: Option<&'a str>,
    pub file_url: &'a str,
    pub file_path: &'a str,
    pub duration: i64,
    pub track_number: Option<i64>,
    pub genre: &'a str,
    pub is_exclusive: bool,
    pub distributor_name: Option<&'a str>,
    pub uploaded_by: Option<&'a str>,
    pub original_filename: Option<&'a str>,
    pub mime_type: &'a str,
    pub file_size: i64,
    pub release_date: Option<NaiveDate>,
}

pub async fn insert_track(pool: &SqlitePool, track: &NewTrack<'_>) -> Result<Track> {
    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO tracks (id, title, artist_id, album_id, file_url, file_path, duration,
            track_number, genre, is_exclusive, distributor_name, uploaded_by, original_filename,
            mime_type, file_size, release_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(track.title)
    .bind(track.artist_id)
    .bind(track.album_id)
    .bind(track.file_url)
    .bind(track.file_path)
    .bind(track.duration.max(0))
    .bind(track.track_number)
    .bind(track.genre)
    .bind(track.is_exclusive)
    .bind(track.distributor_name)
    .bind(track.uploaded_by)
    .bind(track.original_filename)
    .bind(track.mime_type)
    .bind(track.file_size)
    .bind(track.release_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    fetch_track(pool, &id).await
}

pub async fn create_liked_songs(conn: &mut SqliteConnection, user_id: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO playlists (id, name, description, owner_id, is_public, is_system, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, 1, ?, ?)",
    )
    .bind(new_id())
    .bind(LIKED_SONGS_NAME)
    .bind("Tracks you liked")
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Recomputes stored track count and duration of a playlist from its entries.
pub async fn refresh_playlist_totals(pool: &SqlitePool, playlist_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE playlists SET
            track_count = (SELECT COUNT(*) FROM playlist_tracks WHERE playlist_id = ?1),
            total_duration = (SELECT COALESCE(SUM(t.duration), 0)
                              FROM playlist_tracks pt JOIN tracks t ON t.id = pt.track_id
                              WHERE pt.playlist_id = ?1),
            updated_at = ?2
         WHERE id = ?1",
    )
    .bind(playlist_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Pulls a track out of every playlist that holds it and fixes their totals.
pub async fn remove_track_everywhere(pool: &SqlitePool, track_id: &str) -> Result<()> {
    let playlist_ids = sqlx::query_scalar::<_, String>(
        "SELECT playlist_id FROM playlist_tracks WHERE track_id = ?",
    )
    .bind(track_id)
    .fetch_all(pool)
    .await?;

    sqlx::query("DELETE FROM playlist_tracks WHERE track_id = ?")
        .bind(track_id)
        .execute(pool)
        .await?;

    for playlist_id in playlist_ids {
        compact_positions(pool, &playlist_id).await?;
        refresh_playlist_totals(pool, &playlist_id).await?;
    }
    Ok(())
}

/// Renumbers a playlist's entries 1..n, keeping their order.
pub async fn compact_positions(pool: &SqlitePool, playlist_id: &str) -> Result<()> {
    let track_ids = sqlx::query_scalar::<_, String>(
        "SELECT track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position, added_at",
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;

    for (index, track_id) in track_ids.iter().enumerate() {
        sqlx::query("UPDATE playlist_tracks SET position = ?1 WHERE playlist_id = ?2 AND track_id = ?3")
            .bind(index as i64 + 1)
            .bind(playlist_id)
            .bind(track_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rock"), "%rock%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
