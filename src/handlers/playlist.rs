use actix_web::{web, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::auth::{AuthContext, OptionalAuth};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    non_blank, AddTrackRequest, BatchUpdatePlaylists, CreatePlaylistRequest,
    DuplicatePlaylistRequest, FollowToggleResponse, MessageResponse, Playlist, PlaylistEntry,
    PlaylistWithTracks, UpdatePlaylist,
};
use crate::store::{fetch_owned_folder, fetch_owned_playlist, fetch_playlist, fetch_track, new_id};

/// Loads a playlist the caller may read. Private playlists of others read as missing.
async fn fetch_visible_playlist(pool: &SqlitePool, id: &str, user_id: Option<&str>) -> Result<Playlist> {
    let playlist = fetch_playlist(pool, id).await?;
    if !playlist.is_public && user_id != Some(playlist.owner_id.as_str()) {
        return Err(AppError::not_found("Playlist"));
    }
    Ok(playlist)
}

async fn playlist_entries(pool: &SqlitePool, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
    let entries = sqlx::query_as::<_, PlaylistEntry>(
        "SELECT pt.track_id, pt.position, pt.added_at, t.title, t.artist_id,
            a.name AS artist_name, t.album_id, t.duration
         FROM playlist_tracks pt
         JOIN tracks t ON t.id = pt.track_id
         JOIN artists a ON a.id = t.artist_id
         WHERE pt.playlist_id = ?
         ORDER BY pt.position",
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

async fn is_following(pool: &SqlitePool, playlist_id: &str, user_id: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM playlist_followers WHERE playlist_id = ? AND user_id = ?",
    )
    .bind(playlist_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(found > 0)
}

pub async fn create_playlist(
    ctx: AuthContext,
    req: web::Json<CreatePlaylistRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::missing_fields(vec!["name".to_string()]));
    }
    if let Some(folder_id) = req.folder_id.as_deref() {
        fetch_owned_folder(&state.db_pool, folder_id, &ctx.user_id).await?;
    }

    let playlist_id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO playlists (id, name, description, owner_id, is_public, is_system, folder_id,
            cover_url, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
    )
    .bind(&playlist_id)
    .bind(name)
    .bind(non_blank(&req.description))
    .bind(&ctx.user_id)
    .bind(req.is_public)
    .bind(&req.folder_id)
    .bind(non_blank(&req.cover_url))
    .bind(now)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist_id).await?;
    Ok(HttpResponse::Created().json(playlist))
}

pub async fn get_playlists(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    let playlists = sqlx::query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE owner_id = ? ORDER BY is_system DESC, created_at DESC",
    )
    .bind(&ctx.user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(playlists))
}

pub async fn get_playlist(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let playlist = fetch_visible_playlist(&state.db_pool, &path.into_inner(), auth.user_id()).await?;
    let tracks = playlist_entries(&state.db_pool, &playlist.id).await?;
    let is_following = match auth.user_id() {
        Some(user_id) => is_following(&state.db_pool, &playlist.id, user_id).await?,
        None => false,
    };

    Ok(HttpResponse::Ok().json(PlaylistWithTracks {
        playlist,
        tracks,
        is_following,
    }))
}

pub async fn update_playlist(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdatePlaylist>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut playlist = fetch_owned_playlist(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;
    let req = req.into_inner();

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::BadRequest("Playlist name cannot be empty".to_string()));
        }
        if playlist.is_system && name != playlist.name {
            return Err(AppError::BadRequest(
                "System playlists cannot be renamed".to_string(),
            ));
        }
        playlist.name = name.to_string();
    }
    if let Some(description) = req.description {
        playlist.description = Some(description);
    }
    if let Some(is_public) = req.is_public {
        playlist.is_public = is_public;
    }
    if let Some(cover_url) = req.cover_url {
        playlist.cover_url = Some(cover_url);
    }
    if let Some(folder_id) = req.folder_id {
        if let Some(id) = folder_id.as_deref() {
            fetch_owned_folder(&state.db_pool, id, &ctx.user_id).await?;
        }
        playlist.folder_id = folder_id;
    }

    sqlx::query(
        "UPDATE playlists SET name = ?, description = ?, is_public = ?, cover_url = ?,
            folder_id = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&playlist.name)
    .bind(&playlist.description)
    .bind(playlist.is_public)
    .bind(&playlist.cover_url)
    .bind(&playlist.folder_id)
    .bind(Utc::now())
    .bind(&playlist.id)
    .execute(&state.db_pool)
    .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist.id).await?;
    Ok(HttpResponse::Ok().json(playlist))
}

pub async fn delete_playlist(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let playlist = fetch_owned_playlist(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;
    if playlist.is_system {
        return Err(AppError::BadRequest(
            "System playlists cannot be deleted".to_string(),
        ));
    }

    for sql in [
        "DELETE FROM playlist_tracks WHERE playlist_id = ?",
        "DELETE FROM playlist_followers WHERE playlist_id = ?",
        "DELETE FROM playlists WHERE id = ?",
    ] {
        sqlx::query(sql)
            .bind(&playlist.id)
            .execute(&state.db_pool)
            .await?;
    }

    tracing::info!(playlist_id = %playlist.id, "Playlist deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Playlist deleted")))
}

pub async fn add_to_playlist(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<AddTrackRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let playlist = fetch_owned_playlist(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;
    let track = fetch_track(&state.db_pool, &req.track_id).await?;

    let present = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
    )
    .bind(&playlist.id)
    .bind(&track.id)
    .fetch_one(&state.db_pool)
    .await?;
    if present > 0 {
        return Err(AppError::BadRequest(
            "Track is already in this playlist".to_string(),
        ));
    }

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO playlist_tracks (playlist_id, track_id, position, added_at)
         VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_tracks
                          WHERE playlist_id = ?1), ?3)",
    )
    .bind(&playlist.id)
    .bind(&track.id)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    sqlx::query(
        "UPDATE playlists SET track_count = track_count + 1,
            total_duration = total_duration + ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(track.duration)
    .bind(now)
    .bind(&playlist.id)
    .execute(&state.db_pool)
    .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist.id).await?;
    Ok(HttpResponse::Ok().json(playlist))
}

pub async fn remove_from_playlist(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (playlist_id, track_id) = path.into_inner();
    let playlist = fetch_owned_playlist(&state.db_pool, &playlist_id, &ctx.user_id).await?;

    let position = sqlx::query_scalar::<_, i64>(
        "SELECT position FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
    )
    .bind(&playlist.id)
    .bind(&track_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Track in playlist"))?;
    let duration = fetch_track(&state.db_pool, &track_id).await?.duration;

    sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?")
        .bind(&playlist.id)
        .bind(&track_id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query(
        "UPDATE playlist_tracks SET position = position - 1 WHERE playlist_id = ? AND position > ?",
    )
    .bind(&playlist.id)
    .bind(position)
    .execute(&state.db_pool)
    .await?;
    sqlx::query(
        "UPDATE playlists SET track_count = MAX(track_count - 1, 0),
            total_duration = MAX(total_duration - ?, 0), updated_at = ?
         WHERE id = ?",
    )
    .bind(duration)
    .bind(Utc::now())
    .bind(&playlist.id)
    .execute(&state.db_pool)
    .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist.id).await?;
    Ok(HttpResponse::Ok().json(playlist))
}

pub async fn toggle_follow_playlist(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let playlist = fetch_visible_playlist(&state.db_pool, &path.into_inner(), Some(&ctx.user_id)).await?;
    if playlist.owner_id == ctx.user_id {
        return Err(AppError::BadRequest(
            "You cannot follow your own playlist".to_string(),
        ));
    }

    let following = if is_following(&state.db_pool, &playlist.id, &ctx.user_id).await? {
        sqlx::query("DELETE FROM playlist_followers WHERE playlist_id = ? AND user_id = ?")
            .bind(&playlist.id)
            .bind(&ctx.user_id)
            .execute(&state.db_pool)
            .await?;
        sqlx::query(
            "UPDATE playlists SET follower_count = MAX(follower_count - 1, 0) WHERE id = ?",
        )
        .bind(&playlist.id)
        .execute(&state.db_pool)
        .await?;
        false
    } else {
        sqlx::query(
            "INSERT INTO playlist_followers (playlist_id, user_id, followed_at) VALUES (?, ?, ?)",
        )
        .bind(&playlist.id)
        .bind(&ctx.user_id)
        .bind(Utc::now())
        .execute(&state.db_pool)
        .await?;
        sqlx::query("UPDATE playlists SET follower_count = follower_count + 1 WHERE id = ?")
            .bind(&playlist.id)
            .execute(&state.db_pool)
            .await?;
        true
    };

    let follower_count = fetch_playlist(&state.db_pool, &playlist.id)
        .await?
        .follower_count;
    Ok(HttpResponse::Ok().json(FollowToggleResponse {
        following,
        follower_count,
    }))
}

/// Copies a readable playlist, entries in order, into a new private playlist of the caller.
pub async fn duplicate_playlist(
    ctx: AuthContext,
    path: web::Path<String>,
    req: Option<web::Json<DuplicatePlaylistRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let source = fetch_visible_playlist(&state.db_pool, &path.into_inner(), Some(&ctx.user_id)).await?;
    let name = req
        .as_ref()
        .and_then(|r| non_blank(&r.name))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} (Copy)", source.name));

    let copy_id = new_id();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO playlists (id, name, description, owner_id, is_public, is_system, folder_id,
            cover_url, track_count, total_duration, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, 0, NULL, ?, ?, ?, ?, ?)",
    )
    .bind(&copy_id)
    .bind(&name)
    .bind(&source.description)
    .bind(&ctx.user_id)
    .bind(&source.cover_url)
    .bind(source.track_count)
    .bind(source.total_duration)
    .bind(now)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    sqlx::query(
        "INSERT INTO playlist_tracks (playlist_id, track_id, position, added_at)
         SELECT ?, track_id, position, ? FROM playlist_tracks WHERE playlist_id = ?",
    )
    .bind(&copy_id)
    .bind(now)
    .bind(&source.id)
    .execute(&state.db_pool)
    .await?;

    let copy = fetch_playlist(&state.db_pool, &copy_id).await?;
    Ok(HttpResponse::Created().json(copy))
}

/// Applies visibility or folder changes to several playlists. Nothing is written unless every
/// playlist exists and belongs to the caller.
pub async fn batch_update_playlists(
    ctx: AuthContext,
    req: web::Json<BatchUpdatePlaylists>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    if req.playlist_ids.is_empty() {
        return Err(AppError::missing_fields(vec!["playlist_ids".to_string()]));
    }
    if req.is_public.is_none() && req.folder_id.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let ids: HashSet<&str> = req.playlist_ids.iter().map(String::as_str).collect();
    for id in &ids {
        fetch_owned_playlist(&state.db_pool, id, &ctx.user_id).await?;
    }
    if let Some(Some(folder_id)) = req.folder_id.as_ref() {
        fetch_owned_folder(&state.db_pool, folder_id, &ctx.user_id).await?;
    }

    let now = Utc::now();
    let mut tx = state.db_pool.begin().await?;
    for id in &ids {
        if let Some(is_public) = req.is_public {
            sqlx::query("UPDATE playlists SET is_public = ?, updated_at = ? WHERE id = ?")
                .bind(is_public)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(folder_id) = req.folder_id.as_ref() {
            sqlx::query("UPDATE playlists SET folder_id = ?, updated_at = ? WHERE id = ?")
                .bind(folder_id)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new(format!(
        "{} playlists updated",
        ids.len()
    ))))
}
