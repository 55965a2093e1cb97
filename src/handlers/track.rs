use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::{AuthContext, OptionalAuth};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::handlers::artist::exclusive_unlocked;
use crate::models::{
    non_blank, MessageResponse, Page, Pagination, Track, TrackView, UpdateTrack, UNKNOWN_GENRE,
};
use crate::store::{
    fetch_album, fetch_artist, fetch_track, find_or_create_album, find_or_create_artist,
    insert_track, refresh_playlist_totals, remove_track_everywhere, require_artist_member,
    NewTrack,
};
use crate::utils::tags::{read_tags_async, AudioTags};
use crate::utils::upload::{read_upload, UploadForm, UploadKind, UploadedFile};

#[derive(Debug, Deserialize)]
pub struct TrackListQuery {
    pub artist_id: Option<String>,
    pub album_id: Option<String>,
    pub genre: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub track_id: String,
    pub play_count: i64,
}

pub async fn list_tracks(
    query: web::Query<TrackListQuery>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let p = &Pagination::new(query.page, query.limit);
    let filter = "(?1 IS NULL OR artist_id = ?1) AND (?2 IS NULL OR album_id = ?2)
         AND (?3 IS NULL OR genre = ?3 COLLATE NOCASE)";

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM tracks WHERE {}", filter))
        .bind(&query.artist_id)
        .bind(&query.album_id)
        .bind(&query.genre)
        .fetch_one(&state.db_pool)
        .await?;

    let tracks = sqlx::query_as::<_, Track>(&format!(
        "SELECT * FROM tracks WHERE {} ORDER BY created_at DESC LIMIT ?4 OFFSET ?5",
        filter
    ))
    .bind(&query.artist_id)
    .bind(&query.album_id)
    .bind(&query.genre)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(&state.db_pool)
    .await?;

    let mut items = Vec::with_capacity(tracks.len());
    for track in tracks {
        let unlocked = !track.is_exclusive || exclusive_unlocked(&state, &auth, &track.artist_id).await?;
        items.push(TrackView::new(track, unlocked));
    }

    Ok(HttpResponse::Ok().json(Page::new(items, total, p)))
}

pub async fn get_track(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let track = fetch_track(&state.db_pool, &path.into_inner()).await?;
    let unlocked = !track.is_exclusive || exclusive_unlocked(&state, &auth, &track.artist_id).await?;
    Ok(HttpResponse::Ok().json(TrackView::new(track, unlocked)))
}

/// Serves the audio file itself. Exclusive tracks need a qualifying subscription.
pub async fn stream_track(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<NamedFile> {
    let track = fetch_track(&state.db_pool, &path.into_inner()).await?;
    if track.is_exclusive && !exclusive_unlocked(&state, &auth, &track.artist_id).await? {
        return Err(AppError::Forbidden(
            "A subscription is required to play this track".to_string(),
        ));
    }

    let mime_type = track
        .mime_type
        .parse::<mime::Mime>()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    let file = NamedFile::open_async(&track.file_path)
        .await
        .map_err(|e| {
            tracing::warn!(track_id = %track.id, "Audio file unavailable: {}", e);
            AppError::not_found("Audio file")
        })?
        .set_content_type(mime_type);
    Ok(file)
}

pub async fn upload_track(
    ctx: AuthContext,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let form = read_upload(payload, "file", UploadKind::Audio, &state.config.audio_dir()).await?;
    let Some(file) = form.file.clone() else {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    };

    match store_uploaded_track(&ctx, &form, &file, &state).await {
        Ok(track) => {
            tracing::info!(track_id = %track.id, artist_id = %track.artist_id, "Track uploaded");
            Ok(HttpResponse::Created().json(track))
        }
        Err(e) => {
            file.discard().await;
            Err(e)
        }
    }
}

/// Title for a track nobody named: the file name without its extension.
pub(crate) fn title_from_filename(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .unwrap_or_default();
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}

async fn store_uploaded_track(
    ctx: &AuthContext,
    form: &UploadForm,
    file: &UploadedFile,
    state: &AppState,
) -> Result<Track> {
    let pool = &state.db_pool;
    let tags = read_tags_async(file.path.clone()).await.unwrap_or_default();

    let artist = match (form.text("artist_id"), tags.artist.as_deref()) {
        (Some(id), _) => fetch_artist(pool, id).await?,
        (None, Some(name)) => find_or_create_artist(pool, name, Some(&ctx.user_id)).await?,
        (None, None) => {
            return Err(AppError::missing_fields(vec!["artist_id".to_string()]));
        }
    };
    require_artist_member(pool, ctx, &artist.id).await?;

    let album = match (form.text("album_id"), tags.album.as_deref()) {
        (Some(id), _) => {
            let album = fetch_album(pool, id).await?;
            if album.artist_id != artist.id {
                return Err(AppError::BadRequest(
                    "Album belongs to a different artist".to_string(),
                ));
            }
            Some(album)
        }
        (None, Some(title)) => {
            Some(find_or_create_album(pool, &artist.id, title, tags.genre.as_deref()).await?)
        }
        (None, None) => None,
    };

    let AudioTags {
        title: tag_title,
        genre: tag_genre,
        track_number: tag_number,
        duration_secs,
        ..
    } = tags;
    let title = form
        .text("title")
        .map(str::to_string)
        .or(tag_title)
        .unwrap_or_else(|| title_from_filename(&file.original_filename));
    let genre = form
        .text("genre")
        .map(str::to_string)
        .or(tag_genre)
        .or_else(|| album.as_ref().and_then(|a| a.genre.clone()))
        .unwrap_or_else(|| UNKNOWN_GENRE.to_string());
    let track_number = form.parse::<i64>("track_number")?.or(tag_number);
    let duration = form.parse::<i64>("duration")?.or(duration_secs).unwrap_or(0);
    let release_date = form
        .parse::<NaiveDate>("release_date")?
        .or_else(|| album.as_ref().map(|a| a.release_date));
    let file_url = format!("/uploads/audio/{}", file.stored_name);
    let file_path = file.path.to_string_lossy();

    insert_track(
        pool,
        &NewTrack {
            title: &title,
            artist_id: &artist.id,
            album_id: album.as_ref().map(|a| a.id.as_str()),
            file_url: &file_url,
            file_path: &file_path,
            duration,
            track_number,
            genre: &genre,
            is_exclusive: form.flag("is_exclusive"),
            distributor_name: None,
            uploaded_by: Some(&ctx.user_id),
            original_filename: Some(&file.original_filename),
            mime_type: &file.mime_type,
            file_size: file.size,
            release_date,
        },
    )
    .await
}

pub async fn update_track(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateTrack>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut track = fetch_track(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &track.artist_id).await?;
    let req = req.into_inner();
    let duration_changed = matches!(req.duration, Some(d) if d != track.duration);

    if let Some(title) = req.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(AppError::BadRequest("Track title cannot be empty".to_string()));
        }
        track.title = title.to_string();
    }
    if let Some(album_id) = req.album_id {
        if let Some(id) = album_id.as_deref() {
            let album = fetch_album(&state.db_pool, id).await?;
            if album.artist_id != track.artist_id {
                return Err(AppError::BadRequest(
                    "Album belongs to a different artist".to_string(),
                ));
            }
        }
        track.album_id = album_id;
    }
    if let Some(number) = req.track_number {
        track.track_number = number;
    }
    if let Some(genre) = non_blank(&req.genre) {
        track.genre = genre.to_string();
    }
    if let Some(duration) = req.duration {
        if duration < 0 {
            return Err(AppError::BadRequest("Duration cannot be negative".to_string()));
        }
        track.duration = duration;
    }
    if let Some(exclusive) = req.is_exclusive {
        track.is_exclusive = exclusive;
    }
    if let Some(date) = req.release_date {
        track.release_date = date;
    }

    sqlx::query(
        "UPDATE tracks SET title = ?, album_id = ?, track_number = ?, genre = ?, duration = ?,
            is_exclusive = ?, release_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&track.title)
    .bind(&track.album_id)
    .bind(track.track_number)
    .bind(&track.genre)
    .bind(track.duration)
    .bind(track.is_exclusive)
    .bind(track.release_date)
    .bind(Utc::now())
    .bind(&track.id)
    .execute(&state.db_pool)
    .await?;

    if duration_changed {
        let playlist_ids = sqlx::query_scalar::<_, String>(
            "SELECT playlist_id FROM playlist_tracks WHERE track_id = ?",
        )
        .bind(&track.id)
        .fetch_all(&state.db_pool)
        .await?;
        for playlist_id in playlist_ids {
            refresh_playlist_totals(&state.db_pool, &playlist_id).await?;
        }
    }

    let track = fetch_track(&state.db_pool, &track.id).await?;
    Ok(HttpResponse::Ok().json(track))
}

pub async fn delete_track(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let track = fetch_track(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &track.artist_id).await?;

    remove_track_everywhere(&state.db_pool, &track.id).await?;
    sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(&track.id)
        .execute(&state.db_pool)
        .await?;

    if let Err(e) = tokio::fs::remove_file(&track.file_path).await {
        tracing::warn!(track_id = %track.id, "Could not remove audio file: {}", e);
    }

    tracing::info!(track_id = %track.id, "Track deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Track deleted")))
}

/// Counts a play. The first play of an artist by a signed-in user also counts a listener.
pub async fn play_track(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let track = fetch_track(&state.db_pool, &path.into_inner()).await?;
    if track.is_exclusive && !exclusive_unlocked(&state, &auth, &track.artist_id).await? {
        return Err(AppError::Forbidden(
            "A subscription is required to play this track".to_string(),
        ));
    }
    let pool = &state.db_pool;

    sqlx::query("UPDATE tracks SET play_count = play_count + 1 WHERE id = ?")
        .bind(&track.id)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE artists SET total_plays = total_plays + 1 WHERE id = ?")
        .bind(&track.artist_id)
        .execute(pool)
        .await?;

    if let Some(user_id) = auth.user_id() {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO artist_listeners (artist_id, user_id) VALUES (?, ?)",
        )
        .bind(&track.artist_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
        if inserted > 0 {
            sqlx::query("UPDATE artists SET listener_count = listener_count + 1 WHERE id = ?")
                .bind(&track.artist_id)
                .execute(pool)
                .await?;
        }
    }

    let play_count = sqlx::query_scalar::<_, i64>("SELECT play_count FROM tracks WHERE id = ?")
        .bind(&track.id)
        .fetch_one(pool)
        .await?;

    Ok(HttpResponse::Ok().json(PlayResponse {
        track_id: track.id,
        play_count,
    }))
}
