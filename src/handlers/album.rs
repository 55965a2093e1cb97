use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{AuthContext, OptionalAuth};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::handlers::artist::exclusive_unlocked;
use crate::models::{
    non_blank, sort_album_tracks, Album, AlbumDetail, AlbumType, CreateAlbum, MessageResponse,
    Page, Pagination, Track, TrackView, UpdateAlbum,
};
use crate::store::{fetch_album, fetch_artist, insert_album, require_artist_member};
use crate::utils::upload::{read_upload, UploadKind};

#[derive(Debug, Deserialize)]
pub struct AlbumListQuery {
    pub artist_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_albums(
    query: web::Query<AlbumListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let p = &Pagination::new(query.page, query.limit);

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM albums WHERE (?1 IS NULL OR artist_id = ?1)",
    )
    .bind(&query.artist_id)
    .fetch_one(&state.db_pool)
    .await?;

    let albums = sqlx::query_as::<_, Album>(
        "SELECT * FROM albums WHERE (?1 IS NULL OR artist_id = ?1)
         ORDER BY release_date DESC, title ASC LIMIT ?2 OFFSET ?3",
    )
    .bind(&query.artist_id)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(albums, total, p)))
}

pub async fn get_album(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let album = fetch_album(&state.db_pool, &path.into_inner()).await?;
    let artist = fetch_artist(&state.db_pool, &album.artist_id).await?;

    let mut tracks = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE album_id = ?")
        .bind(&album.id)
        .fetch_all(&state.db_pool)
        .await?;
    sort_album_tracks(&mut tracks);

    let total_duration = tracks.iter().map(|t| t.duration).sum::<i64>();
    let unlocked = exclusive_unlocked(&state, &auth, &artist.id).await?;
    let tracks = tracks
        .into_iter()
        .map(|t| TrackView::new(t, unlocked).track)
        .collect();

    Ok(HttpResponse::Ok().json(AlbumDetail {
        album,
        artist_name: artist.name,
        total_duration,
        tracks,
    }))
}

pub async fn create_album(
    ctx: AuthContext,
    req: web::Json<CreateAlbum>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut missing = Vec::new();
    if non_blank(&req.title).is_none() {
        missing.push("title".to_string());
    }
    if non_blank(&req.artist_id).is_none() {
        missing.push("artist_id".to_string());
    }
    if req.release_date.is_none() {
        missing.push("release_date".to_string());
    }
    let (Some(title), Some(artist_id), Some(release_date)) =
        (non_blank(&req.title), non_blank(&req.artist_id), req.release_date)
    else {
        return Err(AppError::missing_fields(missing));
    };

    let artist = fetch_artist(&state.db_pool, artist_id).await?;
    require_artist_member(&state.db_pool, &ctx, &artist.id).await?;

    let album = insert_album(
        &state.db_pool,
        title,
        &artist.id,
        release_date,
        non_blank(&req.cover_url),
        req.album_type.unwrap_or(AlbumType::Album),
        non_blank(&req.genre),
    )
    .await?;
    tracing::info!(album_id = %album.id, artist_id = %artist.id, "Album created");

    Ok(HttpResponse::Created().json(album))
}

pub async fn update_album(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateAlbum>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut album = fetch_album(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &album.artist_id).await?;
    let req = req.into_inner();

    if let Some(title) = req.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(AppError::BadRequest("Album title cannot be empty".to_string()));
        }
        album.title = title.to_string();
    }
    if let Some(date) = req.release_date {
        album.release_date = date;
    }
    if let Some(cover_url) = req.cover_url {
        album.cover_url = Some(cover_url);
    }
    if let Some(album_type) = req.album_type {
        album.album_type = album_type;
    }
    if let Some(genre) = req.genre {
        album.genre = Some(genre);
    }

    sqlx::query(
        "UPDATE albums SET title = ?, release_date = ?, cover_url = ?, album_type = ?, genre = ?,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(&album.title)
    .bind(album.release_date)
    .bind(&album.cover_url)
    .bind(album.album_type)
    .bind(&album.genre)
    .bind(Utc::now())
    .bind(&album.id)
    .execute(&state.db_pool)
    .await?;

    let album = fetch_album(&state.db_pool, &album.id).await?;
    Ok(HttpResponse::Ok().json(album))
}

/// Removes the album; its tracks stay in the catalog without an album.
pub async fn delete_album(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let album = fetch_album(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &album.artist_id).await?;

    sqlx::query("UPDATE tracks SET album_id = NULL, updated_at = ? WHERE album_id = ?")
        .bind(Utc::now())
        .bind(&album.id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(&album.id)
        .execute(&state.db_pool)
        .await?;

    tracing::info!(album_id = %album.id, "Album deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Album deleted")))
}

pub async fn upload_album_cover(
    ctx: AuthContext,
    path: web::Path<String>,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let album = fetch_album(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &album.artist_id).await?;

    let form = read_upload(payload, "image", UploadKind::Image, &state.config.image_dir()).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest("No image uploaded".to_string()))?;
    let cover_url = format!("/uploads/images/{}", file.stored_name);

    sqlx::query("UPDATE albums SET cover_url = ?, updated_at = ? WHERE id = ?")
        .bind(&cover_url)
        .bind(Utc::now())
        .bind(&album.id)
        .execute(&state.db_pool)
        .await?;

    let album = fetch_album(&state.db_pool, &album.id).await?;
    Ok(HttpResponse::Ok().json(album))
}
