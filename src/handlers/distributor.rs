use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::NaiveDate;

use crate::auth::{AuthContext, DistributorKey};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::handlers::track::title_from_filename;
use crate::models::{Page, Pagination, Track, UNKNOWN_GENRE};
use crate::store::{find_or_create_album, find_or_create_artist, insert_track, NewTrack};
use crate::utils::tags::read_tags_async;
use crate::utils::upload::{read_upload, UploadForm, UploadKind, UploadedFile};

pub const DEFAULT_DISTRIBUTOR_NAME: &str = "Independent Distributor";

fn require_distributor(ctx: &AuthContext) -> Result<()> {
    if ctx.is_distributor || ctx.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Distributor access required".to_string(),
        ))
    }
}

/// Ingests a track delivered by a distributor. Artist and album are matched by name and
/// created when unknown.
pub async fn distributor_upload(
    _key: DistributorKey,
    ctx: AuthContext,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    require_distributor(&ctx)?;

    let form = read_upload(payload, "file", UploadKind::Audio, &state.config.audio_dir()).await?;
    let Some(file) = form.file.clone() else {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    };

    match ingest(&ctx, &form, &file, &state).await {
        Ok(track) => {
            tracing::info!(
                track_id = %track.id,
                distributor = track.distributor_name.as_deref().unwrap_or_default(),
                "Distributor track ingested"
            );
            Ok(HttpResponse::Created().json(track))
        }
        Err(e) => {
            file.discard().await;
            Err(e)
        }
    }
}

async fn ingest(ctx: &AuthContext, form: &UploadForm, file: &UploadedFile, state: &AppState) -> Result<Track> {
    let pool = &state.db_pool;
    let tags = read_tags_async(file.path.clone()).await.unwrap_or_default();

    let artist_name = form
        .text("artist_name")
        .map(str::to_string)
        .or(tags.artist)
        .ok_or_else(|| AppError::missing_fields(vec!["artist_name".to_string()]))?;
    let artist = find_or_create_artist(pool, &artist_name, None).await?;

    let genre = form
        .text("genre")
        .map(str::to_string)
        .or(tags.genre)
        .unwrap_or_else(|| UNKNOWN_GENRE.to_string());
    let album = match form.text("album_title").map(str::to_string).or(tags.album) {
        Some(title) => Some(find_or_create_album(pool, &artist.id, &title, Some(&genre)).await?),
        None => None,
    };

    let title = form
        .text("title")
        .map(str::to_string)
        .or(tags.title)
        .unwrap_or_else(|| title_from_filename(&file.original_filename));
    // Decoded length first; the supplied value only when the file carries none.
    let duration = match tags.duration_secs {
        Some(secs) => secs,
        None => form.parse::<i64>("duration")?.unwrap_or(0),
    };
    let track_number = form.parse::<i64>("track_number")?.or(tags.track_number);
    let release_date = form
        .parse::<NaiveDate>("release_date")?
        .or_else(|| album.as_ref().map(|a| a.release_date));
    let distributor_name = form.text("distributor_name").unwrap_or(DEFAULT_DISTRIBUTOR_NAME);
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
            is_exclusive: false,
            distributor_name: Some(distributor_name),
            uploaded_by: Some(&ctx.user_id),
            original_filename: Some(&file.original_filename),
            mime_type: &file.mime_type,
            file_size: file.size,
            release_date,
        },
    )
    .await
}

pub async fn distributor_tracks(
    _key: DistributorKey,
    ctx: AuthContext,
    query: web::Query<Pagination>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    require_distributor(&ctx)?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tracks WHERE uploaded_by = ? AND distributor_name IS NOT NULL",
    )
    .bind(&ctx.user_id)
    .fetch_one(&state.db_pool)
    .await?;
    let tracks = sqlx::query_as::<_, Track>(
        "SELECT * FROM tracks WHERE uploaded_by = ? AND distributor_name IS NOT NULL
         ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&ctx.user_id)
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(tracks, total, &query)))
}
