use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Json;

use crate::auth::{AuthContext, OptionalAuth};
use crate::config::AppState;
use crate::enrichment::spawn_enrichment;
use crate::error::{AppError, Result};
use crate::gate::subscription_entitles;
use crate::models::{
    AddMemberRequest, Album, Artist, ArtistDetail, ArtistMember, CreateArtist, MemberRole,
    MessageResponse, Page, Pagination, Track, TrackView, UpdateArtist,
};
use crate::store::{
    add_member, artist_name_taken, fetch_artist, find_subscription, insert_artist,
    is_artist_insider, like_pattern, member_role, remove_track_everywhere, require_artist_manager,
    require_artist_member, require_artist_owner,
};
use crate::utils::upload::{read_upload, UploadKind};

#[derive(Debug, Deserialize)]
pub struct ArtistListQuery {
    pub genre: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_artists(
    query: web::Query<ArtistListQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let genre = query.genre.as_deref().map(like_pattern);
    let p = &Pagination::new(query.page, query.limit);

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM artists WHERE (?1 IS NULL OR genres LIKE ?1 ESCAPE '\\')",
    )
    .bind(&genre)
    .fetch_one(&state.db_pool)
    .await?;

    let artists = sqlx::query_as::<_, Artist>(
        "SELECT * FROM artists WHERE (?1 IS NULL OR genres LIKE ?1 ESCAPE '\\')
         ORDER BY follower_count DESC, name ASC LIMIT ?2 OFFSET ?3",
    )
    .bind(&genre)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(artists, total, p)))
}

pub async fn get_artist(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;

    let members = sqlx::query_as::<_, ArtistMember>(
        "SELECT m.artist_id, m.user_id, u.username, m.role, m.joined_at
         FROM artist_members m JOIN users u ON u.id = m.user_id
         WHERE m.artist_id = ? ORDER BY m.joined_at",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;

    let albums = sqlx::query_as::<_, Album>(
        "SELECT * FROM albums WHERE artist_id = ? ORDER BY release_date DESC",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;

    let top_tracks = sqlx::query_as::<_, Track>(
        "SELECT * FROM tracks WHERE artist_id = ? ORDER BY play_count DESC, title ASC LIMIT 10",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;
    let unlocked = exclusive_unlocked(&state, &auth, &artist.id).await?;
    let top_tracks = top_tracks
        .into_iter()
        .map(|t| TrackView::new(t, unlocked).track)
        .collect();

    Ok(HttpResponse::Ok().json(ArtistDetail {
        artist,
        members,
        albums,
        top_tracks,
    }))
}

/// Whether the caller may hear the artist's exclusive tracks.
pub(crate) async fn exclusive_unlocked(
    state: &AppState,
    auth: &OptionalAuth,
    artist_id: &str,
) -> Result<bool> {
    if is_artist_insider(&state.db_pool, auth.0.as_ref(), artist_id).await? {
        return Ok(true);
    }
    let Some(user_id) = auth.user_id() else {
        return Ok(false);
    };
    let sub = find_subscription(&state.db_pool, user_id, artist_id).await?;
    Ok(sub.map_or(false, |s| subscription_entitles(&s, Utc::now())))
}

pub async fn create_artist(
    ctx: AuthContext,
    req: web::Json<CreateArtist>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::missing_fields(vec!["name".to_string()]));
    }
    if artist_name_taken(&state.db_pool, &name, None).await? {
        return Err(AppError::Conflict("Artist name already exists".to_string()));
    }

    let req = req.into_inner();
    let artist = insert_artist(
        &state.db_pool,
        &name,
        req.bio.as_deref(),
        req.genres,
        req.social_links,
        req.image_url.as_deref(),
        req.accepts_subscriptions,
        Some(&ctx.user_id),
    )
    .await?;
    tracing::info!(artist_id = %artist.id, name = %artist.name, "Artist created");

    if artist.bio.is_none() || artist.genres.is_empty() {
        spawn_enrichment(
            state.db_pool.clone(),
            state.enricher.clone(),
            artist.id.clone(),
            artist.name.clone(),
            state.config.enrichment_timeout,
        );
    }

    Ok(HttpResponse::Created().json(artist))
}

pub async fn update_artist(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateArtist>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &artist.id).await?;
    let req = req.into_inner();

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::BadRequest("Artist name cannot be empty".to_string()));
        }
        if artist_name_taken(&state.db_pool, name, Some(&artist.id)).await? {
            return Err(AppError::Conflict("Artist name already exists".to_string()));
        }
        artist.name = name.to_string();
    }
    if let Some(bio) = req.bio {
        artist.bio = Some(bio);
    }
    if let Some(genres) = req.genres {
        artist.genres = Json(genres);
    }
    if let Some(links) = req.social_links {
        artist.social_links = Json(links);
    }
    if let Some(image_url) = req.image_url {
        artist.image_url = Some(image_url);
    }
    if let Some(accepts) = req.accepts_subscriptions {
        artist.accepts_subscriptions = accepts;
    }

    sqlx::query(
        "UPDATE artists SET name = ?, bio = ?, genres = ?, social_links = ?, image_url = ?,
            accepts_subscriptions = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&artist.name)
    .bind(&artist.bio)
    .bind(&artist.genres)
    .bind(&artist.social_links)
    .bind(&artist.image_url)
    .bind(artist.accepts_subscriptions)
    .bind(Utc::now())
    .bind(&artist.id)
    .execute(&state.db_pool)
    .await?;

    let artist = fetch_artist(&state.db_pool, &artist.id).await?;
    Ok(HttpResponse::Ok().json(artist))
}

pub async fn delete_artist(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_owner(&state.db_pool, &ctx, &artist.id).await?;
    let pool = &state.db_pool;

    let tracks = sqlx::query_as::<_, Track>("SELECT * FROM tracks WHERE artist_id = ?")
        .bind(&artist.id)
        .fetch_all(pool)
        .await?;
    for track in &tracks {
        remove_track_everywhere(pool, &track.id).await?;
    }

    // Followers lose one followed artist each.
    sqlx::query(
        "UPDATE users SET following_count = MAX(following_count - 1, 0)
         WHERE id IN (SELECT user_id FROM artist_follows WHERE artist_id = ?)",
    )
    .bind(&artist.id)
    .execute(pool)
    .await?;

    for table in [
        "tracks",
        "albums",
        "subscription_tiers",
        "user_subscriptions",
        "exclusive_content",
        "artist_events",
        "artist_follows",
        "artist_listeners",
        "artist_members",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE artist_id = ?", table))
            .bind(&artist.id)
            .execute(pool)
            .await?;
    }
    sqlx::query("DELETE FROM artists WHERE id = ?")
        .bind(&artist.id)
        .execute(pool)
        .await?;

    for track in tracks {
        if let Err(e) = tokio::fs::remove_file(&track.file_path).await {
            tracing::warn!(track_id = %track.id, "Could not remove audio file: {}", e);
        }
    }

    tracing::info!(artist_id = %artist.id, "Artist deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Artist deleted")))
}

pub async fn add_artist_member(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<AddMemberRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_owner(&state.db_pool, &ctx, &artist.id).await?;
    crate::store::fetch_user(&state.db_pool, &req.user_id).await?;

    if member_role(&state.db_pool, &artist.id, &req.user_id).await? == Some(MemberRole::Owner)
        && req.role != MemberRole::Owner
    {
        ensure_other_owner(&state, &artist.id, &req.user_id).await?;
    }

    add_member(&state.db_pool, &artist.id, &req.user_id, req.role).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Member saved")))
}

pub async fn remove_artist_member(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (artist_id, user_id) = path.into_inner();
    let artist = fetch_artist(&state.db_pool, &artist_id).await?;
    require_artist_owner(&state.db_pool, &ctx, &artist.id).await?;

    match member_role(&state.db_pool, &artist.id, &user_id).await? {
        None => return Err(AppError::not_found("Member")),
        Some(MemberRole::Owner) => ensure_other_owner(&state, &artist.id, &user_id).await?,
        Some(_) => {}
    }

    sqlx::query("DELETE FROM artist_members WHERE artist_id = ? AND user_id = ?")
        .bind(&artist.id)
        .bind(&user_id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Member removed")))
}

async fn ensure_other_owner(state: &AppState, artist_id: &str, leaving: &str) -> Result<()> {
    let owners = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM artist_members WHERE artist_id = ? AND role = 'owner' AND user_id != ?",
    )
    .bind(artist_id)
    .bind(leaving)
    .fetch_one(&state.db_pool)
    .await?;
    if owners == 0 {
        return Err(AppError::BadRequest(
            "An artist must keep at least one owner".to_string(),
        ));
    }
    Ok(())
}

pub async fn get_artist_albums(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    let albums = sqlx::query_as::<_, Album>(
        "SELECT * FROM albums WHERE artist_id = ? ORDER BY release_date DESC",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(albums))
}

pub async fn get_artist_tracks(
    path: web::Path<String>,
    query: web::Query<Pagination>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracks WHERE artist_id = ?")
        .bind(&artist.id)
        .fetch_one(&state.db_pool)
        .await?;
    let tracks = sqlx::query_as::<_, Track>(
        "SELECT * FROM tracks WHERE artist_id = ? ORDER BY play_count DESC, title ASC
         LIMIT ? OFFSET ?",
    )
    .bind(&artist.id)
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&state.db_pool)
    .await?;

    let unlocked = exclusive_unlocked(&state, &auth, &artist.id).await?;
    let tracks = tracks
        .into_iter()
        .map(|t| TrackView::new(t, unlocked))
        .collect();
    Ok(HttpResponse::Ok().json(Page::new(tracks, total, &query)))
}

pub async fn upload_artist_image(
    ctx: AuthContext,
    path: web::Path<String>,
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_manager(&state.db_pool, &ctx, &artist.id).await?;

    let form = read_upload(payload, "image", UploadKind::Image, &state.config.image_dir()).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest("No image uploaded".to_string()))?;
    let image_url = format!("/uploads/images/{}", file.stored_name);

    sqlx::query("UPDATE artists SET image_url = ?, updated_at = ? WHERE id = ?")
        .bind(&image_url)
        .bind(Utc::now())
        .bind(&artist.id)
        .execute(&state.db_pool)
        .await?;

    let artist = fetch_artist(&state.db_pool, &artist.id).await?;
    Ok(HttpResponse::Ok().json(artist))
}
