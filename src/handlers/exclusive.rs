use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{AuthContext, OptionalAuth};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::gate::{can_access, Gate};
use crate::models::{
    ArtistEvent, CreateEvent, CreateExclusiveContent, ExclusiveContent, Gated, MessageResponse,
    TierStatus, UpdateEvent, UpdateExclusiveContent, UserSubscription,
};
use crate::store::{
    fetch_artist, fetch_tier, find_subscription, is_artist_insider, new_id, require_artist_member,
};

/// What the caller holds with one artist, resolved once per request.
struct Viewer {
    insider: bool,
    subscription: Option<UserSubscription>,
    now: DateTime<Utc>,
}

impl Viewer {
    async fn resolve(pool: &SqlitePool, auth: &OptionalAuth, artist_id: &str) -> Result<Self> {
        let insider = is_artist_insider(pool, auth.0.as_ref(), artist_id).await?;
        let subscription = match auth.user_id() {
            Some(user_id) if !insider => find_subscription(pool, user_id, artist_id).await?,
            _ => None,
        };
        Ok(Self {
            insider,
            subscription,
            now: Utc::now(),
        })
    }

    fn grants(&self, gate: Gate<'_>) -> bool {
        self.insider || can_access(gate, self.subscription.as_ref(), self.now)
    }
}

/// A minimum tier must be one of the artist's active tiers.
async fn check_minimum_tier(pool: &SqlitePool, artist_id: &str, tier_id: Option<&str>) -> Result<()> {
    let Some(tier_id) = tier_id else {
        return Ok(());
    };
    let tier = fetch_tier(pool, tier_id).await.map_err(|_| AppError::Validation {
        message: "Minimum tier does not exist".to_string(),
        fields: vec!["minimum_tier_id".to_string()],
    })?;
    if tier.artist_id != artist_id || tier.status != TierStatus::Active {
        return Err(AppError::Validation {
            message: "Minimum tier must be an active tier of this artist".to_string(),
            fields: vec!["minimum_tier_id".to_string()],
        });
    }
    Ok(())
}

async fn fetch_content(pool: &SqlitePool, id: &str) -> Result<ExclusiveContent> {
    sqlx::query_as::<_, ExclusiveContent>("SELECT * FROM exclusive_content WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Content"))
}

pub async fn create_content(
    ctx: AuthContext,
    req: web::Json<CreateExclusiveContent>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let artist = fetch_artist(pool, &req.artist_id).await?;
    require_artist_member(pool, &ctx, &artist.id).await?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::missing_fields(vec!["title".to_string()]));
    }
    check_minimum_tier(pool, &artist.id, req.minimum_tier_id.as_deref()).await?;

    let content_id = new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO exclusive_content (id, artist_id, title, description, content_type,
            content_url, is_public, minimum_tier_id, release_date, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&content_id)
    .bind(&artist.id)
    .bind(title)
    .bind(&req.description)
    .bind(req.content_type)
    .bind(&req.content_url)
    .bind(req.is_public)
    .bind(&req.minimum_tier_id)
    .bind(req.release_date)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(content_id = %content_id, artist_id = %artist.id, "Exclusive content created");
    let content = fetch_content(pool, &content_id).await?;
    Ok(HttpResponse::Created().json(content))
}

/// Every item an artist published, each marked locked or not for the caller.
pub async fn list_artist_content(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let artist = fetch_artist(pool, &path.into_inner()).await?;
    let viewer = Viewer::resolve(pool, &auth, &artist.id).await?;

    let items = sqlx::query_as::<_, ExclusiveContent>(
        "SELECT * FROM exclusive_content WHERE artist_id = ?
         ORDER BY COALESCE(release_date, created_at) DESC",
    )
    .bind(&artist.id)
    .fetch_all(pool)
    .await?;

    let items: Vec<_> = items
        .into_iter()
        .map(|item| {
            let granted = viewer.grants(Gate::new(item.is_public, item.minimum_tier_id.as_deref()));
            Gated::content(item, granted)
        })
        .collect();
    Ok(HttpResponse::Ok().json(items))
}

pub async fn get_content(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let content = fetch_content(pool, &path.into_inner()).await?;
    let viewer = Viewer::resolve(pool, &auth, &content.artist_id).await?;

    if !viewer.grants(Gate::new(content.is_public, content.minimum_tier_id.as_deref())) {
        return Err(AppError::Forbidden(
            "A qualifying subscription is required for this content".to_string(),
        ));
    }
    Ok(HttpResponse::Ok().json(Gated::content(content, true)))
}

pub async fn update_content(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateExclusiveContent>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let pool = &state.db_pool;
    let mut content = fetch_content(pool, &path.into_inner()).await?;
    require_artist_member(pool, &ctx, &content.artist_id).await?;
    let req = req.into_inner();

    if let Some(title) = req.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".to_string()));
        }
        content.title = title.to_string();
    }
    if let Some(description) = req.description {
        content.description = Some(description);
    }
    if let Some(content_type) = req.content_type {
        content.content_type = content_type;
    }
    if let Some(url) = req.content_url {
        content.content_url = Some(url);
    }
    if let Some(is_public) = req.is_public {
        content.is_public = is_public;
    }
    if let Some(tier_id) = req.minimum_tier_id {
        check_minimum_tier(pool, &content.artist_id, tier_id.as_deref()).await?;
        content.minimum_tier_id = tier_id;
    }
    if let Some(date) = req.release_date {
        content.release_date = date;
    }

    sqlx::query(
        "UPDATE exclusive_content SET title = ?, description = ?, content_type = ?,
            content_url = ?, is_public = ?, minimum_tier_id = ?, release_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&content.title)
    .bind(&content.description)
    .bind(content.content_type)
    .bind(&content.content_url)
    .bind(content.is_public)
    .bind(&content.minimum_tier_id)
    .bind(content.release_date)
    .bind(Utc::now())
    .bind(&content.id)
    .execute(pool)
    .await?;

    let content = fetch_content(pool, &content.id).await?;
    Ok(HttpResponse::Ok().json(content))
}

pub async fn delete_content(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let content = fetch_content(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &content.artist_id).await?;

    sqlx::query("DELETE FROM exclusive_content WHERE id = ?")
        .bind(&content.id)
        .execute(&state.db_pool)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Content deleted")))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    #[serde(default)]
    pub include_past: bool,
}

async fn fetch_event(pool: &SqlitePool, artist_id: &str, event_id: &str) -> Result<ArtistEvent> {
    sqlx::query_as::<_, ArtistEvent>("SELECT * FROM artist_events WHERE id = ? AND artist_id = ?")
        .bind(event_id)
        .bind(artist_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Event"))
}

/// Upcoming events in date order; `?include_past=true` lists past ones too.
pub async fn list_events(
    path: web::Path<String>,
    query: web::Query<EventListQuery>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let artist = fetch_artist(pool, &path.into_inner()).await?;
    let viewer = Viewer::resolve(pool, &auth, &artist.id).await?;

    let events = sqlx::query_as::<_, ArtistEvent>(
        "SELECT * FROM artist_events WHERE artist_id = ? AND (? OR event_date >= ?)
         ORDER BY event_date ASC",
    )
    .bind(&artist.id)
    .bind(query.include_past)
    .bind(viewer.now)
    .fetch_all(pool)
    .await?;

    let events: Vec<_> = events
        .into_iter()
        .map(|event| {
            let granted = viewer.grants(Gate::new(event.is_public, event.minimum_tier_id.as_deref()));
            Gated::event(event, granted)
        })
        .collect();
    Ok(HttpResponse::Ok().json(events))
}

pub async fn get_event(
    path: web::Path<(String, String)>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (artist_id, event_id) = path.into_inner();
    let pool = &state.db_pool;
    let event = fetch_event(pool, &artist_id, &event_id).await?;
    let viewer = Viewer::resolve(pool, &auth, &event.artist_id).await?;

    if !viewer.grants(Gate::new(event.is_public, event.minimum_tier_id.as_deref())) {
        return Err(AppError::Forbidden(
            "A qualifying subscription is required for this event".to_string(),
        ));
    }
    Ok(HttpResponse::Ok().json(Gated::event(event, true)))
}

pub async fn create_event(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<CreateEvent>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let artist = fetch_artist(pool, &path.into_inner()).await?;
    require_artist_member(pool, &ctx, &artist.id).await?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::missing_fields(vec!["title".to_string()]));
    }
    check_minimum_tier(pool, &artist.id, req.minimum_tier_id.as_deref()).await?;

    let event_id = new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO artist_events (id, artist_id, title, description, venue, location,
            event_date, ticket_url, is_public, minimum_tier_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event_id)
    .bind(&artist.id)
    .bind(title)
    .bind(&req.description)
    .bind(&req.venue)
    .bind(&req.location)
    .bind(req.event_date)
    .bind(&req.ticket_url)
    .bind(req.is_public)
    .bind(&req.minimum_tier_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let event = fetch_event(pool, &artist.id, &event_id).await?;
    Ok(HttpResponse::Created().json(event))
}

pub async fn update_event(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    req: web::Json<UpdateEvent>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let (artist_id, event_id) = path.into_inner();
    let pool = &state.db_pool;
    require_artist_member(pool, &ctx, &artist_id).await?;
    let mut event = fetch_event(pool, &artist_id, &event_id).await?;
    let req = req.into_inner();

    if let Some(title) = req.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(AppError::BadRequest("Title cannot be empty".to_string()));
        }
        event.title = title.to_string();
    }
    if let Some(v) = req.description {
        event.description = Some(v);
    }
    if let Some(v) = req.venue {
        event.venue = Some(v);
    }
    if let Some(v) = req.location {
        event.location = Some(v);
    }
    if let Some(v) = req.event_date {
        event.event_date = v;
    }
    if let Some(v) = req.ticket_url {
        event.ticket_url = Some(v);
    }
    if let Some(v) = req.is_public {
        event.is_public = v;
    }
    if let Some(tier_id) = req.minimum_tier_id {
        check_minimum_tier(pool, &artist_id, tier_id.as_deref()).await?;
        event.minimum_tier_id = tier_id;
    }

    sqlx::query(
        "UPDATE artist_events SET title = ?, description = ?, venue = ?, location = ?,
            event_date = ?, ticket_url = ?, is_public = ?, minimum_tier_id = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.venue)
    .bind(&event.location)
    .bind(event.event_date)
    .bind(&event.ticket_url)
    .bind(event.is_public)
    .bind(&event.minimum_tier_id)
    .bind(Utc::now())
    .bind(&event.id)
    .execute(pool)
    .await?;

    let event = fetch_event(pool, &artist_id, &event.id).await?;
    Ok(HttpResponse::Ok().json(event))
}

pub async fn delete_event(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (artist_id, event_id) = path.into_inner();
    require_artist_member(&state.db_pool, &ctx, &artist_id).await?;
    let event = fetch_event(&state.db_pool, &artist_id, &event_id).await?;

    sqlx::query("DELETE FROM artist_events WHERE id = ?")
        .bind(&event.id)
        .execute(&state.db_pool)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Event deleted")))
}
