use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::OptionalAuth;
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::handlers::artist::exclusive_unlocked;
use crate::models::{
    Album, Artist, Page, Pagination, Playlist, PublicProfile, Track, TrackView, User,
};
use crate::store::like_pattern;

const GLOBAL_DEFAULT_LIMIT: i64 = 5;
const GLOBAL_MAX_LIMIT: i64 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSort {
    #[default]
    Plays,
    ReleaseDate,
    Alphabetical,
}

impl TrackSort {
    fn order_by(self) -> &'static str {
        match self {
            TrackSort::Plays => "play_count DESC, title ASC",
            TrackSort::ReleaseDate => "release_date IS NULL, release_date DESC, title ASC",
            TrackSort::Alphabetical => "title COLLATE NOCASE ASC",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrackSearchQuery {
    pub q: Option<String>,
    pub genre: Option<String>,
    pub artist_id: Option<String>,
    #[serde(default)]
    pub sort: TrackSort,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub genre: Option<String>,
    pub artist_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GlobalSearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchTotals {
    pub tracks: i64,
    pub artists: i64,
    pub albums: i64,
    pub playlists: i64,
    pub users: i64,
}

#[derive(Debug, Serialize)]
pub struct GlobalSearchResults {
    pub tracks: Vec<TrackView>,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub playlists: Vec<Playlist>,
    pub users: Vec<PublicProfile>,
    pub totals: SearchTotals,
}

/// The `LIKE` pattern for a non-blank search term.
fn search_pattern(q: &Option<String>) -> Result<String> {
    match q.as_deref().map(str::trim) {
        Some(term) if !term.is_empty() => Ok(like_pattern(term)),
        _ => Err(AppError::Validation {
            message: "Search query is required".to_string(),
            fields: vec!["q".to_string()],
        }),
    }
}

const TRACK_FILTER: &str = "title LIKE ?1 ESCAPE '\\'
    AND (?2 IS NULL OR genre = ?2 COLLATE NOCASE)
    AND (?3 IS NULL OR artist_id = ?3)";
const ARTIST_FILTER: &str = "name LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR genres LIKE ?2 ESCAPE '\\')";
const ALBUM_FILTER: &str = "title LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR artist_id = ?2)";
const PLAYLIST_FILTER: &str = "is_public = 1 AND name LIKE ?1 ESCAPE '\\'";
const USER_FILTER: &str = "(username LIKE ?1 ESCAPE '\\' OR display_name LIKE ?1 ESCAPE '\\')";

async fn find_tracks(
    pool: &SqlitePool,
    pattern: &str,
    genre: Option<&str>,
    artist_id: Option<&str>,
    sort: TrackSort,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Track>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM tracks WHERE {}",
        TRACK_FILTER
    ))
    .bind(pattern)
    .bind(genre)
    .bind(artist_id)
    .fetch_one(pool)
    .await?;

    let tracks = sqlx::query_as::<_, Track>(&format!(
        "SELECT * FROM tracks WHERE {} ORDER BY {} LIMIT ?4 OFFSET ?5",
        TRACK_FILTER,
        sort.order_by()
    ))
    .bind(pattern)
    .bind(genre)
    .bind(artist_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((tracks, total))
}

async fn find_artists(
    pool: &SqlitePool,
    pattern: &str,
    genre: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Artist>, i64)> {
    let genre = genre.map(like_pattern);
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM artists WHERE {}",
        ARTIST_FILTER
    ))
    .bind(pattern)
    .bind(&genre)
    .fetch_one(pool)
    .await?;

    let artists = sqlx::query_as::<_, Artist>(&format!(
        "SELECT * FROM artists WHERE {} ORDER BY follower_count DESC, name ASC LIMIT ?3 OFFSET ?4",
        ARTIST_FILTER
    ))
    .bind(pattern)
    .bind(&genre)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((artists, total))
}

async fn find_albums(
    pool: &SqlitePool,
    pattern: &str,
    artist_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Album>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM albums WHERE {}",
        ALBUM_FILTER
    ))
    .bind(pattern)
    .bind(artist_id)
    .fetch_one(pool)
    .await?;

    let albums = sqlx::query_as::<_, Album>(&format!(
        "SELECT * FROM albums WHERE {} ORDER BY release_date DESC, title ASC LIMIT ?3 OFFSET ?4",
        ALBUM_FILTER
    ))
    .bind(pattern)
    .bind(artist_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((albums, total))
}

async fn find_playlists(pool: &SqlitePool, pattern: &str, limit: i64, offset: i64) -> Result<(Vec<Playlist>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM playlists WHERE {}",
        PLAYLIST_FILTER
    ))
    .bind(pattern)
    .fetch_one(pool)
    .await?;

    let playlists = sqlx::query_as::<_, Playlist>(&format!(
        "SELECT * FROM playlists WHERE {} ORDER BY follower_count DESC, name ASC LIMIT ?2 OFFSET ?3",
        PLAYLIST_FILTER
    ))
    .bind(pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((playlists, total))
}

async fn find_users(pool: &SqlitePool, pattern: &str, limit: i64, offset: i64) -> Result<(Vec<PublicProfile>, i64)> {
    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM users WHERE {}",
        USER_FILTER
    ))
    .bind(pattern)
    .fetch_one(pool)
    .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT * FROM users WHERE {} ORDER BY follower_count DESC, username ASC LIMIT ?2 OFFSET ?3",
        USER_FILTER
    ))
    .bind(pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((users.into_iter().map(PublicProfile::from).collect(), total))
}

async fn track_views(state: &AppState, auth: &OptionalAuth, tracks: Vec<Track>) -> Result<Vec<TrackView>> {
    let mut views = Vec::with_capacity(tracks.len());
    for track in tracks {
        let unlocked = !track.is_exclusive || exclusive_unlocked(state, auth, &track.artist_id).await?;
        views.push(TrackView::new(track, unlocked));
    }
    Ok(views)
}

pub async fn search_tracks(
    query: web::Query<TrackSearchQuery>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let p = &Pagination::new(query.page, query.limit);

    let (tracks, total) = find_tracks(
        &state.db_pool,
        &pattern,
        query.genre.as_deref(),
        query.artist_id.as_deref(),
        query.sort,
        p.limit(),
        p.offset(),
    )
    .await?;
    let tracks = track_views(&state, &auth, tracks).await?;

    Ok(HttpResponse::Ok().json(Page::new(tracks, total, p)))
}

pub async fn search_artists(
    query: web::Query<SearchQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let p = &Pagination::new(query.page, query.limit);
    let (artists, total) = find_artists(
        &state.db_pool,
        &pattern,
        query.genre.as_deref(),
        p.limit(),
        p.offset(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(Page::new(artists, total, p)))
}

pub async fn search_albums(
    query: web::Query<SearchQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let p = &Pagination::new(query.page, query.limit);
    let (albums, total) = find_albums(
        &state.db_pool,
        &pattern,
        query.artist_id.as_deref(),
        p.limit(),
        p.offset(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(Page::new(albums, total, p)))
}

pub async fn search_playlists(
    query: web::Query<SearchQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let p = &Pagination::new(query.page, query.limit);
    let (playlists, total) = find_playlists(&state.db_pool, &pattern, p.limit(), p.offset()).await?;
    Ok(HttpResponse::Ok().json(Page::new(playlists, total, p)))
}

pub async fn search_users(
    query: web::Query<SearchQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let p = &Pagination::new(query.page, query.limit);
    let (users, total) = find_users(&state.db_pool, &pattern, p.limit(), p.offset()).await?;
    Ok(HttpResponse::Ok().json(Page::new(users, total, p)))
}

/// Searches every entity at once, returning the top matches of each with their totals.
pub async fn global_search(
    query: web::Query<GlobalSearchQuery>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pattern = search_pattern(&query.q)?;
    let limit = query
        .limit
        .unwrap_or(GLOBAL_DEFAULT_LIMIT)
        .clamp(1, GLOBAL_MAX_LIMIT);
    let pool = &state.db_pool;

    let (tracks, track_total) =
        find_tracks(pool, &pattern, None, None, TrackSort::Plays, limit, 0).await?;
    let (artists, artist_total) = find_artists(pool, &pattern, None, limit, 0).await?;
    let (albums, album_total) = find_albums(pool, &pattern, None, limit, 0).await?;
    let (playlists, playlist_total) = find_playlists(pool, &pattern, limit, 0).await?;
    let (users, user_total) = find_users(pool, &pattern, limit, 0).await?;

    Ok(HttpResponse::Ok().json(GlobalSearchResults {
        tracks: track_views(&state, &auth, tracks).await?,
        artists,
        albums,
        playlists,
        users,
        totals: SearchTotals {
            tracks: track_total,
            artists: artist_total,
            albums: album_total,
            playlists: playlist_total,
            users: user_total,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_are_rejected() {
        assert!(search_pattern(&None).is_err());
        assert!(search_pattern(&Some("   ".to_string())).is_err());
        assert_eq!(search_pattern(&Some(" lo-fi ".to_string())).unwrap(), "%lo-fi%");
    }

    #[test]
    fn track_sort_parses_from_query_values() {
        let q = web::Query::<TrackSearchQuery>::from_query("q=night&sort=release_date").unwrap();
        assert_eq!(q.sort, TrackSort::ReleaseDate);
        let q = web::Query::<TrackSearchQuery>::from_query("q=night&limit=5").unwrap();
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.sort, TrackSort::Plays);
    }
}
