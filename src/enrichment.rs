//! Best-effort artist enrichment from an external metadata service.
//!
//! Lookups never fail the request that triggered them: they run in a spawned task with a
//! deadline, and anything short of a usable answer becomes `None`.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = "music-api/0.1.0";
const MAX_GENRES: usize = 5;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}")]
    Api(u16),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistInfo {
    pub bio: Option<String>,
    pub genres: Vec<String>,
}

impl ArtistInfo {
    pub fn is_empty(&self) -> bool {
        self.bio.is_none() && self.genres.is_empty()
    }
}

#[async_trait]
pub trait ArtistEnricher: Send + Sync {
    async fn lookup_artist(&self, name: &str) -> Option<ArtistInfo>;
}

/// Used when no lookup service is configured.
pub struct NoopEnricher;

#[async_trait]
impl ArtistEnricher for NoopEnricher {
    async fn lookup_artist(&self, _name: &str) -> Option<ArtistInfo> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct LastFmResponse {
    artist: Option<LastFmArtist>,
}

#[derive(Debug, Deserialize)]
struct LastFmArtist {
    bio: Option<LastFmBio>,
    tags: Option<LastFmTags>,
}

#[derive(Debug, Deserialize)]
struct LastFmBio {
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastFmTags {
    #[serde(default)]
    tag: Vec<LastFmTag>,
}

#[derive(Debug, Deserialize)]
struct LastFmTag {
    name: String,
}

pub struct LastFmEnricher {
    http_client: reqwest::Client,
    api_key: String,
}

impl LastFmEnricher {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
        })
    }

    async fn fetch(&self, name: &str) -> Result<ArtistInfo, EnrichmentError> {
        let response = self
            .http_client
            .get(LASTFM_BASE_URL)
            .query(&[
                ("method", "artist.getinfo"),
                ("artist", name),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Api(status.as_u16()));
        }

        let body: LastFmResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))?;

        Ok(parse_artist(body))
    }
}

fn parse_artist(body: LastFmResponse) -> ArtistInfo {
    let Some(artist) = body.artist else {
        return ArtistInfo::default();
    };

    let bio = artist
        .bio
        .and_then(|b| b.summary)
        .map(|s| strip_read_more(&s))
        .filter(|s| !s.is_empty());
    let genres = artist
        .tags
        .map(|t| t.tag.into_iter().map(|tag| tag.name).take(MAX_GENRES).collect())
        .unwrap_or_default();

    ArtistInfo { bio, genres }
}

/// Last.fm summaries end with an HTML "Read more" link.
fn strip_read_more(summary: &str) -> String {
    summary
        .split("<a href")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl ArtistEnricher for LastFmEnricher {
    async fn lookup_artist(&self, name: &str) -> Option<ArtistInfo> {
        match self.fetch(name).await {
            Ok(info) if !info.is_empty() => Some(info),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(artist = %name, "Artist lookup failed: {}", e);
                None
            }
        }
    }
}

/// Fills bio and genres where the stored artist has none. Returns whether anything changed.
pub async fn apply_artist_info(
    pool: &SqlitePool,
    artist_id: &str,
    info: &ArtistInfo,
) -> Result<bool, sqlx::Error> {
    let genres = (!info.genres.is_empty()).then(|| Json(info.genres.clone()));

    let result = sqlx::query(
        "UPDATE artists SET
            bio = CASE WHEN bio IS NULL OR bio = '' THEN COALESCE(?, bio) ELSE bio END,
            genres = CASE WHEN genres = '[]' THEN COALESCE(?, genres) ELSE genres END,
            updated_at = ?
         WHERE id = ? AND ((bio IS NULL OR bio = '') OR genres = '[]')",
    )
    .bind(info.bio.as_deref())
    .bind(genres)
    .bind(chrono::Utc::now())
    .bind(artist_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Looks the artist up in the background and stores what comes back.
pub fn spawn_enrichment(
    pool: SqlitePool,
    enricher: Arc<dyn ArtistEnricher>,
    artist_id: String,
    name: String,
    timeout: Duration,
) -> tokio::task::JoinHandle<Option<ArtistInfo>> {
    tokio::spawn(async move {
        let info = match tokio::time::timeout(timeout, enricher.lookup_artist(&name)).await {
            Ok(info) => info?,
            Err(_) => {
                tracing::debug!(artist = %name, "Artist lookup timed out");
                return None;
            }
        };

        match apply_artist_info(&pool, &artist_id, &info).await {
            Ok(true) => tracing::info!(artist_id = %artist_id, "Artist enriched from metadata lookup"),
            Ok(false) => {}
            Err(e) => tracing::warn!(artist_id = %artist_id, "Failed to store artist metadata: {}", e),
        }
        Some(info)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lastfm_artist() {
        let body: LastFmResponse = serde_json::from_str(
            r#"{"artist": {
                "name": "Björk",
                "bio": {"summary": "Icelandic singer. <a href=\"https://last.fm\">Read more</a>"},
                "tags": {"tag": [{"name": "electronic"}, {"name": "experimental"}]}
            }}"#,
        )
        .unwrap();
        let info = parse_artist(body);
        assert_eq!(info.bio.as_deref(), Some("Icelandic singer."));
        assert_eq!(info.genres, vec!["electronic", "experimental"]);
    }

    #[test]
    fn error_body_yields_empty_info() {
        let body: LastFmResponse =
            serde_json::from_str(r#"{"error": 6, "message": "not found"}"#).unwrap();
        assert!(parse_artist(body).is_empty());
    }

    #[tokio::test]
    async fn noop_enricher_finds_nothing() {
        assert_eq!(NoopEnricher.lookup_artist("anyone").await, None);
    }
}
