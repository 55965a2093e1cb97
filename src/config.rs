use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::enrichment::{ArtistEnricher, LastFmEnricher, NoopEnricher};
use crate::error::{AppError, Result};

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub upload_dir: PathBuf,
    pub distributor_api_key: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub enrichment_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Internal("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(AppError::Internal("JWT_SECRET must not be empty".to_string()));
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:music.db".to_string()),
            jwt_secret,
            token_ttl_hours: parse_var("TOKEN_TTL_HOURS", 24 * 7)?,
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./uploads")),
            distributor_api_key: env::var("DISTRIBUTOR_API_KEY").ok().filter(|k| !k.is_empty()),
            lastfm_api_key: env::var("LASTFM_API_KEY").ok().filter(|k| !k.is_empty()),
            enrichment_timeout: Duration::from_secs(parse_var("ENRICHMENT_TIMEOUT_SECS", 5)?),
        })
    }

    /// Settings for tests and local tooling. Uses the cheapest bcrypt cost.
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-key".to_string(),
            token_ttl_hours: 1,
            bcrypt_cost: 4,
            upload_dir,
            distributor_api_key: Some("test-distributor-key".to_string()),
            lastfm_api_key: None,
            enrichment_timeout: Duration::from_secs(1),
        }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.upload_dir.join("audio")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.upload_dir.join("images")
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub enricher: Arc<dyn ArtistEnricher>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        let enricher: Arc<dyn ArtistEnricher> = match &config.lastfm_api_key {
            Some(key) => match LastFmEnricher::new(key.clone(), config.enrichment_timeout) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!("Artist enrichment disabled: {}", e);
                    Arc::new(NoopEnricher)
                }
            },
            None => Arc::new(NoopEnricher),
        };

        Self {
            db_pool,
            config,
            enricher,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ArtistEnricher>) -> Self {
        self.enricher = enricher;
        self
    }
}

pub async fn create_pool(database_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // An in-memory database lives only as long as its single connection.
    if database_url.contains(":memory:") {
        return SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await;
    }

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub async fn init_db(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT,
            display_name TEXT,
            bio TEXT,
            avatar_url TEXT,
            is_admin BOOLEAN NOT NULL DEFAULT 0,
            is_artist BOOLEAN NOT NULL DEFAULT 0,
            is_distributor BOOLEAN NOT NULL DEFAULT 0,
            follower_count INTEGER NOT NULL DEFAULT 0,
            following_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        ); CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            bio TEXT,
            genres TEXT NOT NULL DEFAULT '[]',
            social_links TEXT NOT NULL DEFAULT '{}',
            image_url TEXT,
            accepts_subscriptions BOOLEAN NOT NULL DEFAULT 0,
            follower_count INTEGER NOT NULL DEFAULT 0,
            subscriber_count INTEGER NOT NULL DEFAULT 0,
            total_plays INTEGER NOT NULL DEFAULT 0,
            listener_count INTEGER NOT NULL DEFAULT 0,
            created_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        ); CREATE TABLE IF NOT EXISTS artist_members (
            artist_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            joined_at DATETIME NOT NULL,
            PRIMARY KEY (artist_id, user_id),
            FOREIGN KEY (artist_id) REFERENCES artists(id),
            FOREIGN KEY (user_id) REFERENCES users(id)
        ); CREATE TABLE IF NOT EXISTS artist_listeners (
            artist_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY (artist_id, user_id)
        ); CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            release_date DATE NOT NULL,
            cover_url TEXT,
            album_type TEXT NOT NULL,
            genre TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        ); CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            album_id TEXT,
            file_url TEXT NOT NULL,
            file_path TEXT NOT NULL,
            duration INTEGER NOT NULL DEFAULT 0,
            track_number INTEGER,
            genre TEXT NOT NULL,
            play_count INTEGER NOT NULL DEFAULT 0,
            is_exclusive BOOLEAN NOT NULL DEFAULT 0,
            distributor_name TEXT,
            uploaded_by TEXT,
            original_filename TEXT,
            mime_type TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            release_date DATE,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES artists(id),
            FOREIGN KEY (album_id) REFERENCES albums(id)
        ); CREATE TABLE IF NOT EXISTS playlist_folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            parent_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(id)
        ); CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            owner_id TEXT NOT NULL,
            is_public BOOLEAN NOT NULL DEFAULT 0,
            is_system BOOLEAN NOT NULL DEFAULT 0,
            folder_id TEXT,
            cover_url TEXT,
            follower_count INTEGER NOT NULL DEFAULT 0,
            track_count INTEGER NOT NULL DEFAULT 0,
            total_duration INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(id),
            FOREIGN KEY (folder_id) REFERENCES playlist_folders(id)
        ); CREATE TABLE IF NOT EXISTS playlist_tracks (
            playlist_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            added_at DATETIME NOT NULL,
            PRIMARY KEY (playlist_id, track_id),
            FOREIGN KEY (playlist_id) REFERENCES playlists(id),
            FOREIGN KEY (track_id) REFERENCES tracks(id)
        ); CREATE TABLE IF NOT EXISTS playlist_followers (
            playlist_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            followed_at DATETIME NOT NULL,
            PRIMARY KEY (playlist_id, user_id)
        ); CREATE TABLE IF NOT EXISTS user_follows (
            follower_id TEXT NOT NULL,
            followee_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            PRIMARY KEY (follower_id, followee_id)
        ); CREATE TABLE IF NOT EXISTS artist_follows (
            user_id TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            PRIMARY KEY (user_id, artist_id)
        ); CREATE TABLE IF NOT EXISTS subscription_tiers (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            price REAL NOT NULL,
            tier_order INTEGER NOT NULL,
            benefits TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        ); CREATE TABLE IF NOT EXISTS user_subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            tier_id TEXT NOT NULL,
            status TEXT NOT NULL,
            current_period_start DATETIME NOT NULL,
            current_period_end DATETIME NOT NULL,
            auto_renew BOOLEAN NOT NULL DEFAULT 1,
            canceled_at DATETIME,
            cancel_reason TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            UNIQUE (user_id, artist_id),
            FOREIGN KEY (tier_id) REFERENCES subscription_tiers(id)
        ); CREATE TABLE IF NOT EXISTS exclusive_content (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            content_type TEXT NOT NULL,
            content_url TEXT,
            is_public BOOLEAN NOT NULL DEFAULT 0,
            minimum_tier_id TEXT,
            release_date DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        ); CREATE TABLE IF NOT EXISTS artist_events (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            venue TEXT,
            location TEXT,
            event_date DATETIME NOT NULL,
            ticket_url TEXT,
            is_public BOOLEAN NOT NULL DEFAULT 1,
            minimum_tier_id TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES artists(id)
        ); CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist_id);
        CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id);
        CREATE INDEX IF NOT EXISTS idx_albums_artist ON albums(artist_id);
        CREATE INDEX IF NOT EXISTS idx_playlists_owner ON playlists(owner_id);
        CREATE INDEX IF NOT EXISTS idx_folders_owner ON playlist_folders(owner_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}
