use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;

use crate::auth::AuthContext;
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{MessageResponse, Page, Pagination, UpdateRoles, User};
use crate::store::{count, fetch_user};

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub users: i64,
    pub artists: i64,
    pub albums: i64,
    pub tracks: i64,
    pub playlists: i64,
    pub active_subscriptions: i64,
    pub total_plays: i64,
}

pub async fn list_users(
    ctx: AuthContext,
    query: web::Query<Pagination>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.require_admin()?;

    let total = count(&state.db_pool, "SELECT COUNT(*) FROM users").await?;
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(query.limit())
    .bind(query.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(Page::new(users, total, &query)))
}

/// Role changes show up in the user's token on their next login.
pub async fn update_roles(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateRoles>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.require_admin()?;
    let mut user = fetch_user(&state.db_pool, &path.into_inner()).await?;

    if req.is_admin == Some(false) && ctx.is(&user.id) {
        return Err(AppError::BadRequest(
            "You cannot remove your own admin role".to_string(),
        ));
    }
    if let Some(v) = req.is_admin {
        user.is_admin = v;
    }
    if let Some(v) = req.is_artist {
        user.is_artist = v;
    }
    if let Some(v) = req.is_distributor {
        user.is_distributor = v;
    }

    sqlx::query(
        "UPDATE users SET is_admin = ?, is_artist = ?, is_distributor = ?, updated_at = ? WHERE id = ?",
    )
    .bind(user.is_admin)
    .bind(user.is_artist)
    .bind(user.is_distributor)
    .bind(Utc::now())
    .bind(&user.id)
    .execute(&state.db_pool)
    .await?;

    tracing::info!(
        user_id = %user.id,
        is_admin = user.is_admin,
        is_artist = user.is_artist,
        is_distributor = user.is_distributor,
        "Roles updated"
    );
    let user = fetch_user(&state.db_pool, &user.id).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete_user(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    ctx.require_admin()?;
    let user = fetch_user(&state.db_pool, &path.into_inner()).await?;
    if ctx.is(&user.id) {
        return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
    }

    let mut tx = state.db_pool.begin().await?;

    // Counters on the other side of every relationship go down first.
    for sql in [
        "UPDATE users SET follower_count = MAX(follower_count - 1, 0)
         WHERE id IN (SELECT followee_id FROM user_follows WHERE follower_id = ?1)",
        "UPDATE users SET following_count = MAX(following_count - 1, 0)
         WHERE id IN (SELECT follower_id FROM user_follows WHERE followee_id = ?1)",
        "UPDATE artists SET follower_count = MAX(follower_count - 1, 0)
         WHERE id IN (SELECT artist_id FROM artist_follows WHERE user_id = ?1)",
        "UPDATE artists SET subscriber_count = MAX(subscriber_count - 1, 0)
         WHERE id IN (SELECT artist_id FROM user_subscriptions
                      WHERE user_id = ?1 AND status IN ('active', 'paused'))",
        "UPDATE playlists SET follower_count = MAX(follower_count - 1, 0)
         WHERE id IN (SELECT playlist_id FROM playlist_followers WHERE user_id = ?1)",
    ] {
        sqlx::query(sql).bind(&user.id).execute(&mut *tx).await?;
    }

    for sql in [
        "DELETE FROM playlist_tracks WHERE playlist_id IN (SELECT id FROM playlists WHERE owner_id = ?1)",
        "DELETE FROM playlist_followers WHERE playlist_id IN (SELECT id FROM playlists WHERE owner_id = ?1)",
        "DELETE FROM playlist_followers WHERE user_id = ?1",
        "DELETE FROM playlists WHERE owner_id = ?1",
        "DELETE FROM playlist_folders WHERE owner_id = ?1",
        "DELETE FROM user_follows WHERE follower_id = ?1 OR followee_id = ?1",
        "DELETE FROM artist_follows WHERE user_id = ?1",
        "DELETE FROM user_subscriptions WHERE user_id = ?1",
        "DELETE FROM artist_members WHERE user_id = ?1",
        "DELETE FROM artist_listeners WHERE user_id = ?1",
        "UPDATE tracks SET uploaded_by = NULL WHERE uploaded_by = ?1",
        "DELETE FROM users WHERE id = ?1",
    ] {
        sqlx::query(sql).bind(&user.id).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("User deleted")))
}

pub async fn stats(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    ctx.require_admin()?;
    let pool = &state.db_pool;

    Ok(HttpResponse::Ok().json(PlatformStats {
        users: count(pool, "SELECT COUNT(*) FROM users").await?,
        artists: count(pool, "SELECT COUNT(*) FROM artists").await?,
        albums: count(pool, "SELECT COUNT(*) FROM albums").await?,
        tracks: count(pool, "SELECT COUNT(*) FROM tracks").await?,
        playlists: count(pool, "SELECT COUNT(*) FROM playlists").await?,
        active_subscriptions: count(
            pool,
            "SELECT COUNT(*) FROM user_subscriptions WHERE status = 'active'",
        )
        .await?,
        total_plays: count(pool, "SELECT COALESCE(SUM(play_count), 0) FROM tracks").await?,
    }))
}
