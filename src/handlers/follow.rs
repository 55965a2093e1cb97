use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;

use crate::auth::AuthContext;
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{Artist, MessageResponse, PublicProfile, User};
use crate::store::{fetch_artist, fetch_user};

#[derive(Debug, Serialize)]
pub struct Following {
    pub users: Vec<PublicProfile>,
    pub artists: Vec<Artist>,
}

pub async fn follow_user(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let target = fetch_user(&state.db_pool, &path.into_inner()).await?;
    if ctx.is(&target.id) {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO user_follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(&ctx.user_id)
    .bind(&target.id)
    .bind(Utc::now())
    .execute(&state.db_pool)
    .await?
    .rows_affected();
    if inserted == 0 {
        return Err(AppError::BadRequest(
            "You are already following this user".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
        .bind(&ctx.user_id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
        .bind(&target.id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("User followed")))
}

pub async fn unfollow_user(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let target = fetch_user(&state.db_pool, &path.into_inner()).await?;

    let removed = sqlx::query("DELETE FROM user_follows WHERE follower_id = ? AND followee_id = ?")
        .bind(&ctx.user_id)
        .bind(&target.id)
        .execute(&state.db_pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::BadRequest(
            "You are not following this user".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET following_count = MAX(following_count - 1, 0) WHERE id = ?")
        .bind(&ctx.user_id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("UPDATE users SET follower_count = MAX(follower_count - 1, 0) WHERE id = ?")
        .bind(&target.id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("User unfollowed")))
}

pub async fn follow_artist(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO artist_follows (user_id, artist_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(&ctx.user_id)
    .bind(&artist.id)
    .bind(Utc::now())
    .execute(&state.db_pool)
    .await?
    .rows_affected();
    if inserted == 0 {
        return Err(AppError::BadRequest(
            "You are already following this artist".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
        .bind(&ctx.user_id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("UPDATE artists SET follower_count = follower_count + 1 WHERE id = ?")
        .bind(&artist.id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Artist followed")))
}

pub async fn unfollow_artist(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;

    let removed = sqlx::query("DELETE FROM artist_follows WHERE user_id = ? AND artist_id = ?")
        .bind(&ctx.user_id)
        .bind(&artist.id)
        .execute(&state.db_pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::BadRequest(
            "You are not following this artist".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET following_count = MAX(following_count - 1, 0) WHERE id = ?")
        .bind(&ctx.user_id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("UPDATE artists SET follower_count = MAX(follower_count - 1, 0) WHERE id = ?")
        .bind(&artist.id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Artist unfollowed")))
}

pub async fn get_following(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    let users = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u JOIN user_follows f ON f.followee_id = u.id
         WHERE f.follower_id = ? ORDER BY f.created_at DESC",
    )
    .bind(&ctx.user_id)
    .fetch_all(&state.db_pool)
    .await?;

    let artists = sqlx::query_as::<_, Artist>(
        "SELECT a.* FROM artists a JOIN artist_follows f ON f.artist_id = a.id
         WHERE f.user_id = ? ORDER BY f.created_at DESC",
    )
    .bind(&ctx.user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(Following {
        users: users.into_iter().map(PublicProfile::from).collect(),
        artists,
    }))
}

pub async fn get_followers(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user = fetch_user(&state.db_pool, &path.into_inner()).await?;
    let followers = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u JOIN user_follows f ON f.follower_id = u.id
         WHERE f.followee_id = ? ORDER BY f.created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db_pool)
    .await?;

    let followers: Vec<PublicProfile> = followers.into_iter().map(PublicProfile::from).collect();
    Ok(HttpResponse::Ok().json(followers))
}
