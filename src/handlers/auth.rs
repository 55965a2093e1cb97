use actix_web::{web, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::{hash_password, issue_token, verify_password, AuthContext};
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    non_blank, AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse,
    RegisterRequest, UpdateProfile, User, MIN_PASSWORD_LENGTH,
};
use crate::store::{create_liked_songs, fetch_user, new_id};

fn check_password_length(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation {
            message: format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
            fields: vec!["password".to_string()],
        });
    }
    Ok(())
}

async fn ensure_unique(
    pool: &SqlitePool,
    username: Option<&str>,
    email: Option<&str>,
    except_id: Option<&str>,
) -> Result<()> {
    if let Some(username) = username {
        let taken = sqlx::query_scalar::<_, String>(
            "SELECT id FROM users WHERE username = ? COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;
        if matches!(taken, Some(id) if Some(id.as_str()) != except_id) {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
    }

    if let Some(email) = email {
        let taken = sqlx::query_scalar::<_, String>(
            "SELECT id FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;
        if matches!(taken, Some(id) if Some(id.as_str()) != except_id) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
    }

    Ok(())
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let missing = req.missing_fields();
    if !missing.is_empty() {
        return Err(AppError::missing_fields(missing));
    }

    let username = non_blank(&req.username).unwrap_or_default().to_string();
    let email = non_blank(&req.email).unwrap_or_default().to_lowercase();
    let password = req.password.clone().unwrap_or_default();

    if !email.contains('@') {
        return Err(AppError::Validation {
            message: "Email address is not valid".to_string(),
            fields: vec!["email".to_string()],
        });
    }
    check_password_length(&password)?;
    ensure_unique(&state.db_pool, Some(&username), Some(&email), None).await?;

    let password_hash = hash_password(&password, state.config.bcrypt_cost)?;
    let user_id = new_id();
    let now = Utc::now();

    let mut tx = state.db_pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, first_name, last_name, display_name,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(non_blank(&req.first_name))
    .bind(non_blank(&req.last_name))
    .bind(non_blank(&req.display_name).unwrap_or(&username))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    create_liked_songs(&mut *tx, &user_id).await?;
    tx.commit().await?;

    let user = fetch_user(&state.db_pool, &user_id).await?;
    let token = issue_token(&user, &state.config.jwt_secret, state.config.token_ttl_hours)?;
    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok(HttpResponse::Created().json(AuthResponse { token, user }))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (Some(identifier), Some(password)) = (non_blank(&req.identifier), req.password.as_deref())
    else {
        let mut missing = Vec::new();
        if non_blank(&req.identifier).is_none() {
            missing.push("identifier".to_string());
        }
        if req.password.is_none() {
            missing.push("password".to_string());
        }
        return Err(AppError::missing_fields(missing));
    };

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = ?1 COLLATE NOCASE OR email = ?1 COLLATE NOCASE",
    )
    .bind(identifier)
    .fetch_optional(&state.db_pool)
    .await?;

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
    let user = user.ok_or_else(invalid)?;
    if !verify_password(password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = issue_token(&user, &state.config.jwt_secret, state.config.token_ttl_hours)?;
    Ok(HttpResponse::Ok().json(AuthResponse { token, user }))
}

pub async fn me(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user = fetch_user(&state.db_pool, &ctx.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn update_profile(
    ctx: AuthContext,
    req: web::Json<UpdateProfile>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let mut user = fetch_user(&state.db_pool, &ctx.user_id).await?;
    let req = req.into_inner();

    let username = match req.username.as_deref().map(str::trim) {
        Some("") => return Err(AppError::BadRequest("Username cannot be empty".to_string())),
        Some(name) if name != user.username => Some(name.to_string()),
        _ => None,
    };
    let email = match req.email.as_deref().map(|e| e.trim().to_lowercase()) {
        Some(e) if !e.contains('@') => {
            return Err(AppError::BadRequest("Email address is not valid".to_string()))
        }
        Some(e) if e != user.email => Some(e),
        _ => None,
    };
    ensure_unique(
        &state.db_pool,
        username.as_deref(),
        email.as_deref(),
        Some(&user.id),
    )
    .await?;

    if let Some(username) = username {
        user.username = username;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(v) = req.first_name {
        user.first_name = Some(v);
    }
    if let Some(v) = req.last_name {
        user.last_name = Some(v);
    }
    if let Some(v) = req.display_name {
        user.display_name = Some(v);
    }
    if let Some(v) = req.bio {
        user.bio = Some(v);
    }
    if let Some(v) = req.avatar_url {
        user.avatar_url = Some(v);
    }

    sqlx::query(
        "UPDATE users SET username = ?, email = ?, first_name = ?, last_name = ?, display_name = ?,
            bio = ?, avatar_url = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.display_name)
    .bind(&user.bio)
    .bind(&user.avatar_url)
    .bind(Utc::now())
    .bind(&user.id)
    .execute(&state.db_pool)
    .await?;

    let user = fetch_user(&state.db_pool, &ctx.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn change_password(
    ctx: AuthContext,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user = fetch_user(&state.db_pool, &ctx.user_id).await?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }
    check_password_length(&req.new_password)?;

    let password_hash = hash_password(&req.new_password, state.config.bcrypt_cost)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(&user.id)
        .execute(&state.db_pool)
        .await?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password updated")))
}
