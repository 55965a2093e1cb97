use actix_web::{web, HttpResponse};

use crate::auth::OptionalAuth;
use crate::config::AppState;
use crate::error::Result;
use crate::models::{Playlist, PublicProfile};
use crate::store::fetch_user;

pub async fn get_user(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user = fetch_user(&state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PublicProfile::from(user)))
}

/// Public playlists of a user; the owner also sees private ones.
pub async fn get_user_playlists(
    path: web::Path<String>,
    auth: OptionalAuth,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let user = fetch_user(&state.db_pool, &path.into_inner()).await?;
    let is_owner = auth.user_id() == Some(user.id.as_str());

    let playlists = sqlx::query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE owner_id = ? AND (is_public = 1 OR ?)
         ORDER BY is_system DESC, created_at DESC",
    )
    .bind(&user.id)
    .bind(is_owner)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(playlists))
}
