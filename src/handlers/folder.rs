use actix_web::{web, HttpResponse};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::auth::AuthContext;
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::folder_tree::{FolderArena, ParentCheck};
use crate::models::{
    CreateFolderRequest, DeleteFolderQuery, FolderDetail, MessageResponse, Playlist,
    PlaylistFolder, UpdateFolder,
};
use crate::store::{fetch_owned_folder, fetch_owned_playlist, fetch_playlist, new_id};

async fn owner_arena(pool: &SqlitePool, user_id: &str) -> Result<FolderArena> {
    let folders = sqlx::query_as::<_, PlaylistFolder>(
        "SELECT * FROM playlist_folders WHERE owner_id = ?",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(FolderArena::new(folders))
}

fn parent_error(check: ParentCheck) -> Result<()> {
    match check {
        ParentCheck::Ok => Ok(()),
        ParentCheck::Cycle => Err(AppError::BadRequest(
            "A folder cannot be moved into itself or one of its subfolders".to_string(),
        )),
        ParentCheck::CorruptChain => Err(AppError::BadRequest(
            "Parent folder hierarchy is corrupt".to_string(),
        )),
        ParentCheck::UnknownParent => Err(AppError::not_found("Parent folder")),
    }
}

/// The caller's folders as a tree, with the ids of the playlists filed in each.
pub async fn list_folders(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    let arena = owner_arena(&state.db_pool, &ctx.user_id).await?;
    let playlists = sqlx::query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE owner_id = ? ORDER BY is_system DESC, name ASC",
    )
    .bind(&ctx.user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(arena.build_tree(&playlists)))
}

pub async fn create_folder(
    ctx: AuthContext,
    req: web::Json<CreateFolderRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::missing_fields(vec!["name".to_string()]));
    }
    if let Some(parent_id) = req.parent_id.as_deref() {
        fetch_owned_folder(&state.db_pool, parent_id, &ctx.user_id)
            .await
            .map_err(|_| AppError::not_found("Parent folder"))?;
    }

    let folder_id = new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO playlist_folders (id, name, owner_id, parent_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&folder_id)
    .bind(name)
    .bind(&ctx.user_id)
    .bind(&req.parent_id)
    .bind(now)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    let folder = fetch_owned_folder(&state.db_pool, &folder_id, &ctx.user_id).await?;
    Ok(HttpResponse::Created().json(folder))
}

pub async fn get_folder(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let folder = fetch_owned_folder(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;

    let playlists = sqlx::query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE folder_id = ? ORDER BY name ASC",
    )
    .bind(&folder.id)
    .fetch_all(&state.db_pool)
    .await?;
    let subfolders = sqlx::query_as::<_, PlaylistFolder>(
        "SELECT * FROM playlist_folders WHERE parent_id = ? ORDER BY name ASC",
    )
    .bind(&folder.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(FolderDetail {
        folder,
        playlists,
        subfolders,
    }))
}

pub async fn update_folder(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<UpdateFolder>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut folder = fetch_owned_folder(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;
    let req = req.into_inner();
    if req.name.is_none() && req.parent_id.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::BadRequest("Folder name cannot be empty".to_string()));
        }
        folder.name = name.to_string();
    }
    if let Some(parent_id) = req.parent_id {
        let arena = owner_arena(&state.db_pool, &ctx.user_id).await?;
        parent_error(arena.check_parent(&folder.id, parent_id.as_deref()))?;
        folder.parent_id = parent_id;
    }

    sqlx::query("UPDATE playlist_folders SET name = ?, parent_id = ?, updated_at = ? WHERE id = ?")
        .bind(&folder.name)
        .bind(&folder.parent_id)
        .bind(Utc::now())
        .bind(&folder.id)
        .execute(&state.db_pool)
        .await?;

    let folder = fetch_owned_folder(&state.db_pool, &folder.id, &ctx.user_id).await?;
    Ok(HttpResponse::Ok().json(folder))
}

/// Deletes a folder. Its playlists and subfolders move up to its parent, or to the root
/// with `?orphan=true`.
pub async fn delete_folder(
    ctx: AuthContext,
    path: web::Path<String>,
    query: web::Query<DeleteFolderQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let folder = fetch_owned_folder(&state.db_pool, &path.into_inner(), &ctx.user_id).await?;
    let destination = if query.orphan {
        None
    } else {
        folder.parent_id.clone()
    };
    let now = Utc::now();

    sqlx::query("UPDATE playlists SET folder_id = ?, updated_at = ? WHERE folder_id = ?")
        .bind(&destination)
        .bind(now)
        .bind(&folder.id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("UPDATE playlist_folders SET parent_id = ?, updated_at = ? WHERE parent_id = ?")
        .bind(&destination)
        .bind(now)
        .bind(&folder.id)
        .execute(&state.db_pool)
        .await?;
    sqlx::query("DELETE FROM playlist_folders WHERE id = ?")
        .bind(&folder.id)
        .execute(&state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse::new("Folder deleted")))
}

pub async fn add_playlist_to_folder(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (folder_id, playlist_id) = path.into_inner();
    let folder = fetch_owned_folder(&state.db_pool, &folder_id, &ctx.user_id).await?;
    let playlist = fetch_owned_playlist(&state.db_pool, &playlist_id, &ctx.user_id).await?;

    sqlx::query("UPDATE playlists SET folder_id = ?, updated_at = ? WHERE id = ?")
        .bind(&folder.id)
        .bind(Utc::now())
        .bind(&playlist.id)
        .execute(&state.db_pool)
        .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist.id).await?;
    Ok(HttpResponse::Ok().json(playlist))
}

pub async fn remove_playlist_from_folder(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (folder_id, playlist_id) = path.into_inner();
    let folder = fetch_owned_folder(&state.db_pool, &folder_id, &ctx.user_id).await?;
    let playlist = fetch_owned_playlist(&state.db_pool, &playlist_id, &ctx.user_id).await?;
    if playlist.folder_id.as_deref() != Some(folder.id.as_str()) {
        return Err(AppError::not_found("Playlist in folder"));
    }

    sqlx::query("UPDATE playlists SET folder_id = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&playlist.id)
        .execute(&state.db_pool)
        .await?;

    let playlist = fetch_playlist(&state.db_pool, &playlist.id).await?;
    Ok(HttpResponse::Ok().json(playlist))
}
