pub mod admin;
pub mod album;
pub mod artist;
pub mod auth;
pub mod distributor;
pub mod exclusive;
pub mod folder;
pub mod follow;
pub mod playlist;
pub mod search;
pub mod subscription;
pub mod track;
pub mod user;

use actix_files::Files;
use actix_web::web::{self, ServiceConfig};

use crate::config::AppState;
use crate::error::AppError;

/// Registers state, extractor error handlers, every API route and the upload file server.
pub fn app_config(state: web::Data<AppState>) -> impl Fn(&mut ServiceConfig) + Clone {
    move |cfg: &mut ServiceConfig| {
        let upload_dir = state.config.upload_dir.clone();
        cfg.app_data(state.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(format!("Invalid JSON body: {}", err)).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(format!("Invalid query string: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(format!("Invalid path: {}", err)).into()
            }))
            .configure(api_routes)
            .service(Files::new("/uploads", upload_dir));
    }
}

pub fn api_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/me", web::get().to(auth::me))
            .route("/me", web::put().to(auth::update_profile))
            .route("/password", web::put().to(auth::change_password)),
    )
    .service(
        web::scope("/api/users")
            .route("/{id}", web::get().to(user::get_user))
            .route("/{id}/playlists", web::get().to(user::get_user_playlists))
            .route("/{id}/followers", web::get().to(follow::get_followers)),
    )
    .service(
        web::scope("/api/artists")
            .route("", web::get().to(artist::list_artists))
            .route("", web::post().to(artist::create_artist))
            .route("/{id}", web::get().to(artist::get_artist))
            .route("/{id}", web::put().to(artist::update_artist))
            .route("/{id}", web::delete().to(artist::delete_artist))
            .route("/{id}/members", web::post().to(artist::add_artist_member))
            .route("/{id}/members/{user_id}", web::delete().to(artist::remove_artist_member))
            .route("/{id}/albums", web::get().to(artist::get_artist_albums))
            .route("/{id}/tracks", web::get().to(artist::get_artist_tracks))
            .route("/{id}/image", web::post().to(artist::upload_artist_image))
            .route("/{id}/tiers", web::get().to(subscription::list_tiers))
            .route("/{id}/tiers", web::post().to(subscription::create_tier))
            .route("/{id}/tiers/{tier_id}", web::put().to(subscription::update_tier))
            .route("/{id}/tiers/{tier_id}", web::delete().to(subscription::delete_tier))
            .route("/{id}/subscribers", web::get().to(subscription::artist_subscribers))
            .route("/{id}/exclusive-content", web::get().to(exclusive::list_artist_content))
            .route("/{id}/events", web::get().to(exclusive::list_events))
            .route("/{id}/events", web::post().to(exclusive::create_event))
            .route("/{id}/events/{event_id}", web::get().to(exclusive::get_event))
            .route("/{id}/events/{event_id}", web::put().to(exclusive::update_event))
            .route("/{id}/events/{event_id}", web::delete().to(exclusive::delete_event)),
    )
    .service(
        web::scope("/api/albums")
            .route("", web::get().to(album::list_albums))
            .route("", web::post().to(album::create_album))
            .route("/{id}", web::get().to(album::get_album))
            .route("/{id}", web::put().to(album::update_album))
            .route("/{id}", web::delete().to(album::delete_album))
            .route("/{id}/cover", web::post().to(album::upload_album_cover)),
    )
    .service(
        web::scope("/api/tracks")
            .route("", web::get().to(track::list_tracks))
            .route("", web::post().to(track::upload_track))
            .route("/{id}", web::get().to(track::get_track))
            .route("/{id}", web::put().to(track::update_track))
            .route("/{id}", web::delete().to(track::delete_track))
            .route("/{id}/play", web::post().to(track::play_track))
            .route("/{id}/stream", web::get().to(track::stream_track)),
    )
    .service(
        web::scope("/api/playlists")
            .route("", web::get().to(playlist::get_playlists))
            .route("", web::post().to(playlist::create_playlist))
            .route("/batch", web::put().to(playlist::batch_update_playlists))
            .route("/{id}", web::get().to(playlist::get_playlist))
            .route("/{id}", web::put().to(playlist::update_playlist))
            .route("/{id}", web::delete().to(playlist::delete_playlist))
            .route("/{id}/tracks", web::post().to(playlist::add_to_playlist))
            .route("/{id}/tracks/{track_id}", web::delete().to(playlist::remove_from_playlist))
            .route("/{id}/follow", web::post().to(playlist::toggle_follow_playlist))
            .route("/{id}/duplicate", web::post().to(playlist::duplicate_playlist)),
    )
    .service(
        web::scope("/api/folders")
            .route("", web::get().to(folder::list_folders))
            .route("", web::post().to(folder::create_folder))
            .route("/{id}", web::get().to(folder::get_folder))
            .route("/{id}", web::put().to(folder::update_folder))
            .route("/{id}", web::delete().to(folder::delete_folder))
            .route("/{id}/playlists/{playlist_id}", web::post().to(folder::add_playlist_to_folder))
            .route(
                "/{id}/playlists/{playlist_id}",
                web::delete().to(folder::remove_playlist_from_folder),
            ),
    )
    .service(
        web::scope("/api/follows")
            .route("/following", web::get().to(follow::get_following))
            .route("/users/{id}", web::post().to(follow::follow_user))
            .route("/users/{id}", web::delete().to(follow::unfollow_user))
            .route("/artists/{id}", web::post().to(follow::follow_artist))
            .route("/artists/{id}", web::delete().to(follow::unfollow_artist)),
    )
    .service(
        web::scope("/api/subscriptions")
            .route("", web::get().to(subscription::list_my_subscriptions))
            .route("", web::post().to(subscription::subscribe))
            .route("/{id}", web::get().to(subscription::get_subscription))
            .route("/{id}/cancel", web::post().to(subscription::cancel_subscription))
            .route("/{id}/tier", web::put().to(subscription::change_tier))
            .route("/{id}/pause", web::post().to(subscription::pause_subscription))
            .route("/{id}/resume", web::post().to(subscription::resume_subscription)),
    )
    .service(
        web::scope("/api/exclusive-content")
            .route("", web::post().to(exclusive::create_content))
            .route("/{id}", web::get().to(exclusive::get_content))
            .route("/{id}", web::put().to(exclusive::update_content))
            .route("/{id}", web::delete().to(exclusive::delete_content)),
    )
    .service(
        web::scope("/api/search")
            .route("", web::get().to(search::global_search))
            .route("/tracks", web::get().to(search::search_tracks))
            .route("/artists", web::get().to(search::search_artists))
            .route("/albums", web::get().to(search::search_albums))
            .route("/playlists", web::get().to(search::search_playlists))
            .route("/users", web::get().to(search::search_users)),
    )
    .service(
        web::scope("/api/distributor")
            .route("/upload", web::post().to(distributor::distributor_upload))
            .route("/tracks", web::get().to(distributor::distributor_tracks)),
    )
    .service(
        web::scope("/api/admin")
            .route("/users", web::get().to(admin::list_users))
            .route("/users/{id}/roles", web::put().to(admin::update_roles))
            .route("/users/{id}", web::delete().to(admin::delete_user))
            .route("/stats", web::get().to(admin::stats)),
    );
}
