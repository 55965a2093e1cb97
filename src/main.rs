use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use music_api::{app_config, create_pool, init_db, AppState, Config};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "music_api=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| io::Error::other(e.to_string()))?;

    tokio::fs::create_dir_all(config.audio_dir()).await?;
    tokio::fs::create_dir_all(config.image_dir()).await?;

    let db_pool = create_pool(&config.database_url)
        .await
        .map_err(|e| io::Error::other(format!("Failed to open database: {}", e)))?;
    init_db(&db_pool)
        .await
        .map_err(|e| io::Error::other(format!("Failed to initialize database: {}", e)))?;

    let bind = (config.host.clone(), config.port);
    let app_state = web::Data::new(AppState::new(db_pool, config));
    let routes = app_config(app_state);

    tracing::info!("Listening on {}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(routes.clone())
    })
    .bind(bind)?
    .run()
    .await
}
