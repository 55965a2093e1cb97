pub mod auth;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod folder_tree;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod store;
pub mod utils;

// Re-export commonly used items
pub use config::{create_pool, init_db, AppState, Config};
pub use error::{AppError, Result};
pub use handlers::app_config;
