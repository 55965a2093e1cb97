pub mod catalog;
pub mod common;
pub mod content;
pub mod playlist;
pub mod subscription;
pub mod user;

pub use catalog::*;
pub use common::*;
pub use content::*;
pub use playlist::*;
pub use subscription::*;
pub use user::*;
