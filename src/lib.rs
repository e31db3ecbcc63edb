// Module declarations
pub mod api;
pub mod config;
pub mod db;
pub mod diagnose;
pub mod error;
pub mod logging;
pub mod server;

pub use api::{router, AppState};
pub use config::ServerConfig;
pub use error::{Result, StudioError};
