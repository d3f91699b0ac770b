/// Database configuration and connection management
pub mod database;

/// Repository settings loaded from the optional TOML file
pub mod repository;

/// Process settings loaded from environment variables
pub mod settings;

pub use repository::RepositoryConfig;
pub use settings::{AppConfig, UpdateSettings};
