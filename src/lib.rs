pub mod autosave;
pub mod configuration;
pub mod core;
pub mod database;
pub mod deepsearch;
pub mod directory;
pub mod email;
pub mod estimate;
pub mod normalizer;
pub mod pdf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config Error:{0}")]
    ConfigError(String),

    #[error("Database Error:{0}")]
    DatabaseError(String),

    #[error("DeepSearch Error:{0}")]
    DeepSearchError(String),

    #[error("Service error")]
    ServiceError,
}
