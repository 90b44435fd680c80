//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] rotation_engine::EngineError),

    /// A collaborator call failed. Never retried: chain-local state is left
    /// unchanged and the failure surfaces to the caller.
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// The scheduler loop has shut down; commands can no longer be served.
    #[error("Scheduler is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
