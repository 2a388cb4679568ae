//! Error types for adgate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("missing config: {0}")]
    MissingConfig(String),

    #[error("policy document error: {0}")]
    Policy(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid ad kind {0:?} (expected app_open|interstitial|banner)")]
    InvalidKind(String),
}

impl AdError {
    /// Stable machine-readable code used in robot output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Sqlite(_) => "sqlite",
            Self::Json(_) | Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::MissingConfig(_) => "missing_config",
            Self::Policy(_) => "policy",
            Self::Storage(_) => "storage",
            Self::InvalidKind(_) => "invalid_kind",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdError>;
