//! Error types for the annotation engine and its persistence boundary

use std::path::PathBuf;

/// Failures reported by a persistence gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported annotation envelope version {0}")]
    UnsupportedVersion(u32),
    #[error("remote call failed: {0}")]
    Remote(String),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by the engine's public surface
///
/// Most failures inside the engine are absorbed as no-ops; only the ones the
/// caller must act on are represented here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("annotation load failed: {0}")]
    Load(#[source] GatewayError),
    #[error("annotation save failed: {0}")]
    Save(#[source] GatewayError),
    #[error("engine has been destroyed")]
    Destroyed,
    #[error("engine was not initialized")]
    NotInitialized,
    #[error("no persistence gateway configured")]
    NoGateway,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors while reading an engine configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
