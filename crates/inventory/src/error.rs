use thiserror::Error;

pub type Result<T> = std::result::Result<T, InventoryError>;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache error: {0}")]
    CacheError(#[from] fleet_cache::CacheError),
}

/// A remote call that failed or timed out. Absorbed by the fetch layer.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{request} timed out after {timeout_ms} ms")]
    Timeout { request: String, timeout_ms: u64 },

    #[error("invalid JSON from `{command}`: {source}")]
    InvalidJson {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Other(String),
}
