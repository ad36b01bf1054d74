use thiserror::Error;

pub type ZarrResult<T> = Result<T, ZarrError>;

#[derive(Error, Debug)]
pub enum ZarrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Path conflict at {path:?}: {reason}")]
    PathConflict { path: String, reason: String },

    #[error("Missing required field {field:?} in {key}")]
    MissingField { key: String, field: String },

    #[error("Unexpected field {field:?} in {key}")]
    UnexpectedField { key: String, field: String },

    #[error("Invalid dtype: {0}")]
    InvalidDType(String),

    #[error("Invalid fill value: {0}")]
    InvalidFillValue(String),

    #[error("Invalid chunk coordinate {coord:?}: {reason}")]
    InvalidChunkCoordinate { coord: String, reason: String },

    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error("Codec {id} failed: {reason}")]
    CodecFailure { id: String, reason: String },

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Chunk buffer has {actual} bytes, expected {expected}")]
    ChunkSize { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task join error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ZarrError {
    pub(crate) fn codec(id: &str, reason: impl std::fmt::Display) -> Self {
        ZarrError::CodecFailure {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
