use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] tokio_rusqlite::rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("server not found")]
    ServerNotFound,

    #[error("panel request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("panel rejected request with status {status}: {path}")]
    Rejected { status: u16, path: String },

    #[error("malformed content in {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("server is not reachable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
