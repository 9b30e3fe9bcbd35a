use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml parse error: {0}")]
    XmlParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corrupt index file: {0}")]
    CorruptIndex(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{service} request failed: {details}")]
    Upstream { service: String, details: String },

    #[error("search request failed: {0}")]
    Request(String),

    #[error("chunk position {position} out of range for store of {len}")]
    NotFound { position: usize, len: usize },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
