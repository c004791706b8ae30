use std::path::PathBuf;

/// All errors that can occur in versecast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("alignment failed: {0}")]
    Alignment(String),

    #[error("audio did not become readable in time: {path}")]
    AvailabilityTimeout { path: PathBuf },

    #[error("audio file not found: {path}")]
    AudioMissing { path: PathBuf },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("publish failed (video kept at {path}): {reason}")]
    Publish { path: PathBuf, reason: String },

    #[error("subtitle build error: {0}")]
    Subtitle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
