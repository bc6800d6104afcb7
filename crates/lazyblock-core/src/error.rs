use crate::payload::PayloadError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Invalid block configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid settings: {message}")]
    Settings { message: String },

    #[error("Failed to serialize iframe config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
