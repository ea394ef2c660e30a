#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode: {0}")]
    Decode(String),

    #[error("empty response: {0}")]
    EmptyResponse(String),
}

impl GenerationError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status, message } => *status == 404 || message.contains("NOT_FOUND"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;

pub fn looks_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<GenerationError>()
            .map(GenerationError::is_not_found)
            .unwrap_or(false)
            || cause.to_string().contains("404")
    })
}
