use std::path::PathBuf;

/// Configuration problems surfaced before any request is sent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "authentication missing: provide either --api-key (or API_KEY in env) \
         or --project-id (or PROJECT_ID / application default credentials)"
    )]
    MissingAuth,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read settings file {}: {message}", path.display())]
    EnvFile { path: PathBuf, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
