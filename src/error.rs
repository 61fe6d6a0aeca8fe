use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("stored value for `{key}` is unreadable: {reason}")]
    PersistenceRead { key: String, reason: String },

    #[error("failed to write `{key}`: {source}")]
    PersistenceWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("price request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("price source returned an unusable body: {0}")]
    BadResponse(String),

    #[error("transaction amount {0} is not a finite number")]
    InvalidTransactionAmount(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
