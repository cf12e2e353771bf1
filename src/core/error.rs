use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    /// Validation failure raised before any mutation happens.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0} '{1}' not found")]
    NotFound(&'static str, String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl MetaError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, MetaError>;

impl<T> From<std::sync::PoisonError<T>> for MetaError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MetaError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MetaError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<regex::Error> for MetaError {
    fn from(err: regex::Error) -> Self {
        Self::Cache(format!("invalid key pattern: {}", err))
    }
}
