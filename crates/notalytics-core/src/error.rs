use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid funnel definition: {0}")]
    InvalidFunnel(String),

    #[error("invalid {field}: {value}")]
    InvalidParameter { field: &'static str, value: String },
}

/// The single failure condition surfaced by an event store query.
///
/// There is no partial-result contract: a failed fetch yields no events.
#[derive(Debug, Error)]
#[error("event fetch failed: {0}")]
pub struct StoreError(#[from] anyhow::Error);

impl StoreError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self(anyhow::anyhow!("{message}"))
    }
}
