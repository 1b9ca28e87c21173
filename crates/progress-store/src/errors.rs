use collect_core_types::CollectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<StoreError> for CollectError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Io(err) => CollectError::Io(err.to_string()),
            StoreError::Serde(err) => CollectError::Serde(err.to_string()),
        }
    }
}
