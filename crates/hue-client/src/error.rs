use thiserror::Error;

/// Failures reported by a [`crate::LightingBridge`].
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bridge rejected {address}: {description}")]
    Api {
        address: String,
        description: String,
    },

    #[error("unexpected bridge response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid command `{0}`")]
    InvalidCommand(String),

    #[error("invalid resource id `{0}`")]
    InvalidId(String),
}
