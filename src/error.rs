use thiserror::Error;

/// Errors produced while talking to the media library or decoding assets.
///
/// None of these are fatal. Per-asset failures (`AssetUnreadable`,
/// `DecodeFailed`) are swallowed by the loaders so the item simply stays
/// out of the list or the preview; `AuthorizationDenied` is surfaced to the
/// UI as a state; `Cancelled` is expected whenever a load is superseded.
#[derive(Debug, Error)]
pub enum PickerError {
    #[error("Photo library access was denied")]
    AuthorizationDenied,

    #[error("Asset {0} could not be read")]
    AssetUnreadable(String),

    #[error("Asset {asset} could not be decoded: {reason}")]
    DecodeFailed { asset: String, reason: String },

    #[error("Load was cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PickerError {
    /// Whether this error is part of normal operation and should not be
    /// reported above `trace`.
    pub fn is_silent(&self) -> bool {
        matches!(self, PickerError::Cancelled)
    }

    /// Whether this error only affects a single asset.
    pub fn is_per_asset(&self) -> bool {
        matches!(
            self,
            PickerError::AssetUnreadable(_)
                | PickerError::DecodeFailed { .. }
                | PickerError::Cancelled
        )
    }
}
