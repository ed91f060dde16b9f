//! Frame cache error types

use contracts::{ContractError, FrameKey, ModalityId};
use thiserror::Error;

/// Terminal failure of a cache request
///
/// Cloned into every ticket attached to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// External extraction failed; cached as a failed entry
    #[error("decode failed for {key}: {message}")]
    Decode { key: FrameKey, message: String },

    /// Dropped from the decode queue by newer requests before it started
    #[error("request for {key} superseded before decode started")]
    Superseded { key: FrameKey },

    /// No video source registered for the modality
    #[error("no video source registered for modality '{modality_id}'")]
    UnknownModality { modality_id: ModalityId },

    /// Cache dropped while the entry was still pending
    #[error("cache dropped before {key} resolved")]
    Abandoned { key: FrameKey },

    /// Constructed outside a tokio runtime
    #[error("frame cache must be created inside a tokio runtime")]
    NoRuntime,
}

impl CacheError {
    pub(crate) fn from_extractor(key: &FrameKey, err: ContractError) -> Self {
        let message = match err {
            ContractError::DecodeFailure { message, .. } => message,
            other => other.to_string(),
        };
        Self::Decode {
            key: key.clone(),
            message,
        }
    }

    /// Whether a later request for the same key may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Superseded { .. } | Self::Abandoned { .. })
    }
}

impl From<CacheError> for ContractError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Decode { key, message } => ContractError::DecodeFailure {
                modality_id: key.modality_id,
                frame_index: key.frame_index,
                message,
            },
            CacheError::UnknownModality { modality_id } => {
                ContractError::UnknownModality { modality_id }
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}
