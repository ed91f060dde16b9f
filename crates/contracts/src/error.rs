//! Layered error definitions
//!
//! Categorized by source: config / stream index / synchronization / decode

use thiserror::Error;

use crate::{CoverageSpan, ModalityId};

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Stream Index Errors =====
    /// Timestamp input is empty, unsorted or not finite
    #[error("malformed timestamps for modality '{modality_id}': {message}")]
    MalformedTimestamps {
        modality_id: ModalityId,
        message: String,
    },

    /// Index outside `[0, len)`; resolution clamps before this can happen
    #[error("index {index} out of range for modality '{modality_id}' (len={len})")]
    IndexOutOfRange {
        modality_id: ModalityId,
        index: usize,
        len: usize,
    },

    // ===== Synchronization Errors =====
    /// Modality is not part of the session
    #[error("unknown modality '{modality_id}'")]
    UnknownModality { modality_id: ModalityId },

    /// Reference modality could not be loaded; no navigation is possible
    #[error("reference modality '{modality_id}' unavailable: {message}")]
    ReferenceUnavailable {
        modality_id: ModalityId,
        message: String,
    },

    /// Recordings do not share any common time window
    #[error(
        "no overlapping coverage: t_lo={t_lo} > t_hi={t_hi} [{}]",
        describe_spans(.spans)
    )]
    NoOverlappingCoverage {
        t_lo: f64,
        t_hi: f64,
        spans: Vec<CoverageSpan>,
    },

    /// Reference instant outside the navigable range; the clock source clamps first
    #[error("reference instant {instant} outside navigable range [{lo}, {hi}]")]
    ReferenceOutOfRange { instant: f64, lo: f64, hi: f64 },

    /// Reference frame index outside the navigable frame range
    #[error("reference frame {frame} outside navigable frames [{start_index}, {end_index}]")]
    ReferenceFrameOutOfRange {
        frame: usize,
        start_index: usize,
        end_index: usize,
    },

    // ===== Decode Errors =====
    /// External frame extraction failed for one frame
    #[error("decode failure for '{modality_id}' frame {frame_index}: {message}")]
    DecodeFailure {
        modality_id: ModalityId,
        frame_index: usize,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn describe_spans(spans: &[CoverageSpan]) -> String {
    spans
        .iter()
        .map(|s| format!("{}: [{}, {}]", s.modality_id, s.first_instant, s.last_instant))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed timestamps error
    pub fn malformed(modality_id: impl Into<ModalityId>, message: impl Into<String>) -> Self {
        Self::MalformedTimestamps {
            modality_id: modality_id.into(),
            message: message.into(),
        }
    }

    /// Create decode failure
    pub fn decode(
        modality_id: impl Into<ModalityId>,
        frame_index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::DecodeFailure {
            modality_id: modality_id.into(),
            frame_index,
            message: message.into(),
        }
    }

    /// Whether the whole session must stop (no navigation possible)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoOverlappingCoverage { .. } | Self::ReferenceUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overlap_message_names_every_modality() {
        let err = ContractError::NoOverlappingCoverage {
            t_lo: 20.0,
            t_hi: 10.0,
            spans: vec![
                CoverageSpan {
                    modality_id: "camera_1".into(),
                    first_instant: 0.0,
                    last_instant: 10.0,
                },
                CoverageSpan {
                    modality_id: "imu".into(),
                    first_instant: 20.0,
                    last_instant: 30.0,
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("camera_1: [0, 10]"));
        assert!(message.contains("imu: [20, 30]"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_decode_failure_is_not_fatal() {
        let err = ContractError::decode("camera_2", 42, "ffmpeg exited with status 1");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("frame 42"));
    }
}
