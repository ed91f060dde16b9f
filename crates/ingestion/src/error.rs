//! Ingestion 错误类型

use std::path::PathBuf;

use contracts::{ContractError, ModalityId};
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 时间戳文件读取失败
    #[error("failed to read timestamps for '{modality_id}' from {}: {source}", path.display())]
    ReadFailed {
        /// 模态 ID
        modality_id: ModalityId,
        /// 文件路径
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 时间戳文件解析失败
    #[error("failed to parse timestamps for '{modality_id}' from {}: {message}", path.display())]
    ParseFailed {
        /// 模态 ID
        modality_id: ModalityId,
        /// 文件路径
        path: PathBuf,
        /// 错误消息
        message: String,
    },

    /// 合成流参数无法产生任何样本
    #[error("synthetic stream '{modality_id}' produced no samples: {message}")]
    EmptySynthetic {
        /// 模态 ID
        modality_id: ModalityId,
        /// 错误消息
        message: String,
    },
}

impl IngestionError {
    pub fn modality_id(&self) -> &ModalityId {
        match self {
            Self::ReadFailed { modality_id, .. }
            | Self::ParseFailed { modality_id, .. }
            | Self::EmptySynthetic { modality_id, .. } => modality_id,
        }
    }
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::ReadFailed { source, .. } => ContractError::Io(source),
            other => ContractError::malformed(other.modality_id().clone(), other.to_string()),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
