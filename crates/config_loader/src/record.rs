//! 持久化的 offsets + annotations 记录
//!
//! 核心只通过批量恢复读取 `offsets`；`annotations` 原样透传。

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use contracts::{ContractError, ModalityId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const RECORD_VERSION: u32 = 1;

/// Offsets + annotations record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetsRecord {
    #[serde(default = "default_version")]
    pub version: u32,

    /// 保存时间
    pub saved_at: DateTime<Utc>,

    /// key (模态或组) -> offset；零值不保存
    #[serde(default)]
    pub offsets: BTreeMap<ModalityId, i64>,

    /// 标注数据，核心不解析
    #[serde(default)]
    pub annotations: serde_json::Value,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl Default for OffsetsRecord {
    fn default() -> Self {
        Self {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            offsets: BTreeMap::new(),
            annotations: serde_json::Value::Null,
        }
    }
}

impl OffsetsRecord {
    /// 从 offset 快照构建记录，丢弃零值
    pub fn from_offsets<I>(offsets: I, annotations: serde_json::Value) -> Self
    where
        I: IntoIterator<Item = (ModalityId, i64)>,
    {
        Self {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            offsets: offsets.into_iter().filter(|(_, v)| *v != 0).collect(),
            annotations,
        }
    }

    /// 批量恢复用的 (key, value) 列表
    pub fn batch(&self) -> Vec<(ModalityId, i64)> {
        self.offsets.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// 读取记录；文件不存在时返回空记录
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        if !path.exists() {
            debug!(path = %path.display(), "offsets record not found, starting empty");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let record: Self =
            serde_json::from_str(&content).map_err(|e| ContractError::ConfigParse {
                message: format!("offsets record {}: {e}", path.display()),
                source: Some(Box::new(e)),
            })?;

        if record.version > RECORD_VERSION {
            return Err(ContractError::config_validation(
                "offsets.version",
                format!(
                    "record version {} is newer than supported {RECORD_VERSION}",
                    record.version
                ),
            ));
        }

        info!(
            path = %path.display(),
            offsets = record.offsets.len(),
            saved_at = %record.saved_at,
            "offsets record loaded"
        );
        Ok(record)
    }

    /// 写入记录 (先写临时文件再 rename)
    pub fn save(&self, path: &Path) -> Result<(), ContractError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ContractError::Other(format!("offsets record serialize: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), offsets = self.offsets.len(), "offsets record saved");
        Ok(())
    }
}
