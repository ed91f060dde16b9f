//! Recording File Reader
//!
//! 时间戳文件为 JSON，两种写法：
//! - 带 `encoding` 标签的 `TimestampSeries` (`continuous` / `burst`)
//! - 裸数组 `[0.0, 0.033, ...]`，视为连续流

use std::path::Path;

use contracts::{ModalityId, TimestampSeries};
use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestionError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampFile {
    Tagged(TimestampSeries),
    Flat(Vec<f64>),
}

/// 读取一个模态的时间戳文件
pub fn read_timestamps_file(modality_id: &ModalityId, path: &Path) -> Result<TimestampSeries> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestionError::ReadFailed {
        modality_id: modality_id.clone(),
        path: path.to_path_buf(),
        source,
    })?;

    let series = parse_timestamps(&content).map_err(|message| IngestionError::ParseFailed {
        modality_id: modality_id.clone(),
        path: path.to_path_buf(),
        message,
    })?;

    debug!(
        modality_id = %modality_id,
        path = %path.display(),
        encoding = series.encoding_name(),
        samples = series.sample_count(),
        "timestamps read"
    );
    Ok(series)
}

/// 解析时间戳 JSON 内容
pub fn parse_timestamps(content: &str) -> std::result::Result<TimestampSeries, String> {
    let file: TimestampFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
    Ok(match file {
        TimestampFile::Tagged(series) => series,
        TimestampFile::Flat(timestamps) => TimestampSeries::Continuous { timestamps },
    })
}
