//! 按会话蓝图加载所有模态的时间戳
//!
//! 每个模态独立加载：一个模态失败只会被记录为 degraded，不影响其他模态。

use contracts::{
    DegradedModality, ModalityConfig, ModalityId, ModalityKind, SessionBlueprint,
    TimestampSeries, TimestampSourceConfig,
};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::{reader, synthetic};

/// 一个加载成功的模态
#[derive(Debug, Clone)]
pub struct LoadedStream {
    pub modality_id: ModalityId,
    pub kind: ModalityKind,
    pub series: TimestampSeries,
}

/// 加载结果
#[derive(Debug, Default)]
pub struct LoadReport {
    /// 加载成功的模态，顺序与蓝图一致
    pub streams: Vec<LoadedStream>,

    /// 加载失败的模态
    pub failures: Vec<DegradedModality>,
}

impl LoadReport {
    pub fn stream(&self, modality_id: &str) -> Option<&LoadedStream> {
        self.streams.iter().find(|s| s.modality_id == modality_id)
    }

    pub fn failure(&self, modality_id: &str) -> Option<&DegradedModality> {
        self.failures.iter().find(|f| f.modality_id == modality_id)
    }
}

/// 加载单个模态的时间戳
pub fn load_modality(modality: &ModalityConfig) -> Result<TimestampSeries> {
    let modality_id = ModalityId::from(&modality.id);
    match &modality.timestamps {
        TimestampSourceConfig::File { path } => reader::read_timestamps_file(&modality_id, path),
        TimestampSourceConfig::Synthetic(config) => synthetic::generate(&modality_id, config),
    }
}

/// 加载蓝图中的全部模态
#[instrument(name = "ingestion_load", skip(blueprint), fields(session = %blueprint.session.name))]
pub fn load_streams(blueprint: &SessionBlueprint) -> LoadReport {
    let mut report = LoadReport::default();

    for modality in &blueprint.modalities {
        let modality_id = ModalityId::from(&modality.id);
        match load_modality(modality) {
            Ok(series) => {
                metrics::counter!("scrubsync_ingestion_streams_total", "status" => "ok")
                    .increment(1);
                report.streams.push(LoadedStream {
                    modality_id,
                    kind: modality.kind,
                    series,
                });
            }
            Err(e) => {
                metrics::counter!("scrubsync_ingestion_streams_total", "status" => "failed")
                    .increment(1);
                warn!(
                    modality_id = %modality_id,
                    reference = modality.reference,
                    error = %e,
                    "modality failed to load"
                );
                report.failures.push(DegradedModality {
                    modality_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        loaded = report.streams.len(),
        failed = report.failures.len(),
        "streams loaded"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        CacheConfig, ConfigVersion, ExtractorConfig, SessionConfig, SyntheticStreamConfig,
    };
    use std::path::PathBuf;

    fn blueprint(modalities: Vec<ModalityConfig>) -> SessionBlueprint {
        SessionBlueprint {
            version: ConfigVersion::V1,
            session: SessionConfig {
                name: "test".to_string(),
                baseline_frame: 100,
            },
            modalities,
            offset_groups: vec![],
            cache: CacheConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }

    fn synthetic_modality(id: &str) -> ModalityConfig {
        ModalityConfig {
            id: id.to_string(),
            kind: ModalityKind::Imu,
            reference: false,
            timestamps: TimestampSourceConfig::Synthetic(SyntheticStreamConfig {
                rate_hz: 100.0,
                start: 0.0,
                duration: 1.0,
                jitter: 0.0,
                drop_ratio: 0.0,
                burst: None,
                seed: 0,
            }),
            video: None,
        }
    }

    #[test]
    fn test_failure_is_isolated() {
        let broken = ModalityConfig {
            id: "insole".to_string(),
            kind: ModalityKind::Insole,
            reference: false,
            timestamps: TimestampSourceConfig::File {
                path: PathBuf::from("/nonexistent/insole.json"),
            },
            video: None,
        };
        let bp = blueprint(vec![synthetic_modality("imu"), broken]);

        let report = load_streams(&bp);
        assert_eq!(report.streams.len(), 1);
        assert_eq!(report.stream("imu").unwrap().series.sample_count(), 101);
        assert!(report.failure("insole").unwrap().reason.contains("insole.json"));
    }
}
