//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 时间戳索引 / offset / 截断的端到端行为
//! - 配置文件 -> 加载 -> 同步器
//! - 同步器 -> 解码缓存
//! - offsets 记录的保存与恢复

#[cfg(test)]
mod sync_tests {
    use contracts::{Burst, ContractError, ReferenceInstant, TimestampSeries};
    use sync_engine::Synchronizer;

    fn continuous(timestamps: &[f64]) -> TimestampSeries {
        TimestampSeries::Continuous {
            timestamps: timestamps.to_vec(),
        }
    }

    fn uniform(start: f64, end: f64, step: f64) -> TimestampSeries {
        let n = ((end - start) / step).round() as usize + 1;
        TimestampSeries::Continuous {
            timestamps: (0..n).map(|i| start + i as f64 * step).collect(),
        }
    }

    /// 30 fps reference, sparse target; offsets shift and clamp the target
    #[test]
    fn test_offset_shift_and_clamp() {
        let sync = Synchronizer::builder()
            .reference("camera")
            .stream("camera", continuous(&[0.0, 0.033, 0.066, 0.099, 0.132, 0.165]))
            .stream("target", continuous(&[0.005, 0.040, 0.095, 0.140]))
            .baseline_frame(0)
            .build()
            .unwrap();

        let resolution = sync.resolve(ReferenceInstant::Timestamp(0.099)).unwrap();
        assert_eq!(resolution.reference_index, 3);
        assert_eq!(resolution.index_of("target"), Some(2));

        sync.offsets().set(&"target".into(), 1).unwrap();
        let resolution = sync.resolve(ReferenceInstant::Timestamp(0.099)).unwrap();
        let target = resolution.get("target").unwrap();
        assert_eq!(target.index, 3);
        assert!(!target.clamped);
        assert_eq!(target.instant, 0.140);

        sync.offsets().set(&"target".into(), -5).unwrap();
        let resolution = sync.resolve(ReferenceInstant::Timestamp(0.099)).unwrap();
        let target = resolution.get("target").unwrap();
        assert_eq!(target.requested, -3);
        assert_eq!(target.index, 0);
        assert!(target.clamped);
        // the reference itself is untouched
        assert_eq!(resolution.index_of("camera"), Some(3));
    }

    #[test]
    fn test_equidistant_resolves_to_earlier() {
        let sync = Synchronizer::builder()
            .reference("camera")
            .stream("camera", continuous(&[0.0, 0.25, 0.5, 0.75, 1.0]))
            .stream("imu", continuous(&[0.0, 0.5, 1.0]))
            .build()
            .unwrap();

        let resolution = sync.resolve(ReferenceInstant::Frame(1)).unwrap();
        assert_eq!(resolution.index_of("imu"), Some(0));
        let resolution = sync.resolve(ReferenceInstant::Frame(3)).unwrap();
        assert_eq!(resolution.index_of("imu"), Some(1));
    }

    /// A covers [0, 10], B covers [2, 12]: only [2, 10] is navigable
    #[test]
    fn test_truncation_window() {
        let sync = Synchronizer::builder()
            .reference("a")
            .stream("a", uniform(0.0, 10.0, 1.0))
            .stream("b", uniform(2.0, 12.0, 1.0))
            .build()
            .unwrap();

        let nav = sync.navigable();
        assert_eq!((nav.lo, nav.hi), (2.0, 10.0));
        assert_eq!((nav.start_index, nav.end_index), (2, 10));

        let range = sync.valid_range("b").unwrap();
        assert_eq!((range.start_index, range.end_index), (0, 8));

        let err = sync.resolve(ReferenceInstant::Timestamp(1.0)).unwrap_err();
        assert!(matches!(err, ContractError::ReferenceOutOfRange { .. }));
        let err = sync.resolve(ReferenceInstant::Frame(11)).unwrap_err();
        assert!(matches!(err, ContractError::ReferenceFrameOutOfRange { .. }));

        // the clock source clamps before emitting
        let resolution = sync
            .resolve(ReferenceInstant::Timestamp(nav.clamp(1.0)))
            .unwrap();
        assert_eq!(resolution.index_of("a"), Some(2));
        assert_eq!(resolution.index_of("b"), Some(0));
    }

    #[test]
    fn test_disjoint_recordings_fail_to_open() {
        let err = Synchronizer::builder()
            .reference("a")
            .stream("a", uniform(0.0, 5.0, 1.0))
            .stream("b", uniform(6.0, 9.0, 1.0))
            .build()
            .unwrap_err();
        match err {
            ContractError::NoOverlappingCoverage { spans, .. } => assert_eq!(spans.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_burst_stream_resolution() {
        let bursts = TimestampSeries::Burst {
            bursts: vec![
                Burst {
                    start: 0.0,
                    samples: 4,
                    period: 0.125,
                },
                Burst {
                    start: 0.75,
                    samples: 2,
                    period: 0.125,
                },
            ],
        };
        let sync = Synchronizer::builder()
            .reference("camera")
            .stream("camera", uniform(0.0, 1.0, 0.25))
            .stream("insole", bursts)
            .build()
            .unwrap();

        assert_eq!(sync.stream("insole").unwrap().len(), 6);
        // navigable ends at the last burst sample; 1.0 and 0.75 tie, earlier wins
        assert_eq!(sync.navigable().end_index, 3);

        let at = |frame| {
            sync.resolve(ReferenceInstant::Frame(frame))
                .unwrap()
                .index_of("insole")
        };
        assert_eq!(at(1), Some(2));
        // in the gap between bursts the closer edge wins
        assert_eq!(at(2), Some(3));
        assert_eq!(at(3), Some(4));

        sync.offsets().set(&"insole".into(), 3).unwrap();
        let resolution = sync.resolve(ReferenceInstant::Frame(3)).unwrap();
        let insole = resolution.get("insole").unwrap();
        assert_eq!(insole.index, 5);
        assert!(insole.clamped);
        assert_eq!(insole.instant, 0.875);
    }

    #[test]
    fn test_malformed_stream_is_degraded() {
        let sync = Synchronizer::builder()
            .reference("camera")
            .stream("camera", uniform(0.0, 2.0, 0.5))
            .stream("imu", continuous(&[0.0, 0.2, 0.1]))
            .build()
            .unwrap();

        assert!(sync.stream("imu").is_none());
        assert_eq!(sync.degraded().len(), 1);
        assert_eq!(sync.degraded()[0].modality_id, "imu");

        let resolution = sync.resolve(ReferenceInstant::Frame(2)).unwrap();
        assert_eq!(resolution.indices.len(), 1);
    }
}

#[cfg(test)]
mod session_file_tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use config_loader::{ConfigLoader, OffsetsRecord};
    use contracts::{ReferenceInstant, SessionBlueprint};
    use sync_engine::{OffsetTable, Synchronizer};
    use tempfile::tempdir;

    const SESSION_TOML: &str = r#"
[session]
name = "walk_trial"
baseline_frame = 4

[[modalities]]
id = "camera_1"
kind = "camera"
reference = true
timestamps = { type = "file", path = "ts/camera_1.json" }
video = { path = "video/camera_1.mp4", fps = 2.0, frame_count = 21 }

[[modalities]]
id = "imu"
kind = "imu"
timestamps = { type = "synthetic", rate_hz = 100.0, duration = 10.0 }

[[modalities]]
id = "skeleton"
kind = "skeleton"
timestamps = { type = "file", path = "ts/missing.json" }

[[offset_groups]]
id = "body"
members = ["imu", "skeleton"]
"#;

    fn write_session(dir: &Path) -> std::path::PathBuf {
        fs::create_dir_all(dir.join("ts")).unwrap();
        let camera: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        fs::write(
            dir.join("ts/camera_1.json"),
            serde_json::to_string(&camera).unwrap(),
        )
        .unwrap();
        let path = dir.join("session.toml");
        fs::write(&path, SESSION_TOML).unwrap();
        path
    }

    fn open(blueprint: &SessionBlueprint) -> Synchronizer {
        let report = ingestion::load_streams(blueprint);
        let offsets = Arc::new(OffsetTable::from_blueprint(blueprint).unwrap());
        let mut builder = Synchronizer::builder()
            .reference(blueprint.reference().unwrap().id.as_str())
            .offsets(offsets)
            .baseline_frame(blueprint.session.baseline_frame);
        for stream in report.streams {
            builder = builder.stream(stream.modality_id, stream.series);
        }
        for failure in report.failures {
            builder = builder.degraded(failure);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_config_to_synchronizer() {
        let dir = tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_path(&write_session(dir.path())).unwrap();
        assert!(blueprint.modalities[0]
            .video
            .as_ref()
            .unwrap()
            .path
            .starts_with(dir.path()));

        let sync = open(&blueprint);
        assert_eq!(sync.reference_id(), "camera_1");
        assert_eq!(sync.streams().len(), 2);
        assert_eq!(sync.degraded().len(), 1);
        assert_eq!(sync.degraded()[0].modality_id, "skeleton");

        let anchor = sync.anchor();
        assert_eq!(anchor.reference_frame, 4);
        assert_eq!(anchor.instant, 2.0);
        let imu = anchor.points.iter().find(|p| p.modality_id == "imu").unwrap();
        assert_eq!(imu.index, 200);

        let resolution = sync.resolve(ReferenceInstant::Frame(4)).unwrap();
        assert_eq!(resolution.index_of("imu"), Some(200));
        assert_eq!(resolution.index_of("skeleton"), None);
    }

    #[test]
    fn test_group_offset_through_degraded_member() {
        let dir = tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_path(&write_session(dir.path())).unwrap();
        let sync = open(&blueprint);

        let update = sync.offsets().set(&"skeleton".into(), 5).unwrap();
        assert_eq!(update.key, "body");
        assert_eq!(update.affected.len(), 2);

        let resolution = sync.resolve(ReferenceInstant::Frame(4)).unwrap();
        let instant = resolution.instant;
        let fresh = sync.resolve_modalities(instant, &update.affected).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].modality_id, "imu");
        assert_eq!(fresh[0].index, 205);
    }

    #[test]
    fn test_offsets_record_round_trip() {
        let dir = tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_path(&write_session(dir.path())).unwrap();
        let record_path = dir.path().join("offsets.json");

        // missing record is empty
        let empty = OffsetsRecord::load(&record_path).unwrap();
        assert!(empty.offsets.is_empty());

        let first = open(&blueprint);
        first.offsets().set(&"imu".into(), -7).unwrap();
        first.offsets().set(&"camera_1".into(), 0).unwrap();
        let annotations = serde_json::json!({ "labels": [{ "t": 2.0, "text": "heel strike" }] });
        OffsetsRecord::from_offsets(first.offsets().snapshot(), annotations.clone())
            .save(&record_path)
            .unwrap();

        let loaded = OffsetsRecord::load(&record_path).unwrap();
        assert_eq!(loaded.offsets.len(), 1);
        assert_eq!(loaded.offsets.get("body"), Some(&-7));
        assert_eq!(loaded.annotations, annotations);

        let second = open(&blueprint);
        let batch = second.offsets().restore(loaded.batch());
        assert!(batch.ignored.is_empty());
        let resolution = second.resolve(ReferenceInstant::Frame(4)).unwrap();
        assert_eq!(resolution.index_of("imu"), Some(193));
    }
}

#[cfg(test)]
mod cache_tests {
    use std::path::PathBuf;

    use contracts::{
        DecodeOutcome, FrameKey, FrameSource, ReferenceInstant, SessionEvent, TimestampSeries,
    };
    use frame_cache::{CacheBudget, CacheOptions, FrameCache, LaneLimits, SyntheticExtractor};
    use sync_engine::Synchronizer;
    use tokio::sync::broadcast;

    fn uniform(n: usize, step: f64) -> TimestampSeries {
        TimestampSeries::Continuous {
            timestamps: (0..n).map(|i| i as f64 * step).collect(),
        }
    }

    fn options(max_entries: usize) -> CacheOptions {
        CacheOptions {
            budget: CacheBudget {
                max_bytes: 1 << 20,
                max_entries,
            },
            lanes: LaneLimits {
                max_in_flight: 2,
                queue_capacity: 8,
            },
        }
    }

    fn source(name: &str) -> FrameSource {
        FrameSource {
            path: PathBuf::from(name),
            fps: 10.0,
            frame_count: Some(100),
        }
    }

    /// Resolve -> request -> decode for two cameras at different rates
    #[tokio::test]
    async fn test_resolution_drives_frame_requests() {
        let sync = Synchronizer::builder()
            .reference("camera_1")
            .stream("camera_1", uniform(100, 0.1))
            .stream("camera_2", uniform(50, 0.2))
            .build()
            .unwrap();

        let (events, mut rx) = broadcast::channel(64);
        let cache = FrameCache::new(SyntheticExtractor::new(4, 4), options(16), Some(events)).unwrap();
        cache.register_source("camera_1", source("c1.mp4"));
        cache.register_source("camera_2", source("c2.mp4"));

        let resolution = sync.resolve(ReferenceInstant::Frame(40)).unwrap();
        for resolved in &resolution.indices {
            let ticket = cache.request(FrameKey::new(resolved.modality_id.clone(), resolved.index));
            let frame = ticket.resolve().await.unwrap();
            assert_eq!(frame.data[2] as usize, resolved.index);
        }
        assert_eq!(resolution.index_of("camera_2"), Some(20));

        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::DecodeCompleted { key, outcome } = event {
                assert!(matches!(outcome, DecodeOutcome::Ready { .. }));
                completed.push(key);
            }
        }
        assert_eq!(completed.len(), 2);
        assert_eq!(cache.extractor().calls(), 2);
    }

    /// Two display surfaces asking for the same frame share one decode
    #[tokio::test]
    async fn test_shared_frame_decoded_once() {
        let cache = FrameCache::new(SyntheticExtractor::new(4, 4), options(16), None).unwrap();
        cache.register_source("camera_1", source("c1.mp4"));

        let key = FrameKey::new("camera_1", 7);
        let first = cache.request(key.clone());
        let second = cache.request(key.clone());
        let (a, b) = tokio::join!(first.resolve(), second.resolve());
        assert_eq!(a.unwrap().data, b.unwrap().data);

        // already ready: a hit
        let third = cache.request(key).resolve().await.unwrap();
        assert_eq!(third.data[2], 7);
        assert_eq!(cache.extractor().calls(), 1);

        let stats = cache.stats();
        assert_eq!((stats.misses, stats.joined, stats.hits), (1, 1, 1));
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    /// Sweeping past the budget keeps the cache bounded
    #[tokio::test]
    async fn test_sweep_stays_within_budget() {
        let cache = FrameCache::new(SyntheticExtractor::new(4, 4), options(5), None).unwrap();
        cache.register_source("camera_1", source("c1.mp4"));

        for index in 0..20 {
            cache
                .request(FrameKey::new("camera_1", index))
                .resolve()
                .await
                .unwrap();
        }
        assert!(cache.len() <= 5);
        let lru = cache.lru_order();
        assert_eq!(lru.last(), Some(&FrameKey::new("camera_1", 19)));
        assert!(!lru.contains(&FrameKey::new("camera_1", 0)));
    }

    #[tokio::test]
    async fn test_failed_decode_reaches_every_waiter() {
        let extractor = SyntheticExtractor::new(4, 4).with_failing([3]);
        let cache = FrameCache::new(extractor, options(16), None).unwrap();
        cache.register_source("camera_1", source("c1.mp4"));

        let key = FrameKey::new("camera_1", 3);
        let (a, b) = tokio::join!(
            cache.request(key.clone()).resolve(),
            cache.request(key).resolve()
        );
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(cache.stats().decodes_failed, 1);
        assert_eq!(cache.extractor().calls(), 1);
    }
}
