//! 同步 / 拖动指标收集模块
//!
//! 基于 `Resolution` 与 `CacheStats` 记录运行指标，并在内存中聚合摘要。

use std::collections::BTreeMap;

use contracts::{CacheStats, ModalityId, Resolution};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// 注册指标说明 (Prometheus HELP / 单位)
///
/// 只需调用一次；exporter 安装后调用。
pub fn describe_metrics() {
    describe_counter!("scrubsync_seeks_total", "Reference instant changes");
    describe_counter!(
        "scrubsync_resolutions_clamped_total",
        "Resolved indices clamped to the stream bounds"
    );
    describe_counter!("scrubsync_offset_changes_total", "Offset edits per key");
    describe_gauge!("scrubsync_offset_value", "Current offset per key, in samples");
    describe_gauge!(
        "scrubsync_reference_instant_seconds",
        Unit::Seconds,
        "Current reference instant"
    );
    describe_histogram!(
        "scrubsync_resolution_skew_ms",
        Unit::Milliseconds,
        "Distance between a resolved sample and the reference instant"
    );
    describe_histogram!(
        "scrubsync_frame_wait_ms",
        Unit::Milliseconds,
        "Time from frame request to displayable"
    );
    describe_gauge!("scrubsync_cache_hit_rate", "Requests served without a new decode");
    describe_gauge!("scrubsync_cache_bytes", Unit::Bytes, "Decoded payload bytes held");
}

/// 从一次解析结果记录指标
///
/// 每次参考时刻变化 (seek) 后调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_resolution;
///
/// let resolution = sync.resolve(ReferenceInstant::Timestamp(t))?;
/// record_resolution(&resolution);
/// ```
pub fn record_resolution(resolution: &Resolution) {
    counter!("scrubsync_seeks_total").increment(1);
    gauge!("scrubsync_reference_instant_seconds").set(resolution.instant);
    gauge!("scrubsync_reference_index").set(resolution.reference_index as f64);

    for resolved in &resolution.indices {
        let id = resolved.modality_id.to_string();
        gauge!("scrubsync_resolved_index", "modality_id" => id.clone()).set(resolved.index as f64);
        // 应用 offset 后的实际时间差
        histogram!("scrubsync_resolution_skew_ms", "modality_id" => id.clone())
            .record((resolved.instant - resolution.instant).abs() * 1000.0);
        if resolved.clamped {
            counter!("scrubsync_resolutions_clamped_total", "modality_id" => id).increment(1);
        }
    }
}

/// 记录 offset 修改
pub fn record_offset_change(key: &str, value: i64) {
    counter!("scrubsync_offset_changes_total", "key" => key.to_string()).increment(1);
    gauge!("scrubsync_offset_value", "key" => key.to_string()).set(value as f64);
}

/// 记录单帧等待时间 (请求 → 可渲染)
pub fn record_frame_wait_ms(modality_id: &str, wait_ms: f64) {
    histogram!(
        "scrubsync_frame_wait_ms",
        "modality_id" => modality_id.to_string()
    )
    .record(wait_ms);
}

/// 把缓存快照导出为 gauge
pub fn record_cache_stats(stats: &CacheStats) {
    gauge!("scrubsync_cache_hit_rate").set(stats.hit_rate());
    gauge!("scrubsync_cache_pinned").set(stats.pinned as f64);
    gauge!("scrubsync_cache_bytes").set(stats.bytes as f64);
    gauge!("scrubsync_cache_entries").set(stats.entries as f64);
}

/// 拖动指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ScrubMetricsAggregator {
    /// seek 次数
    pub total_seeks: u64,

    /// 被截断到合法区间的解析次数
    pub total_clamped: u64,

    /// 各模态被截断次数
    pub clamp_counts: BTreeMap<ModalityId, u64>,

    /// 各模态 |实际时刻 - 参考时刻| (毫秒)
    pub skew_stats: BTreeMap<ModalityId, RunningStats>,

    /// 单帧等待时间 (毫秒)
    pub wait_stats: RunningStats,

    /// 解码失败帧数
    pub failed_frames: u64,
}

impl ScrubMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, resolution: &Resolution) {
        self.total_seeks += 1;
        for resolved in &resolution.indices {
            if resolved.clamped {
                self.total_clamped += 1;
                *self
                    .clamp_counts
                    .entry(resolved.modality_id.clone())
                    .or_insert(0) += 1;
            }
            self.skew_stats
                .entry(resolved.modality_id.clone())
                .or_default()
                .push((resolved.instant - resolution.instant).abs() * 1000.0);
        }
    }

    /// 记录一帧的等待结果
    pub fn record_frame(&mut self, wait_ms: f64, ok: bool) {
        self.wait_stats.push(wait_ms);
        if !ok {
            self.failed_frames += 1;
        }
    }

    /// 生成摘要报告
    pub fn summary(&self, cache: CacheStats) -> ScrubSummary {
        ScrubSummary {
            total_seeks: self.total_seeks,
            total_clamped: self.total_clamped,
            failed_frames: self.failed_frames,
            frame_wait_ms: StatsSummary::from(&self.wait_stats),
            skew_ms: self
                .skew_stats
                .iter()
                .map(|(id, stats)| (id.clone(), StatsSummary::from(stats)))
                .collect(),
            clamp_counts: self.clamp_counts.clone(),
            cache,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct ScrubSummary {
    pub total_seeks: u64,
    pub total_clamped: u64,
    pub failed_frames: u64,
    pub frame_wait_ms: StatsSummary,
    pub skew_ms: BTreeMap<ModalityId, StatsSummary>,
    pub clamp_counts: BTreeMap<ModalityId, u64>,
    pub cache: CacheStats,
}

impl std::fmt::Display for ScrubSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Scrub Summary ===")?;
        writeln!(f, "Seeks: {}", self.total_seeks)?;
        writeln!(f, "Clamped resolutions: {}", self.total_clamped)?;
        writeln!(f, "Frame wait (ms): {}", self.frame_wait_ms)?;
        writeln!(f, "Failed frames: {}", self.failed_frames)?;
        writeln!(
            f,
            "Cache: {:.2}% hit rate ({} hits, {} joined, {} misses), {} decoded, {} failed, {} superseded, {} evicted",
            self.cache.hit_rate() * 100.0,
            self.cache.hits,
            self.cache.joined,
            self.cache.misses,
            self.cache.decodes_ok,
            self.cache.decodes_failed,
            self.cache.superseded,
            self.cache.evictions,
        )?;
        writeln!(
            f,
            "Cache size: {} entries, {} bytes, {} pinned",
            self.cache.entries, self.cache.bytes, self.cache.pinned
        )?;

        if !self.skew_ms.is_empty() {
            writeln!(f, "Skew to reference (ms):")?;
            for (id, stats) in &self.skew_ms {
                writeln!(f, "  {}: {}", id, stats)?;
            }
        }
        if !self.clamp_counts.is_empty() {
            writeln!(f, "Clamp counts:")?;
            for (id, count) in &self.clamp_counts {
                writeln!(f, "  {}: {}", id, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
