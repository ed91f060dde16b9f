//! 合成时间戳流
//!
//! 用于无录制文件环境的演示和测试。相同的参数与种子总是产生相同的序列。

use contracts::{Burst, ModalityId, SyntheticStreamConfig, TimestampSeries};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{IngestionError, Result};

/// 按配置生成时间戳序列
pub fn generate(modality_id: &ModalityId, config: &SyntheticStreamConfig) -> Result<TimestampSeries> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let period = 1.0 / config.rate_hz;
    let nominal = (config.duration * config.rate_hz).floor() as usize + 1;

    let series = match config.burst {
        None => TimestampSeries::Continuous {
            timestamps: continuous(&mut rng, config, period, nominal),
        },
        Some(shape) => TimestampSeries::Burst {
            bursts: bursts(&mut rng, config, period, nominal, shape.samples, shape.gap),
        },
    };

    if series.sample_count() == 0 {
        return Err(IngestionError::EmptySynthetic {
            modality_id: modality_id.clone(),
            message: format!(
                "rate_hz={} duration={} drop_ratio={}",
                config.rate_hz, config.duration, config.drop_ratio
            ),
        });
    }

    debug!(
        modality_id = %modality_id,
        encoding = series.encoding_name(),
        samples = series.sample_count(),
        seed = config.seed,
        "synthetic timestamps generated"
    );
    Ok(series)
}

fn continuous(
    rng: &mut StdRng,
    config: &SyntheticStreamConfig,
    period: f64,
    nominal: usize,
) -> Vec<f64> {
    // 抖动不超过半个周期，保证单调
    let jitter = config.jitter.min(period * 0.5);
    let mut timestamps = Vec::with_capacity(nominal);
    let mut last = f64::NEG_INFINITY;

    for i in 0..nominal {
        if i > 0 && config.drop_ratio > 0.0 && rng.random_bool(config.drop_ratio) {
            continue;
        }
        let mut t = config.start + i as f64 * period;
        if jitter > 0.0 {
            t += rng.random_range(-jitter..=jitter);
        }
        let t = t.max(last);
        timestamps.push(t);
        last = t;
    }
    timestamps
}

fn bursts(
    rng: &mut StdRng,
    config: &SyntheticStreamConfig,
    period: f64,
    nominal: usize,
    samples: usize,
    gap: f64,
) -> Vec<Burst> {
    let burst_count = nominal.div_ceil(samples);
    let stride = samples as f64 * period + gap;
    let jitter = config.jitter.min(gap * 0.5);
    let mut out = Vec::with_capacity(burst_count);
    let mut min_start = f64::NEG_INFINITY;

    for b in 0..burst_count {
        if b > 0 && config.drop_ratio > 0.0 && rng.random_bool(config.drop_ratio) {
            continue;
        }
        let mut start = config.start + b as f64 * stride;
        if jitter > 0.0 {
            start += rng.random_range(-jitter..=jitter);
        }
        let start = start.max(min_start);
        let burst = Burst {
            start,
            samples: samples.min(nominal - b * samples),
            period,
        };
        min_start = burst.last_instant() + period;
        out.push(burst);
    }
    out
}
