//! TimestampSeries - Recording File Reader 输出
//!
//! 每个模态的时间戳序列（连续采样或突发采样）。

use serde::{Deserialize, Serialize};

/// 模态类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalityKind {
    /// 视频相机 (帧由外部解码器提取)
    Camera,
    /// 眼动相机
    Gaze,
    /// 惯性传感器
    Imu,
    /// 压力鞋垫
    Insole,
    /// 3-D 骨架轨迹
    Skeleton,
    /// 肌电 (突发采样)
    Emg,
    /// 其他派生轨迹
    Other,
}

impl ModalityKind {
    /// Whether samples of this modality are decoded video frames
    pub fn is_video(self) -> bool {
        matches!(self, Self::Camera | Self::Gaze)
    }
}

/// 一次突发采样
///
/// 每个样本的时间 = `start + k * period`, `k ∈ [0, samples)`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Burst {
    /// 突发起始时间
    pub start: f64,

    /// 突发内样本数
    pub samples: usize,

    /// 突发内采样间隔
    pub period: f64,
}

impl Burst {
    /// Instant of the `k`-th sample inside this burst
    #[inline]
    pub fn instant(&self, k: usize) -> f64 {
        self.start + k as f64 * self.period
    }

    /// Instant of the last sample (equals `start` for single-sample bursts)
    #[inline]
    pub fn last_instant(&self) -> f64 {
        self.instant(self.samples.saturating_sub(1))
    }
}

/// 时间戳序列
///
/// 连续流每个样本一个时间戳；突发流仅记录每次突发，样本时间按需推导。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum TimestampSeries {
    /// 每个样本/帧一个时间戳
    Continuous { timestamps: Vec<f64> },

    /// 突发区间序列
    Burst { bursts: Vec<Burst> },
}

impl TimestampSeries {
    /// Total number of samples the series describes
    pub fn sample_count(&self) -> usize {
        match self {
            Self::Continuous { timestamps } => timestamps.len(),
            Self::Burst { bursts } => bursts.iter().map(|b| b.samples).sum(),
        }
    }

    /// Short label for logs
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Self::Continuous { .. } => "continuous",
            Self::Burst { .. } => "burst",
        }
    }
}
