//! SessionBlueprint - Config Loader 输出
//!
//! 描述一次标注会话：参考流、各模态的时间戳来源与视频源、共享 offset 组、
//! 解码缓存预算以及外部抽帧工具。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::ModalityKind;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的会话配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 会话设置
    #[validate(nested)]
    pub session: SessionConfig,

    /// 模态列表，恰好一个 `reference = true`
    #[validate(length(min = 1), nested)]
    pub modalities: Vec<ModalityConfig>,

    /// 共享 offset 组 (e.g. skeleton 与 IMU 共用一个 offset)
    #[serde(default)]
    #[validate(nested)]
    pub offset_groups: Vec<OffsetGroupConfig>,

    /// 解码缓存预算
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// 外部抽帧工具
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

impl SessionBlueprint {
    /// 参考模态 (校验后必然存在)
    pub fn reference(&self) -> Option<&ModalityConfig> {
        self.modalities.iter().find(|m| m.reference)
    }

    pub fn modality(&self, id: &str) -> Option<&ModalityConfig> {
        self.modalities.iter().find(|m| m.id == id)
    }

    /// 模态所属的共享组
    pub fn group_of(&self, modality_id: &str) -> Option<&OffsetGroupConfig> {
        self.offset_groups
            .iter()
            .find(|g| g.members.iter().any(|m| m == modality_id))
    }

    /// 把相对路径解析到配置文件所在目录
    pub fn resolve_paths(&mut self, base_dir: &std::path::Path) {
        for modality in &mut self.modalities {
            if let TimestampSourceConfig::File { path } = &mut modality.timestamps {
                if path.is_relative() {
                    *path = base_dir.join(&*path);
                }
            }
            if let Some(video) = &mut modality.video {
                if video.path.is_relative() {
                    video.path = base_dir.join(&video.path);
                }
            }
        }
    }
}

/// 会话设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// 会话名称
    #[validate(length(min = 1))]
    pub name: String,

    /// 对齐锚点：参考流上的第几帧 (保证所有模态此时都已开始记录)
    #[serde(default = "default_baseline_frame")]
    pub baseline_frame: usize,
}

fn default_baseline_frame() -> usize {
    100
}

/// 模态配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModalityConfig {
    /// 唯一标识符
    #[validate(length(min = 1))]
    pub id: String,

    /// 模态类型
    pub kind: ModalityKind,

    /// 是否为参考流 (主时钟)
    #[serde(default)]
    pub reference: bool,

    /// 时间戳来源
    pub timestamps: TimestampSourceConfig,

    /// 视频源 (camera / gaze 必填)
    #[serde(default)]
    #[validate(nested)]
    pub video: Option<VideoConfig>,
}

/// 时间戳来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimestampSourceConfig {
    /// JSON 时间戳文件 (`TimestampSeries` 格式)
    File { path: PathBuf },

    /// 确定性合成流 (演示/测试用)
    Synthetic(SyntheticStreamConfig),
}

/// 合成时间戳流参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SyntheticStreamConfig {
    /// 采样频率 (Hz)，必须 > 0
    #[validate(range(exclusive_min = 0.0))]
    pub rate_hz: f64,

    /// 第一个样本的时刻 (秒)
    #[serde(default)]
    pub start: f64,

    /// 时长 (秒)，必须 > 0
    #[validate(range(exclusive_min = 0.0))]
    pub duration: f64,

    /// 每个样本的均匀抖动幅度 (秒)
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub jitter: f64,

    /// 随机丢样比例
    #[serde(default)]
    #[validate(range(min = 0.0, max = 0.95))]
    pub drop_ratio: f64,

    /// 突发采样形态；缺省为连续流
    #[serde(default)]
    #[validate(nested)]
    pub burst: Option<BurstShape>,

    /// 随机种子
    #[serde(default)]
    pub seed: u64,
}

/// 突发采样形态：每 `samples` 个样本后停顿 `gap` 秒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct BurstShape {
    #[validate(range(min = 1))]
    pub samples: usize,

    #[validate(range(min = 0.0))]
    pub gap: f64,
}

/// 视频源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VideoConfig {
    /// 视频文件路径
    pub path: PathBuf,

    /// 标称帧率，必须 > 0
    #[validate(range(exclusive_min = 0.0))]
    pub fps: f64,

    /// 文件中实际帧数 (未知时由 ffprobe 探测或留空)
    #[serde(default)]
    pub frame_count: Option<usize>,
}

/// 共享 offset 组
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OffsetGroupConfig {
    /// 组标识符，与模态 id 同一命名空间
    #[validate(length(min = 1))]
    pub id: String,

    /// 绑定的模态
    #[validate(length(min = 1))]
    pub members: Vec<String>,
}

/// 解码缓存预算
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CacheConfig {
    /// 解码帧总字节上限
    #[serde(default = "default_max_bytes")]
    #[validate(range(min = 1))]
    pub max_bytes: u64,

    /// 缓存条目上限
    #[serde(default = "default_max_entries")]
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// 每个模态同时进行的解码数上限
    #[serde(default = "default_max_in_flight")]
    #[validate(range(min = 1))]
    pub max_in_flight_per_modality: usize,

    /// 每个模态排队等待解码的请求上限 (超出丢弃最旧的)
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// seek 后预取的邻近帧半径
    #[serde(default = "default_prefetch_radius")]
    pub prefetch_radius: usize,
}

fn default_max_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_max_entries() -> usize {
    512
}

fn default_max_in_flight() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    8
}

fn default_prefetch_radius() -> usize {
    2
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_entries: default_max_entries(),
            max_in_flight_per_modality: default_max_in_flight(),
            queue_capacity: default_queue_capacity(),
            prefetch_radius: default_prefetch_radius(),
        }
    }
}

/// 抽帧工具类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    #[default]
    Ffmpeg,
    Synthetic,
}

/// 外部抽帧工具配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub kind: ExtractorKind,

    /// ffmpeg 可执行文件
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// ffprobe 可执行文件
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,

    /// 硬件解码 (传给 `-hwaccel`, e.g. "cuda", "videotoolbox")
    #[serde(default)]
    pub hwaccel: Option<String>,

    /// 合成抽帧的图像尺寸
    #[serde(default = "default_synthetic_size")]
    pub synthetic_size: (u32, u32),

    /// 合成抽帧的人为延迟 (毫秒)
    #[serde(default)]
    pub synthetic_latency_ms: u64,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_synthetic_size() -> (u32, u32) {
    (64, 48)
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::default(),
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            hwaccel: None,
            synthetic_size: default_synthetic_size(),
            synthetic_latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_TOML: &str = r#"
[session]
name = "walk_trial_03"

[[modalities]]
id = "camera_1"
kind = "camera"
reference = true
timestamps = { type = "file", path = "ts/camera_1.json" }
video = { path = "video/camera_1.mp4", fps = 30.0 }

[[modalities]]
id = "imu"
kind = "imu"
timestamps = { type = "synthetic", rate_hz = 100.0, duration = 60.0, seed = 7 }

[[offset_groups]]
id = "skeleton_imu_shared"
members = ["imu"]
"#;

    #[test]
    fn test_defaults_fill_in() {
        let bp: SessionBlueprint = toml::from_str(SESSION_TOML).unwrap();
        assert_eq!(bp.session.baseline_frame, 100);
        assert_eq!(bp.cache.queue_capacity, 8);
        assert_eq!(bp.extractor.kind, ExtractorKind::Ffmpeg);
        assert_eq!(bp.reference().unwrap().id, "camera_1");
        assert_eq!(bp.group_of("imu").unwrap().id, "skeleton_imu_shared");
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_resolve_paths_against_config_dir() {
        let mut bp: SessionBlueprint = toml::from_str(SESSION_TOML).unwrap();
        bp.resolve_paths(std::path::Path::new("/data/trial"));

        let cam = bp.modality("camera_1").unwrap();
        assert_eq!(
            cam.timestamps,
            TimestampSourceConfig::File {
                path: PathBuf::from("/data/trial/ts/camera_1.json")
            }
        );
        assert_eq!(
            cam.video.as_ref().unwrap().path,
            PathBuf::from("/data/trial/video/camera_1.mp4")
        );
    }

    #[test]
    fn test_derive_validation_rejects_zero_fps() {
        let mut bp: SessionBlueprint = toml::from_str(SESSION_TOML).unwrap();
        bp.modalities[0].video.as_mut().unwrap().fps = 0.0;
        assert!(bp.validate().is_err());
    }
}
