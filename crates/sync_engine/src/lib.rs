//! # Sync Engine
//!
//! 多模态录制的时间同步核心。
//!
//! 负责：
//! - 每个模态的时间戳索引 (连续 / 突发采样)
//! - 共享 offset 表 (组绑定、原子批量恢复)
//! - 参考时刻 → 各模态样本索引
//! - 公共可播放区间 (truncation) 与加载时锚点
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::Synchronizer;
//! use contracts::ReferenceInstant;
//!
//! let sync = Synchronizer::builder()
//!     .reference("camera_1")
//!     .stream("camera_1", camera_series)
//!     .stream("imu", imu_series)
//!     .baseline_frame(100)
//!     .build()?;
//!
//! let t = sync.navigable().clamp(slider_value);
//! let resolution = sync.resolve(ReferenceInstant::Timestamp(t))?;
//! ```

mod engine;
mod offsets;
mod stream_index;
mod truncation;

// Re-exports
pub use engine::{Synchronizer, SynchronizerBuilder};
pub use offsets::{Applied, OffsetBatch, OffsetTable, OffsetUpdate, OffsetsRead};
pub use stream_index::StreamIndex;
pub use truncation::{compute_anchor, compute_coverage};

// Re-export contracts types
pub use contracts::{Anchor, Coverage, NavigableRange, ReferenceInstant, Resolution, ResolvedIndex};
