//! # Frame Cache
//!
//! 视频帧解码缓存。
//!
//! 负责：
//! - 按 (模态, 帧号) 去重的异步解码请求
//! - 内存预算 + LRU 淘汰，固定 (pin) 的帧不会被淘汰
//! - 每个模态独立的解码队列，旧请求被新请求挤掉 (superseded)
//! - 外部抽帧工具 (ffmpeg / synthetic)
//!
//! ## 使用示例
//!
//! ```ignore
//! let cache = FrameCache::new(extractor, CacheOptions::from(&blueprint.cache), Some(events))?;
//! cache.register_source("camera_1", source);
//!
//! let ticket = cache.request(FrameKey::new("camera_1", 412));
//! let frame = ticket.pinned().await?;   // 渲染期间不会被淘汰
//! ```

mod cache;
pub mod error;
pub mod extractors;
mod metrics;
mod ticket;

pub use cache::{CacheBudget, CacheOptions, EntryState, FrameCache, LaneLimits};
pub use error::CacheError;
pub use extractors::{
    ConfiguredExtractor, FfmpegExtractor, SyntheticExtractor, VideoProbe, parse_probe, write_image,
};
pub use metrics::CacheMetrics;
pub use ticket::{EntryStatus, PinGuard, Ticket};

pub use contracts::{CacheStats, DecodedFrame, FrameExtractor, FrameKey, FrameSource};
