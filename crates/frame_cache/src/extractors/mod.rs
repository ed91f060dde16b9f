//! Frame extractors
//!
//! - `FfmpegExtractor`: real video files through the ffmpeg CLI
//! - `SyntheticExtractor`: generated frames for demos and tests

mod ffmpeg;
mod synthetic;

use std::path::Path;

use contracts::{
    ContractError, DecodedFrame, ExtractorConfig, ExtractorKind, FrameExtractor, FrameSource,
    ModalityId, PixelFormat,
};

pub use ffmpeg::{FfmpegExtractor, VideoProbe, parse_probe};
pub use synthetic::SyntheticExtractor;

/// Extractor selected by the session blueprint
#[derive(Debug)]
pub enum ConfiguredExtractor {
    Ffmpeg(FfmpegExtractor),
    Synthetic(SyntheticExtractor),
}

impl ConfiguredExtractor {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        match config.kind {
            ExtractorKind::Ffmpeg => Self::Ffmpeg(FfmpegExtractor::new(config)),
            ExtractorKind::Synthetic => {
                let (width, height) = config.synthetic_size;
                Self::Synthetic(
                    SyntheticExtractor::new(width, height).with_latency(
                        std::time::Duration::from_millis(config.synthetic_latency_ms),
                    ),
                )
            }
        }
    }
}

impl FrameExtractor for ConfiguredExtractor {
    fn name(&self) -> &str {
        match self {
            Self::Ffmpeg(e) => e.name(),
            Self::Synthetic(e) => e.name(),
        }
    }

    async fn extract_frame(
        &self,
        modality_id: &ModalityId,
        source: &FrameSource,
        frame_index: usize,
    ) -> Result<DecodedFrame, ContractError> {
        match self {
            Self::Ffmpeg(e) => e.extract_frame(modality_id, source, frame_index).await,
            Self::Synthetic(e) => e.extract_frame(modality_id, source, frame_index).await,
        }
    }
}

/// Write a decoded frame to disk; format follows the file extension
pub fn write_image(frame: &DecodedFrame, path: impl AsRef<Path>) -> std::io::Result<()> {
    let color = match frame.format {
        PixelFormat::Rgb8 => image::ColorType::Rgb8,
        PixelFormat::Rgba8 => image::ColorType::Rgba8,
        PixelFormat::Gray8 => image::ColorType::L8,
    };
    image::save_buffer(path, &frame.data, frame.width, frame.height, color)
        .map_err(std::io::Error::other)
}
