//! Decoded video frames and the keys they are cached under.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ModalityId;

/// Cache key: one frame of one video modality
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey {
    pub modality_id: ModalityId,
    pub frame_index: usize,
}

impl FrameKey {
    pub fn new(modality_id: impl Into<ModalityId>, frame_index: usize) -> Self {
        Self {
            modality_id: modality_id.into(),
            frame_index,
        }
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.modality_id, self.frame_index)
    }
}

/// Pixel layout of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// Decoded image plus presentation metadata
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed pixel rows
    pub data: Bytes,
}

impl DecodedFrame {
    /// Bytes this frame occupies in the cache budget
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Whether `data` matches `width * height * bytes_per_pixel`
    pub fn is_consistent(&self) -> bool {
        self.data.len()
            == self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Where the frames of a video modality come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSource {
    /// Video file path
    pub path: PathBuf,

    /// Nominal frame rate, used to turn frame indices into seek times
    pub fps: f64,

    /// Frames actually present in the file, when known
    #[serde(default)]
    pub frame_count: Option<usize>,
}

impl FrameSource {
    /// Seek position (seconds into the file) of `frame_index`
    #[inline]
    pub fn seek_seconds(&self, frame_index: usize) -> f64 {
        if self.fps > 0.0 {
            frame_index as f64 / self.fps
        } else {
            0.0
        }
    }
}
