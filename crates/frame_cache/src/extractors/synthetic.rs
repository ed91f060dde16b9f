//! Synthetic extractor: deterministic gradient frames, no external tools.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    ContractError, DecodedFrame, FrameExtractor, FrameSource, ModalityId, PixelFormat,
};

/// Generates an RGB gradient whose blue channel encodes the frame index
#[derive(Debug)]
pub struct SyntheticExtractor {
    width: u32,
    height: u32,
    latency: Duration,
    failing: HashSet<usize>,
    calls: AtomicU64,
}

impl SyntheticExtractor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            latency: Duration::ZERO,
            failing: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Sleep this long per frame to mimic a real decoder
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Frame indices that always fail to decode
    pub fn with_failing(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Number of `extract_frame` invocations so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Bytes of one generated frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * PixelFormat::Rgb8.bytes_per_pixel()
    }

    fn render(&self, frame_index: usize) -> DecodedFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let span = |n: usize| n.saturating_sub(1).max(1);
        let mut data = Vec::with_capacity(self.frame_bytes());
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / span(w)) as u8);
                data.push((y * 255 / span(h)) as u8);
                data.push((frame_index % 256) as u8);
            }
        }
        DecodedFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb8,
            data: Bytes::from(data),
        }
    }
}

impl FrameExtractor for SyntheticExtractor {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn extract_frame(
        &self,
        modality_id: &ModalityId,
        source: &FrameSource,
        frame_index: usize,
    ) -> Result<DecodedFrame, ContractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(count) = source.frame_count {
            if frame_index >= count {
                return Err(ContractError::decode(
                    modality_id.clone(),
                    frame_index,
                    format!("frame index beyond the file's {count} frames"),
                ));
            }
        }
        if self.failing.contains(&frame_index) {
            return Err(ContractError::decode(
                modality_id.clone(),
                frame_index,
                "synthetic decode failure",
            ));
        }
        Ok(self.render(frame_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(frame_count: Option<usize>) -> FrameSource {
        FrameSource {
            path: PathBuf::from("synthetic.mp4"),
            fps: 30.0,
            frame_count,
        }
    }

    #[tokio::test]
    async fn test_frames_encode_their_index() {
        let extractor = SyntheticExtractor::new(4, 3);
        let frame = extractor
            .extract_frame(&"cam".into(), &source(None), 258)
            .await
            .unwrap();
        assert!(frame.is_consistent());
        assert_eq!(frame.byte_len(), extractor.frame_bytes());
        assert_eq!(frame.data[2], 2);
        assert_eq!(frame.data[frame.data.len() - 3], 255);
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures() {
        let extractor = SyntheticExtractor::new(2, 2).with_failing([7]);
        let err = extractor
            .extract_frame(&"cam".into(), &source(None), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::DecodeFailure { frame_index: 7, .. }));

        let err = extractor
            .extract_frame(&"cam".into(), &source(Some(10)), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("beyond"));
    }
}
