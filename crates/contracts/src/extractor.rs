//! FrameExtractor trait - external frame extraction
//!
//! The decode cache is the only caller. Implementations may block on a
//! subprocess or a decoder library; the cache runs them off the interactive path.

use crate::{ContractError, DecodedFrame, FrameSource, ModalityId};

/// Decodes one frame of a video source
///
/// # Example
///
/// ```ignore
/// let frame = extractor.extract_frame(&"camera_1".into(), &source, 300).await?;
/// assert!(frame.is_consistent());
/// ```
#[trait_variant::make(FrameExtractor: Send)]
pub trait LocalFrameExtractor {
    /// Extractor name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Decode `frame_index` of `source`
    ///
    /// # Errors
    /// `ContractError::DecodeFailure` when the file is unreadable, the index is
    /// past the file's real frame count, or the decode tool fails.
    async fn extract_frame(
        &self,
        modality_id: &ModalityId,
        source: &FrameSource,
        frame_index: usize,
    ) -> Result<DecodedFrame, ContractError>;
}
