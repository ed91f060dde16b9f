//! Synchronizer: reference instant → per-modality indices.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{
    Anchor, ContractError, Coverage, DegradedModality, ModalityId, NavigableRange,
    ReferenceInstant, ResolvedIndex, Resolution, TimestampSeries, ValidRange,
};
use tracing::{debug, info, instrument, warn};

use crate::offsets::{OffsetTable, OffsetsRead};
use crate::stream_index::StreamIndex;
use crate::truncation::{compute_anchor, compute_coverage};

const DEFAULT_BASELINE_FRAME: usize = 100;

/// Builder collecting the loaded streams of one session
#[derive(Debug, Default)]
pub struct SynchronizerBuilder {
    reference: Option<ModalityId>,
    series: Vec<(ModalityId, TimestampSeries)>,
    degraded: Vec<DegradedModality>,
    offsets: Option<Arc<OffsetTable>>,
    baseline_frame: Option<usize>,
}

impl SynchronizerBuilder {
    pub fn reference(mut self, modality_id: impl Into<ModalityId>) -> Self {
        self.reference = Some(modality_id.into());
        self
    }

    pub fn stream(mut self, modality_id: impl Into<ModalityId>, series: TimestampSeries) -> Self {
        self.series.push((modality_id.into(), series));
        self
    }

    /// Modality that already failed upstream (e.g. unreadable file)
    pub fn degraded(mut self, failure: DegradedModality) -> Self {
        self.degraded.push(failure);
        self
    }

    /// Shared offset table; defaults to an ungrouped table over the streams
    pub fn offsets(mut self, offsets: Arc<OffsetTable>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn baseline_frame(mut self, frame: usize) -> Self {
        self.baseline_frame = Some(frame);
        self
    }

    /// Build every stream index, then the coverage window and anchor
    ///
    /// A stream that fails to build is reported as degraded and left out.
    ///
    /// # Errors
    /// - `ReferenceUnavailable` when the reference stream is missing or malformed
    /// - `NoOverlappingCoverage` when the remaining streams share no window
    #[instrument(name = "synchronizer_build", skip(self), fields(streams = self.series.len()))]
    pub fn build(self) -> Result<Synchronizer, ContractError> {
        let reference_id = self.reference.ok_or_else(|| {
            ContractError::config_validation("reference", "no reference modality given")
        })?;

        let mut degraded = self.degraded;
        let mut streams = Vec::with_capacity(self.series.len());
        for (modality_id, series) in self.series {
            match StreamIndex::build(modality_id.clone(), series) {
                Ok(index) => {
                    debug!(
                        modality_id = %modality_id,
                        encoding = index.encoding_name(),
                        len = index.len(),
                        first = index.first_instant(),
                        last = index.last_instant(),
                        "stream index built"
                    );
                    streams.push(index);
                }
                Err(e) => {
                    warn!(modality_id = %modality_id, error = %e, "stream index rejected");
                    metrics::counter!("scrubsync_degraded_modalities_total").increment(1);
                    degraded.push(DegradedModality {
                        modality_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let Some(reference_pos) = streams.iter().position(|s| s.modality_id() == &reference_id)
        else {
            let message = degraded
                .iter()
                .find(|d| d.modality_id == reference_id)
                .map(|d| d.reason.clone())
                .unwrap_or_else(|| "no timestamps supplied".to_string());
            return Err(ContractError::ReferenceUnavailable {
                modality_id: reference_id,
                message,
            });
        };

        let reference = &streams[reference_pos];
        let coverage = compute_coverage(reference, &streams)?;
        let anchor = compute_anchor(
            reference,
            &streams,
            self.baseline_frame.unwrap_or(DEFAULT_BASELINE_FRAME),
        )?;

        let offsets = self.offsets.unwrap_or_else(|| {
            Arc::new(OffsetTable::new(
                streams.iter().map(|s| s.modality_id().clone()),
            ))
        });

        let positions = streams
            .iter()
            .enumerate()
            .map(|(i, s)| (s.modality_id().clone(), i))
            .collect();

        info!(
            reference = %reference_id,
            modalities = streams.len(),
            degraded = degraded.len(),
            t_lo = coverage.navigable.lo,
            t_hi = coverage.navigable.hi,
            frames = ?(coverage.navigable.start_index, coverage.navigable.end_index),
            anchor_frame = anchor.reference_frame,
            "synchronizer ready"
        );

        Ok(Synchronizer {
            reference_pos,
            streams,
            positions,
            offsets,
            coverage,
            anchor,
            degraded,
        })
    }
}

/// Single source of truth from reference timeline to local indices
///
/// Coverage and anchor are computed once at build; offsets are re-read on
/// every query.
#[derive(Debug)]
pub struct Synchronizer {
    reference_pos: usize,
    streams: Vec<StreamIndex>,
    positions: HashMap<ModalityId, usize>,
    offsets: Arc<OffsetTable>,
    coverage: Coverage,
    anchor: Anchor,
    degraded: Vec<DegradedModality>,
}

impl Synchronizer {
    pub fn builder() -> SynchronizerBuilder {
        SynchronizerBuilder::default()
    }

    pub fn reference(&self) -> &StreamIndex {
        &self.streams[self.reference_pos]
    }

    pub fn reference_id(&self) -> &ModalityId {
        self.reference().modality_id()
    }

    /// Available streams in load order
    pub fn streams(&self) -> &[StreamIndex] {
        &self.streams
    }

    pub fn stream(&self, modality_id: &str) -> Option<&StreamIndex> {
        self.positions.get(modality_id).map(|&i| &self.streams[i])
    }

    pub fn modality_ids(&self) -> impl Iterator<Item = &ModalityId> {
        self.streams.iter().map(StreamIndex::modality_id)
    }

    pub fn offsets(&self) -> &Arc<OffsetTable> {
        &self.offsets
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn navigable(&self) -> NavigableRange {
        self.coverage.navigable
    }

    /// Truncated sample bounds of one modality
    pub fn valid_range(&self, modality_id: &str) -> Option<ValidRange> {
        self.coverage.range_of(modality_id)
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn degraded(&self) -> &[DegradedModality] {
        &self.degraded
    }

    /// Turn a clock-source event into a reference instant and frame
    ///
    /// # Errors
    /// `ReferenceOutOfRange` / `ReferenceFrameOutOfRange` outside the navigable range.
    pub fn locate(&self, at: ReferenceInstant) -> Result<(f64, usize), ContractError> {
        let nav = self.coverage.navigable;
        match at {
            ReferenceInstant::Timestamp(t) => {
                if !nav.contains(t) {
                    return Err(ContractError::ReferenceOutOfRange {
                        instant: t,
                        lo: nav.lo,
                        hi: nav.hi,
                    });
                }
                Ok((t, self.reference().resolve_index(t)))
            }
            ReferenceInstant::Frame(frame) => {
                if !nav.frames().contains(frame) {
                    return Err(ContractError::ReferenceFrameOutOfRange {
                        frame,
                        start_index: nav.start_index,
                        end_index: nav.end_index,
                    });
                }
                Ok((self.reference().instant_at(frame)?, frame))
            }
        }
    }

    /// Resolve every available modality at one reference instant
    #[instrument(level = "trace", name = "synchronizer_resolve", skip(self))]
    pub fn resolve(&self, at: ReferenceInstant) -> Result<Resolution, ContractError> {
        let (instant, reference_index) = self.locate(at)?;

        let view = self.offsets.read();
        let indices = self
            .streams
            .iter()
            .map(|s| resolve_in(s, instant, &view))
            .collect::<Result<Vec<_>, _>>()?;
        drop(view);

        metrics::counter!("scrubsync_resolutions_total").increment(1);
        Ok(Resolution {
            instant,
            reference_index,
            indices,
        })
    }

    /// Re-resolve only `modality_ids` at an already-validated instant
    ///
    /// Used after an offset edit; the reference instant does not move.
    pub fn resolve_modalities(
        &self,
        instant: f64,
        modality_ids: &[ModalityId],
    ) -> Result<Vec<ResolvedIndex>, ContractError> {
        let view = self.offsets.read();
        modality_ids
            .iter()
            .filter_map(|id| match self.stream(id) {
                Some(stream) => Some(resolve_in(stream, instant, &view)),
                // bound to a group but degraded at load
                None if self.is_degraded(id) => None,
                None => Some(Err(ContractError::UnknownModality {
                    modality_id: id.clone(),
                })),
            })
            .collect()
    }

    /// Resolve one modality at an already-validated instant
    pub fn resolve_one(&self, modality_id: &str, instant: f64) -> Result<ResolvedIndex, ContractError> {
        let stream = self
            .stream(modality_id)
            .ok_or_else(|| ContractError::UnknownModality {
                modality_id: modality_id.into(),
            })?;
        resolve_in(stream, instant, &self.offsets.read())
    }

    fn is_degraded(&self, modality_id: &str) -> bool {
        self.degraded.iter().any(|d| d.modality_id == modality_id)
    }
}

fn resolve_in(
    stream: &StreamIndex,
    instant: f64,
    offsets: &OffsetsRead<'_>,
) -> Result<ResolvedIndex, ContractError> {
    let base_index = stream.resolve_index(instant);
    let applied = offsets.apply(stream.modality_id(), base_index, stream.len());
    if applied.clamped {
        metrics::counter!("scrubsync_offset_clamped_total").increment(1);
        debug!(
            modality_id = %stream.modality_id(),
            requested = applied.requested,
            index = applied.index,
            "offset clamped to stream bounds"
        );
    }

    Ok(ResolvedIndex {
        modality_id: stream.modality_id().clone(),
        base_index,
        offset: applied.offset,
        requested: applied.requested,
        index: applied.index,
        instant: stream.instant_at(applied.index)?,
        clamped: applied.clamped,
    })
}
