//! Session - glues loading, synchronization, offsets and the frame cache.
//!
//! The session owns the current reference instant. A seek resolves every
//! modality and requests their frames; an offset edit re-resolves only the
//! modalities it affects, at the same instant. Every change is broadcast as a
//! `SessionEvent`.

use std::sync::Arc;

use config_loader::OffsetsRecord;
use contracts::{
    ContractError, FrameKey, FrameSource, ModalityId, ReferenceInstant, Resolution,
    ResolvedIndex, SessionBlueprint, SessionEvent,
};
use frame_cache::{CacheOptions, FfmpegExtractor, FrameCache, FrameExtractor, Ticket};
use sync_engine::{OffsetBatch, OffsetTable, OffsetUpdate, Synchronizer};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// Build the synchronizer for a blueprint: load every stream, bind offset groups
///
/// Modalities that fail to load are carried as degraded; a failing reference
/// is fatal.
#[instrument(skip(blueprint), fields(session = %blueprint.session.name))]
pub fn build_synchronizer(blueprint: &SessionBlueprint) -> Result<Synchronizer, ContractError> {
    let reference = blueprint
        .reference()
        .ok_or_else(|| ContractError::config_validation("modalities", "no reference modality"))?;

    let report = ingestion::load_streams(blueprint);
    let offsets = Arc::new(OffsetTable::from_blueprint(blueprint)?);

    let mut builder = Synchronizer::builder()
        .reference(reference.id.as_str())
        .offsets(offsets)
        .baseline_frame(blueprint.session.baseline_frame);
    for stream in report.streams {
        builder = builder.stream(stream.modality_id, stream.series);
    }
    for failure in report.failures {
        builder = builder.degraded(failure);
    }
    builder.build()
}

/// Fill in missing video frame counts with ffprobe
///
/// Probe failures only warn; the extractor then reports out-of-range frames
/// as decode failures.
pub async fn probe_videos(blueprint: &mut SessionBlueprint, extractor: &FfmpegExtractor) {
    for modality in &mut blueprint.modalities {
        let Some(video) = modality.video.as_mut() else {
            continue;
        };
        if video.frame_count.is_some() {
            continue;
        }
        match extractor.probe(&video.path).await {
            Ok(probe) => {
                debug!(
                    modality_id = %modality.id,
                    width = probe.width,
                    height = probe.height,
                    fps = probe.fps,
                    frames = probe.frame_count,
                    "video probed"
                );
                video.frame_count = Some(probe.frame_count);
            }
            Err(e) => {
                warn!(modality_id = %modality.id, error = %e, "video probe failed");
            }
        }
    }
}

/// Result of one seek
#[derive(Debug)]
pub struct Seek {
    pub resolution: Resolution,
    /// Primary frame of every video modality, in resolution order
    pub frames: Vec<Ticket>,
}

/// Result of one offset edit
#[derive(Debug)]
pub struct OffsetEdit {
    pub affected: Vec<ModalityId>,
    /// Re-resolved indices at the current instant (empty before the first seek)
    pub resolved: Vec<ResolvedIndex>,
    pub frames: Vec<Ticket>,
}

/// One open recording session
pub struct Session<E> {
    sync: Synchronizer,
    cache: FrameCache<E>,
    events: broadcast::Sender<SessionEvent>,
    current: Option<Resolution>,
    prefetch_radius: usize,
    fetch_frames: bool,
}

impl<E> Session<E>
where
    E: FrameExtractor + Sync + 'static,
{
    /// Open a session; must be called inside a tokio runtime
    pub fn open(blueprint: &SessionBlueprint, extractor: E) -> Result<Self, ContractError> {
        let sync = build_synchronizer(blueprint)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cache = FrameCache::new(
            extractor,
            CacheOptions::from(&blueprint.cache),
            Some(events.clone()),
        )?;

        for modality in &blueprint.modalities {
            let Some(video) = &modality.video else {
                continue;
            };
            if sync.stream(&modality.id).is_none() {
                // degraded, nothing will ever resolve to it
                continue;
            }
            cache.register_source(
                modality.id.as_str(),
                FrameSource {
                    path: video.path.clone(),
                    fps: video.fps,
                    frame_count: video.frame_count,
                },
            );
        }

        info!(
            session = %blueprint.session.name,
            modalities = sync.streams().len(),
            degraded = sync.degraded().len(),
            extractor = cache.extractor().name(),
            "session opened"
        );

        Ok(Self {
            sync,
            cache,
            events,
            current: None,
            prefetch_radius: blueprint.cache.prefetch_radius,
            fetch_frames: true,
        })
    }

    /// Resolve indices only, never touch the decoder
    pub fn without_frames(mut self) -> Self {
        self.fetch_frames = false;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn offsets(&self) -> &Arc<OffsetTable> {
        self.sync.offsets()
    }

    pub fn cache(&self) -> &FrameCache<E> {
        &self.cache
    }

    /// Resolution at the current reference instant
    pub fn current(&self) -> Option<&Resolution> {
        self.current.as_ref()
    }

    /// Move the reference instant
    pub fn seek(&mut self, at: ReferenceInstant) -> Result<Seek, ContractError> {
        let resolution = self.sync.resolve(at)?;
        self.emit(SessionEvent::ReferenceChanged {
            instant: resolution.instant,
            reference_index: resolution.reference_index,
        });
        observability::record_resolution(&resolution);

        let frames = self.request_frames(&resolution.indices);
        self.current = Some(resolution.clone());
        Ok(Seek { resolution, frames })
    }

    pub fn set_offset(&mut self, key: &ModalityId, value: i64) -> Result<OffsetEdit, ContractError> {
        let update = self.sync.offsets().set(key, value)?;
        self.after_update(update)
    }

    pub fn nudge_offset(&mut self, key: &ModalityId, delta: i64) -> Result<OffsetEdit, ContractError> {
        let update = self.sync.offsets().nudge(key, delta)?;
        self.after_update(update)
    }

    pub fn reset_offset(&mut self, key: &ModalityId) -> Result<OffsetEdit, ContractError> {
        let update = self.sync.offsets().reset(key)?;
        self.after_update(update)
    }

    pub fn reset_all_offsets(&mut self) -> Result<OffsetEdit, ContractError> {
        let batch = self.sync.offsets().reset_all();
        self.after_batch(batch)
    }

    /// Replace every offset with the persisted record's values
    pub fn restore(&mut self, record: &OffsetsRecord) -> Result<OffsetEdit, ContractError> {
        let batch = self.sync.offsets().restore(record.batch());
        self.after_batch(batch)
    }

    /// Current offsets as a persistable record
    pub fn record(&self, annotations: serde_json::Value) -> OffsetsRecord {
        OffsetsRecord::from_offsets(self.sync.offsets().snapshot(), annotations)
    }

    fn after_update(&mut self, update: OffsetUpdate) -> Result<OffsetEdit, ContractError> {
        observability::record_offset_change(&update.key, update.value);
        self.emit(SessionEvent::OffsetChanged {
            key: update.key.clone(),
            value: update.value,
            affected: update.affected.clone(),
        });
        self.refresh(update.affected)
    }

    fn after_batch(&mut self, batch: OffsetBatch) -> Result<OffsetEdit, ContractError> {
        let offsets = Arc::clone(self.sync.offsets());
        for modality_id in &batch.affected {
            let key = offsets.owner_key(modality_id).clone();
            let value = offsets.get(&key);
            observability::record_offset_change(&key, value);
            self.emit(SessionEvent::OffsetChanged {
                key,
                value,
                affected: vec![modality_id.clone()],
            });
        }
        self.refresh(batch.affected)
    }

    /// Re-resolve `affected` at the current instant and patch the current resolution
    fn refresh(&mut self, affected: Vec<ModalityId>) -> Result<OffsetEdit, ContractError> {
        let Some(instant) = self.current.as_ref().map(|c| c.instant) else {
            return Ok(OffsetEdit {
                affected,
                resolved: Vec::new(),
                frames: Vec::new(),
            });
        };

        let resolved = self.sync.resolve_modalities(instant, &affected)?;
        let frames = self.request_frames(&resolved);
        if let Some(current) = self.current.as_mut() {
            for fresh in &resolved {
                if let Some(slot) = current
                    .indices
                    .iter_mut()
                    .find(|r| r.modality_id == fresh.modality_id)
                {
                    *slot = fresh.clone();
                }
            }
        }

        Ok(OffsetEdit {
            affected,
            resolved,
            frames,
        })
    }

    /// Request the frame of every resolved video modality plus its prefetch window
    ///
    /// Prefetch requests go in first: drainers take the newest request, so the
    /// primary frame is decoded before its neighbours.
    fn request_frames(&self, indices: &[ResolvedIndex]) -> Vec<Ticket> {
        if !self.fetch_frames {
            return Vec::new();
        }

        let mut tickets = Vec::new();
        for resolved in indices {
            if !self.cache.has_source(&resolved.modality_id) {
                continue;
            }
            let len = self.sync.stream(&resolved.modality_id).map_or(0, |s| s.len());
            for distance in (1..=self.prefetch_radius).rev() {
                let around = [
                    resolved.index.checked_add(distance),
                    resolved.index.checked_sub(distance),
                ];
                for index in around.into_iter().flatten().filter(|i| *i < len) {
                    // dropping the ticket does not cancel the decode
                    drop(self.cache.request(FrameKey::new(resolved.modality_id.clone(), index)));
                }
            }
            tickets.push(
                self.cache
                    .request(FrameKey::new(resolved.modality_id.clone(), resolved.index)),
            );
        }
        tickets
    }

    fn emit(&self, event: SessionEvent) {
        debug!(kind = event.kind(), "session event");
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
