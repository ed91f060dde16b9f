//! Bounded frame decode cache.
//!
//! One mutex guards entries, LRU order, byte accounting and the per-modality
//! decode lanes. Decodes run on tokio tasks, never under the lock.
//!
//! Each modality has a lane: a bounded queue of frame indices waiting for
//! decode plus a count of drainer tasks. Drainers take the newest queued
//! index first; when the queue overflows, the oldest queued request is
//! dropped and its tickets resolve `Superseded`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use contracts::{
    CacheConfig, CacheStats, DecodeOutcome, DecodedFrame, FrameExtractor, FrameKey, FrameSource,
    ModalityId, SessionEvent,
};
use indexmap::IndexSet;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use crate::error::CacheError;
use crate::metrics::{CacheMetrics, RequestKind};
use crate::ticket::{EntryStatus, PinGuard, Ticket};

/// Memory budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    pub max_bytes: u64,
    pub max_entries: usize,
}

/// Per-modality decode limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneLimits {
    /// Concurrent decodes per modality
    pub max_in_flight: usize,
    /// Queued, not yet started decodes per modality
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub budget: CacheBudget,
    pub lanes: LaneLimits,
}

impl From<&CacheConfig> for CacheOptions {
    fn from(config: &CacheConfig) -> Self {
        Self {
            budget: CacheBudget {
                max_bytes: config.max_bytes,
                max_entries: config.max_entries,
            },
            lanes: LaneLimits {
                max_in_flight: config.max_in_flight_per_modality.max(1),
                queue_capacity: config.queue_capacity.max(1),
            },
        }
    }
}

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Ready,
    Failed,
}

struct Entry {
    status: watch::Sender<EntryStatus>,
    state: EntryState,
    pins: usize,
    bytes: usize,
}

struct Lane {
    source: Arc<FrameSource>,
    queue: VecDeque<usize>,
    active: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<FrameKey, Entry>,
    /// Front is least recently used
    lru: IndexSet<FrameKey>,
    total_bytes: usize,
    lanes: HashMap<ModalityId, Lane>,
}

/// State shared by the cache handle, tickets, pins and drainers
pub(crate) struct Shared {
    state: Mutex<CacheState>,
    metrics: CacheMetrics,
    options: CacheOptions,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn over_budget(&self, state: &CacheState) -> bool {
        state.total_bytes as u64 > self.options.budget.max_bytes
            || state.entries.len() > self.options.budget.max_entries
    }

    /// Least recently used unpinned failed entry, else ready entry
    fn pick_victim(state: &CacheState) -> Option<FrameKey> {
        let evictable = |wanted: EntryState| {
            state.lru.iter().find(|key| {
                state
                    .entries
                    .get(*key)
                    .is_some_and(|e| e.state == wanted && e.pins == 0)
            })
        };
        evictable(EntryState::Failed)
            .or_else(|| evictable(EntryState::Ready))
            .cloned()
    }

    fn evict_to_budget(&self, state: &mut CacheState) {
        while self.over_budget(state) {
            let Some(victim) = Self::pick_victim(state) else {
                // everything left is pending or pinned
                break;
            };
            if let Some(entry) = remove_entry(state, &victim) {
                trace!(key = %victim, bytes = entry.bytes, state = ?entry.state, "evicted");
                self.metrics.inc_evictions();
            }
        }
        ::metrics::gauge!("scrubsync_cache_bytes").set(state.total_bytes as f64);
        ::metrics::gauge!("scrubsync_cache_entries").set(state.entries.len() as f64);
    }

    fn supersede(&self, state: &mut CacheState, key: FrameKey) {
        if let Some(entry) = remove_entry(state, &key) {
            entry
                .status
                .send_replace(EntryStatus::Failed(CacheError::Superseded { key: key.clone() }));
            debug!(key = %key, "queued decode superseded");
            self.metrics.inc_superseded();
        }
    }

    /// Next queued index for a drainer, newest first; retires the drainer when empty
    fn next_job(&self, modality_id: &ModalityId) -> Option<(usize, Arc<FrameSource>)> {
        let mut guard = self.lock();
        let lane = guard.lanes.get_mut(modality_id)?;
        match lane.queue.pop_back() {
            Some(index) => Some((index, Arc::clone(&lane.source))),
            None => {
                lane.active -= 1;
                None
            }
        }
    }

    fn complete(
        &self,
        key: &FrameKey,
        result: Result<DecodedFrame, CacheError>,
        started: Instant,
    ) {
        let ok = result.is_ok();
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(key) else {
                warn!(key = %key, "decode finished for an entry that no longer exists");
                return;
            };

            let outcome = match result {
                Ok(frame) => {
                    let bytes = frame.byte_len();
                    entry.state = EntryState::Ready;
                    entry.bytes = bytes;
                    entry.status.send_replace(EntryStatus::Ready(Arc::new(frame)));
                    state.total_bytes += bytes;
                    DecodeOutcome::Ready { bytes }
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "decode failed");
                    entry.state = EntryState::Failed;
                    let message = err.to_string();
                    entry.status.send_replace(EntryStatus::Failed(err));
                    DecodeOutcome::Failed { message }
                }
            };
            self.evict_to_budget(state);
            outcome
        };

        self.metrics
            .record_decode(ok, started.elapsed().as_secs_f64());
        if let Some(events) = &self.events {
            // no subscribers is fine
            let _ = events.send(SessionEvent::DecodeCompleted {
                key: key.clone(),
                outcome,
            });
        }
    }

    /// Pin `key` if it still holds exactly `frame`
    pub(crate) fn pin_resolved(&self, key: &FrameKey, frame: &Arc<DecodedFrame>) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        let same = matches!(&*entry.status.borrow(), EntryStatus::Ready(f) if Arc::ptr_eq(f, frame));
        if !same {
            return false;
        }
        entry.pins += 1;
        touch(&mut state.lru, key);
        true
    }

    pub(crate) fn unpin(&self, key: &FrameKey) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.pins = entry.pins.saturating_sub(1);
            touch(&mut state.lru, key);
        }
        self.evict_to_budget(state);
    }
}

fn touch(lru: &mut IndexSet<FrameKey>, key: &FrameKey) {
    if lru.shift_remove(key) {
        lru.insert(key.clone());
    }
}

fn remove_entry(state: &mut CacheState, key: &FrameKey) -> Option<Entry> {
    let entry = state.entries.remove(key)?;
    state.lru.shift_remove(key);
    state.total_bytes -= entry.bytes;
    Some(entry)
}

/// Frame decode cache
///
/// Cheap to clone; clones share the same entries and lanes. `request` never
/// blocks on a decode and may be called from threads outside the runtime.
pub struct FrameCache<E> {
    shared: Arc<Shared>,
    extractor: Arc<E>,
    runtime: Handle,
}

impl<E> Clone for FrameCache<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            extractor: Arc::clone(&self.extractor),
            runtime: self.runtime.clone(),
        }
    }
}

impl<E> FrameCache<E>
where
    E: FrameExtractor + Sync + 'static,
{
    /// Create a cache; must be called inside a tokio runtime
    ///
    /// Decode completions are broadcast on `events` when given.
    pub fn new(
        extractor: E,
        options: CacheOptions,
        events: Option<broadcast::Sender<SessionEvent>>,
    ) -> Result<Self, CacheError> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        debug!(
            extractor = extractor.name(),
            max_bytes = options.budget.max_bytes,
            max_entries = options.budget.max_entries,
            max_in_flight = options.lanes.max_in_flight,
            queue_capacity = options.lanes.queue_capacity,
            "frame cache created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                metrics: CacheMetrics::new(),
                options,
                events,
            }),
            extractor: Arc::new(extractor),
            runtime,
        })
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Register (or replace) the video source of a modality
    pub fn register_source(&self, modality_id: impl Into<ModalityId>, source: FrameSource) {
        let modality_id = modality_id.into();
        let mut guard = self.shared.lock();
        match guard.lanes.get_mut(&modality_id) {
            Some(lane) => lane.source = Arc::new(source),
            None => {
                guard.lanes.insert(
                    modality_id,
                    Lane {
                        source: Arc::new(source),
                        queue: VecDeque::new(),
                        active: 0,
                    },
                );
            }
        }
    }

    pub fn has_source(&self, modality_id: &str) -> bool {
        self.shared.lock().lanes.contains_key(modality_id)
    }

    /// Ask for a decoded frame; returns immediately
    ///
    /// An existing entry in any state is joined, so one key is decoded at
    /// most once while it stays cached.
    pub fn request(&self, key: FrameKey) -> Ticket {
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        if let Some(entry) = state.entries.get(&key) {
            let kind = if entry.state == EntryState::Pending {
                RequestKind::Joined
            } else {
                RequestKind::Hit
            };
            let rx = entry.status.subscribe();
            if kind == RequestKind::Hit {
                touch(&mut state.lru, &key);
            }
            drop(guard);
            self.shared.metrics.record_request(kind);
            return Ticket::new(key, rx, Arc::clone(&self.shared));
        }

        let Some(lane) = state.lanes.get_mut(&key.modality_id) else {
            drop(guard);
            let err = CacheError::UnknownModality {
                modality_id: key.modality_id.clone(),
            };
            return Ticket::failed(key, err, Arc::clone(&self.shared));
        };

        let limits = self.shared.options.lanes;
        lane.queue.push_back(key.frame_index);
        let superseded = if lane.queue.len() > limits.queue_capacity {
            lane.queue.pop_front()
        } else {
            None
        };
        let spawn_drainer = lane.active < limits.max_in_flight;
        if spawn_drainer {
            lane.active += 1;
        }

        let (tx, rx) = watch::channel(EntryStatus::Pending);
        state.entries.insert(
            key.clone(),
            Entry {
                status: tx,
                state: EntryState::Pending,
                pins: 0,
                bytes: 0,
            },
        );
        state.lru.insert(key.clone());

        if let Some(frame_index) = superseded {
            self.shared.supersede(
                state,
                FrameKey {
                    modality_id: key.modality_id.clone(),
                    frame_index,
                },
            );
        }
        self.shared.evict_to_budget(state);
        drop(guard);

        self.shared.metrics.record_request(RequestKind::Miss);
        trace!(key = %key, spawn_drainer, "decode queued");
        if spawn_drainer {
            self.spawn_drainer(key.modality_id.clone());
        }
        Ticket::new(key, rx, Arc::clone(&self.shared))
    }

    /// Pin a ready entry; `None` when absent, pending or failed
    pub fn pin(&self, key: &FrameKey) -> Option<PinGuard> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let entry = state.entries.get_mut(key)?;
        let frame = match &*entry.status.borrow() {
            EntryStatus::Ready(frame) => Arc::clone(frame),
            _ => return None,
        };
        entry.pins += 1;
        touch(&mut state.lru, key);
        drop(guard);
        Some(PinGuard::new(Arc::clone(&self.shared), key.clone(), frame))
    }

    pub fn state_of(&self, key: &FrameKey) -> Option<EntryState> {
        self.shared.lock().entries.get(key).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from least to most recently used
    pub fn lru_order(&self) -> Vec<FrameKey> {
        self.shared.lock().lru.iter().cloned().collect()
    }

    /// Drop every unpinned ready/failed entry; returns how many were removed
    pub fn clear(&self) -> usize {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let victims: Vec<FrameKey> = state
            .entries
            .iter()
            .filter(|(_, e)| e.state != EntryState::Pending && e.pins == 0)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &victims {
            remove_entry(state, key);
        }
        victims.len()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.shared.metrics.snapshot();
        let guard = self.shared.lock();
        stats.entries = guard.entries.len() as u64;
        stats.bytes = guard.total_bytes as u64;
        stats.pinned = guard.entries.values().filter(|e| e.pins > 0).count() as u64;
        stats
    }

    fn spawn_drainer(&self, modality_id: ModalityId) {
        let cache = self.clone();
        self.runtime.spawn(cache.drain(modality_id));
    }

    async fn drain(self, modality_id: ModalityId) {
        while let Some((frame_index, source)) = self.shared.next_job(&modality_id) {
            let key = FrameKey {
                modality_id: modality_id.clone(),
                frame_index,
            };
            let started = Instant::now();

            // own task, so a panicking extractor fails the entry instead of wedging the lane
            let extractor = Arc::clone(&self.extractor);
            let id = modality_id.clone();
            let job = tokio::spawn(async move {
                extractor.extract_frame(&id, &source, frame_index).await
            });
            let result = match job.await {
                Ok(Ok(frame)) => Ok(frame),
                Ok(Err(err)) => Err(CacheError::from_extractor(&key, err)),
                Err(join) => Err(CacheError::Decode {
                    key: key.clone(),
                    message: format!("extractor task failed: {join}"),
                }),
            };
            self.shared.complete(&key, result, started);
        }
    }
}
