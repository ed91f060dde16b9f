//! Resolution - Synchronizer output
//!
//! Per-modality indices for one reference instant, coverage windows and the
//! load-time anchor.

use serde::{Deserialize, Serialize};

use crate::ModalityId;

/// A navigation event from the reference clock source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceInstant {
    /// Instant on the reference timeline
    Timestamp(f64),

    /// Frame index on the reference stream
    Frame(usize),
}

/// Resolved index of one modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIndex {
    pub modality_id: ModalityId,

    /// Nearest-sample index before the offset is applied
    pub base_index: usize,

    /// Offset in effect (samples of this modality)
    pub offset: i64,

    /// `base_index + offset` before clamping; may be negative or past the end
    pub requested: i64,

    /// Final index, always in `[0, len - 1]`
    pub index: usize,

    /// Instant of `index` on this modality's own timeline
    pub instant: f64,

    /// Whether `requested` had to be clamped
    pub clamped: bool,
}

/// Synchronizer answer for one reference instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Reference instant the lookup ran for
    pub instant: f64,

    /// Reference frame index nearest to `instant`
    pub reference_index: usize,

    /// One entry per available modality, reference included
    pub indices: Vec<ResolvedIndex>,
}

impl Resolution {
    pub fn get(&self, modality_id: &str) -> Option<&ResolvedIndex> {
        self.indices.iter().find(|r| r.modality_id == modality_id)
    }

    pub fn index_of(&self, modality_id: &str) -> Option<usize> {
        self.get(modality_id).map(|r| r.index)
    }
}

/// Instant range one modality actually covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSpan {
    pub modality_id: ModalityId,
    pub first_instant: f64,
    pub last_instant: f64,
}

/// Truncated sample bounds of one modality, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidRange {
    pub start_index: usize,
    pub end_index: usize,
}

impl ValidRange {
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        (self.start_index..=self.end_index).contains(&index)
    }

    /// Number of samples in the range (never zero)
    #[inline]
    pub fn count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Slider range on the reference timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavigableRange {
    /// `t_lo`: latest first instant across modalities
    pub lo: f64,

    /// `t_hi`: earliest last instant across modalities
    pub hi: f64,

    /// Reference frame index of `lo`
    pub start_index: usize,

    /// Reference frame index of `hi`
    pub end_index: usize,
}

impl NavigableRange {
    #[inline]
    pub fn contains(&self, instant: f64) -> bool {
        instant >= self.lo && instant <= self.hi
    }

    /// Clamp an instant into the range before handing it to the Synchronizer
    #[inline]
    pub fn clamp(&self, instant: f64) -> f64 {
        instant.clamp(self.lo, self.hi)
    }

    /// Clamp a reference frame index into the range
    #[inline]
    pub fn clamp_frame(&self, frame: usize) -> usize {
        frame.clamp(self.start_index, self.end_index)
    }

    pub fn frames(&self) -> ValidRange {
        ValidRange {
            start_index: self.start_index,
            end_index: self.end_index,
        }
    }
}

/// Common playable window, computed once at load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coverage {
    pub navigable: NavigableRange,

    /// Per-modality coverage that produced the intersection
    pub spans: Vec<CoverageSpan>,

    /// Per-modality truncated bounds, ignoring offsets
    pub ranges: Vec<(ModalityId, ValidRange)>,
}

impl Coverage {
    pub fn range_of(&self, modality_id: &str) -> Option<ValidRange> {
        self.ranges
            .iter()
            .find(|(id, _)| id == &modality_id)
            .map(|(_, r)| *r)
    }
}

/// Index of one modality at the anchor instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub modality_id: ModalityId,
    pub index: usize,
    pub instant: f64,
}

/// Load-time reference alignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    /// Reference frame the anchor sits on (after clamping to the stream length)
    pub reference_frame: usize,

    /// Instant of `reference_frame`
    pub instant: f64,

    pub points: Vec<AnchorPoint>,
}

/// A modality that failed to load or build; the session continues without it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedModality {
    pub modality_id: ModalityId,
    pub reason: String,
}

/// Decode cache counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// `request` calls
    pub requests: u64,
    /// Requests that found a ready or failed entry
    pub hits: u64,
    /// Requests that joined a pending entry
    pub joined: u64,
    /// Requests that created a new entry
    pub misses: u64,
    pub decodes_ok: u64,
    pub decodes_failed: u64,
    /// Queued decodes dropped before they started
    pub superseded: u64,
    pub evictions: u64,
    /// Current entry count
    pub entries: u64,
    /// Current payload bytes
    pub bytes: u64,
    /// Current pinned entries
    pub pinned: u64,
}

impl CacheStats {
    /// Share of requests served without starting a decode
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.hits + self.joined) as f64 / self.requests as f64
        }
    }
}
