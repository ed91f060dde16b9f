//! Cache counters for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::CacheStats;

/// Lock-free request/decode counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    requests: AtomicU64,
    hits: AtomicU64,
    joined: AtomicU64,
    misses: AtomicU64,
    decodes_ok: AtomicU64,
    decodes_failed: AtomicU64,
    superseded: AtomicU64,
    evictions: AtomicU64,
}

/// How a request was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Hit,
    Joined,
    Miss,
}

impl RequestKind {
    fn label(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Joined => "joined",
            Self::Miss => "miss",
        }
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self, kind: RequestKind) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            RequestKind::Hit => &self.hits,
            RequestKind::Joined => &self.joined,
            RequestKind::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("scrubsync_cache_requests_total", "result" => kind.label()).increment(1);
    }

    pub(crate) fn record_decode(&self, ok: bool, seconds: f64) {
        let (counter, status) = if ok {
            (&self.decodes_ok, "ok")
        } else {
            (&self.decodes_failed, "failed")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("scrubsync_decodes_total", "status" => status).increment(1);
        ::metrics::histogram!("scrubsync_decode_seconds").record(seconds);
    }

    pub(crate) fn inc_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("scrubsync_decodes_superseded_total").increment(1);
    }

    pub(crate) fn inc_evictions(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("scrubsync_cache_evictions_total").increment(1);
    }

    /// Counter part of a snapshot; gauges are filled in by the cache
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decodes_ok: self.decodes_ok.load(Ordering::Relaxed),
            decodes_failed: self.decodes_failed.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
