//! Tickets and pins handed out by the cache.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use contracts::{DecodedFrame, FrameKey};
use tokio::sync::watch;

use crate::cache::Shared;
use crate::error::CacheError;

/// Value published on an entry's watch channel
#[derive(Debug, Clone)]
pub enum EntryStatus {
    Pending,
    Ready(Arc<DecodedFrame>),
    Failed(CacheError),
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Pending resolution of one `request`
///
/// Every ticket for the same key observes the same terminal state.
pub struct Ticket {
    key: FrameKey,
    rx: watch::Receiver<EntryStatus>,
    shared: Arc<Shared>,
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.key)
            .field("status", &*self.rx.borrow())
            .finish()
    }
}

impl Ticket {
    pub(crate) fn new(key: FrameKey, rx: watch::Receiver<EntryStatus>, shared: Arc<Shared>) -> Self {
        Self { key, rx, shared }
    }

    /// Ticket that is already failed
    pub(crate) fn failed(key: FrameKey, err: CacheError, shared: Arc<Shared>) -> Self {
        let (_tx, rx) = watch::channel(EntryStatus::Failed(err));
        Self { key, rx, shared }
    }

    pub fn key(&self) -> &FrameKey {
        &self.key
    }

    /// Current status without waiting
    pub fn peek(&self) -> EntryStatus {
        self.rx.borrow().clone()
    }

    /// Wait for the entry to become ready or failed
    pub async fn resolve(mut self) -> Result<Arc<DecodedFrame>, CacheError> {
        let status = match self.rx.wait_for(EntryStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => return Err(CacheError::Abandoned { key: self.key }),
        };
        match status {
            EntryStatus::Ready(frame) => Ok(frame),
            EntryStatus::Failed(err) => Err(err),
            EntryStatus::Pending => Err(CacheError::Abandoned { key: self.key }),
        }
    }

    /// Wait for the frame and pin it for rendering
    pub async fn pinned(self) -> Result<PinGuard, CacheError> {
        let shared = Arc::clone(&self.shared);
        let key = self.key.clone();
        let frame = self.resolve().await?;
        let registered = shared.pin_resolved(&key, &frame);
        Ok(PinGuard {
            shared,
            key,
            frame,
            registered,
        })
    }
}

/// Scoped pin: the entry cannot be evicted until this guard drops
///
/// Dropping unpins and refreshes the entry's recency. When the entry was
/// evicted between resolution and pinning the guard still owns the frame, it
/// just has nothing to unpin.
pub struct PinGuard {
    shared: Arc<Shared>,
    key: FrameKey,
    frame: Arc<DecodedFrame>,
    registered: bool,
}

impl PinGuard {
    pub(crate) fn new(shared: Arc<Shared>, key: FrameKey, frame: Arc<DecodedFrame>) -> Self {
        Self {
            shared,
            key,
            frame,
            registered: true,
        }
    }

    pub fn key(&self) -> &FrameKey {
        &self.key
    }

    pub fn frame(&self) -> &Arc<DecodedFrame> {
        &self.frame
    }
}

impl Deref for PinGuard {
    type Target = DecodedFrame;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl fmt::Debug for PinGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinGuard")
            .field("key", &self.key)
            .field("registered", &self.registered)
            .finish()
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if self.registered {
            self.shared.unpin(&self.key);
        }
    }
}
