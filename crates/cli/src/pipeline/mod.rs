//! Session orchestration module.

mod session;
mod stats;

pub use session::{build_synchronizer, probe_videos, OffsetEdit, Session};
pub use stats::ScrubStats;
