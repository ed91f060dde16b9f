//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Every modality records on its own clock; instants are `f64` on a shared
//!   reference timeline (seconds in configs, any unit consistent per session)
//! - Sample/frame indices are `usize`; offsets are signed sample counts of the
//!   owning modality

mod blueprint;
mod error;
mod events;
mod extractor;
mod frame;
mod modality_id;
mod stream;
mod sync;

pub use blueprint::*;
pub use error::*;
pub use events::*;
pub use extractor::{FrameExtractor, LocalFrameExtractor};
pub use frame::*;
pub use modality_id::{InvalidName, ModalityId};
pub use stream::*;
pub use sync::*;
