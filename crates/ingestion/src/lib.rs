//! # Ingestion
//!
//! Recording File Reader.
//!
//! Responsibilities:
//! - Read each modality's timestamp series from JSON files
//!   (continuous or burst-encoded)
//! - Generate deterministic synthetic streams for demos and tests
//! - Isolate per-modality load failures into a degraded report
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::load_streams;
//!
//! let report = load_streams(&blueprint);
//! for failure in &report.failures {
//!     eprintln!("{} degraded: {}", failure.modality_id, failure.reason);
//! }
//! ```

mod error;
mod loader;
mod reader;
mod synthetic;

// Re-exports
pub use error::{IngestionError, Result};
pub use loader::{load_modality, load_streams, LoadReport, LoadedStream};
pub use reader::{parse_timestamps, read_timestamps_file};
pub use synthetic::generate as generate_synthetic;
