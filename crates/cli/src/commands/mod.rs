//! Command implementations.

mod common;
mod info;
mod offsets;
mod resolve;
mod scrub;
mod validate;

pub use info::run_info;
pub use offsets::run_offsets;
pub use resolve::run_resolve;
pub use scrub::run_scrub;
pub use validate::run_validate;
