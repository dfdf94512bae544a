//! shotdiff Common Library
//!
//! Shared data model, wire protocol and diff engine for the shotdiff
//! snapshot regression workflow.

pub mod diff;
pub mod error;
pub mod markup;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use diff::{diff_text, ImageDiffer, PixelDiffer, TextDiff, TextDiffer, TokenDiffer};
pub use error::{Error, Result};
pub use types::*;

/// shotdiff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
