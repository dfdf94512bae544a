//! Diff engine
//!
//! Two narrow capabilities sit behind traits so the comparison algorithms can
//! be swapped without touching resolve or capture code:
//! - [`TextDiffer`]: baseline text vs new text, as ordered segments
//! - [`ImageDiffer`]: two rasterized pages, as one highlight artifact

pub mod pixel;
pub mod text;

pub use self::pixel::{hash_file, ImageDiffer, PixelDiffSummary, PixelDiffer};
pub use self::text::{diff_text, DiffSegment, SegmentKind, TextDiff, TextDiffer, TokenDiffer};
