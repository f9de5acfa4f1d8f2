//! Heirloom Processing Library
//!
//! Turns the raw parts of one upload into a single PDF:
//!
//! - `stager`: lists and orders an upload's parts and fetches them
//! - `mime`: content sniffing for staged parts
//! - `merge`: appends PDF pages and image pages into one output document

pub mod merge;
pub mod mime;
pub mod stager;

pub use merge::{MergeEngine, MergeError, MergedDocument, SkippedPart};
pub use mime::detect_mime_kind;
pub use stager::{order_parts, ObjectStager};
