//! Data models
//!
//! Drafts and letters are the durable records; submissions are transient inputs of one
//! pipeline run.

mod draft;
mod letter;
mod submission;

pub use draft::*;
pub use letter::*;
pub use submission::*;
