//! Heirloom Services
//!
//! Business workflows built on the storage, record store, and processing crates:
//!
//! - `extraction`: client for the transcription service
//! - `pipeline`: one ingestion run from staged parts to a REVIEW or ERROR draft
//! - `publish`: promotion of a draft into a versioned letter, plus edits and restores

pub mod extraction;
pub mod pipeline;
pub mod publish;

pub use extraction::{AnthropicExtractionClient, ExtractionClient, ExtractionError};
pub use pipeline::IngestionPipeline;
pub use publish::{PublishCoordinator, PublishRequest, PublishedLetter};
