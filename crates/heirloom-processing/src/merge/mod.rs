//! Merge engine
//!
//! Combines an ordered list of staged parts into one PDF. PDF parts contribute all their
//! pages in order; JPEG and PNG parts each become one page sized to the image's pixel
//! dimensions. Parts of any other kind, and images that fail to decode, are skipped with a
//! warning. A PDF part that cannot be parsed fails the whole merge.

mod pdf;
mod raster;

use heirloom_core::models::{MimeKind, SubmissionPart};
use heirloom_core::AppError;
use lopdf::{dictionary, Document, Object, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Part {index} ({key}) is not a readable PDF: {reason}")]
    CorruptPdf {
        index: usize,
        key: String,
        reason: String,
    },

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MergeError> for AppError {
    fn from(err: MergeError) -> Self {
        AppError::Merge(err.to_string())
    }
}

/// A part left out of the merged output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPart {
    pub index: usize,
    pub key: String,
    pub reason: String,
}

/// Serialized output of one merge.
#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub skipped: Vec<SkippedPart>,
}

impl MergedDocument {
    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merge `parts` in slice order. Never fails because of an unusable image or an
    /// unsupported kind; if every part is skipped the result is a valid document with
    /// no pages.
    pub fn merge(&self, parts: &[SubmissionPart]) -> Result<MergedDocument, MergeError> {
        let mut output = OutputDocument::new();
        let mut skipped = Vec::new();

        for part in parts {
            match part.mime_kind {
                MimeKind::Pdf => {
                    let added = output.append_pdf(&part.bytes).map_err(|e| {
                        MergeError::CorruptPdf {
                            index: part.sequence_index,
                            key: part.key.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    tracing::debug!(index = part.sequence_index, key = %part.key, pages = added, "Appended PDF part");
                }
                MimeKind::Jpeg | MimeKind::Png => {
                    if let Err(e) = output.append_image(&part.bytes) {
                        tracing::warn!(
                            index = part.sequence_index,
                            key = %part.key,
                            error = %e,
                            "Skipping undecodable image part"
                        );
                        skipped.push(SkippedPart {
                            index: part.sequence_index,
                            key: part.key.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                MimeKind::Other => {
                    tracing::warn!(
                        index = part.sequence_index,
                        key = %part.key,
                        "Skipping part of unsupported type"
                    );
                    skipped.push(SkippedPart {
                        index: part.sequence_index,
                        key: part.key.clone(),
                        reason: "unsupported type".to_string(),
                    });
                }
            }
        }

        let page_count = output.page_count();
        let bytes = output.finish()?;

        tracing::info!(
            parts = parts.len(),
            pages = page_count,
            skipped = skipped.len(),
            size_bytes = bytes.len(),
            "Merge completed"
        );

        Ok(MergedDocument {
            bytes,
            page_count,
            skipped,
        })
    }
}

/// Output document under construction. The page tree root is allocated up front so
/// appended pages can point at it; it is written by [`OutputDocument::finish`].
struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl OutputDocument {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn finish(mut self) -> Result<Vec<u8>, MergeError> {
        let kids: Vec<Object> = self.kids.iter().copied().map(Object::Reference).collect();
        let count = kids.len() as i64;

        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}
