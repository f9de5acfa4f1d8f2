use serde::{Deserialize, Serialize};

/// Kind of a staged part, decided from its content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    Pdf,
    Jpeg,
    Png,
    Other,
}

impl MimeKind {
    pub fn is_image(&self) -> bool {
        matches!(self, MimeKind::Jpeg | MimeKind::Png)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MimeKind::Pdf => "application/pdf",
            MimeKind::Jpeg => "image/jpeg",
            MimeKind::Png => "image/png",
            MimeKind::Other => "application/octet-stream",
        }
    }
}

/// One raw part of a submission, in merge order.
#[derive(Debug, Clone)]
pub struct SubmissionPart {
    pub sequence_index: usize,
    pub key: String,
    pub bytes: Vec<u8>,
    pub mime_kind: MimeKind,
}

/// Ordered raw parts sharing one upload.
#[derive(Debug, Clone)]
pub struct SubmissionBatch {
    pub upload_id: String,
    pub requester_id: String,
    pub parts: Vec<SubmissionPart>,
}

impl SubmissionBatch {
    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(|p| p.bytes.len()).sum()
    }
}
