use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Editable content of a letter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LetterContent {
    pub title: String,
    pub author: String,
    pub content: String,
}

/// Immutable snapshot written on every publish, edit, or restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LetterVersion {
    pub date: String,
    /// Sortable timestamp, also the version's sort key segment
    pub timestamp: String,
    #[serde(flatten)]
    pub body: LetterContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    /// Draft this version was published from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_upload_id: Option<String>,
    /// Timestamp of the version whose content was restored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Current pointer of a letter.
///
/// Carries a copy of the referenced version's content so reading a letter is one lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    pub date: String,
    /// Timestamp of the version this pointer references
    pub current_version: String,
    #[serde(flatten)]
    pub body: LetterContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Letter {
    /// Pointer referencing `version`. `created_at` is kept from the previous pointer, if any.
    pub fn pointing_at(version: &LetterVersion, previous: Option<&Letter>) -> Self {
        Self {
            date: version.date.clone(),
            current_version: version.timestamp.clone(),
            body: version.body.clone(),
            pdf_key: version
                .pdf_key
                .clone()
                .or_else(|| previous.and_then(|p| p.pdf_key.clone())),
            created_at: previous.map_or(version.created_at, |p| p.created_at),
            updated_at: version.created_at,
            updated_by: version.editor.clone(),
        }
    }
}
