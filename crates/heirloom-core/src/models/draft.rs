use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Status of a submission awaiting review.
///
/// `Processing` is never persisted by the pipeline; a run always ends in `Review` or `Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DraftStatus {
    Processing,
    Review,
    Error,
}

impl Display for DraftStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DraftStatus::Processing => write!(f, "PROCESSING"),
            DraftStatus::Review => write!(f, "REVIEW"),
            DraftStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for DraftStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(DraftStatus::Processing),
            "REVIEW" => Ok(DraftStatus::Review),
            "ERROR" => Ok(DraftStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid draft status: {}", s)),
        }
    }
}

/// Review-pending letter, one per upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub upload_id: String,
    pub status: DraftStatus,
    pub requester_id: String,
    /// Object key of the merged document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    /// Extraction result, present only in `REVIEW`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<serde_json::Value>,
    /// Failure message, present only in `ERROR`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn review(
        upload_id: impl Into<String>,
        requester_id: impl Into<String>,
        s3_key: impl Into<String>,
        parsed_data: serde_json::Value,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            status: DraftStatus::Review,
            requester_id: requester_id.into(),
            s3_key: Some(s3_key.into()),
            parsed_data: Some(parsed_data),
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        upload_id: impl Into<String>,
        requester_id: impl Into<String>,
        s3_key: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            status: DraftStatus::Error,
            requester_id: requester_id.into(),
            s3_key,
            parsed_data: None,
            error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}
