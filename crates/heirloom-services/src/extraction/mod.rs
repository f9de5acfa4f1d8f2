//! Extraction client
//!
//! Sends a merged letter PDF to a transcription service and returns whatever structured
//! data it produces. Callers treat the result as opaque JSON.

mod anthropic;

pub use anthropic::{AnthropicConfig, AnthropicExtractionClient};

use std::time::Duration;

use async_trait::async_trait;
use heirloom_core::AppError;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Extraction service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Extraction service returned no text")]
    EmptyResponse,

    #[error("Extraction service returned no data")]
    NoData,

    #[error("Extraction result is not valid JSON: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        AppError::Extraction(err.to_string())
    }
}

#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Transcribe `document` (PDF bytes) into structured data.
    async fn extract(&self, document: &[u8]) -> Result<Value, ExtractionError>;

    /// Service name for logs
    fn name(&self) -> &str;
}

/// Accept an extraction result only if it carries data: `null`, `{}` and `[]` are rejected.
pub fn require_data(value: Value) -> Result<Value, ExtractionError> {
    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Err(ExtractionError::NoData);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_data_rejects_empty_results() {
        assert!(matches!(require_data(Value::Null), Err(ExtractionError::NoData)));
        assert!(matches!(require_data(json!({})), Err(ExtractionError::NoData)));
        assert!(matches!(require_data(json!([])), Err(ExtractionError::NoData)));

        let value = require_data(json!({"content": "Dear Mother"})).unwrap();
        assert_eq!(value["content"], "Dear Mother");
        assert_eq!(require_data(json!("Dear Mother")).unwrap(), "Dear Mother");
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_precision() {
        let err = ExtractionError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Extraction timed out after 250ms");
    }
}
