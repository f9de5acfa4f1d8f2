//! Anthropic Messages API extraction client

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use heirloom_core::Config;
use serde::{Deserialize, Serialize};

use super::{ExtractionClient, ExtractionError};

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

const EXTRACTION_PROMPT: &str = "This PDF is a scanned handwritten or typed family letter. \
Transcribe it and respond with a single JSON object with these fields:\n\
- content: the full transcribed text, preserving paragraph breaks\n\
- date: the date written on the letter in YYYY-MM-DD form, or null if absent\n\
- author: who signed the letter, or null\n\
- recipient: who the letter is addressed to, or null\n\
- location: where the letter was written, or null\n\
- title: a short descriptive title\n\
- illegible_sections: number of passages you could not read\n\
Respond with JSON only.";

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub base_url: String,
}

impl Debug for AnthropicConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AnthropicConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicConfig {
    pub fn from_config(config: &Config) -> Result<Self, ExtractionError> {
        let api_key = config
            .anthropic_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ExtractionError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        Ok(Self {
            api_key,
            model: config.extraction_model.clone(),
            max_tokens: config.extraction_max_tokens,
            timeout: Duration::from_secs(config.extraction_timeout_secs),
            base_url: API_BASE.to_string(),
        })
    }
}

pub struct AnthropicExtractionClient {
    http_client: reqwest::Client,
    config: AnthropicConfig,
}

impl Debug for AnthropicExtractionClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AnthropicExtractionClient")
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
    Document { source: DocumentSource },
}

#[derive(Debug, Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl AnthropicExtractionClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, ExtractionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ExtractionError> {
        Self::new(AnthropicConfig::from_config(config)?)
    }
}

/// Pull the JSON object out of a reply that may wrap it in a markdown fence.
pub(crate) fn parse_extraction_result(text: &str) -> Result<serde_json::Value, ExtractionError> {
    let json_text = if text.contains("```json") {
        text.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
            .trim()
    } else if text.contains("```") {
        text.split("```").nth(1).unwrap_or(text).trim()
    } else {
        text.trim()
    };

    Ok(serde_json::from_str(json_text)?)
}

#[async_trait]
impl ExtractionClient for AnthropicExtractionClient {
    async fn extract(&self, document: &[u8]) -> Result<serde_json::Value, ExtractionError> {
        let start = Instant::now();
        let data = base64::engine::general_purpose::STANDARD.encode(document);

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![MessageParam {
                role: "user",
                content: vec![
                    ContentBlock::Document {
                        source: DocumentSource {
                            source_type: "base64",
                            media_type: "application/pdf",
                            data,
                        },
                    },
                    ContentBlock::Text {
                        text: EXTRACTION_PROMPT,
                    },
                ],
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = status.as_u16(), "Extraction request failed");
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .ok_or(ExtractionError::EmptyResponse)?;

        let result = parse_extraction_result(&text)?;

        tracing::info!(
            model = %self.config.model,
            document_bytes = document.len(),
            input_tokens = parsed.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = parsed.usage.as_ref().map(|u| u.output_tokens),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Extraction completed"
        );

        Ok(result)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let value = parse_extraction_result(r#"  {"content": "Dear Mother", "date": null} "#).unwrap();
        assert_eq!(value["content"], "Dear Mother");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "Here is the transcription:\n```json\n{\"author\": \"Walter\"}\n```\nDone.";
        let value = parse_extraction_result(text).unwrap();
        assert_eq!(value["author"], "Walter");
    }

    #[test]
    fn test_parse_bare_fence() {
        let value = parse_extraction_result("```\n{\"title\": \"Home\"}\n```").unwrap();
        assert_eq!(value["title"], "Home");
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_extraction_result("I could not read this letter.").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse(_)));
    }

    #[test]
    fn test_request_uses_document_block() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            messages: vec![MessageParam {
                role: "user",
                content: vec![ContentBlock::Document {
                    source: DocumentSource {
                        source_type: "base64",
                        media_type: "application/pdf",
                        data: "JVBERi0=".to_string(),
                    },
                }],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        let block = &value["messages"][0]["content"][0];
        assert_eq!(block["type"], "document");
        assert_eq!(block["source"]["type"], "base64");
        assert_eq!(block["source"]["media_type"], "application/pdf");
    }

    #[test]
    fn test_config_requires_api_key() {
        let config = Config {
            environment: "test".to_string(),
            storage_backend: heirloom_core::StorageBackend::Local,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            aws_region: None,
            local_storage_path: Some("/tmp".to_string()),
            local_storage_base_url: Some("http://localhost".to_string()),
            record_store_backend: heirloom_core::RecordStoreBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            db_timeout_seconds: 1,
            anthropic_api_key: Some(String::new()),
            extraction_model: "claude-sonnet-4-20250514".to_string(),
            extraction_max_tokens: 1024,
            extraction_timeout_secs: 30,
            staging_fetch_concurrency: 1,
            max_part_size_bytes: 1024,
        };
        assert!(matches!(
            AnthropicConfig::from_config(&config),
            Err(ExtractionError::Config(_))
        ));
    }
}
