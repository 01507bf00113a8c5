use burrow_core::{ChannelError, CoreError, ShortCode, UrlMapping};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message carries an invalid short code: {0}")]
    InvalidCode(#[from] CoreError),
}

/// Wire form of a pending mapping.
///
/// ```json
/// {"shortUrl":"aB3xY9kQ","originalUrl":"https://example.com/a","createdAt":"2024-05-01T10:00:00Z"}
/// ```
///
/// `createdAt` is optional when decoding; messages without it are stamped
/// with the time they are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMessage {
    pub short_url: String,
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl MappingMessage {
    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Validates the code and turns the message back into a mapping.
    pub fn into_mapping(self) -> Result<UrlMapping, MessageError> {
        Ok(UrlMapping {
            code: ShortCode::new(self.short_url)?,
            original_url: self.original_url,
            created_at: self.created_at.unwrap_or_else(Timestamp::now),
        })
    }
}

impl From<&UrlMapping> for MappingMessage {
    fn from(mapping: &UrlMapping) -> Self {
        Self {
            short_url: mapping.code.as_str().to_owned(),
            original_url: mapping.original_url.clone(),
            created_at: Some(mapping.created_at),
        }
    }
}

/// A message that could not be persisted, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub partition_key: String,
    pub payload: String,
    pub reason: String,
}

impl DeadLetter {
    pub fn encode(&self) -> Result<String, ChannelError> {
        serde_json::to_string(self).map_err(|e| ChannelError::Serialization(e.to_string()))
    }
}
