//! Message payloads.
//!
//! A message is a small JSON document sealed as a whole. Field names match the
//! web client so both sides read each other's messages.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// What `file` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Raw UTF-8 text.
    Text,
    /// `data:image/...;base64,` URL.
    Image,
    /// `data:video/...;base64,` URL.
    Video,
    /// `data:audio/...;base64,` URL.
    Audio,
}

/// The plaintext of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBlob {
    /// Content type of `file`.
    pub file_type: ContentType,
    /// Message body: text, or a data URL for media.
    pub file: String,
    /// ISO-8601 send time as written by the sender.
    pub timestamp: String,
}

impl MessageBlob {
    /// A text message.
    pub fn text(body: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            file_type: ContentType::Text,
            file: body.into(),
            timestamp: timestamp.into(),
        }
    }

    /// A text message stamped with the current time.
    pub fn text_now(body: impl Into<String>) -> Self {
        Self::text(body, iso_timestamp_now())
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Payload(e.to_string()))
    }

    /// Parse from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Payload(e.to_string()))
    }
}

/// The current UTC time in the web client's `toISOString` form,
/// e.g. `2025-01-01T00:00:00.000Z`.
pub fn iso_timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let blob = MessageBlob::text("hi", "2025-01-01T00:00:00.000Z");
        let json: serde_json::Value = serde_json::from_slice(&blob.to_json().unwrap()).unwrap();
        assert_eq!(json["file_type"], "text");
        assert_eq!(json["file"], "hi");
        assert_eq!(json["timestamp"], "2025-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_parses_web_client_blob() {
        let raw = br#"{"file_type":"image","file":"data:image/png;base64,AAAA","timestamp":"2025-06-01T12:00:00Z"}"#;
        let blob = MessageBlob::from_json(raw).unwrap();
        assert_eq!(blob.file_type, ContentType::Image);
        assert!(blob.file.starts_with("data:image/png"));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let raw = br#"{"file_type":"pdf","file":"x","timestamp":""}"#;
        assert!(matches!(MessageBlob::from_json(raw), Err(CodecError::Payload(_))));
    }

    #[test]
    fn test_timestamp_shape() {
        let stamp = iso_timestamp_now();
        assert_eq!(stamp.len(), 24);
        assert!(stamp.ends_with('Z'));
        assert_eq!(&stamp[10..11], "T");
        assert_eq!(MessageBlob::text_now("x").file_type, ContentType::Text);
    }
}
