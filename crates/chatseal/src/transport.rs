//! Blob transport for sealed messages.
//!
//! Envelopes travel through a content-addressed blob store that only sees
//! bytes. Each upload is framed in the same JSON shape as a message payload
//! with `file_type` fixed to `text`, so the real content type stays inside
//! the ciphertext.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chatseal_core::{CodecError, MessageBlob, MessageEnvelope};

use crate::error::Result;

/// Identifier the blob store returns for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte-in, byte-out blob storage.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Store `blob` and return its identifier.
    async fn upload(&self, blob: Bytes) -> Result<BlobId>;

    /// Fetch a previously stored blob.
    async fn download(&self, id: &BlobId) -> Result<Bytes>;
}

#[async_trait]
impl<T: BlobTransport + ?Sized> BlobTransport for Arc<T> {
    async fn upload(&self, blob: Bytes) -> Result<BlobId> {
        (**self).upload(blob).await
    }

    async fn download(&self, id: &BlobId) -> Result<Bytes> {
        (**self).download(id).await
    }
}

/// Wrap an envelope for upload.
pub fn frame_envelope(envelope: &MessageEnvelope) -> Result<Bytes> {
    let outer = MessageBlob::text_now(envelope.encode());
    Ok(Bytes::from(outer.to_json()?))
}

/// Extract the envelope from a downloaded blob.
///
/// Accepts the framed JSON form and a bare base64 envelope.
pub fn unframe_envelope(blob: &[u8]) -> Result<MessageEnvelope> {
    let text = std::str::from_utf8(blob)
        .map_err(|_| CodecError::MalformedEnvelope("blob is not UTF-8".into()))?
        .trim();

    let envelope = if text.starts_with('{') {
        let outer = MessageBlob::from_json(text.as_bytes())?;
        MessageEnvelope::decode(&outer.file)?
    } else {
        MessageEnvelope::decode(text)?
    };
    Ok(envelope)
}

/// An in-memory, content-addressed blob store.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::error::KeyError;

    /// Blobs keyed by the BLAKE3 hash of their contents.
    ///
    /// Cloning yields another handle to the same store.
    #[derive(Clone, Default)]
    pub struct MemoryBlobTransport {
        blobs: Arc<RwLock<HashMap<BlobId, Bytes>>>,
    }

    impl MemoryBlobTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Replace a stored blob, e.g. to simulate corruption in transit.
        pub async fn overwrite(&self, id: &BlobId, blob: Bytes) {
            self.blobs.write().await.insert(id.clone(), blob);
        }

        pub async fn len(&self) -> usize {
            self.blobs.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.blobs.read().await.is_empty()
        }
    }

    #[async_trait]
    impl BlobTransport for MemoryBlobTransport {
        async fn upload(&self, blob: Bytes) -> Result<BlobId> {
            let id = BlobId(blake3::hash(&blob).to_hex().to_string());
            self.blobs.write().await.insert(id.clone(), blob);
            Ok(id)
        }

        async fn download(&self, id: &BlobId) -> Result<Bytes> {
            self.blobs
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| KeyError::Transport(format!("blob not found: {id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryBlobTransport;
    use super::*;
    use crate::error::ErrorKind;
    use chatseal_core::{AesGcmCodec, MessageCodec, Secret};

    #[test]
    fn test_frame_hides_content_type() {
        let envelope = AesGcmCodec::new()
            .encrypt(b"payload", &Secret::generate())
            .unwrap();
        let framed = frame_envelope(&envelope).unwrap();

        let outer: serde_json::Value = serde_json::from_slice(&framed).unwrap();
        assert_eq!(outer["file_type"], "text");
        assert_eq!(outer["file"], envelope.encode());

        assert_eq!(unframe_envelope(&framed).unwrap(), envelope);
    }

    #[test]
    fn test_unframe_bare_base64() {
        let envelope = AesGcmCodec::new()
            .encrypt(b"payload", &Secret::generate())
            .unwrap();
        let bare = format!("{}\n", envelope.encode());
        assert_eq!(unframe_envelope(bare.as_bytes()).unwrap(), envelope);
    }

    #[test]
    fn test_unframe_garbage() {
        let err = unframe_envelope(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);

        let err = unframe_envelope(b"{\"file\":1}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);

        let err = unframe_envelope(b"AAAA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);
    }

    #[tokio::test]
    async fn test_memory_transport_content_addressed() {
        let transport = MemoryBlobTransport::new();
        let a = transport.upload(Bytes::from_static(b"one")).await.unwrap();
        let b = transport.upload(Bytes::from_static(b"one")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(transport.len().await, 1);
        assert_eq!(transport.download(&a).await.unwrap(), Bytes::from_static(b"one"));

        let missing = transport.download(&BlobId("nope".into())).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Transport);
    }
}
