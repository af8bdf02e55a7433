//! Proptest generators for property-based testing.

use proptest::prelude::*;

use chatseal_core::{ContentType, ConversationId, Keypair, MessageBlob, Secret};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random ConversationId.
pub fn conversation_id() -> impl Strategy<Value = ConversationId> {
    any::<[u8; 32]>().prop_map(ConversationId::from_bytes)
}

/// Generate a random Secret.
pub fn secret() -> impl Strategy<Value = Secret> {
    any::<[u8; 32]>().prop_map(Secret::from_bytes)
}

/// Generate two secrets that differ.
pub fn distinct_secrets() -> impl Strategy<Value = (Secret, Secret)> {
    (any::<[u8; 32]>(), any::<[u8; 32]>())
        .prop_filter("secrets must differ", |(a, b)| a != b)
        .prop_map(|(a, b)| (Secret::from_bytes(a), Secret::from_bytes(b)))
}

/// Generate plaintext bytes of specified max length.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a ContentType.
pub fn content_type() -> impl Strategy<Value = ContentType> {
    prop_oneof![
        Just(ContentType::Text),
        Just(ContentType::Image),
        Just(ContentType::Video),
        Just(ContentType::Audio),
    ]
}

/// Generate a message payload. Media bodies are shaped like data URLs.
pub fn message_blob() -> impl Strategy<Value = MessageBlob> {
    (content_type(), "[ -~]{0,200}", 0i64..4_102_444_800_000).prop_map(|(file_type, body, ms)| {
        let file = match file_type {
            ContentType::Text => body,
            ContentType::Image => format!("data:image/png;base64,{body}"),
            ContentType::Video => format!("data:video/mp4;base64,{body}"),
            ContentType::Audio => format!("data:audio/webm;base64,{body}"),
        };
        MessageBlob {
            file_type,
            file,
            timestamp: format!("{ms}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatseal_core::{AesGcmCodec, MessageCodec};

    proptest! {
        #[test]
        fn prop_message_blob_roundtrips_through_codec(
            blob in message_blob(),
            secret in secret(),
        ) {
            let codec = AesGcmCodec::new();
            let envelope = codec.encrypt(&blob.to_json().unwrap(), &secret).unwrap();
            let opened = codec.decrypt(&envelope, &secret).unwrap();
            prop_assert_eq!(MessageBlob::from_json(&opened).unwrap(), blob);
        }

        #[test]
        fn prop_distinct_secrets_differ((a, b) in distinct_secrets()) {
            prop_assert_ne!(a, b);
        }
    }
}
