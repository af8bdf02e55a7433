//! Property tests over the pieces a message passes through.

use std::time::Duration;

use proptest::prelude::*;

use chatseal::core::{AesGcmCodec, ContentType, MessageBlob, MessageCodec};
use chatseal::escrow::{CredentialError, SessionCredentialIssuer};
use chatseal::store::{SecretStore, SqliteSecretStore, StorageKey};
use chatseal::{frame_envelope, unframe_envelope, ErrorKind, KeyError};
use chatseal_testkit::generators::{
    content_type, conversation_id, distinct_secrets, keypair, message_blob, plaintext, secret,
};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn test_framed_envelope_survives_transport(
        plaintext in plaintext(1024),
        secret in secret(),
    ) {
        let codec = AesGcmCodec::new();
        let envelope = codec.encrypt(&plaintext, &secret).unwrap();

        let framed = frame_envelope(&envelope).unwrap();
        let outer = MessageBlob::from_json(&framed).unwrap();
        prop_assert_eq!(outer.file_type, ContentType::Text);

        let unframed = unframe_envelope(&framed).unwrap();
        prop_assert_eq!(codec.decrypt(&unframed, &secret).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_secret_is_authentication_failure(
        plaintext in plaintext(256),
        (right, wrong) in distinct_secrets(),
    ) {
        let codec = AesGcmCodec::new();
        let envelope = codec.encrypt(&plaintext, &right).unwrap();
        let err = KeyError::from(codec.decrypt(&envelope, &wrong).unwrap_err());
        prop_assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn test_content_type_stays_inside_ciphertext(
        file_type in content_type(),
        body in "[a-zA-Z0-9+/]{1,64}",
        secret in secret(),
    ) {
        let blob = MessageBlob {
            file_type,
            file: body.clone(),
            timestamp: "2025-03-01T10:00:00.000Z".into(),
        };
        let codec = AesGcmCodec::new();
        let envelope = codec.encrypt(&blob.to_json().unwrap(), &secret).unwrap();

        let outer = MessageBlob::from_json(&frame_envelope(&envelope).unwrap()).unwrap();
        prop_assert_eq!(outer.file_type, ContentType::Text);
        prop_assert_ne!(outer.file, body);
    }

    #[test]
    fn test_non_blob_plaintext_is_malformed_payload(
        garbage in plaintext(64).prop_filter("must not parse", |p| MessageBlob::from_json(p).is_err()),
        blob in message_blob(),
    ) {
        prop_assert!(MessageBlob::from_json(&blob.to_json().unwrap()).is_ok());
        let err = KeyError::from(MessageBlob::from_json(&garbage).unwrap_err());
        prop_assert_eq!(err.kind(), ErrorKind::MalformedPayload);
    }

    #[test]
    fn test_credential_bound_to_its_conversation(
        signer in keypair(),
        conversation in conversation_id(),
        other in conversation_id(),
    ) {
        prop_assume!(conversation != other);
        let issuer = SessionCredentialIssuer::new(signer.clone(), "0xchat");
        let credential = block_on(issuer.issue(
            &signer.identity(),
            &conversation,
            Duration::from_secs(600),
        ))
        .unwrap();
        prop_assert!(issuer.verify(&credential).is_ok());

        let mut replayed = credential;
        replayed.conversation_id = other;
        prop_assert_eq!(
            issuer.verify(&replayed).unwrap_err(),
            CredentialError::InvalidSignature
        );
    }

    #[test]
    fn test_cached_secret_is_immutable(
        conversation in conversation_id(),
        (first, second) in distinct_secrets(),
    ) {
        let store = SqliteSecretStore::open_memory(StorageKey::generate()).unwrap();
        store.put(&conversation, &first).unwrap();

        let err = KeyError::from(store.put(&conversation, &second).unwrap_err());
        prop_assert_eq!(err.kind(), ErrorKind::SecretConflict);
        prop_assert_eq!(store.get(&conversation).unwrap(), Some(first));
    }
}
