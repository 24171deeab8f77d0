use crate::error::TrailError;
use crate::remote::{EncryptedFields, EncryptionMode, InteractionBatch, PlaintextFields, SessionPayload};
use crate::trail::keys::RecipientKey;
use crate::trail::transcript::Interaction;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub const ENVELOPE_VERSION: u32 = 1;
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// Hybrid-encrypted field group as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionEnvelope {
    /// Base64 of AES-256-GCM ciphertext followed by its tag.
    pub ciphertext: String,
    /// Base64 of the AES key wrapped with RSA-OAEP(SHA-256).
    pub wrapped_key: String,
    pub iv: String,
    pub version: u32,
}

impl EncryptionEnvelope {
    pub fn to_wire(&self) -> Result<String, TrailError> {
        serde_json::to_string(self).map_err(|e| TrailError::Envelope(e.to_string()))
    }
}

/// Encrypt the JSON form of `value` under a fresh key and nonce.
pub fn seal<T: Serialize + ?Sized>(
    value: &T,
    recipient: &RsaPublicKey,
) -> Result<EncryptionEnvelope, TrailError> {
    let plaintext = serde_json::to_vec(value).map_err(|e| TrailError::Envelope(e.to_string()))?;

    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| TrailError::Envelope(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|e| TrailError::Envelope(e.to_string()))?;

    let wrapped_key = recipient
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &key)
        .map_err(|e| TrailError::Envelope(e.to_string()))?;

    Ok(EncryptionEnvelope {
        ciphertext: STANDARD.encode(ciphertext),
        wrapped_key: STANDARD.encode(wrapped_key),
        iv: STANDARD.encode(nonce_bytes),
        version: ENVELOPE_VERSION,
    })
}

fn seal_group<T: Serialize>(
    items: &[T],
    recipient: &RsaPublicKey,
) -> Result<Option<String>, TrailError> {
    if items.is_empty() {
        return Ok(None);
    }
    seal(items, recipient)?.to_wire().map(Some)
}

fn require_key(
    mode: EncryptionMode,
    recipient: Option<&RecipientKey>,
) -> Result<Option<&RecipientKey>, TrailError> {
    if !mode.requires_envelope() {
        return Ok(None);
    }
    recipient
        .map(Some)
        .ok_or_else(|| TrailError::EncryptionKeyUnavailable {
            mode: mode.as_str().to_string(),
        })
}

/// Plaintext for `enhanced` projects, one envelope per non-empty group otherwise.
pub fn build_payload(
    mode: EncryptionMode,
    recipient: Option<&RecipientKey>,
    fields: PlaintextFields,
) -> Result<SessionPayload, TrailError> {
    let Some(recipient) = require_key(mode, recipient)? else {
        return Ok(SessionPayload::Plaintext(fields));
    };

    let key = &recipient.public_key;
    Ok(SessionPayload::Encrypted(EncryptedFields {
        interactions: seal_group(&fields.interactions, key)?,
        progress_snapshots: seal_group(&fields.progress_snapshots, key)?,
        sub_sessions: seal_group(&fields.sub_sessions, key)?,
        attachments: seal_group(&fields.attachments, key)?,
        key_version: recipient.key_version,
    }))
}

pub fn build_batch(
    mode: EncryptionMode,
    recipient: Option<&RecipientKey>,
    interactions: Vec<Interaction>,
) -> Result<InteractionBatch, TrailError> {
    let Some(recipient) = require_key(mode, recipient)? else {
        return Ok(InteractionBatch::Plaintext(interactions));
    };
    let envelope = seal(&interactions, &recipient.public_key)?.to_wire()?;
    Ok(InteractionBatch::Encrypted {
        envelope,
        key_version: recipient.key_version,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::trail::keys::{KeyScope, RecipientKey};
    use crate::trail::transcript::{InteractionKind, SubSession};
    use rsa::RsaPrivateKey;
    use serde::de::DeserializeOwned;
    use std::collections::BTreeMap;

    fn open<T: DeserializeOwned>(envelope: &EncryptionEnvelope, private: &RsaPrivateKey) -> T {
        let wrapped = STANDARD.decode(&envelope.wrapped_key).expect("b64 key");
        let key = private
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .expect("unwrap key");
        let iv = STANDARD.decode(&envelope.iv).expect("b64 iv");
        let ciphertext = STANDARD.decode(&envelope.ciphertext).expect("b64 ct");
        let cipher = Aes256Gcm::new_from_slice(&key).expect("cipher");
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
            .expect("decrypt");
        serde_json::from_slice(&plaintext).expect("json")
    }

    fn recipient() -> RecipientKey {
        let (private, _) = super::test_keys::keypair();
        RecipientKey {
            public_key: private.to_public_key(),
            key_version: 3,
            scope: KeyScope::User,
        }
    }

    fn interactions() -> Vec<Interaction> {
        vec![Interaction {
            timestamp: "2025-01-01T00:00:00Z".into(),
            kind: InteractionKind::Prompt,
            content: "refactor the parser, keep ünïcode".into(),
            tool_name: None,
            input_tokens: None,
            output_tokens: None,
            metadata: BTreeMap::new(),
        }]
    }

    #[test]
    fn seal_round_trips() {
        let (private, _) = super::test_keys::keypair();
        let payload = interactions();
        let envelope = seal(&payload, &private.to_public_key()).expect("seal");
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        let back: Vec<Interaction> = open(&envelope, private);
        assert_eq!(back, payload);
    }

    #[test]
    fn every_seal_uses_fresh_key_and_nonce() {
        let (private, _) = super::test_keys::keypair();
        let public = private.to_public_key();
        let a = seal(&interactions(), &public).expect("seal a");
        let b = seal(&interactions(), &public).expect("seal b");
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.wrapped_key, b.wrapped_key);
    }

    #[test]
    fn ciphertext_carries_the_tag() {
        let (private, _) = super::test_keys::keypair();
        let payload = "x".repeat(40);
        let envelope = seal(&payload, &private.to_public_key()).expect("seal");
        let raw = STANDARD.decode(&envelope.ciphertext).expect("b64");
        // JSON string adds two quotes; GCM appends a 16-byte tag.
        assert_eq!(raw.len(), payload.len() + 2 + 16);
        assert_eq!(STANDARD.decode(&envelope.iv).expect("b64").len(), NONCE_SIZE);
    }

    #[test]
    fn enhanced_mode_stays_plaintext_without_key() {
        let fields = PlaintextFields {
            interactions: interactions(),
            ..PlaintextFields::default()
        };
        let payload = build_payload(EncryptionMode::Enhanced, None, fields).expect("payload");
        assert!(matches!(payload, SessionPayload::Plaintext(f) if f.interactions.len() == 1));
    }

    #[test]
    fn end_to_end_without_key_fails_closed() {
        for mode in [EncryptionMode::E2e, EncryptionMode::ZeroKnowledge] {
            let fields = PlaintextFields {
                interactions: interactions(),
                ..PlaintextFields::default()
            };
            let err = build_payload(mode, None, fields).unwrap_err();
            assert!(matches!(err, TrailError::EncryptionKeyUnavailable { .. }));
            let batch_err = build_batch(mode, None, interactions()).unwrap_err();
            assert!(matches!(batch_err, TrailError::EncryptionKeyUnavailable { .. }));
        }
    }

    #[test]
    fn one_envelope_per_non_empty_group() {
        let (private, _) = super::test_keys::keypair();
        let fields = PlaintextFields {
            interactions: interactions(),
            sub_sessions: vec![SubSession {
                timestamp: "2025-01-01T00:00:01Z".into(),
                agent_type: None,
                description: "scan".into(),
            }],
            ..PlaintextFields::default()
        };
        let key = recipient();
        let payload = build_payload(EncryptionMode::E2e, Some(&key), fields).expect("payload");
        let SessionPayload::Encrypted(enc) = payload else {
            panic!("expected encrypted payload");
        };
        assert_eq!(enc.key_version, 3);
        assert!(enc.progress_snapshots.is_none());
        assert!(enc.attachments.is_none());

        let wire = enc.interactions.expect("interactions envelope");
        let envelope: EncryptionEnvelope = serde_json::from_str(&wire).expect("wire json");
        let back: Vec<Interaction> = open(&envelope, private);
        assert_eq!(back, interactions());

        let sub_wire = enc.sub_sessions.expect("sub-session envelope");
        let sub_envelope: EncryptionEnvelope = serde_json::from_str(&sub_wire).expect("wire");
        assert_ne!(sub_envelope.wrapped_key, envelope.wrapped_key);
    }

    #[test]
    fn wire_form_uses_camel_case_fields() {
        let (private, _) = super::test_keys::keypair();
        let wire = seal(&interactions(), &private.to_public_key())
            .expect("seal")
            .to_wire()
            .expect("wire");
        let value: serde_json::Value = serde_json::from_str(&wire).expect("json");
        for field in ["ciphertext", "wrappedKey", "iv", "version"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }
}
