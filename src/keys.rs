//! Signing identities and the signing capability.
//!
//! Outbound records are signed by a [`Signer`]. The crate ships a concrete
//! ed25519 [`Keypair`] and a [`NoSigner`] for the unauthenticated case, where
//! every signing attempt fails and the failure is fatal to the operation
//! that needed it.

use std::fmt;

use data_encoding::HEXLOWER;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde_json::json;

use crate::proto::{DraftRecord, Record};

/// Capability to turn a draft into a signed [`Record`].
pub trait Signer: Send + Sync + fmt::Debug + 'static {
    /// Signs the draft, producing a complete record.
    fn sign(&self, draft: DraftRecord) -> Result<Record, SigningError>;
}

/// Failure to sign an outbound record.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningError {
    /// No signing identity is available, typically "not authenticated".
    #[error("no signing identity available")]
    MissingIdentity,
}

/// An ed25519 signing identity.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.public_key_hex())
    }
}

impl Keypair {
    /// Generates a fresh keypair from the OS random number generator.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Restores a keypair from its secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// The public key as lowercase hex, used as the record author identity.
    pub fn public_key_hex(&self) -> String {
        HEXLOWER.encode(self.signing_key.verifying_key().as_bytes())
    }
}

impl Signer for Keypair {
    fn sign(&self, draft: DraftRecord) -> Result<Record, SigningError> {
        let pubkey = self.public_key_hex();
        let id_bytes = record_id(&pubkey, &draft);
        let sig = self.signing_key.sign(&id_bytes);
        Ok(Record {
            id: HEXLOWER.encode(&id_bytes),
            pubkey,
            created_at: draft.created_at,
            kind: draft.kind,
            tags: draft.tags,
            content: draft.content,
            sig: HEXLOWER.encode(&sig.to_bytes()),
        })
    }
}

/// Signer for sessions without an authenticated identity.
///
/// Every signing attempt fails with [`SigningError::MissingIdentity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

impl Signer for NoSigner {
    fn sign(&self, _draft: DraftRecord) -> Result<Record, SigningError> {
        Err(SigningError::MissingIdentity)
    }
}

/// Content address of a record: the blake3 hash of its canonical form.
///
/// The canonical form is the JSON array
/// `[0, pubkey, created_at, kind, tags, content]` without whitespace, which
/// keeps the id stable across implementations that preserve tag order.
fn record_id(pubkey: &str, draft: &DraftRecord) -> [u8; 32] {
    let canonical = json!([
        0,
        pubkey,
        draft.created_at,
        u16::from(draft.kind),
        draft.tags,
        draft.content,
    ]);
    *blake3::hash(canonical.to_string().as_bytes()).as_bytes()
}

/// Failure to verify an inbound record.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A hex field did not decode to the expected length.
    #[error("malformed key, id or signature encoding")]
    BadEncoding,
    /// The record id does not match the record contents.
    #[error("record id does not match contents")]
    IdMismatch,
    /// The signature does not verify against the author key.
    #[error("invalid signature")]
    BadSignature,
}

impl Record {
    /// Checks that the id matches the record contents and that the signature
    /// verifies against the author key.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let expected = record_id(&self.pubkey, &self.as_draft());
        let id = decode_exact::<32>(&self.id)?;
        if id != expected {
            return Err(VerifyError::IdMismatch);
        }

        let key_bytes = decode_exact::<32>(&self.pubkey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| VerifyError::BadEncoding)?;
        let sig_bytes = decode_exact::<64>(&self.sig)?;
        let sig = Signature::from_bytes(&sig_bytes);
        key.verify(&id, &sig).map_err(|_| VerifyError::BadSignature)
    }
}

fn decode_exact<const N: usize>(hex: &str) -> Result<[u8; N], VerifyError> {
    let bytes = HEXLOWER
        .decode(hex.as_bytes())
        .map_err(|_| VerifyError::BadEncoding)?;
    bytes.try_into().map_err(|_| VerifyError::BadEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::RecordKind;

    fn draft() -> DraftRecord {
        DraftRecord {
            kind: RecordKind::CatalogListing,
            created_at: 1_700_000_000,
            tags: vec![vec!["d".into(), "widget-1".into()]],
            content: "hello".into(),
        }
    }

    #[test]
    fn sign_and_verify() {
        let keypair = Keypair::generate();
        let record = keypair.sign(draft()).unwrap();
        assert_eq!(record.pubkey, keypair.public_key_hex());
        record.verify().expect("fresh signature verifies");
    }

    #[test]
    fn tampering_breaks_verification() {
        let keypair = Keypair::generate();
        let mut record = keypair.sign(draft()).unwrap();
        record.content = "tampered".into();
        assert!(matches!(record.verify(), Err(VerifyError::IdMismatch)));
    }

    #[test]
    fn signature_is_bound_to_the_key() {
        let record = Keypair::generate().sign(draft()).unwrap();
        let mut forged = Keypair::generate().sign(draft()).unwrap();
        forged.sig = record.sig;
        assert!(matches!(forged.verify(), Err(VerifyError::BadSignature)));
    }

    #[test]
    fn no_signer_fails() {
        assert!(matches!(
            NoSigner.sign(draft()),
            Err(SigningError::MissingIdentity)
        ));
    }
}
