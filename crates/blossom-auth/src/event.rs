//! Signed event carried inside a capability token
//!
//! The event id is the SHA-256 of the canonical encoding
//! `[0, pubkey, created_at, kind, tags, content]` (compact JSON), and the
//! signature is an ed25519 signature over the 32 id bytes.

use blossom_core::{Digest, PublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// A signed event as it appears on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Hex SHA-256 of the canonical encoding
    pub id: String,
    /// Hex public key of the signer
    pub pubkey: String,
    /// Unix seconds
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    /// Hex signature over the id bytes
    pub sig: String,
}

impl SignedEvent {
    /// Bytes the id is computed over. Excludes `id` and `sig`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    pub fn compute_id(&self) -> Digest {
        Digest::of(&self.canonical_bytes())
    }

    /// Values of every tag named `name`
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    /// Value of the first tag named `name`
    pub fn tag_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tag_values(name).next()
    }

    /// Check the id and signature, returning the signer
    ///
    /// Any structural problem with the key or signature encoding is reported
    /// as `InvalidSignature`, same as a signature that does not verify.
    pub fn verify_signature(&self) -> AuthResult<PublicKey> {
        let issuer = PublicKey::from_hex(&self.pubkey).map_err(|_| AuthError::InvalidSignature)?;
        let verifying_key =
            VerifyingKey::from_bytes(issuer.as_bytes()).map_err(|_| AuthError::InvalidSignature)?;

        let id = self.compute_id();
        if !id.matches_hex(&self.id) {
            return Err(AuthError::InvalidSignature);
        }

        let mut sig_bytes = [0u8; 64];
        hex::decode_to_slice(&self.sig, &mut sig_bytes).map_err(|_| AuthError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        verifying_key
            .verify_strict(id.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;
        Ok(issuer)
    }
}

/// An event before signing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn sign(self, key: &SigningKey) -> SignedEvent {
        let pubkey = hex::encode(key.verifying_key().to_bytes());
        let id = Digest::of(&canonical_bytes(
            &pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ));
        let sig = key.sign(id.as_bytes());
        SignedEvent {
            id: id.to_hex(),
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig.to_bytes()),
        }
    }
}

fn canonical_bytes(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> Vec<u8> {
    // Serializing a tuple of strings and integers cannot fail
    serde_json::to_vec(&(0u8, pubkey, created_at, kind, tags, content)).unwrap_or_default()
}
