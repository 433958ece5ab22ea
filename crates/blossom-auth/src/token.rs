//! Bearer token envelope and minting
//!
//! Wire form: `Authorization: <scheme> <base64(JSON event)>`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blossom_core::{Clock, Digest, SystemClock};
use ed25519_dalek::SigningKey;

use crate::capability::{CAPABILITY_KIND, Verb};
use crate::error::{AuthError, AuthResult};
use crate::event::{SignedEvent, UnsignedEvent};

pub const DEFAULT_SCHEME: &str = "Nostr";

/// Split a header value into its event
///
/// The scheme comparison is case-insensitive. Anything that does not decode
/// to a well-formed event is `MalformedToken`.
pub fn decode_envelope(header: &str, scheme: &str) -> AuthResult<SignedEvent> {
    let (found_scheme, payload) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedToken("expected '<scheme> <payload>'".into()))?;
    if !found_scheme.eq_ignore_ascii_case(scheme) {
        return Err(AuthError::MalformedToken(format!(
            "unsupported scheme '{found_scheme}'"
        )));
    }

    let json = STANDARD
        .decode(payload.trim())
        .map_err(|e| AuthError::MalformedToken(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| AuthError::MalformedToken(format!("invalid event: {e}")))
}

/// Render an event as a header value
pub fn encode_envelope(event: &SignedEvent, scheme: &str) -> String {
    // Serializing strings, integers and nested string vectors cannot fail
    let json = serde_json::to_vec(event).unwrap_or_default();
    format!("{scheme} {}", STANDARD.encode(json))
}

/// Builder for capability tokens
///
/// ```rust,ignore
/// let header = CapabilityToken::new(Verb::Upload)
///     .target(digest)
///     .expires_at(now + 300)
///     .header(&key);
/// ```
#[derive(Clone, Debug)]
pub struct CapabilityToken {
    verbs: Vec<Verb>,
    targets: Vec<Digest>,
    created_at: Option<u64>,
    expires_at: Option<u64>,
    kind: u32,
    content: String,
    extra_tags: Vec<Vec<String>>,
}

impl CapabilityToken {
    pub fn new(verb: Verb) -> Self {
        Self {
            verbs: vec![verb],
            targets: Vec::new(),
            created_at: None,
            expires_at: None,
            kind: CAPABILITY_KIND,
            content: String::new(),
            extra_tags: Vec::new(),
        }
    }

    /// Grant an additional verb
    pub fn verb(mut self, verb: Verb) -> Self {
        self.verbs.push(verb);
        self
    }

    /// Bind the token to a digest (repeatable)
    pub fn target(mut self, digest: Digest) -> Self {
        self.targets.push(digest);
        self
    }

    /// Defaults to the current time
    pub fn created_at(mut self, at: u64) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: u64) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Human-readable description shown to the signer
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Override the event kind. Only useful for exercising rejection paths.
    pub fn kind(mut self, kind: u32) -> Self {
        self.kind = kind;
        self
    }

    pub fn tag(mut self, tag: Vec<String>) -> Self {
        self.extra_tags.push(tag);
        self
    }

    pub fn sign(self, key: &SigningKey) -> SignedEvent {
        let mut tags: Vec<Vec<String>> = self
            .verbs
            .iter()
            .map(|v| vec!["t".to_string(), v.as_str().to_string()])
            .collect();
        tags.extend(
            self.targets
                .iter()
                .map(|d| vec!["x".to_string(), d.to_hex()]),
        );
        if let Some(exp) = self.expires_at {
            tags.push(vec!["expiration".to_string(), exp.to_string()]);
        }
        tags.extend(self.extra_tags);

        let created_at = self.created_at.unwrap_or_else(|| SystemClock.now());
        UnsignedEvent {
            created_at,
            kind: self.kind,
            tags,
            content: self.content,
        }
        .sign(key)
    }

    /// Signed header value using the default scheme
    pub fn header(self, key: &SigningKey) -> String {
        encode_envelope(&self.sign(key), DEFAULT_SCHEME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_envelope_roundtrip() {
        let key = SigningKey::generate(&mut OsRng);
        let event = CapabilityToken::new(Verb::Get).created_at(5).sign(&key);
        let header = encode_envelope(&event, DEFAULT_SCHEME);

        assert!(header.starts_with("Nostr "));
        assert_eq!(decode_envelope(&header, DEFAULT_SCHEME).unwrap(), event);
        assert_eq!(decode_envelope(&header.replacen("Nostr", "nostr", 1), DEFAULT_SCHEME).unwrap(), event);
    }

    #[test]
    fn test_malformed_envelopes() {
        let cases = [
            "",
            "Nostr",
            "Bearer abc",
            "Nostr !!!not-base64!!!",
            // base64 of "not json"
            "Nostr bm90IGpzb24=",
            // base64 of {"kind":1}
            "Nostr eyJraW5kIjoxfQ==",
        ];
        for case in cases {
            assert!(
                matches!(decode_envelope(case, DEFAULT_SCHEME), Err(AuthError::MalformedToken(_))),
                "{case:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_builder_tags() {
        let key = SigningKey::generate(&mut OsRng);
        let d = Digest::of(b"target");
        let event = CapabilityToken::new(Verb::Delete)
            .verb(Verb::Get)
            .target(d)
            .expires_at(99)
            .content("Delete blob")
            .sign(&key);

        assert_eq!(event.kind, CAPABILITY_KIND);
        assert_eq!(event.tag_values("t").collect::<Vec<_>>(), vec!["delete", "get"]);
        assert_eq!(event.tag_value("x"), Some(d.to_hex().as_str()));
        assert_eq!(event.tag_value("expiration"), Some("99"));
        assert_eq!(event.content, "Delete blob");
        assert!(event.verify_signature().is_ok());
    }
}
