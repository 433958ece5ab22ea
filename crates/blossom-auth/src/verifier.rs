//! Capability verification
//!
//! Turns a raw `Authorization` header value into a [`CapabilityClaim`] and
//! checks it against one requested operation. Checks run in a fixed order
//! and stop at the first failure.

use std::sync::Arc;
use std::time::Duration;

use blossom_core::{Clock, Digest, SystemClock, Telemetry};
use tracing::debug;

use crate::capability::{CAPABILITY_KIND, CapabilityClaim, Verb};
use crate::error::{AuthError, AuthResult};
use crate::event::SignedEvent;
use crate::token::{DEFAULT_SCHEME, decode_envelope};

/// Lifetime of a token that carries no `expiration` tag
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// How far in the future `created_at` may be
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// What a request needs from a token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyRequest {
    pub verb: Verb,
    /// Digest the operation acts on, if any
    pub target: Option<Digest>,
    /// Reject tokens that are not bound to `target`
    pub require_target: bool,
}

impl VerifyRequest {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            target: None,
            require_target: false,
        }
    }

    /// Operation acts on `digest`; bound tokens must list it
    pub fn target(mut self, digest: Digest) -> Self {
        self.target = Some(digest);
        self
    }

    /// Operation acts on `digest` and only bound tokens may perform it
    pub fn bound_to(mut self, digest: Digest) -> Self {
        self.target = Some(digest);
        self.require_target = true;
        self
    }
}

/// Verifies capability tokens
///
/// Holds no per-request state; one instance serves every request.
#[derive(Clone)]
pub struct CapabilityVerifier {
    clock: Arc<dyn Clock>,
    scheme: String,
    validity: Duration,
    clock_skew: Duration,
    telemetry: Telemetry,
}

impl Default for CapabilityVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityVerifier {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            scheme: DEFAULT_SCHEME.to_string(),
            validity: DEFAULT_VALIDITY,
            clock_skew: DEFAULT_CLOCK_SKEW,
            telemetry: Telemetry::inherit(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Full verification for one operation
    pub fn verify(&self, header: &str, request: &VerifyRequest) -> AuthResult<CapabilityClaim> {
        let result = self.decode(header).and_then(|claim| {
            check_scope(&claim, request.verb)?;
            check_target(&claim, request)?;
            Ok(claim)
        });

        self.telemetry.in_scope(|| match &result {
            Ok(claim) => debug!(
                issuer = %claim.issuer,
                verb = %request.verb,
                "Capability accepted"
            ),
            Err(e) => debug!(
                reason = %e.kind(),
                verb = %request.verb,
                error = %e,
                "Capability rejected"
            ),
        });
        result
    }

    /// Envelope, kind, time window and signature. No operation checks.
    pub fn decode(&self, header: &str) -> AuthResult<CapabilityClaim> {
        let event = decode_envelope(header, &self.scheme)?;

        if event.kind != CAPABILITY_KIND {
            return Err(AuthError::WrongClaimKind {
                expected: CAPABILITY_KIND,
                found: event.kind,
            });
        }

        let issued_at = event.created_at;
        let expires_at = match event.tag_value("expiration") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                AuthError::MalformedToken(format!("invalid expiration tag '{raw}'"))
            })?,
            None => issued_at.saturating_add(self.validity.as_secs()),
        };

        let now = self.clock.now();
        if issued_at > now.saturating_add(self.clock_skew.as_secs()) {
            return Err(AuthError::ExpiredOrNotYetValid(format!(
                "created_at {issued_at} is in the future (now {now})"
            )));
        }
        if now >= expires_at {
            return Err(AuthError::ExpiredOrNotYetValid(format!(
                "expired at {expires_at} (now {now})"
            )));
        }

        let issuer = event.verify_signature()?;

        Ok(CapabilityClaim {
            issuer,
            signature_valid: true,
            issued_at,
            expires_at,
            scope: event.tag_values("t").filter_map(Verb::parse).collect(),
            target_digests: parse_targets(&event)?,
        })
    }
}

fn parse_targets(event: &SignedEvent) -> AuthResult<Vec<Digest>> {
    event
        .tag_values("x")
        .map(|hex| {
            Digest::parse_hex(hex)
                .map_err(|e| AuthError::MalformedToken(format!("invalid x tag: {e}")))
        })
        .collect()
}

pub(crate) fn check_scope(claim: &CapabilityClaim, verb: Verb) -> AuthResult<()> {
    if claim.permits(verb) {
        Ok(())
    } else {
        Err(AuthError::ScopeMismatch(verb))
    }
}

pub(crate) fn check_target(claim: &CapabilityClaim, request: &VerifyRequest) -> AuthResult<()> {
    match request.target {
        Some(digest) => {
            if request.require_target && claim.is_unscoped() {
                return Err(AuthError::TargetMismatch(format!(
                    "{} requires a token bound to {digest}",
                    request.verb
                )));
            }
            if !claim.covers(&digest) {
                return Err(AuthError::TargetMismatch(digest.to_hex()));
            }
            Ok(())
        }
        None if request.require_target => Err(AuthError::TargetMismatch(format!(
            "{} requires a target digest",
            request.verb
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::CapabilityToken;
    use blossom_core::FixedClock;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    const NOW: u64 = 1_700_000_000;

    fn verifier() -> CapabilityVerifier {
        CapabilityVerifier::new().with_clock(Arc::new(FixedClock::new(NOW)))
    }

    fn key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[test]
    fn test_fresh_token_accepted() {
        let key = key();
        let header = CapabilityToken::new(Verb::Upload)
            .created_at(NOW - 10)
            .expires_at(NOW + 300)
            .header(&key);

        let claim = verifier()
            .verify(&header, &VerifyRequest::new(Verb::Upload))
            .unwrap();
        assert_eq!(claim.issuer.as_bytes(), &key.verifying_key().to_bytes());
        assert!(claim.signature_valid);
        assert_eq!(claim.expires_at, NOW + 300);
    }

    #[test]
    fn test_expired_token_rejected() {
        let header = CapabilityToken::new(Verb::Upload)
            .created_at(NOW - 600)
            .expires_at(NOW - 1)
            .header(&key());

        let err = verifier()
            .verify(&header, &VerifyRequest::new(Verb::Upload))
            .unwrap_err();
        assert!(matches!(err, AuthError::ExpiredOrNotYetValid(_)));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let header = CapabilityToken::new(Verb::Get)
            .created_at(NOW - 1)
            .expires_at(NOW)
            .header(&key());
        assert!(matches!(
            verifier().decode(&header),
            Err(AuthError::ExpiredOrNotYetValid(_))
        ));
    }

    #[test]
    fn test_default_window_applies_without_expiration_tag() {
        let key = key();
        let fresh = CapabilityToken::new(Verb::Get).created_at(NOW - 3600).header(&key);
        let claim = verifier().decode(&fresh).unwrap();
        assert_eq!(claim.expires_at, NOW - 3600 + DEFAULT_VALIDITY.as_secs());

        let stale = CapabilityToken::new(Verb::Get)
            .created_at(NOW - DEFAULT_VALIDITY.as_secs())
            .header(&key);
        assert!(matches!(
            verifier().decode(&stale),
            Err(AuthError::ExpiredOrNotYetValid(_))
        ));
    }

    #[test]
    fn test_future_token_within_skew() {
        let key = key();
        let within = CapabilityToken::new(Verb::Get).created_at(NOW + 30).header(&key);
        assert!(verifier().decode(&within).is_ok());

        let beyond = CapabilityToken::new(Verb::Get).created_at(NOW + 3600).header(&key);
        assert!(matches!(
            verifier().decode(&beyond),
            Err(AuthError::ExpiredOrNotYetValid(_))
        ));
    }

    #[test]
    fn test_wrong_kind_rejected_before_time() {
        // Expired and wrong kind: kind is reported
        let header = CapabilityToken::new(Verb::Upload)
            .kind(1)
            .created_at(1)
            .expires_at(2)
            .header(&key());
        assert_eq!(
            verifier().decode(&header),
            Err(AuthError::WrongClaimKind {
                expected: CAPABILITY_KIND,
                found: 1
            })
        );
    }

    #[test]
    fn test_bad_expiration_tag_is_malformed() {
        let header = CapabilityToken::new(Verb::Upload)
            .created_at(NOW)
            .tag(vec!["expiration".into(), "soon".into()])
            .header(&key());
        assert!(matches!(
            verifier().decode(&header),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_scope_mismatch() {
        let header = CapabilityToken::new(Verb::Upload)
            .created_at(NOW)
            .header(&key());
        let d = Digest::of(b"victim");
        assert_eq!(
            verifier().verify(&header, &VerifyRequest::new(Verb::Delete).bound_to(d)),
            Err(AuthError::ScopeMismatch(Verb::Delete))
        );
    }

    #[test]
    fn test_target_mismatch() {
        let x = Digest::of(b"x");
        let y = Digest::of(b"y");
        let header = CapabilityToken::new(Verb::Delete)
            .target(x)
            .created_at(NOW)
            .header(&key());

        assert!(verifier()
            .verify(&header, &VerifyRequest::new(Verb::Delete).bound_to(x))
            .is_ok());
        assert!(matches!(
            verifier().verify(&header, &VerifyRequest::new(Verb::Delete).bound_to(y)),
            Err(AuthError::TargetMismatch(_))
        ));
    }

    #[test]
    fn test_unscoped_token_rejected_when_binding_required() {
        let d = Digest::of(b"d");
        let header = CapabilityToken::new(Verb::Delete)
            .created_at(NOW)
            .header(&key());

        assert!(matches!(
            verifier().verify(&header, &VerifyRequest::new(Verb::Delete).bound_to(d)),
            Err(AuthError::TargetMismatch(_))
        ));
        // Same token is fine where binding is optional
        assert!(verifier()
            .verify(&header, &VerifyRequest::new(Verb::Delete).target(d))
            .is_ok());
    }

    #[test]
    fn test_rejections_are_logged_with_reason() {
        let (telemetry, capture) = Telemetry::capturing();
        let v = verifier().with_telemetry(telemetry);
        let _ = v.verify("Bearer nope", &VerifyRequest::new(Verb::Get));
        assert!(capture.contains("Capability rejected"));
        assert!(capture.contains("malformed_token"));
    }

    #[test]
    fn test_custom_scheme() {
        let key = key();
        let event = CapabilityToken::new(Verb::Get).created_at(NOW).sign(&key);
        let header = crate::token::encode_envelope(&event, "Blossom");

        assert!(matches!(
            verifier().decode(&header),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(verifier().with_scheme("Blossom").decode(&header).is_ok());
    }
}
