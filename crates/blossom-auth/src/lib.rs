//! blossom-auth: Capability tokens for content-addressed storage
//!
//! Verifies signed, time-bounded bearer tokens and decides whether a
//! request may proceed. Verification is pure: no state is kept between
//! requests and nothing here touches storage.
//!
//! ## Pipeline
//!
//! | Step | Failure                 |
//! |------|-------------------------|
//! | Envelope + JSON decode | `MalformedToken` |
//! | Event kind             | `WrongClaimKind` |
//! | Validity window        | `ExpiredOrNotYetValid` |
//! | Signature              | `InvalidSignature` |
//! | Verb scope             | `ScopeMismatch` |
//! | Target digest          | `TargetMismatch` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use blossom_auth::{AuthPolicy, AuthorizationGate, CapabilityToken, CapabilityVerifier, Operation, Verb};
//! use ed25519_dalek::SigningKey;
//!
//! let key = SigningKey::generate(&mut rand::rngs::OsRng);
//! let header = CapabilityToken::new(Verb::Delete)
//!     .target(digest)
//!     .expires_at(now + 600)
//!     .header(&key);
//!
//! let gate = AuthorizationGate::new(CapabilityVerifier::new(), AuthPolicy::default());
//! let auth = gate.authorize(Some(&header), &Operation::Delete(digest))?;
//! ```

mod capability;
mod error;
mod event;
mod gate;
mod token;
mod verifier;

// Re-exports
pub use capability::{CAPABILITY_KIND, CapabilityClaim, Verb};
pub use error::{AuthError, AuthResult};
pub use event::{SignedEvent, UnsignedEvent};
pub use gate::{AuthPolicy, Authorization, AuthorizationGate, Operation};
pub use token::{CapabilityToken, DEFAULT_SCHEME, decode_envelope, encode_envelope};
pub use verifier::{CapabilityVerifier, DEFAULT_CLOCK_SKEW, DEFAULT_VALIDITY, VerifyRequest};
