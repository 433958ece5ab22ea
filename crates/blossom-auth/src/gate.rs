//! Request authorization gate
//!
//! Combines token verification with per-operation policy. Transports hand
//! the gate the raw header value and an [`Operation`]; they never call the
//! verifier directly.

use blossom_core::{Digest, PublicKey, Telemetry};
use tracing::{info, warn};

use crate::capability::{CapabilityClaim, Verb};
use crate::error::{AuthError, AuthResult};
use crate::verifier::{CapabilityVerifier, VerifyRequest};

/// A request, described by what it does to which resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Store new content, optionally announcing its digest up front
    Upload { expected: Option<Digest> },
    /// Fetch a remote URL and store the result
    Mirror,
    Get(Digest),
    Exists(Digest),
    Delete(Digest),
    List(PublicKey),
}

impl Operation {
    pub fn verb(&self) -> Option<Verb> {
        match self {
            Operation::Upload { .. } | Operation::Mirror => Some(Verb::Upload),
            Operation::Get(_) => Some(Verb::Get),
            Operation::Exists(_) => None,
            Operation::Delete(_) => Some(Verb::Delete),
            Operation::List(_) => Some(Verb::List),
        }
    }

    fn verify_request(&self) -> Option<VerifyRequest> {
        let verb = self.verb()?;
        let request = VerifyRequest::new(verb);
        Some(match self {
            Operation::Upload {
                expected: Some(digest),
            } => request.target(*digest),
            Operation::Get(digest) => request.target(*digest),
            Operation::Delete(digest) => request.bound_to(*digest),
            _ => request,
        })
    }
}

/// Which operations need a token and how strictly
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Uploads and mirrors need a token
    pub required: bool,
    pub get_requires_auth: bool,
    /// Listing is restricted to the owner's own tokens
    pub list_owner_only: bool,
    /// Only the uploader may delete
    pub delete_requires_owner: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            required: true,
            get_requires_auth: false,
            list_owner_only: false,
            delete_requires_owner: true,
        }
    }
}

impl AuthPolicy {
    fn token_required(&self, operation: &Operation) -> bool {
        match operation {
            Operation::Upload { .. } | Operation::Mirror => self.required,
            Operation::Get(_) => self.get_requires_auth,
            Operation::Exists(_) => false,
            Operation::Delete(_) => true,
            Operation::List(_) => self.list_owner_only,
        }
    }
}

/// Outcome of a successful authorization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    /// No token needed and none used
    Anonymous,
    /// A verified token
    Granted(CapabilityClaim),
}

impl Authorization {
    /// Who signed the token, if there was one
    pub fn issuer(&self) -> Option<PublicKey> {
        match self {
            Authorization::Anonymous => None,
            Authorization::Granted(claim) => Some(claim.issuer),
        }
    }

    pub fn claim(&self) -> Option<&CapabilityClaim> {
        match self {
            Authorization::Anonymous => None,
            Authorization::Granted(claim) => Some(claim),
        }
    }
}

/// Allow/deny decisions for incoming requests
#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: CapabilityVerifier,
    policy: AuthPolicy,
    telemetry: Telemetry,
}

impl AuthorizationGate {
    pub fn new(verifier: CapabilityVerifier, policy: AuthPolicy) -> Self {
        Self {
            verifier,
            policy,
            telemetry: Telemetry::inherit(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.verifier = self.verifier.with_telemetry(telemetry.clone());
        self.telemetry = telemetry;
        self
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn verifier(&self) -> &CapabilityVerifier {
        &self.verifier
    }

    /// Decide whether `operation` may proceed
    ///
    /// A token presented for an operation that does not need one is still
    /// verified for uploads and mirrors, so that the uploader is recorded as
    /// owner; elsewhere it is ignored.
    pub fn authorize(
        &self,
        header: Option<&str>,
        operation: &Operation,
    ) -> AuthResult<Authorization> {
        let required = self.policy.token_required(operation);
        let Some(request) = operation.verify_request() else {
            return Ok(Authorization::Anonymous);
        };

        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let header = match header {
            Some(h) if required || matches!(operation, Operation::Upload { .. } | Operation::Mirror) => h,
            Some(_) => return Ok(Authorization::Anonymous),
            None if required => {
                self.telemetry
                    .in_scope(|| info!(verb = %request.verb, "Rejected request without token"));
                return Err(AuthError::MissingToken);
            }
            None => return Ok(Authorization::Anonymous),
        };

        let claim = self.verifier.verify(header, &request)?;

        if let Operation::List(owner) = operation {
            if required && claim.issuer != *owner {
                self.telemetry.in_scope(|| {
                    warn!(issuer = %claim.issuer, owner = %owner, "List token issued by another key")
                });
                return Err(AuthError::IssuerMismatch);
            }
        }

        Ok(Authorization::Granted(claim))
    }

    /// Ownership check for deletes, run once the stored owner is known
    pub fn authorize_owner(
        &self,
        authorization: &Authorization,
        owner: Option<&PublicKey>,
    ) -> AuthResult<()> {
        if !self.policy.delete_requires_owner {
            return Ok(());
        }
        match (authorization.issuer(), owner) {
            (Some(issuer), Some(owner)) if issuer == *owner => Ok(()),
            (issuer, _) => {
                self.telemetry.in_scope(|| {
                    warn!(issuer = ?issuer, owner = ?owner, "Delete by non-owner refused")
                });
                Err(AuthError::IssuerMismatch)
            }
        }
    }
}
