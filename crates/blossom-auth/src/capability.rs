//! Capability claim: what a verified token grants

use std::collections::BTreeSet;
use std::fmt;

use blossom_core::{Digest, PublicKey};

/// Event kind reserved for blob-store capability tokens
pub const CAPABILITY_KIND: u32 = 24242;

/// Verbs a token can grant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// Store new content (`PUT /upload`, `PUT /mirror`)
    Upload,
    /// Read content
    Get,
    /// Remove content
    Delete,
    /// Enumerate an owner's blobs
    List,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Upload => "upload",
            Verb::Get => "get",
            Verb::Delete => "delete",
            Verb::List => "list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Some(Verb::Upload),
            "get" => Some(Verb::Get),
            "delete" => Some(Verb::Delete),
            "list" => Some(Verb::List),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified token, reduced to what authorization decisions need
///
/// Built per request and dropped afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityClaim {
    /// Key that signed the token
    pub issuer: PublicKey,
    pub signature_valid: bool,
    /// Unix seconds
    pub issued_at: u64,
    /// Unix seconds; explicit `expiration` tag or `issued_at` + validity window
    pub expires_at: u64,
    pub scope: BTreeSet<Verb>,
    /// Empty means the token is not bound to particular content
    pub target_digests: Vec<Digest>,
}

impl CapabilityClaim {
    /// Check if a specific verb is granted
    pub fn permits(&self, verb: Verb) -> bool {
        self.scope.contains(&verb)
    }

    pub fn is_unscoped(&self) -> bool {
        self.target_digests.is_empty()
    }

    /// Whether the claim covers `digest`. Unscoped claims cover everything.
    pub fn covers(&self, digest: &Digest) -> bool {
        self.is_unscoped() || self.target_digests.contains(digest)
    }
}
