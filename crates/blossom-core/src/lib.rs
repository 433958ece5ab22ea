//! blossom-core: shared primitives for the blossom blob store
//!
//! Provides the streaming SHA-256 digest engine, public key identities,
//! a pluggable clock, injectable telemetry, and the transport-neutral
//! error vocabulary shared by the storage and auth crates.
//!
//! ## Example
//!
//! ```rust,ignore
//! use blossom_core::{Digest, copy_and_digest};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut src: &[u8] = b"Hello, blobs!";
//!     let mut dst = Vec::new();
//!
//!     let (digest, written) = copy_and_digest(&mut src, &mut dst).await?;
//!     assert_eq!(digest, Digest::of(b"Hello, blobs!"));
//!     assert_eq!(written, 13);
//!     Ok(())
//! }
//! ```

mod clock;
mod digest;
mod error;
mod kind;
mod pubkey;
mod telemetry;

// Re-exports
pub use clock::{Clock, FixedClock, SystemClock};
pub use digest::{DIGEST_LEN, Digest, Hasher, copy_and_digest, digest_reader};
pub use error::{CoreError, CoreResult};
pub use kind::ErrorKind;
pub use pubkey::PublicKey;
pub use telemetry::{LogCapture, Telemetry};
