//! Streaming SHA-256 digest engine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CoreError, CoreResult};

/// Length of a SHA-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Read buffer for streaming copies (64 KiB)
const COPY_BUF_SIZE: usize = 64 * 1024;

/// SHA-256 digest of blob content
///
/// The canonical text form is 64 lowercase hex characters. Parsing accepts
/// either case so that client-supplied digests compare exactly after
/// normalisation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Digest an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest, case-insensitively
    pub fn parse_hex(s: &str) -> CoreResult<Self> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(CoreError::InvalidDigest(format!(
                "expected {} hex characters, got {}",
                DIGEST_LEN * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut bytes)
            .map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Compare against a hex string without allocating a second `Digest`
    /// at the call site. Malformed input never matches.
    pub fn matches_hex(&self, s: &str) -> bool {
        Self::parse_hex(s).map(|d| d == *self).unwrap_or(false)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher that also counts bytes
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha256,
    len: u64,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Bytes hashed so far
    pub fn bytes_seen(&self) -> u64 {
        self.len
    }

    /// Finish and return `(digest, byte_count)`
    pub fn finalize(self) -> (Digest, u64) {
        (Digest(self.inner.finalize().into()), self.len)
    }
}

/// Copy `reader` into `writer`, hashing every byte on the way through.
///
/// Memory use is bounded by the copy buffer regardless of stream length.
/// The writer is flushed but not synced; durability is the caller's job.
pub async fn copy_and_digest<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<(Digest, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n]).await?;
    }
    writer.flush().await?;

    Ok(hasher.finalize())
}

/// Digest a stream without keeping its bytes
pub async fn digest_reader<R>(reader: &mut R) -> std::io::Result<(Digest, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    copy_and_digest(reader, &mut tokio::io::sink()).await
}
