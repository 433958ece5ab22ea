//! Upload admission policy

use crate::error::{StorageError, StorageResult};
use crate::traits::SaveRequest;

/// Media type assumed when a client declares none
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Which uploads a store accepts
///
/// `allowed_media_types` entries are exact (`image/png`) or a major-type
/// wildcard (`image/*`). An empty list admits every type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadPolicy {
    allowed_media_types: Vec<String>,
    max_size: Option<u64>,
}

impl UploadPolicy {
    pub fn new(allowed_media_types: Vec<String>, max_size: Option<u64>) -> Self {
        Self {
            allowed_media_types: allowed_media_types
                .into_iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            max_size,
        }
    }

    /// Accept everything
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    pub fn allows_media_type(&self, media_type: Option<&str>) -> bool {
        if self.allowed_media_types.is_empty() {
            return true;
        }
        let essence = essence(media_type.unwrap_or(DEFAULT_MEDIA_TYPE));
        let major = essence.split('/').next().unwrap_or_default();
        self.allowed_media_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(allowed_major) => allowed_major == major,
                None => *allowed == essence,
            }
        })
    }

    pub fn check_media_type(&self, media_type: Option<&str>) -> StorageResult<()> {
        if self.allows_media_type(media_type) {
            Ok(())
        } else {
            Err(StorageError::UnsupportedMediaType(
                media_type.unwrap_or(DEFAULT_MEDIA_TYPE).to_string(),
            ))
        }
    }

    pub fn check_size(&self, size: u64) -> StorageResult<()> {
        match self.max_size {
            Some(max) if size > max => Err(StorageError::TooLarge { size, max }),
            _ => Ok(()),
        }
    }

    /// Admission check on metadata alone, before any content is read
    pub fn preflight(&self, media_type: Option<&str>, size: Option<u64>) -> StorageResult<()> {
        self.check_media_type(media_type)?;
        if let Some(size) = size {
            self.check_size(size)?;
        }
        Ok(())
    }

    /// Check a save request and cap how much of it will be read
    pub fn apply(&self, mut request: SaveRequest) -> StorageResult<SaveRequest> {
        self.preflight(request.media_type.as_deref(), request.declared_size)?;
        if let Some(max) = self.max_size {
            request.max_size = Some(request.max_size.map_or(max, |m| m.min(max)));
        }
        Ok(request)
    }
}

/// `text/plain; charset=utf-8` -> `text/plain`
fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
