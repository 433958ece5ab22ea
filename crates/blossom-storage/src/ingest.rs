//! Shared hash-while-copy step for every backend

use blossom_core::{Digest, copy_and_digest};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::{StorageError, StorageResult};
use crate::traits::SaveRequest;

/// Copy `data` into `writer`, enforcing the request's size cap and
/// expectations. Nothing here touches the final location.
pub(crate) async fn ingest<W>(
    data: &mut (dyn AsyncRead + Send + Unpin),
    writer: &mut W,
    request: &SaveRequest,
) -> StorageResult<(Digest, u64)>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let (digest, size) = match request.max_size {
        Some(max) => {
            // Read one byte past the cap so oversize input is detectable
            let mut limited = (&mut *data).take(max.saturating_add(1));
            let (digest, size) = copy_and_digest(&mut limited, writer).await?;
            if size > max {
                return Err(StorageError::TooLarge { size, max });
            }
            (digest, size)
        }
        None => copy_and_digest(data, writer).await?,
    };
    request.check(digest, size)?;
    Ok((digest, size))
}
