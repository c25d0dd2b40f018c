use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_util::StreamExt;
use tracing::debug;

use super::{RangeSource, plan_ranges};
use crate::batch::Batch;
use crate::config::DownloadOptions;
use crate::error::{Result, TransferError};
use crate::resumable::ResumableReadStream;

/// Shared download target and the running byte total written into it.
struct Target {
    data: Vec<u8>,
    loaded: u64,
}

/// Downloads `count` bytes starting at `offset` into memory.
///
/// The span is split into `block_size` ranges that are read with at most
/// `concurrency` in flight, each through its own [`ResumableReadStream`].
/// The progress callback in `options.resume` receives the total number of
/// bytes written so far across all ranges; successive totals never
/// decrease, even when ranges complete on different threads.
///
/// # Errors
///
/// - [`TransferError::InvalidArgument`] for invalid options or a span that
///   does not fit in memory
/// - The first error reported by any range read; reads already in flight
///   are left to finish on their own
pub async fn download_to_buffer<R: RangeSource>(
    source: Arc<R>,
    offset: u64,
    count: u64,
    options: DownloadOptions,
) -> Result<Bytes> {
    options.validate()?;
    let len = usize::try_from(count).map_err(|_| TransferError::InvalidArgument {
        name: "count",
        reason: "does not fit in memory",
    })?;
    let ranges = plan_ranges(offset, count, options.block_size)?;
    debug!(offset, count, blocks = ranges.len(), concurrency = options.concurrency, "download started");

    let target = Arc::new(Mutex::new(Target {
        data: vec![0u8; len],
        loaded: 0,
    }));
    let progress = options.resume.on_progress.clone();
    let per_range = options.resume.clone();

    let mut batch = Batch::new(options.concurrency)?;
    for range in ranges {
        let source = Arc::clone(&source);
        let target = Arc::clone(&target);
        let progress = progress.clone();
        let mut resume = per_range.clone();
        resume.on_progress = None;

        batch.submit(move || async move {
            let mut reader = ResumableReadStream::open(source, range, resume).await?;
            let mut at = (range.offset - offset) as usize;
            while let Some(chunk) = reader.next().await {
                let chunk = chunk?;
                {
                    let mut shared = target.lock().unwrap_or_else(PoisonError::into_inner);
                    shared.data[at..at + chunk.len()].copy_from_slice(&chunk);
                    shared.loaded += chunk.len() as u64;
                    // Reported under the lock so totals reach the callback in order.
                    if let Some(progress) = progress.as_ref() {
                        progress(shared.loaded);
                    }
                }
                at += chunk.len();
            }
            Ok::<_, TransferError>(())
        });
    }

    batch.run().await?;

    let data = match Arc::try_unwrap(target) {
        Ok(owned) => owned.into_inner().unwrap_or_else(PoisonError::into_inner).data,
        Err(shared) => shared.lock().unwrap_or_else(PoisonError::into_inner).data.clone(),
    };
    debug!(bytes = data.len(), "download complete");
    Ok(Bytes::from(data))
}
