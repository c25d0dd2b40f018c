//! Bounded-concurrency, fail-fast batch of asynchronous operations.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::positive;
use crate::error::{BoxError, Result, TransferError};

type Operation = Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

fn boxed_operation<F, Fut, E>(operation: F) -> Operation
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move || {
        operation()
            .map(|r| r.map_err(|e| -> BoxError { e.into() }))
            .boxed()
    })
}

/// Runs zero-argument async operations with at most `concurrency` active.
///
/// Operations start in submission order; completion order is not
/// constrained. The first failure is returned from [`Batch::run`] right away
/// and nothing else is started. Operations already active at that point are
/// not cancelled: each runs on its own tokio task and finishes detached.
///
/// # Example
///
/// ```
/// use chunkxfer::Batch;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), chunkxfer::TransferError> {
/// let mut batch = Batch::new(2)?;
/// for block in 0..4u32 {
///     batch.submit(move || async move {
///         println!("staging block {block}");
///         Ok::<_, std::io::Error>(())
///     });
/// }
/// batch.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Batch {
    concurrency: usize,
    queued: VecDeque<Operation>,
    submitted: usize,
    tx: mpsc::UnboundedSender<Operation>,
    rx: mpsc::UnboundedReceiver<Operation>,
}

impl Batch {
    /// Creates an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidArgument`] if `concurrency` is zero.
    pub fn new(concurrency: usize) -> Result<Self> {
        positive("concurrency", concurrency)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            concurrency,
            queued: VecDeque::new(),
            submitted: 0,
            tx,
            rx,
        })
    }

    /// Appends an operation. It runs after every earlier submission has started.
    pub fn submit<F, Fut, E>(&mut self, operation: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.submitted += 1;
        self.queued.push_back(boxed_operation(operation));
    }

    /// Returns a handle that can add operations while the batch runs.
    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            tx: self.tx.clone(),
        }
    }

    /// Number of operations submitted directly on this batch.
    pub fn len(&self) -> usize {
        self.submitted
    }

    /// Returns true if nothing has been submitted directly on this batch.
    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }

    /// Returns the concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every submitted operation.
    ///
    /// Resolves once all operations submitted so far, including those added
    /// through a [`BatchHandle`] before the batch drains, have completed. An
    /// operation submitted through a handle starts as soon as a slot is free,
    /// without waiting for a running operation to finish.
    ///
    /// # Errors
    ///
    /// - The first operation error; a [`TransferError`] returned by an
    ///   operation keeps its kind, anything else is wrapped in
    ///   [`TransferError::Transport`]
    /// - [`TransferError::Internal`] if an operation panicked
    pub async fn run(self) -> Result<()> {
        let Batch {
            concurrency,
            mut queued,
            rx: mut incoming,
            ..
        } = self;

        let mut active = FuturesUnordered::new();
        let mut started = 0usize;
        let mut completed = 0usize;

        loop {
            while let Ok(operation) = incoming.try_recv() {
                queued.push_back(operation);
            }

            while active.len() < concurrency {
                let Some(operation) = queued.pop_front() else {
                    break;
                };
                started += 1;
                trace!(index = started, active = active.len() + 1, "starting operation");
                active.push(tokio::spawn(operation()));
            }

            if active.is_empty() {
                debug!(completed, "batch finished");
                return Ok(());
            }

            let joined = tokio::select! {
                Some(joined) = active.next() => joined,
                Some(operation) = incoming.recv() => {
                    queued.push_back(operation);
                    continue;
                }
            };

            match joined {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) => {
                    warn!(
                        error = %e,
                        completed,
                        still_active = active.len(),
                        never_started = queued.len(),
                        "batch operation failed"
                    );
                    return Err(TransferError::from_boxed(e));
                }
                Err(join) => {
                    warn!(error = %join, "batch operation did not complete");
                    return Err(TransferError::Internal(format!(
                        "batch operation did not complete: {join}"
                    )));
                }
            }
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("concurrency", &self.concurrency)
            .field("queued", &self.queued.len())
            .finish()
    }
}

/// Adds operations to a [`Batch`], including one that is already running.
#[derive(Clone)]
pub struct BatchHandle {
    tx: mpsc::UnboundedSender<Operation>,
}

impl BatchHandle {
    /// Queues an operation behind everything submitted before it.
    ///
    /// Returns false if the batch has been dropped. An operation queued after
    /// a running batch has drained is never started.
    pub fn submit<F, Fut, E>(&self, operation: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.tx.send(boxed_operation(operation)).is_ok()
    }
}

impl fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
