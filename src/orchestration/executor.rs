//! Bounded fan-out over check units
//!
//! A producer offers units in input order through a one-slot channel and a
//! fixed pool of workers drains it. The first failure is recorded and cancels
//! the batch token; nothing already running is aborted.

use crate::error::{DriftError, DriftResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type UnitFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, DriftResult<()>> + Send>;

/// One schedulable piece of work, usually a single directory
pub struct CheckUnit {
    label: String,
    run: UnitFn,
}

impl CheckUnit {
    pub fn new<F, Fut>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = DriftResult<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move |token| run(token).boxed()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn start(self, token: CancellationToken) -> BoxFuture<'static, DriftResult<()>> {
        (self.run)(token)
    }
}

impl std::fmt::Debug for CheckUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckUnit").field("label", &self.label).finish()
    }
}

fn join_failure(label: &str, err: JoinError) -> DriftError {
    if err.is_panic() {
        DriftError::Internal(format!("check unit {} panicked", label))
    } else {
        DriftError::Internal(format!("check unit {} was aborted", label))
    }
}

/// Run every unit, at most `parallelism` at a time
///
/// With `parallelism <= 1` units run in order on the caller's token and the
/// first error is returned straight away. Otherwise units share a child of
/// `cancel`, so a failing batch never cancels the caller.
pub async fn run_all(
    cancel: &CancellationToken,
    parallelism: usize,
    units: Vec<CheckUnit>,
) -> DriftResult<()> {
    if parallelism <= 1 {
        return run_sequential(cancel, units).await;
    }
    run_parallel(cancel, parallelism, units).await
}

async fn run_sequential(cancel: &CancellationToken, units: Vec<CheckUnit>) -> DriftResult<()> {
    for unit in units {
        if cancel.is_cancelled() {
            return Err(DriftError::Cancelled);
        }
        let label = unit.label.clone();
        debug!(unit = %label, "Running check unit");
        tokio::spawn(unit.start(cancel.clone()))
            .await
            .map_err(|e| join_failure(&label, e))??;
    }
    Ok(())
}

/// Keep the first error of the batch and stop further scheduling
async fn record_failure(
    slot: &Mutex<Option<DriftError>>,
    token: &CancellationToken,
    err: DriftError,
) {
    let mut first = slot.lock().await;
    if first.is_none() {
        *first = Some(err);
    }
    token.cancel();
}

async fn run_parallel(
    cancel: &CancellationToken,
    parallelism: usize,
    units: Vec<CheckUnit>,
) -> DriftResult<()> {
    let total = units.len();
    let token = cancel.child_token();
    let (tx, rx) = mpsc::channel::<CheckUnit>(1);
    let rx = Arc::new(Mutex::new(rx));
    let first_error = Arc::new(Mutex::new(None::<DriftError>));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();

    let producer_token = token.clone();
    tasks.spawn(async move {
        for unit in units {
            tokio::select! {
                biased;
                _ = producer_token.cancelled() => break,
                sent = tx.send(unit) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        // Dropping the sender lets idle workers see the end of the queue
    });

    for worker in 0..parallelism {
        let token = token.clone();
        let rx = Arc::clone(&rx);
        let first_error = Arc::clone(&first_error);
        let completed = Arc::clone(&completed);

        tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    unit = async { rx.lock().await.recv().await } => unit,
                };
                let Some(unit) = next else {
                    break;
                };

                let label = unit.label.clone();
                debug!(worker, unit = %label, "Running check unit");
                let outcome = tokio::spawn(unit.start(token.clone()))
                    .await
                    .map_err(|e| join_failure(&label, e))
                    .and_then(|r| r);

                match outcome {
                    Ok(()) => {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        if !e.is_cancelled() {
                            warn!(unit = %label, error = %e, "Check unit failed, cancelling batch");
                        }
                        record_failure(&first_error, &token, e).await;
                        break;
                    }
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            record_failure(&first_error, &token, join_failure("worker", e)).await;
        }
    }

    if let Some(err) = first_error.lock().await.take() {
        return Err(err);
    }
    if completed.load(Ordering::SeqCst) < total {
        return Err(DriftError::Cancelled);
    }
    Ok(())
}
