//! Worker pool and queue redelivery poller.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::EngineContext;
use crate::cutoff;
use crate::executor::Executor;
use crate::queue::{RunQueue, RunReceiver};
use crate::store::RunStore;

/// Maximum Run ids redelivered per poll.
const REDELIVERY_BATCH: i64 = 100;

/// A fixed number of executor tasks pulling from one [`RunReceiver`].
pub struct WorkerPool {
    ctx: EngineContext,
    receiver: RunReceiver,
    concurrency: usize,
    name: String,
}

impl WorkerPool {
    /// `name` prefixes each task's worker id (`"{name}-{n}"`), which is
    /// recorded as `claimed_by` on the Runs it executes.
    pub fn new(ctx: EngineContext, receiver: RunReceiver, name: impl Into<String>) -> Self {
        let concurrency = ctx.config.worker_concurrency.max(1);
        Self {
            ctx,
            receiver,
            concurrency,
            name: name.into(),
        }
    }

    /// Run every executor task until `cancel` fires or the queue closes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(concurrency = self.concurrency, name = %self.name, "Worker pool started");

        let tasks: Vec<_> = (0..self.concurrency)
            .map(|n| {
                let executor = Executor::new(self.ctx.clone(), format!("{}-{n}", self.name));
                tokio::spawn(worker_loop(executor, self.receiver.clone(), cancel.clone()))
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        tracing::info!(name = %self.name, "Worker pool stopped");
    }
}

async fn worker_loop(executor: Executor, receiver: RunReceiver, cancel: CancellationToken) {
    loop {
        let run_id = tokio::select! {
            _ = cancel.cancelled() => break,
            next = receiver.next() => match next {
                Some(run_id) => run_id,
                None => break,
            },
        };
        // A claimed Run always finishes: cancellation is only observed
        // between Runs.
        if let Err(e) = executor.execute(run_id).await {
            tracing::error!(run_id, worker = %executor.worker_id(), error = %e, "Run execution failed");
        }
    }
}

/// Re-enqueue `QUEUED` Runs older than `redeliver_after` every
/// `poll_interval` until cancelled.
pub async fn run_redelivery(
    store: Arc<dyn RunStore>,
    queue: RunQueue,
    poll_interval: Duration,
    redeliver_after: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        poll_interval_secs = poll_interval.as_secs(),
        redeliver_after_secs = redeliver_after.as_secs(),
        "Queue poller started",
    );

    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Queue poller stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.list_redeliverable(cutoff(redeliver_after), REDELIVERY_BATCH).await {
                    Ok(ids) => {
                        if !ids.is_empty() {
                            tracing::info!(count = ids.len(), "Redelivering queued runs");
                        }
                        for run_id in ids {
                            if let Err(e) = queue.enqueue(run_id).await {
                                tracing::error!(run_id, error = %e, "Redelivery failed");
                                break;
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Queue poll failed"),
                }
            }
        }
    }
}
