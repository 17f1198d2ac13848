//! Dispatcher queue: hands admitted Run ids to executor tasks.
//!
//! The Run row is the durable record; the channel is only a fast path.
//! A message lost to a full buffer or a process restart is picked up by
//! the redelivery poller in [`crate::pool`], so delivery is at-least-once
//! and the executor's claim CAS turns duplicates into no-ops.

use std::sync::Arc;

use autopilot_core::types::DbId;
use tokio::sync::{mpsc, Mutex};

use crate::error::EngineError;

/// Producer side of the run queue.
#[derive(Clone)]
pub struct RunQueue {
    sender: Option<mpsc::Sender<DbId>>,
}

/// Consumer side, shared by every executor task in the process.
#[derive(Clone)]
pub struct RunReceiver {
    inner: Arc<Mutex<mpsc::Receiver<DbId>>>,
}

/// Create a connected queue with room for `capacity` pending ids.
pub fn channel(capacity: usize) -> (RunQueue, RunReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        RunQueue {
            sender: Some(sender),
        },
        RunReceiver {
            inner: Arc::new(Mutex::new(receiver)),
        },
    )
}

impl RunQueue {
    /// A queue for processes that run no executors. Enqueue acknowledges
    /// immediately and delivery is left to a worker process's poller.
    pub fn durable_only() -> Self {
        Self { sender: None }
    }

    /// Acknowledge a Run for delivery.
    pub async fn enqueue(&self, run_id: DbId) -> Result<(), EngineError> {
        let Some(sender) = &self.sender else {
            return Ok(());
        };
        match sender.try_send(run_id) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(run_id, "Run queue full, leaving run for redelivery");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EngineError::QueueClosed),
        }
    }
}

impl RunReceiver {
    /// Wait for the next Run id. `None` once every producer is gone.
    pub async fn next(&self) -> Option<DbId> {
        self.inner.lock().await.recv().await
    }
}
