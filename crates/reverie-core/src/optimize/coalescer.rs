//! Batch Coalescer
//!
//! Submit-and-await queue that trades a tiny latency tax for a large
//! per-call cost reduction on the underlying operation. Producers `submit`
//! a request and await its response; a background task drains up to
//! `batch_size` requests every `tick` and hands them to a [`BatchProcessor`]
//! in one call.
//!
//! Ordering: within a batch, response `i` belongs to request `i`. Across
//! batches nothing is promised. If the processor fails, every waiter in the
//! drained batch receives that error; partial fulfillment is not attempted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

// ============================================================================
// ERRORS AND CONTRACT
// ============================================================================

/// Coalescer error types.
///
/// Clonable so one processor failure can fan out to every waiter.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoalescerError {
    /// The batch processor failed; the whole batch is failed with it
    #[error("batch processing failed: {0}")]
    BatchFailed(String),
    /// The coalescer was dropped while requests were pending
    #[error("coalescer shut down")]
    ShutDown,
}

/// Processes one drained batch.
///
/// Must return exactly one response per request, index-aligned.
#[async_trait]
pub trait BatchProcessor<Req, Resp>: Send + Sync {
    async fn process(&self, batch: Vec<Req>) -> Result<Vec<Resp>, CoalescerError>;
}

// ============================================================================
// COALESCER
// ============================================================================

type Waiter<Resp> = oneshot::Sender<Result<Resp, CoalescerError>>;

/// Submit-and-await batching queue.
pub struct BatchCoalescer<Req, Resp> {
    queue: Arc<Mutex<VecDeque<(Req, Waiter<Resp>)>>>,
    drain: JoinHandle<()>,
}

impl<Req: Send + 'static, Resp: Send + 'static> BatchCoalescer<Req, Resp> {
    /// Spawn a coalescer draining up to `batch_size` requests every `tick`.
    pub fn spawn(
        name: &'static str,
        processor: Arc<dyn BatchProcessor<Req, Resp>>,
        tick: Duration,
        batch_size: usize,
    ) -> Self {
        let queue: Arc<Mutex<VecDeque<(Req, Waiter<Resp>)>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let batch_size = batch_size.max(1);

        let drain_queue = Arc::clone(&queue);
        let drain = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;

                let batch: Vec<(Req, Waiter<Resp>)> = {
                    let mut queue = drain_queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    let take = batch_size.min(queue.len());
                    queue.drain(..take).collect()
                };
                if batch.is_empty() {
                    continue;
                }

                debug!(coalescer = name, size = batch.len(), "draining batch");
                let (requests, waiters): (Vec<Req>, Vec<Waiter<Resp>>) =
                    batch.into_iter().unzip();
                let expected = waiters.len();

                match processor.process(requests).await {
                    Ok(responses) if responses.len() == expected => {
                        for (waiter, response) in waiters.into_iter().zip(responses) {
                            let _ = waiter.send(Ok(response));
                        }
                    }
                    Ok(responses) => {
                        let err = CoalescerError::BatchFailed(format!(
                            "processor returned {} responses for {} requests",
                            responses.len(),
                            expected
                        ));
                        for waiter in waiters {
                            let _ = waiter.send(Err(err.clone()));
                        }
                    }
                    Err(err) => {
                        for waiter in waiters {
                            let _ = waiter.send(Err(err.clone()));
                        }
                    }
                }
            }
        });

        Self { queue, drain }
    }

    /// Enqueue a request and return a future resolving to its response.
    ///
    /// The request is enqueued immediately; the returned future only waits
    /// on the response channel, so it does not borrow the coalescer. A
    /// dropped waiter does not cancel its request.
    pub fn submit(
        &self,
        request: Req,
    ) -> impl std::future::Future<Output = Result<Resp, CoalescerError>> + Send + use<Req, Resp>
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            queue.push_back((request, tx));
        }
        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(CoalescerError::ShutDown),
            }
        }
    }

    /// Requests waiting for the next drain
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<Req, Resp> Drop for BatchCoalescer<Req, Resp> {
    fn drop(&mut self) {
        // Stop the drain task; pending waiters observe a closed channel.
        self.drain.abort();
    }
}

// ============================================================================
// TESTS
// ============================================================================
