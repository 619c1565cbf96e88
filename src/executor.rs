//! Async Executor (C6): runs a stage's per-candidate agent calls as
//! concurrent tasks behind a bounded semaphore, with per-task timeouts,
//! cancellation propagation, and a bounded progress-event channel.
//!
//! Grounded directly in `llm/batch.rs`'s `BatchExecutor::execute` — a
//! `Semaphore`-bounded `tokio::spawn` pool joined with
//! `futures::future::join_all` — generalized from "one LLM completion per
//! task" to "one arbitrary future per task" so the Orchestrator can reuse it
//! for any per-candidate stage.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};

use crate::llm::CancellationToken;

/// Default bounded concurrency for a per-candidate stage, matching the
/// teacher's `DEFAULT_MAX_PARALLEL`.
pub const DEFAULT_STAGE_CONCURRENCY: usize = 4;
/// Capacity of the progress-event channel.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// One unit of progress, emitted as a stage's per-candidate tasks complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: String,
    /// Fraction of this stage's tasks completed so far, in `[0, 1]`.
    pub progress: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(stage: impl Into<String>, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            progress,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A bounded progress-event sink. Publishing never blocks the caller:
/// events pass through an unbounded ingress queue into a forwarder task that
/// maintains a ring buffer capped at `capacity` and feeds a bounded `mpsc`
/// channel, dropping the oldest buffered event (never the newest) whenever
/// the consumer is draining slower than events arrive.
#[derive(Clone)]
pub struct ProgressBus {
    ingress: mpsc::UnboundedSender<ProgressEvent>,
    dropped: Arc<AtomicUsize>,
}

impl ProgressBus {
    /// Spawn the forwarder task and return the bus plus the bounded
    /// receiver end the caller drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (ingress_tx, mut ingress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let (egress_tx, egress_rx) = mpsc::channel::<ProgressEvent>(capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_for_task = Arc::clone(&dropped);

        tokio::spawn(async move {
            let mut buffer: VecDeque<ProgressEvent> = VecDeque::with_capacity(capacity.max(1));
            while let Some(event) = ingress_rx.recv().await {
                if buffer.len() >= capacity.max(1) {
                    buffer.pop_front();
                    dropped_for_task.fetch_add(1, Ordering::Relaxed);
                }
                buffer.push_back(event);

                while let Some(front) = buffer.pop_front() {
                    match egress_tx.try_send(front) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(event)) => {
                            buffer.push_front(event);
                            break;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }
            }
        });

        (
            Self {
                ingress: ingress_tx,
                dropped,
            },
            egress_rx,
        )
    }

    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.ingress.send(event);
    }

    /// Count of events evicted from the ring buffer because the consumer
    /// was draining too slowly.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded-concurrency runner for one stage's per-candidate tasks.
pub struct Executor {
    semaphore: Arc<Semaphore>,
}

impl Executor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Run `tasks` concurrently, at most `max_parallel` at a time, each
    /// bounded by `per_task_timeout` and aborted early if `cancellation`
    /// fires. Returns one slot per input task, in the same order, `None` on
    /// timeout or cancellation.
    pub async fn run_bounded<Fut, T>(
        &self,
        stage: &str,
        tasks: Vec<Fut>,
        per_task_timeout: Duration,
        cancellation: Option<&CancellationToken>,
        progress: Option<&ProgressBus>,
    ) -> Vec<Option<T>>
    where
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        let total = tasks.len().max(1);
        let completed = Arc::new(AtomicUsize::new(0));
        let cancellation = cancellation.cloned();

        let scheduled = tasks.into_iter().map(|task| {
            let semaphore = Arc::clone(&self.semaphore);
            let completed = Arc::clone(&completed);
            let stage = stage.to_string();
            let cancellation = cancellation.clone();
            let progress = progress.cloned();

            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("stage semaphore closed unexpectedly");

                if cancellation.as_ref().is_some_and(CancellationToken::is_canceled) {
                    return None;
                }

                let result = tokio::time::timeout(per_task_timeout, task).await.ok();

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(bus) = &progress {
                    bus.publish(ProgressEvent::new(
                        stage.clone(),
                        done as f64 / total as f64,
                        format!("{stage}: {done}/{total} complete"),
                    ));
                }
                result
            }
        });

        join_all(scheduled).await
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    #[tokio::test]
    async fn run_bounded_preserves_input_order() {
        let executor = Executor::new(2);
        let tasks: Vec<_> = (0..5)
            .map(|i| async move {
                sleep(Duration::from_millis((5 - i) as u64)).await;
                i
            })
            .collect();

        let results = executor
            .run_bounded("test", tasks, Duration::from_secs(1), None, None)
            .await;
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn run_bounded_times_out_slow_tasks() {
        let executor = Executor::new(1);
        let tasks = vec![async {
            sleep(Duration::from_millis(50)).await;
            42
        }];

        let results = executor
            .run_bounded("slow", tasks, Duration::from_millis(5), None, None)
            .await;
        assert_eq!(results, vec![None]);
    }

    #[tokio::test]
    async fn run_bounded_skips_tasks_after_cancellation() {
        let executor = Executor::new(4);
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let tasks: Vec<_> = (0..3).map(|i| async move { i }).collect();

        let results = executor
            .run_bounded("canceled", tasks, Duration::from_secs(1), Some(&cancellation), None)
            .await;
        assert!(results.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn run_bounded_respects_the_concurrency_limit() {
        let executor = Executor::new(2);
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_observed = Arc::new(AtomicU32::new(0));
        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let max_observed = Arc::clone(&max_observed);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        executor
            .run_bounded("limited", tasks, Duration::from_secs(1), None, None)
            .await;
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn progress_bus_drops_oldest_under_backpressure() {
        let (bus, mut rx) = ProgressBus::new(2);
        for i in 0..5 {
            bus.publish(ProgressEvent::new("stage", i as f64 / 5.0, format!("event {i}")));
        }
        // Give the forwarder task a chance to run before draining.
        sleep(Duration::from_millis(20)).await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event.message);
        }
        assert!(received.len() <= 2);
        if let Some(last) = received.last() {
            assert_eq!(last, "event 4");
        }
    }
}
