// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch formation and export, driven by a single worker task.
//!
//! One dedicated worker owns draining and exporting so a retried batch is
//! always resubmitted before any later batch is attempted. The worker is
//! woken by buffer occupancy, by the age deadline of the oldest pending
//! record, or by explicit flush/shutdown commands sent over a channel.

use crate::buffer::RingBuffer;
use crate::errors::PipelineError;
use crate::exporter::{Exporter, RetryStrategy};
use crate::record::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub enum ProcessorCommand {
    /// Drain everything now; ack carries whether all batches were delivered
    Flush(oneshot::Sender<bool>),
    /// Final drain, then exit the worker loop
    Shutdown(oneshot::Sender<bool>),
}

/// Delivery counters shared between the worker and the pipeline facade.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) records_exported: AtomicU64,
    pub(crate) records_dropped: AtomicU64,
    pub(crate) batches_failed: AtomicU64,
}

impl PipelineStats {
    pub fn records_exported(&self) -> u64 {
        self.records_exported.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }
}

/// Sends commands to the worker loop.
#[derive(Clone)]
pub struct ProcessorHandle {
    tx: mpsc::UnboundedSender<ProcessorCommand>,
}

impl ProcessorHandle {
    /// Forces an immediate drain+export cycle. Resolves once every pending
    /// batch completed, with whether all of them were delivered.
    pub async fn flush(&self) -> Result<bool, PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ProcessorCommand::Flush(response_tx))
            .map_err(|e| {
                PipelineError::WorkerUnavailable(format!("failed to send flush command: {e}"))
            })?;

        response_rx.await.map_err(|e| {
            PipelineError::WorkerUnavailable(format!("failed to receive flush response: {e}"))
        })
    }

    /// Final drain, after which the worker exits.
    pub async fn shutdown(&self) -> Result<bool, PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ProcessorCommand::Shutdown(response_tx))
            .map_err(|e| {
                PipelineError::WorkerUnavailable(format!("failed to send shutdown command: {e}"))
            })?;

        response_rx.await.map_err(|e| {
            PipelineError::WorkerUnavailable(format!("failed to receive shutdown response: {e}"))
        })
    }
}

pub struct BatchProcessorConfig {
    pub buffer: Arc<RingBuffer>,
    pub exporter: Arc<dyn Exporter>,
    pub retry: RetryStrategy,
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
    pub cancel: CancellationToken,
    pub stats: Arc<PipelineStats>,
}

pub struct BatchProcessor {
    worker: BatchWorker,
    rx: mpsc::UnboundedReceiver<ProcessorCommand>,
}

impl BatchProcessor {
    pub fn new(config: BatchProcessorConfig) -> (Self, ProcessorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let processor = BatchProcessor {
            worker: BatchWorker {
                buffer: config.buffer,
                exporter: config.exporter,
                retry: config.retry,
                max_batch_size: config.max_batch_size,
                max_batch_age: config.max_batch_age,
                cancel: config.cancel,
                stats: config.stats,
            },
            rx,
        };

        let handle = ProcessorHandle { tx };

        (processor, handle)
    }

    pub async fn run(self) {
        let BatchProcessor { worker, mut rx } = self;
        debug!("Batch worker started");

        loop {
            let age_deadline = worker
                .buffer
                .oldest_enqueued_at()
                .map(|enqueued| enqueued + worker.max_batch_age);

            tokio::select! {
                command = rx.recv() => match command {
                    Some(ProcessorCommand::Flush(response_tx)) => {
                        let delivered = worker.drain_all().await;
                        if response_tx.send(delivered).is_err() {
                            debug!("Flush caller went away before the response");
                        }
                    }
                    Some(ProcessorCommand::Shutdown(response_tx)) => {
                        let delivered = worker.drain_all().await;
                        let _ = response_tx.send(delivered);
                        break;
                    }
                    None => break,
                },
                _ = worker.buffer.activity() => {
                    // Size trigger: keep going while full batches are ready.
                    while worker.buffer.len() >= worker.max_batch_size {
                        worker.flush_one_batch().await;
                    }
                }
                _ = tokio::time::sleep_until(age_deadline.unwrap_or_else(Instant::now)),
                        if age_deadline.is_some() => {
                    worker.flush_one_batch().await;
                }
            }
        }

        debug!("Batch worker stopped");
    }
}

struct BatchWorker {
    buffer: Arc<RingBuffer>,
    exporter: Arc<dyn Exporter>,
    retry: RetryStrategy,
    max_batch_size: usize,
    max_batch_age: Duration,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl BatchWorker {
    /// Drains at most one batch and exports it. Returns whether the batch
    /// was delivered (an empty buffer counts as delivered).
    async fn flush_one_batch(&self) -> bool {
        let batch = self.buffer.drain(self.max_batch_size);
        if batch.is_empty() {
            return true;
        }
        self.export_with_retry(batch).await
    }

    /// Repeated drain+export until the buffer is empty.
    async fn drain_all(&self) -> bool {
        let mut all_delivered = true;
        while !self.buffer.is_empty() {
            if !self.flush_one_batch().await {
                all_delivered = false;
            }
        }
        all_delivered
    }

    /// Exports one batch, retrying the same batch in place so later batches
    /// cannot overtake it. Total attempts are capped by the retry strategy.
    async fn export_with_retry(&self, batch: Vec<Record>) -> bool {
        let mut attempts: u32 = 1;
        loop {
            match self.exporter.export(&batch).await {
                Ok(()) => {
                    self.stats
                        .records_exported
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    debug!("Exported batch of {} records", batch.len());
                    return true;
                }
                Err(e) if e.is_retriable() && attempts < self.retry.max_attempts() => {
                    let delay = self.retry.delay_for(attempts);
                    attempts += 1;
                    warn!(
                        "Retriable export failure ({e}), retrying batch of {} records in {delay:?}",
                        batch.len()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            // Shutdown interrupts the backoff wait; make one
                            // final best-effort attempt and move on.
                            if self.exporter.export(&batch).await.is_ok() {
                                self.stats
                                    .records_exported
                                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                                return true;
                            }
                            self.record_dropped_batch(&batch, "shutdown interrupted retry");
                            return false;
                        }
                    }
                }
                Err(e) => {
                    self.record_dropped_batch(&batch, &e.to_string());
                    return false;
                }
            }
        }
    }

    fn record_dropped_batch(&self, batch: &[Record], reason: &str) {
        self.stats.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .records_dropped
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        error!("Dropping batch of {} records: {reason}", batch.len());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::buffer::OverflowPolicy;
    use crate::errors::{ExportError, ExportResult};
    use crate::record::{Record, Severity};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Records every delivered batch; fails the first `fail_first` attempts
    /// with a retriable error.
    struct TestExporter {
        batches: Mutex<Vec<Vec<Record>>>,
        attempts: AtomicU32,
        fail_first: u32,
    }

    impl TestExporter {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(TestExporter {
                batches: Mutex::new(Vec::new()),
                attempts: AtomicU32::new(0),
                fail_first,
            })
        }

        fn batches(&self) -> Vec<Vec<Record>> {
            self.batches.lock().unwrap().clone()
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Exporter for TestExporter {
        async fn export(&self, batch: &[Record]) -> ExportResult {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(ExportError::Status(503));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn setup(
        exporter: Arc<TestExporter>,
        max_batch_size: usize,
        max_batch_age: Duration,
        max_attempts: u32,
    ) -> (Arc<RingBuffer>, ProcessorHandle, Arc<PipelineStats>) {
        let buffer = Arc::new(RingBuffer::new(
            1024,
            OverflowPolicy::DropNewest,
            max_batch_size,
        ));
        let stats = Arc::new(PipelineStats::default());
        let (processor, handle) = BatchProcessor::new(BatchProcessorConfig {
            buffer: Arc::clone(&buffer),
            exporter,
            retry: RetryStrategy::new(
                max_attempts,
                Duration::from_millis(10),
                Duration::from_millis(50),
            ),
            max_batch_size,
            max_batch_age,
            cancel: CancellationToken::new(),
            stats: Arc::clone(&stats),
        });
        tokio::spawn(processor.run());
        (buffer, handle, stats)
    }

    fn record(body: &str) -> Record {
        Record::log(Severity::Info, body)
    }

    fn bodies(batch: &[Record]) -> Vec<&str> {
        batch.iter().map(|r| r.body.as_deref().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_size_trigger_exports_full_batch() {
        let exporter = TestExporter::new(0);
        let (buffer, _handle, stats) =
            setup(Arc::clone(&exporter), 3, Duration::from_secs(60), 1);

        for body in ["a", "b", "c"] {
            buffer.push(record(body)).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while exporter.batches().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("size trigger did not fire");

        let batches = exporter.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(bodies(&batches[0]), vec!["a", "b", "c"]);
        assert_eq!(stats.records_exported(), 3);
    }

    #[tokio::test]
    async fn test_age_trigger_exports_partial_batch() {
        let exporter = TestExporter::new(0);
        let (buffer, _handle, _stats) =
            setup(Arc::clone(&exporter), 100, Duration::from_millis(100), 1);

        buffer.push(record("lonely")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(exporter.batches().is_empty(), "age trigger fired early");

        tokio::time::timeout(Duration::from_secs(1), async {
            while exporter.batches().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("age trigger did not fire");

        assert_eq!(bodies(&exporter.batches()[0]), vec!["lonely"]);
    }

    #[tokio::test]
    async fn test_flush_command_drains_everything() {
        let exporter = TestExporter::new(0);
        let (buffer, handle, _stats) =
            setup(Arc::clone(&exporter), 2, Duration::from_secs(60), 1);

        for body in ["a", "b", "c", "d", "e"] {
            buffer.push(record(body)).await.unwrap();
        }

        let delivered = handle.flush().await.unwrap();
        assert!(delivered);
        assert!(buffer.is_empty());

        let batches = exporter.batches();
        let all: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.iter())
            .map(|r| r.body.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(all, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_retry_is_head_of_line() {
        // First attempt fails, so the first batch must still land before
        // the second one.
        let exporter = TestExporter::new(1);
        let (buffer, handle, _stats) =
            setup(Arc::clone(&exporter), 2, Duration::from_secs(60), 3);

        for body in ["a1", "a2", "b1", "b2"] {
            buffer.push(record(body)).await.unwrap();
        }

        let delivered = handle.flush().await.unwrap();
        assert!(delivered);

        let batches = exporter.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(bodies(&batches[0]), vec!["a1", "a2"]);
        assert_eq!(bodies(&batches[1]), vec!["b1", "b2"]);
        assert_eq!(exporter.attempts(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_drops_batch() {
        // Batch size above occupancy so only the flush drains; the drop
        // outcome is then visible in the flush ack.
        let exporter = TestExporter::new(u32::MAX);
        let (buffer, handle, stats) =
            setup(Arc::clone(&exporter), 10, Duration::from_secs(60), 2);

        buffer.push(record("doomed")).await.unwrap();
        buffer.push(record("also doomed")).await.unwrap();

        let delivered = handle.flush().await.unwrap();
        assert!(!delivered);
        assert_eq!(exporter.attempts(), 2);
        assert_eq!(stats.batches_failed(), 1);
        assert_eq!(stats.records_dropped(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_command_stops_worker() {
        let exporter = TestExporter::new(0);
        let (buffer, handle, _stats) =
            setup(Arc::clone(&exporter), 10, Duration::from_secs(60), 1);

        buffer.push(record("last words")).await.unwrap();

        let delivered = handle.shutdown().await.unwrap();
        assert!(delivered);
        assert_eq!(bodies(&exporter.batches()[0]), vec!["last words"]);

        // Worker loop has exited; further commands fail.
        let result = handle.flush().await;
        assert!(matches!(result, Err(PipelineError::WorkerUnavailable(_))));
    }
}
