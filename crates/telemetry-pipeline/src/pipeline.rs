// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing pipeline surface.
//!
//! A [`Pipeline`] owns the ring buffer, the batch worker, and the exporter,
//! and is the only handle application code needs: `emit`, `flush`,
//! `shutdown`. There is no process-wide instance; the host application owns
//! the pipeline and threads it through explicitly.

use crate::buffer::{PushOutcome, RingBuffer};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::exporter::{Exporter, OtlpHttpExporter, RetryStrategy};
use crate::processor::{BatchProcessor, BatchProcessorConfig, PipelineStats, ProcessorHandle};
use crate::record::Record;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Pipeline lifecycle. Transitions are one-way:
/// Running -> Draining -> Shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Shutdown,
}

const STATE_RUNNING: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

pub struct Pipeline {
    buffer: Arc<RingBuffer>,
    handle: ProcessorHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    state: AtomicU8,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    /// Builds a pipeline shipping to the configured endpoint over HTTP.
    ///
    /// Must be called from within a tokio runtime; the batch worker is
    /// spawned immediately.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let exporter = Arc::new(OtlpHttpExporter::new(
            &config.endpoint,
            config.per_attempt_timeout,
        )?);
        Self::with_exporter(config, exporter)
    }

    /// Builds a pipeline around a caller-provided exporter.
    pub fn with_exporter(
        config: PipelineConfig,
        exporter: Arc<dyn Exporter>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let buffer = Arc::new(RingBuffer::new(
            config.buffer_capacity,
            config.overflow_policy,
            config.max_batch_size,
        ));
        let cancel = CancellationToken::new();
        let stats = Arc::new(PipelineStats::default());

        let (processor, handle) = BatchProcessor::new(BatchProcessorConfig {
            buffer: Arc::clone(&buffer),
            exporter,
            retry: RetryStrategy::with_max_attempts(config.max_retries),
            max_batch_size: config.max_batch_size,
            max_batch_age: config.max_batch_age,
            cancel: cancel.clone(),
            stats: Arc::clone(&stats),
        });
        let worker = tokio::spawn(processor.run());

        Ok(Pipeline {
            buffer,
            handle,
            worker: Mutex::new(Some(worker)),
            cancel,
            state: AtomicU8::new(STATE_RUNNING),
            stats,
        })
    }

    /// Enqueues a record. Non-blocking in the common case; under the
    /// `block` overflow policy the caller may wait up to the policy
    /// timeout for space.
    pub async fn emit(&self, record: Record) -> Result<(), PipelineError> {
        if self.state() != PipelineState::Running {
            return Err(PipelineError::Rejected);
        }

        match self.buffer.push(record).await? {
            PushOutcome::Stored => Ok(()),
            PushOutcome::ReplacedOldest => {
                self.stats.records_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Buffer full, evicted oldest pending record");
                Ok(())
            }
        }
    }

    /// Forces an immediate drain+export cycle and waits for it to finish.
    /// Resolves to whether every pending record was exported.
    pub async fn flush(&self, timeout: Duration) -> Result<bool, PipelineError> {
        if self.state() == PipelineState::Shutdown {
            return Err(PipelineError::Rejected);
        }

        match tokio::time::timeout(timeout, self.handle.flush()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::FlushTimeout),
        }
    }

    /// Stops accepting records, performs a final flush within the timeout,
    /// and releases the worker. Idempotent; the second call is a no-op.
    ///
    /// Cancels any in-progress retry backoff wait, after which the worker
    /// makes one final best-effort attempt per in-flight batch.
    pub async fn shutdown(&self, timeout: Duration) -> Result<bool, PipelineError> {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(true);
        }

        self.cancel.cancel();

        let result = tokio::time::timeout(timeout, async {
            let delivered = self.handle.shutdown().await?;
            let worker = {
                #[allow(clippy::expect_used)]
                let mut guard = self.worker.lock().expect("lock poisoned");
                guard.take()
            };
            if let Some(worker) = worker {
                let _ = worker.await;
            }
            Ok::<bool, PipelineError>(delivered)
        })
        .await;

        self.state.store(STATE_SHUTDOWN, Ordering::Release);

        match result {
            Ok(inner) => inner,
            // The wait is abandoned; the worker finishes its best-effort
            // drain in the background while new emits are rejected.
            Err(_) => Err(PipelineError::ShutdownTimeout),
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.state.load(Ordering::Acquire) {
            STATE_RUNNING => PipelineState::Running,
            STATE_DRAINING => PipelineState::Draining,
            _ => PipelineState::Shutdown,
        }
    }

    /// Number of records waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn records_exported(&self) -> u64 {
        self.stats.records_exported()
    }

    /// Records lost to buffer eviction or dropped batches.
    pub fn records_dropped(&self) -> u64 {
        self.stats.records_dropped()
    }

    /// Batches abandoned after a terminal failure or exhausted retries.
    pub fn batches_failed(&self) -> u64 {
        self.stats.batches_failed()
    }
}
