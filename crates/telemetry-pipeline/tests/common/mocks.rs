// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock exporter implementations for integration tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_pipeline::errors::{ExportError, ExportResult};
use telemetry_pipeline::exporter::Exporter;
use telemetry_pipeline::record::Record;

/// Exporter that accepts every batch and records it.
pub struct RecordingExporter {
    batches: Mutex<Vec<Vec<Record>>>,
}

impl RecordingExporter {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingExporter {
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    /// Bodies of all exported records, flattened in delivery order.
    pub fn exported_bodies(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.iter())
            .filter_map(|record| record.body.clone())
            .collect()
    }
}

#[async_trait]
impl Exporter for RecordingExporter {
    async fn export(&self, batch: &[Record]) -> ExportResult {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

/// Exporter that fails the first `fail_first` attempts with a retriable
/// error, then accepts everything.
pub struct FlakyExporter {
    batches: Mutex<Vec<Vec<Record>>>,
    attempts: AtomicU32,
    fail_first: u32,
}

impl FlakyExporter {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(FlakyExporter {
            batches: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            fail_first,
        })
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exporter for FlakyExporter {
    async fn export(&self, batch: &[Record]) -> ExportResult {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(ExportError::Transport("connection reset".to_string()));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

/// Exporter that fails every attempt with a fixed status code.
pub struct FailingExporter {
    attempts: AtomicU32,
    status: u16,
}

impl FailingExporter {
    pub fn new(status: u16) -> Arc<Self> {
        Arc::new(FailingExporter {
            attempts: AtomicU32::new(0),
            status,
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exporter for FailingExporter {
    async fn export(&self, _batch: &[Record]) -> ExportResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ExportError::Status(self.status))
    }
}

/// Exporter that hangs long enough to outlive any test deadline.
pub struct StallingExporter {
    delay: Duration,
}

impl StallingExporter {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(StallingExporter { delay })
    }
}

#[async_trait]
impl Exporter for StallingExporter {
    async fn export(&self, _batch: &[Record]) -> ExportResult {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
