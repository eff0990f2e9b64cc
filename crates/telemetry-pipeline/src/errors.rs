// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced through the pipeline's public API.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record rejected: pipeline is draining or shut down")]
    Rejected,

    #[error("Record rejected: buffer full")]
    BufferFull,

    #[error("Flush timeout exceeded")]
    FlushTimeout,

    #[error("Shutdown timeout exceeded")]
    ShutdownTimeout,

    #[error("Batch worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Failure of a single export attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Endpoint returned status {0}")]
    Status(u16),

    #[error("Export attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ExportError {
    /// Whether retrying the same batch can possibly succeed.
    ///
    /// 4xx-equivalent responses and malformed payloads are permanent;
    /// timeouts, connection failures, 408/429 and 5xx are transient.
    pub fn is_retriable(&self) -> bool {
        match self {
            ExportError::Serialization(_) => false,
            ExportError::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            ExportError::Timeout(_) | ExportError::Transport(_) => true,
        }
    }
}

/// Outcome of one export attempt.
pub type ExportResult = Result<(), ExportError>;
