// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch transmission to the remote sink.
//!
//! A batch goes over the wire as one HTTP POST carrying a JSON array of
//! records in drain order. An export attempt either succeeds, fails in a
//! way worth retrying (timeouts, connection errors, 5xx) or fails
//! permanently (other 4xx, unserializable payload).

use crate::errors::{ExportError, ExportResult, PipelineError};
use crate::record::Record;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Transmits one serialized batch per call to a remote sink.
///
/// Implementations must be idempotent-safe: a failed attempt leaves no
/// partial side effects, so the same batch can be resubmitted.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, batch: &[Record]) -> ExportResult;
}

/// Exponential backoff with jitter for retriable export failures.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::new(3, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY)
    }
}

impl RetryStrategy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryStrategy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Default delays with the attempt cap taken from configuration.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        RetryStrategy::new(max_attempts, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY)
    }

    /// Total export attempts per batch, the first attempt included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based): base doubled per
    /// attempt, capped at the max delay, plus up to 50% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let jitter_ms = rand::rng().random_range(0..=backoff.as_millis() as u64 / 2);
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// Ships batches to a single HTTP endpoint as JSON.
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    per_attempt_timeout: Duration,
}

impl OtlpHttpExporter {
    pub fn new(endpoint: &str, per_attempt_timeout: Duration) -> Result<Self, PipelineError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            PipelineError::InvalidConfig(format!("Invalid endpoint '{endpoint}': {e}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(per_attempt_timeout)
            .build()
            .map_err(|e| {
                PipelineError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(OtlpHttpExporter {
            client,
            endpoint,
            per_attempt_timeout,
        })
    }
}

#[async_trait]
impl Exporter for OtlpHttpExporter {
    async fn export(&self, batch: &[Record]) -> ExportResult {
        let payload = serde_json::to_vec(batch)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                debug!("Shipped batch of {} records", batch.len());
                Ok(())
            }
            Ok(resp) => Err(ExportError::Status(resp.status().as_u16())),
            Err(e) if e.is_timeout() => Err(ExportError::Timeout(self.per_attempt_timeout)),
            Err(e) => Err(ExportError::Transport(e.to_string())),
        }
    }
}
