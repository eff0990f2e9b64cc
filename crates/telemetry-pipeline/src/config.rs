// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::buffer::OverflowPolicy;
use crate::errors::PipelineError;
use std::env;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:4318/v1/telemetry";
const DEFAULT_MAX_BATCH_SIZE: usize = 512;
const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BUFFER_CAPACITY: usize = 2048;
const DEFAULT_PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction-time settings for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sink URL batches are POSTed to
    pub endpoint: String,
    /// Maximum records per exported batch
    pub max_batch_size: usize,
    /// Maximum time a record may wait in the buffer before a flush is forced
    pub max_batch_age: Duration,
    /// Total export attempts per batch, the first attempt included
    pub max_retries: u32,
    /// Ring buffer capacity
    pub buffer_capacity: usize,
    /// What `emit` does when the buffer is full
    pub overflow_policy: OverflowPolicy,
    /// Deadline for a single export attempt
    pub per_attempt_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_age: DEFAULT_MAX_BATCH_AGE,
            max_retries: DEFAULT_MAX_RETRIES,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow_policy: OverflowPolicy::DropNewest,
            per_attempt_timeout: DEFAULT_PER_ATTEMPT_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables.
    ///
    /// OTel-convention names are honored where they exist
    /// (`OTEL_EXPORTER_OTLP_ENDPOINT`, the `OTEL_BSP_*` batch processor
    /// knobs); the remaining knobs use `OTEL_PIPELINE_*` names.
    pub fn from_env() -> Result<Self, PipelineError> {
        let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let max_batch_size = env::var("OTEL_BSP_MAX_EXPORT_BATCH_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);
        let max_batch_age = env::var("OTEL_BSP_SCHEDULE_DELAY")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAX_BATCH_AGE);
        let buffer_capacity = env::var("OTEL_BSP_MAX_QUEUE_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BUFFER_CAPACITY);
        let per_attempt_timeout = env::var("OTEL_EXPORTER_OTLP_TIMEOUT")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PER_ATTEMPT_TIMEOUT);
        let max_retries = env::var("OTEL_PIPELINE_MAX_RETRIES")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let overflow_policy = match env::var("OTEL_PIPELINE_OVERFLOW_POLICY") {
            Ok(val) => val.parse::<OverflowPolicy>()?,
            Err(_) => OverflowPolicy::DropNewest,
        };

        let config = Self {
            endpoint,
            max_batch_size,
            max_batch_age,
            max_retries,
            buffer_capacity,
            overflow_policy,
            per_attempt_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PipelineError> {
        reqwest::Url::parse(&self.endpoint).map_err(|e| {
            PipelineError::InvalidConfig(format!("Invalid endpoint '{}': {e}", self.endpoint))
        })?;

        if self.buffer_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "Buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "Max batch size must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_age.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Max batch age must be greater than 0".to_string(),
            ));
        }

        if self.per_attempt_timeout.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Per-attempt timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_endpoint() {
        let config = PipelineConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = PipelineConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = PipelineConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_batch_age() {
        let config = PipelineConfig {
            max_batch_age: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
