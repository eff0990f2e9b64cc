// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process telemetry batching and export pipeline.
//!
//! Application code hands [`Record`]s to a [`Pipeline`]; a single background
//! worker batches them by size and age and ships each batch to a remote sink
//! over HTTP, retrying transient failures with exponential backoff while
//! preserving emission order.
//!
//! ```no_run
//! use std::time::Duration;
//! use telemetry_pipeline::{Pipeline, PipelineConfig, Record, Severity};
//!
//! # async fn example() -> Result<(), telemetry_pipeline::PipelineError> {
//! let pipeline = Pipeline::new(PipelineConfig {
//!     endpoint: "http://localhost:4318/v1/telemetry".to_string(),
//!     ..Default::default()
//! })?;
//!
//! pipeline
//!     .emit(Record::log(Severity::Info, "application started").with_attribute("version", "1.0.0"))
//!     .await?;
//!
//! pipeline.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod buffer;
pub mod config;
pub mod errors;
pub mod exporter;
pub mod pipeline;
pub mod processor;
pub mod record;

pub use buffer::{OverflowPolicy, PushOutcome, RingBuffer};
pub use config::PipelineConfig;
pub use errors::{ExportError, ExportResult, PipelineError};
pub use exporter::{Exporter, OtlpHttpExporter, RetryStrategy};
pub use pipeline::{Pipeline, PipelineState};
pub use processor::PipelineStats;
pub use record::{AttributeValue, Attributes, Record, RecordKind, Severity};
