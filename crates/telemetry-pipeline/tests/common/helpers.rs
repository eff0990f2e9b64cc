// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::time::Duration;
use telemetry_pipeline::record::{Record, Severity};
use tokio::time::{sleep, timeout};

/// Polls `condition` until it holds or `deadline` elapses.
pub async fn wait_until(condition: impl Fn() -> bool, deadline: Duration) -> bool {
    let result = timeout(deadline, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    result.is_ok()
}

/// A log record whose body doubles as its identity in assertions.
pub fn labeled_record(label: &str) -> Record {
    Record::log(Severity::Info, label).with_attribute("test", true)
}
