// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO shared between producers and the batch worker.

use crate::errors::PipelineError;
use crate::record::Record;
use std::collections::VecDeque;
use std::pin::pin;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Default producer wait under the `block` policy when none is configured.
const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// What `push` does when the buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum OverflowPolicy {
    /// Reject the incoming record
    #[display("drop-newest")]
    DropNewest,
    /// Evict the oldest pending record to make room
    #[display("drop-oldest")]
    DropOldest,
    /// Wait for the worker to free space, up to the timeout
    #[display("block")]
    Block { timeout: Duration },
}

impl FromStr for OverflowPolicy {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "drop-newest" => Ok(OverflowPolicy::DropNewest),
            "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "block" => Ok(OverflowPolicy::Block {
                timeout: DEFAULT_BLOCK_TIMEOUT,
            }),
            other => Err(PipelineError::InvalidConfig(format!(
                "Unknown overflow policy '{other}'. Must be one of: drop-newest, drop-oldest, block"
            ))),
        }
    }
}

/// Result of a successful `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// Stored, but the oldest pending record was evicted to make room.
    ReplacedOldest,
}

struct Entry {
    enqueued_at: Instant,
    record: Record,
}

/// Fixed-capacity queue of pending records, safe for any number of
/// producers concurrent with the single draining worker.
///
/// Ordering is global FIFO by enqueue completion time.
pub struct RingBuffer {
    inner: Mutex<VecDeque<Entry>>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Occupancy at which a push wakes the worker for a size-triggered flush
    wake_threshold: usize,
    worker_wakeup: Notify,
    space_freed: Notify,
}

impl RingBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy, wake_threshold: usize) -> Self {
        RingBuffer {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            wake_threshold,
            worker_wakeup: Notify::new(),
            space_freed: Notify::new(),
        }
    }

    /// Enqueues a record, applying the overflow policy when full.
    pub async fn push(&self, record: Record) -> Result<PushOutcome, PipelineError> {
        match self.policy {
            OverflowPolicy::DropNewest => self
                .try_push(record)
                .map_err(|_| PipelineError::BufferFull),
            OverflowPolicy::DropOldest => Ok(self.push_evicting(record)),
            OverflowPolicy::Block { timeout } => {
                let deadline = Instant::now() + timeout;
                let mut record = record;
                loop {
                    // Register for the space signal before checking occupancy
                    // so a drain racing with the check is not missed.
                    let mut space = pin!(self.space_freed.notified());
                    space.as_mut().enable();
                    match self.try_push(record) {
                        Ok(outcome) => return Ok(outcome),
                        Err(rejected) => {
                            record = rejected;
                            if tokio::time::timeout_at(deadline, space).await.is_err() {
                                return Err(PipelineError::BufferFull);
                            }
                        }
                    }
                }
            }
        }
    }

    fn try_push(&self, record: Record) -> Result<PushOutcome, Record> {
        let occupancy = {
            #[allow(clippy::expect_used)]
            let mut queue = self.inner.lock().expect("lock poisoned");
            if queue.len() >= self.capacity {
                return Err(record);
            }
            queue.push_back(Entry {
                enqueued_at: Instant::now(),
                record,
            });
            queue.len()
        };
        self.wake_worker(occupancy);
        Ok(PushOutcome::Stored)
    }

    fn push_evicting(&self, record: Record) -> PushOutcome {
        let (occupancy, evicted) = {
            #[allow(clippy::expect_used)]
            let mut queue = self.inner.lock().expect("lock poisoned");
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front().is_some()
            } else {
                false
            };
            queue.push_back(Entry {
                enqueued_at: Instant::now(),
                record,
            });
            (queue.len(), evicted)
        };
        self.wake_worker(occupancy);
        if evicted {
            PushOutcome::ReplacedOldest
        } else {
            PushOutcome::Stored
        }
    }

    /// Removes and returns up to `max_n` records in FIFO order.
    pub fn drain(&self, max_n: usize) -> Vec<Record> {
        let drained: Vec<Record> = {
            #[allow(clippy::expect_used)]
            let mut queue = self.inner.lock().expect("lock poisoned");
            (0..max_n)
                .map_while(|_| queue.pop_front())
                .map(|entry| entry.record)
                .collect()
        };
        if !drained.is_empty() {
            self.space_freed.notify_waiters();
        }
        drained
    }

    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let queue = self.inner.lock().expect("lock poisoned");
        queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue time of the oldest pending record, if any. Drives the
    /// worker's age-trigger deadline.
    pub fn oldest_enqueued_at(&self) -> Option<Instant> {
        #[allow(clippy::expect_used)]
        let queue = self.inner.lock().expect("lock poisoned");
        queue.front().map(|entry| entry.enqueued_at)
    }

    /// Resolves when a push makes the buffer worth looking at again:
    /// either the first record after empty (arms the age trigger) or
    /// occupancy reaching the wake threshold (size trigger).
    pub async fn activity(&self) {
        self.worker_wakeup.notified().await;
    }

    fn wake_worker(&self, occupancy: usize) {
        if occupancy == 1 || occupancy >= self.wake_threshold {
            self.worker_wakeup.notify_one();
        }
    }
}
