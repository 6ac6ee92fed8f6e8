//! # Batching Engine
//!
//! Groups deliveries into batches bounded by size and by age, and hands each
//! batch to the processor pool.
//!
//! States:
//!
//! - **Accumulating**: deliveries decode and append to the current batch.
//!   Reaching `batch_size` flushes immediately and rearms the timer. When the
//!   timer fires, a non-empty batch flushes and the timer is rearmed either
//!   way.
//! - **Flushing**: the batch is handed off. The hand-off waits for room in
//!   the dispatch channel, so a busy processor pool holds back consumption
//!   rather than buffering without bound.
//!
//! When the delivery stream ends, any partial batch is flushed and the engine
//! returns; dropping its dispatch sender is what tells the processors to
//! finish.
//!
//! Malformed payloads are logged and discarded. The engine never stops for
//! one.

use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::messaging::{Delivery, DeliveryStream};
use crate::models::UserRecord;

/// What caused a batch to be flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    Size,
    Timer,
    Shutdown,
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// A flushed batch as seen by the processor pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Starts at 1 and increases by one per flush
    pub sequence: u64,
    pub trigger: FlushTrigger,
    pub records: Vec<UserRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchingConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

/// What the engine did over one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub deliveries_accepted: u64,
    pub deliveries_rejected: u64,
    pub size_flushes: u64,
    pub timer_flushes: u64,
    pub shutdown_flushes: u64,
    /// Sizes of dispatched batches, in dispatch order
    pub batch_sizes: Vec<usize>,
    /// Batches that could not be handed off because every processor was gone
    pub undelivered_batches: u64,
}

impl EngineReport {
    pub fn batches_dispatched(&self) -> usize {
        self.batch_sizes.len()
    }
}

pub struct BatchingEngine {
    config: BatchingConfig,
    dispatch: mpsc::Sender<Batch>,
    batch: Vec<UserRecord>,
    next_sequence: u64,
    report: EngineReport,
}

impl BatchingEngine {
    pub fn new(config: BatchingConfig, dispatch: mpsc::Sender<Batch>) -> Self {
        let config = BatchingConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            batch: Vec::with_capacity(config.batch_size),
            config,
            dispatch,
            next_sequence: 1,
            report: EngineReport::default(),
        }
    }

    /// Consume deliveries until the stream ends, then flush what is left.
    pub async fn run(mut self, mut deliveries: DeliveryStream) -> EngineReport {
        let interval = self.config.flush_interval;
        let timer = sleep(interval);
        tokio::pin!(timer);

        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = interval.as_millis() as u64,
            "📥 BATCHING: Engine started"
        );

        loop {
            tokio::select! {
                next = deliveries.next() => match next {
                    Some(delivery) => {
                        self.accept(delivery);
                        if self.batch.len() >= self.config.batch_size {
                            self.flush(FlushTrigger::Size).await;
                            timer.as_mut().reset(Instant::now() + interval);
                        }
                    }
                    None => {
                        if !self.batch.is_empty() {
                            self.flush(FlushTrigger::Shutdown).await;
                        }
                        break;
                    }
                },
                () = &mut timer => {
                    if !self.batch.is_empty() {
                        self.flush(FlushTrigger::Timer).await;
                    }
                    timer.as_mut().reset(Instant::now() + interval);
                }
            }
        }

        info!(
            accepted = self.report.deliveries_accepted,
            rejected = self.report.deliveries_rejected,
            batches = self.report.batches_dispatched(),
            "📥 BATCHING: Delivery stream ended, engine stopped"
        );
        self.report
    }

    fn accept(&mut self, delivery: Delivery) {
        match UserRecord::from_payload(&delivery.payload) {
            Ok(user) => {
                self.report.deliveries_accepted += 1;
                self.batch.push(user);
            }
            Err(e) => {
                self.report.deliveries_rejected += 1;
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    payload_bytes = delivery.payload.len(),
                    error = %e,
                    "Discarding undecodable delivery"
                );
            }
        }
    }

    async fn flush(&mut self, trigger: FlushTrigger) {
        let records =
            std::mem::replace(&mut self.batch, Vec::with_capacity(self.config.batch_size));
        let batch = Batch {
            sequence: self.next_sequence,
            trigger,
            records,
        };
        self.next_sequence += 1;

        let size = batch.len();
        let sequence = batch.sequence;
        match trigger {
            FlushTrigger::Size => self.report.size_flushes += 1,
            FlushTrigger::Timer => self.report.timer_flushes += 1,
            FlushTrigger::Shutdown => self.report.shutdown_flushes += 1,
        }

        if self.dispatch.send(batch).await.is_ok() {
            self.report.batch_sizes.push(size);
            debug!(
                batch_sequence = sequence,
                record_count = size,
                trigger = %trigger,
                "Batch dispatched"
            );
        } else {
            self.report.undelivered_batches += 1;
            warn!(
                batch_sequence = sequence,
                record_count = size,
                "No batch processors left, batch dropped"
            );
        }
    }
}
