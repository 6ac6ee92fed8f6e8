//! # Producer
//!
//! Streams source rows into the queue through a fixed pool of publisher
//! workers.
//!
//! ```text
//!   source rows ──> reader (blocking pool) ──> job queue (2N) ──> N publishers ──> MessageQueue
//! ```
//!
//! The reader runs on tokio's blocking pool, so a slow file never stalls the
//! async workers, and it blocks whenever the bounded job queue is full. Rows
//! that do not carry exactly eight fields are logged and skipped. Publish
//! failures and timeouts are logged per record and never stop the run.
//! [`Producer::start`] returns only after every job has been attempted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProducerConfig;
use crate::error::{IngestError, Result};
use crate::messaging::MessageQueue;
use crate::models::UserRecord;
use crate::source::{transform_row, SourceError};

/// Counts for one producer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Rows pulled from the source, well-formed or not
    pub rows_read: u64,
    /// Rows rejected for their field count
    pub rows_skipped: u64,
    pub read_errors: u64,
    pub published: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Default)]
struct ProducerCounters {
    rows_read: AtomicU64,
    rows_skipped: AtomicU64,
    read_errors: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

impl ProducerCounters {
    fn snapshot(&self) -> ProducerReport {
        ProducerReport {
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Producer {
    queue: Arc<dyn MessageQueue>,
    config: ProducerConfig,
}

impl Producer {
    pub fn new(queue: Arc<dyn MessageQueue>, config: ProducerConfig) -> Self {
        Self { queue, config }
    }

    /// Read the whole source and publish every well-formed row.
    ///
    /// Per-row problems are counted in the report; only a crashed background
    /// task surfaces as an error.
    #[instrument(skip(self, source), fields(queue = %self.queue.queue_name()))]
    pub async fn start<I>(&self, source: I) -> Result<ProducerReport>
    where
        I: IntoIterator<Item = std::result::Result<Vec<String>, SourceError>>,
        I::IntoIter: Send + 'static,
    {
        let worker_count = self.config.worker_count.max(1);
        let publish_timeout = self.config.publish_timeout();
        let counters = Arc::new(ProducerCounters::default());

        let (job_tx, job_rx) = mpsc::channel::<UserRecord>(self.config.job_queue_capacity().max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));

        info!(
            "🏊 POOL: Starting {} publisher workers (job queue capacity {})",
            worker_count,
            self.config.job_queue_capacity().max(1)
        );

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_publisher(
                    worker_id,
                    Arc::clone(&self.queue),
                    Arc::clone(&job_rx),
                    publish_timeout,
                    Arc::clone(&counters),
                ))
            })
            .collect();

        let reader_counters = Arc::clone(&counters);
        let rows = source.into_iter();
        let reader =
            tokio::task::spawn_blocking(move || read_source(rows, job_tx, &reader_counters));

        let reader_result = reader.await;
        for worker in workers {
            worker
                .await
                .map_err(|e| IngestError::task_join("publisher", e))?;
        }
        reader_result.map_err(|e| IngestError::task_join("source_reader", e))?;

        let report = counters.snapshot();
        info!(
            rows_read = report.rows_read,
            rows_skipped = report.rows_skipped,
            read_errors = report.read_errors,
            published = report.published,
            publish_failures = report.publish_failures,
            "✅ PRODUCER: Source fully processed"
        );
        Ok(report)
    }

    /// Release the queue connection.
    pub async fn close(&self) -> Result<()> {
        self.queue.close().await?;
        info!(queue = %self.queue.queue_name(), "🔌 PRODUCER: Queue connection closed");
        Ok(())
    }
}

/// Runs on the blocking pool. Dropping `jobs` on return is what lets the
/// publishers drain and exit.
fn read_source<I>(rows: I, jobs: mpsc::Sender<UserRecord>, counters: &ProducerCounters)
where
    I: Iterator<Item = std::result::Result<Vec<String>, SourceError>>,
{
    for (index, row) in rows.enumerate() {
        let fields = match row {
            Ok(fields) => fields,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "❌ PRODUCER: Source unreadable, stopping read");
                counters.read_errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
            Err(e) => {
                warn!(row = index, error = %e, "Skipping unreadable source row");
                counters.read_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        counters.rows_read.fetch_add(1, Ordering::Relaxed);

        match transform_row(&fields) {
            Ok(user) => {
                if jobs.blocking_send(user).is_err() {
                    error!("❌ PRODUCER: All publishers gone, stopping read");
                    break;
                }
            }
            Err(e) => {
                warn!(row = index, error = %e, "Skipping malformed source row");
                counters.rows_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn run_publisher(
    worker_id: usize,
    queue: Arc<dyn MessageQueue>,
    jobs: Arc<Mutex<mpsc::Receiver<UserRecord>>>,
    publish_timeout: Duration,
    counters: Arc<ProducerCounters>,
) {
    debug!(worker_id = worker_id, "Publisher worker started");

    loop {
        let next = { jobs.lock().await.recv().await };
        let Some(user) = next else {
            break;
        };

        let payload = match user.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    worker_id = worker_id,
                    record_id = user.id,
                    error = %e,
                    "❌ PRODUCER: Failed to encode record"
                );
                counters.publish_failures.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        match tokio::time::timeout(publish_timeout, queue.publish(&payload)).await {
            Ok(Ok(())) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                warn!(worker_id = worker_id, record_id = user.id, error = %e, "Publish failed");
                counters.publish_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                warn!(
                    worker_id = worker_id,
                    record_id = user.id,
                    timeout_ms = publish_timeout.as_millis() as u64,
                    "Publish timed out"
                );
                counters.publish_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    debug!(worker_id = worker_id, "Publisher worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{DeliveryStream, InMemoryQueue, MessagingError};
    use async_trait::async_trait;
    use futures::StreamExt;
    use tokio::sync::Semaphore;

    /// Publishes only once a permit is released for it.
    struct GatedQueue {
        gate: Semaphore,
        published: AtomicU64,
    }

    #[async_trait]
    impl MessageQueue for GatedQueue {
        async fn publish(&self, _payload: &[u8]) -> std::result::Result<(), MessagingError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| MessagingError::closed("gated"))?;
            permit.forget();
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(&self) -> std::result::Result<DeliveryStream, MessagingError> {
            Err(MessagingError::already_subscribed("gated"))
        }

        async fn close(&self) -> std::result::Result<(), MessagingError> {
            Ok(())
        }

        fn queue_name(&self) -> &str {
            "gated"
        }

        fn provider_name(&self) -> &'static str {
            "gated"
        }
    }

    fn row(id: &str) -> std::result::Result<Vec<String>, SourceError> {
        Ok([id, "First", "Last", "user@example.com", "1700000000000", "-1", "-1", "0"]
            .iter()
            .map(|f| f.to_string())
            .collect())
    }

    fn config(worker_count: usize) -> ProducerConfig {
        ProducerConfig {
            worker_count,
            ..ProducerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_publishes_every_well_formed_row() {
        let queue = Arc::new(InMemoryQueue::new("users"));
        let producer = Producer::new(queue.clone(), config(4));

        let rows: Vec<_> = (1..=20).map(|i| row(&i.to_string())).collect();
        let report = producer.start(rows).await.unwrap();

        assert_eq!(report.rows_read, 20);
        assert_eq!(report.published, 20);
        assert_eq!(report.publish_failures, 0);

        producer.close().await.unwrap();
        let mut ids: Vec<i64> = queue
            .subscribe()
            .await
            .unwrap()
            .map(|d| UserRecord::from_payload(&d.payload).unwrap().id)
            .collect()
            .await;
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_wrong_field_counts_are_skipped() {
        let queue = Arc::new(InMemoryQueue::new("users"));
        let producer = Producer::new(queue.clone(), config(2));

        let rows = vec![
            row("1"),
            Ok(vec!["2".to_string(), "short".to_string()]),
            row("3"),
            Err(SourceError::Read {
                line: 4,
                message: "bad utf-8".to_string(),
            }),
        ];
        let report = producer.start(rows).await.unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.read_errors, 1);
        assert_eq!(report.published, 2);
    }

    #[tokio::test]
    async fn test_closed_queue_counts_failures_and_finishes() {
        let queue = Arc::new(InMemoryQueue::new("users"));
        queue.close().await.unwrap();
        let producer = Producer::new(queue, config(3));

        let rows: Vec<_> = (1..=5).map(|i| row(&i.to_string())).collect();
        let report = producer.start(rows).await.unwrap();

        assert_eq!(report.published, 0);
        assert_eq!(report.publish_failures, 5);
    }

    #[tokio::test]
    async fn test_fatal_source_error_stops_reading() {
        let queue = Arc::new(InMemoryQueue::new("users"));
        let producer = Producer::new(queue, config(1));

        let rows = vec![
            row("1"),
            Err(SourceError::Io {
                message: "disk gone".to_string(),
            }),
            row("2"),
        ];
        let report = producer.start(rows).await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.read_errors, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stalled_publishers_stop_the_reader() {
        let queue = Arc::new(GatedQueue {
            gate: Semaphore::new(0),
            published: AtomicU64::new(0),
        });
        let worker_count = 2;
        let producer = Producer::new(
            queue.clone(),
            ProducerConfig {
                worker_count,
                publish_timeout_ms: 60_000,
                ..ProducerConfig::default()
            },
        );

        let pulled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&pulled);
        let rows = (1..=50).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            row(&i.to_string())
        });
        let run = tokio::spawn(async move { producer.start(rows).await });

        // N jobs held by publishers, 2N queued, one more row blocked in send
        let expected = (worker_count * 2 + worker_count + 1) as u64;
        tokio::time::timeout(Duration::from_secs(5), async {
            while pulled.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), expected);
        assert_eq!(queue.published.load(Ordering::SeqCst), 0);
        assert!(!run.is_finished());

        queue.gate.add_permits(50);
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.published, 50);
        assert_eq!(pulled.load(Ordering::SeqCst), 50);
    }
}
