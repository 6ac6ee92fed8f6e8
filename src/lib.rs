#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # User Ingest
//!
//! Bulk ingestion of user records from a CSV export into a relational store
//! and a key/value cache, decoupled by a durable message queue.
//!
//! ## Architecture
//!
//! ```text
//!  CSV ──> Producer ──> MessageQueue ──> BatchingEngine ──> BatchProcessors ──> Postgres
//!         (N publishers)                (size | timer)      (encrypt, insert)  └─> Redis
//!                                                                  │
//!                                                                  └──> ErrorSink
//! ```
//!
//! - **Producer**: reads rows lazily, drops malformed ones, and publishes
//!   through a bounded worker pool with per-message timeouts.
//! - **Consumer**: accumulates deliveries into batches flushed at a size
//!   threshold or after a quiet interval, then encrypts emails, bulk inserts,
//!   and populates the cache only after a successful insert.
//! - **Shutdown** runs on channel closure, so a closed queue drains every
//!   accepted record before [`ingestion::Consumer::run`] returns.
//!
//! ## Module Organization
//!
//! - [`ingestion`] - Producer, batching engine, batch processors, error sink
//! - [`messaging`] - Queue port with RabbitMQ and in-memory adapters
//! - [`repository`] - Store port with the Postgres adapter
//! - [`cache`] - Cache port with Redis and in-memory adapters
//! - [`encryption`] - AES-GCM field encryption
//! - [`services`] - Cache-aside user service
//! - [`source`] - CSV source and row transformation
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use user_ingest::cache::InMemoryUserCache;
//! use user_ingest::config::IngestConfig;
//! use user_ingest::encryption::AesGcmEncryptor;
//! use user_ingest::ingestion::Consumer;
//! use user_ingest::messaging::InMemoryQueue;
//! use user_ingest::repository::PgUserRepository;
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::default();
//! let consumer = Consumer::new(
//!     Arc::new(InMemoryQueue::new("users")),
//!     Arc::new(PgUserRepository::new(pool)),
//!     Arc::new(InMemoryUserCache::new(Duration::from_secs(3600))),
//!     Arc::new(AesGcmEncryptor::new(b"0123456789abcdef")?),
//!     config.consumer.clone(),
//! );
//! let report = consumer.run().await?;
//! println!("persisted {}", report.processor.records_persisted);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod database;
pub mod encryption;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod repository;
pub mod services;
pub mod source;

pub use error::{IngestError, Result};
pub use models::UserRecord;
