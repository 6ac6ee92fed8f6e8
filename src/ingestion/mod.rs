//! # Ingestion Pipeline
//!
//! The two halves of bulk ingestion: the [`producer`] turns source rows into
//! queue messages, and the [`consumer`] batches deliveries and hands them to
//! the [`processor`] pool, with failures drained by the [`error_sink`].

pub mod batching;
pub mod consumer;
pub mod error_sink;
pub mod processor;
pub mod producer;

pub use batching::{Batch, BatchingConfig, BatchingEngine, EngineReport, FlushTrigger};
pub use consumer::{Consumer, ConsumerReport};
pub use error_sink::{ErrorSink, ErrorSinkReport, ErrorStage, PipelineError};
pub use processor::{BatchOutcome, BatchProcessor, ProcessorReport};
pub use producer::{Producer, ProducerReport};
