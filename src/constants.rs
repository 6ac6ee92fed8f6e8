//! # Pipeline Constants
//!
//! Defaults and fixed layout values shared by the producer, the consumer and
//! the configuration layer.

/// Number of fields a source row must carry to become a record.
pub const SOURCE_FIELD_COUNT: usize = 8;

/// Timestamp field value meaning "absent".
pub const ABSENT_TIMESTAMP_SENTINEL: &str = "-1";

/// Columns written for every record, in bind order.
pub const USER_COLUMN_COUNT: usize = 8;

/// Postgres caps a single statement at 65535 bind parameters.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Largest batch a single bulk insert can carry.
pub const MAX_BULK_INSERT_RECORDS: usize = MAX_BIND_PARAMETERS / USER_COLUMN_COUNT;

pub mod producer {
    pub const DEFAULT_WORKER_COUNT: usize = 15;
    pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 15_000;
    /// Job queue capacity is this multiple of the worker count.
    pub const JOB_QUEUE_FACTOR: usize = 2;
}

pub mod consumer {
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_WORKER_COUNT: usize = 3;
    pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 15_000;
    pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 15_000;
}

pub mod storage {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3_600;
    pub const DEFAULT_CACHE_POOL_SIZE: u32 = 10;
    pub const DEFAULT_QUEUE_NAME: &str = "user_records";
}
