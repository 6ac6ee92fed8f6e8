//! Shared fixtures for the integration suites: in-process stand-ins for the
//! store, cache and cipher, plus record builders.

#![allow(dead_code)] // Each suite uses a different subset

pub mod fakes;
pub mod strategies;

pub use fakes::*;

use user_ingest::encryption::AesGcmEncryptor;
use user_ingest::messaging::{InMemoryQueue, MessageQueue};
use user_ingest::UserRecord;

pub const TEST_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

pub fn encryptor() -> AesGcmEncryptor {
    AesGcmEncryptor::new(TEST_KEY).expect("test key is 32 bytes")
}

pub fn email_for(id: i64) -> String {
    format!("user{id}@example.com")
}

pub fn user(id: i64) -> UserRecord {
    UserRecord {
        id,
        first_name: format!("First{id}"),
        last_name: format!("Last{id}"),
        email_address: email_for(id),
        created_at: None,
        deleted_at: None,
        merged_at: None,
        parent_user_id: 0,
    }
}

pub fn users(ids: impl IntoIterator<Item = i64>) -> Vec<UserRecord> {
    ids.into_iter().map(user).collect()
}

/// Publish every record to `queue` as a wire payload.
pub async fn publish_all(queue: &InMemoryQueue, records: &[UserRecord]) {
    for record in records {
        queue
            .publish(&record.to_payload().expect("record serializes"))
            .await
            .expect("in-memory publish");
    }
}
