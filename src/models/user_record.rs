use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user record as it travels through the pipeline.
///
/// Maps to the `user_details` table. `email_address` holds plaintext until a
/// batch processor replaces it with an encryption token just before
/// persistence; everything downstream of the store sees the token.
///
/// The JSON encoding of this struct is the queue message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub parent_user_id: i64,
}

impl UserRecord {
    /// Cache key for this record: the stringified id.
    pub fn cache_key(&self) -> String {
        Self::cache_key_for(self.id)
    }

    pub fn cache_key_for(id: i64) -> String {
        id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Copy of this record with `email_address` replaced.
    pub fn with_email(&self, email_address: String) -> Self {
        Self {
            email_address,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserRecord {
        UserRecord {
            id: 42,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email_address: "ada@example.com".to_string(),
            created_at: DateTime::from_timestamp_millis(1_700_000_000_123),
            deleted_at: None,
            merged_at: None,
            parent_user_id: 0,
        }
    }

    #[test]
    fn test_cache_key_is_stringified_id() {
        assert_eq!(sample().cache_key(), "42");
        assert_eq!(UserRecord::cache_key_for(-7), "-7");
    }

    #[test]
    fn test_payload_keeps_millisecond_timestamps() {
        let user = sample();
        let decoded = UserRecord::from_payload(&user.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, user);
        assert_eq!(
            decoded.created_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_123)
        );
    }

    #[test]
    fn test_absent_timestamps_encode_as_null() {
        let json: serde_json::Value =
            serde_json::from_slice(&sample().to_payload().unwrap()).unwrap();
        assert!(json["deleted_at"].is_null());
        assert_eq!(json["email_address"], "ada@example.com");
    }

    #[test]
    fn test_with_email_leaves_other_fields() {
        let user = sample();
        let sealed = user.with_email("token".to_string());
        assert_eq!(sealed.email_address, "token");
        assert_eq!(sealed.id, user.id);
        assert_eq!(sealed.created_at, user.created_at);
    }
}
