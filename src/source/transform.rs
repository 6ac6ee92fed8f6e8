//! Raw field row to [`UserRecord`].
//!
//! Field layout, in order: id, first name, last name, email address,
//! created-at, deleted-at, merged-at, parent user id. Timestamps are epoch
//! milliseconds with `-1` meaning absent.
//!
//! Malformed numeric fields never reject a row: an unparsable id becomes 0
//! and an unparsable timestamp becomes absent. Only the field count can
//! reject a row.

use chrono::{DateTime, Utc};

use super::RowError;
use crate::constants::{ABSENT_TIMESTAMP_SENTINEL, SOURCE_FIELD_COUNT};
use crate::models::UserRecord;

pub fn transform_row<S: AsRef<str>>(fields: &[S]) -> Result<UserRecord, RowError> {
    let [
        id,
        first_name,
        last_name,
        email_address,
        created_at,
        deleted_at,
        merged_at,
        parent_user_id,
    ] = fields
    else {
        return Err(RowError::InvalidFieldCount {
            expected: SOURCE_FIELD_COUNT,
            actual: fields.len(),
        });
    };

    Ok(UserRecord {
        id: parse_i64_or_zero(id.as_ref()),
        first_name: first_name.as_ref().to_string(),
        last_name: last_name.as_ref().to_string(),
        email_address: email_address.as_ref().to_string(),
        created_at: parse_optional_timestamp(created_at.as_ref()),
        deleted_at: parse_optional_timestamp(deleted_at.as_ref()),
        merged_at: parse_optional_timestamp(merged_at.as_ref()),
        parent_user_id: parse_i64_or_zero(parent_user_id.as_ref()),
    })
}

pub fn parse_i64_or_zero(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

/// `-1`, unparsable text, and millisecond values outside chrono's range are
/// all absent.
pub fn parse_optional_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value == ABSENT_TIMESTAMP_SENTINEL {
        return None;
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}
