use proptest::prelude::*;

/// Free-text CSV field without separators or quotes
pub fn text_field_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .@_-]{0,24}"
}

pub fn email_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._]{0,15}@[a-z]{1,10}\\.(com|org|io)"
}

/// Epoch millis inside chrono's range, or the absent sentinel
pub fn timestamp_field_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("-1".to_string()),
        (0i64..4_102_444_800_000).prop_map(|ms| ms.to_string()),
    ]
}

/// A well-formed eight-field source row
pub fn source_row_strategy() -> impl Strategy<Value = Vec<String>> {
    (
        any::<i64>(),
        text_field_strategy(),
        text_field_strategy(),
        email_strategy(),
        timestamp_field_strategy(),
        timestamp_field_strategy(),
        timestamp_field_strategy(),
        any::<i64>(),
    )
        .prop_map(|(id, first, last, email, created, deleted, merged, parent)| {
            vec![
                id.to_string(),
                first,
                last,
                email,
                created,
                deleted,
                merged,
                parent.to_string(),
            ]
        })
}

/// A row with any field count other than eight
pub fn wrong_width_row_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(text_field_strategy(), 0..16)
        .prop_filter("not eight fields", |row| row.len() != 8)
}
