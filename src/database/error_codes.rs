//! PostgreSQL Error Codes
//!
//! SQLSTATE constants the repository classifies on. Codes are five
//! characters: a two-character class followed by the condition.
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    /// Unique violation (duplicate key) - Code 23505
    ///
    /// Raised when a bulk insert carries an id already in `user_details`,
    /// either from an earlier run or twice within the same batch.
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    /// Query canceled - Code 57014
    ///
    /// Raised when `statement_timeout` fires or the query is canceled.
    pub const QUERY_CANCELED: &'static str = "57014";

    #[inline]
    pub fn is_unique_violation(code: &str) -> bool {
        code == Self::UNIQUE_VIOLATION
    }

    #[inline]
    pub fn is_query_canceled(code: &str) -> bool {
        code == Self::QUERY_CANCELED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        assert!(PgErrorCode::is_unique_violation("23505"));
        assert!(!PgErrorCode::is_unique_violation("23502"));
        assert!(!PgErrorCode::is_unique_violation("57014"));
    }

    #[test]
    fn test_query_canceled() {
        assert!(PgErrorCode::is_query_canceled("57014"));
        assert!(!PgErrorCode::is_query_canceled("23505"));
    }
}
