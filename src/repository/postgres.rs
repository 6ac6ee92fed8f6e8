//! Postgres adapter for [`UserRepository`].
//!
//! Expects the `user_details` table from
//! `migrations/20240601000000_create_user_details.sql`, keyed by `id`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use super::{RepositoryError, UserRepository};
use crate::database::PgErrorCode;
use crate::models::UserRecord;

const SELECT_COLUMNS: &str = "SELECT id, first_name, last_name, email_address, \
     created_at, deleted_at, merged_at, parent_user_id FROM user_details";

const INSERT_PREFIX: &str = "INSERT INTO user_details (id, first_name, last_name, \
     email_address, created_at, deleted_at, merged_at, parent_user_id) ";

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the multi-row insert. Parameters are bound in record order, eight
/// per record, so `$1..$8` belong to the first record.
fn build_insert(users: &[UserRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(INSERT_PREFIX);
    builder.push_values(users, |mut row, user| {
        row.push_bind(user.id)
            .push_bind(&user.first_name)
            .push_bind(&user.last_name)
            .push_bind(&user.email_address)
            .push_bind(user.created_at)
            .push_bind(user.deleted_at)
            .push_bind(user.merged_at)
            .push_bind(user.parent_user_id);
    });
    builder
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(code) if PgErrorCode::is_unique_violation(code) => RepositoryError::Duplicate,
            Some(code) if PgErrorCode::is_query_canceled(code) => {
                RepositoryError::io(operation, format!("query canceled: {db_err}"))
            }
            _ => RepositoryError::io(operation, db_err.to_string()),
        },
        other => RepositoryError::io(operation, other.to_string()),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self, users), fields(record_count = users.len()))]
    async fn bulk_insert(&self, users: &[UserRecord]) -> Result<(), RepositoryError> {
        if users.is_empty() {
            return Ok(());
        }

        // a single statement is atomic, no explicit transaction needed
        build_insert(users)
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("bulk_insert", e))?;

        debug!(record_count = users.len(), "💾 DATABASE: Bulk insert committed");
        Ok(())
    }

    async fn create(&self, user: &UserRecord) -> Result<(), RepositoryError> {
        build_insert(std::slice::from_ref(user))
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<UserRecord, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_all(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all", e))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(&format!("{SELECT_COLUMNS} ORDER BY id LIMIT $1 OFFSET $2"))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM user_details WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
