use thiserror::Error;

use crate::traits::StoreError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Cannot insert duplicate transaction {0}")]
    DuplicateTransaction(String),
    #[error("Transaction not found: id = {0}")]
    TransactionNotFound(i64),
    #[error("Subscription not found: id = {0}")]
    SubscriptionNotFound(i64),
}

impl From<SqliteDatabaseError> for StoreError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DriverError(e) => StoreError::Database(e.to_string()),
            SqliteDatabaseError::MigrationError(e) => StoreError::Database(e.to_string()),
            SqliteDatabaseError::QueryError(s) => StoreError::Database(s),
            SqliteDatabaseError::DuplicateTransaction(uuid) => StoreError::DuplicateTransaction(uuid),
            SqliteDatabaseError::TransactionNotFound(id) => StoreError::TransactionNotFound(id),
            SqliteDatabaseError::SubscriptionNotFound(id) => StoreError::SubscriptionNotFound(id),
        }
    }
}
