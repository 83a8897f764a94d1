use thiserror::Error;

use crate::db_types::{NewTransaction, PaymentProvider, Transaction, TransactionKind, TransactionUpdate};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Transaction does not exist: id = {0}")]
    TransactionNotFound(i64),
    #[error("A transaction with uuid {0} already exists")]
    DuplicateTransaction(String),
    #[error("Subscription does not exist: id = {0}")]
    SubscriptionNotFound(i64),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// The persistent record store for payment transactions.
///
/// Backends implement this trait to hold the transaction ledger the reconciliation engine operates on. Every method
/// that mutates must be atomic. [`TransactionStore::insert_derivative`] additionally has to be safe under concurrent
/// calls with the same arguments, using the backend's own uniqueness primitives. The engine takes no in-process
/// lock; redelivered notifications may be handled by independent processes.
#[allow(async_fn_in_trait)]
pub trait TransactionStore: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Fetches the transaction with the given uuid, if it exists.
    async fn fetch_transaction_by_uuid(&self, uuid: &str) -> Result<Option<Transaction>, StoreError>;

    /// Fetches the transaction that the given provider knows under `provider_id`.
    ///
    /// Both provider-assigned identifiers (`uid_pay`, `uid_support`) are searched: some providers hand out an id at
    /// initiation time, others only in the first notification.
    async fn fetch_transaction_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Fetches the derivative of the given kind hanging off transaction `transaction_id`, if one exists.
    async fn fetch_related_transaction(
        &self,
        transaction_id: i64,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Creates a brand-new transaction. Fails with [`StoreError::DuplicateTransaction`] if the uuid is taken.
    ///
    /// This is the entry point used by payment-initiation flows; notifications never create payments directly,
    /// except on the subscription-charge path.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, StoreError>;

    /// Applies the given field updates to transaction `id` and returns the updated record.
    ///
    /// The caller (the reconciliation guard) has already decided the update is legal; the store applies it as a
    /// single atomic write.
    async fn update_transaction(&self, id: i64, update: TransactionUpdate) -> Result<Transaction, StoreError>;

    /// Inserts a derivative transaction linked to `related_to`, unless one of the same kind already exists.
    ///
    /// Returns the derivative and a flag indicating whether this call created it (`true`) or found an existing one
    /// (`false`). When two deliveries race, exactly one caller observes `true`.
    async fn insert_derivative(&self, related_to: i64, new: NewTransaction)
        -> Result<(Transaction, bool), StoreError>;
}
