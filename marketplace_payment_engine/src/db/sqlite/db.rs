use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::{db_url, new_pool, subscriptions, transactions, SqliteDatabaseError};
use crate::{
    db_types::{
        BillingPeriod,
        NewSubscription,
        NewTransaction,
        PaymentProvider,
        Subscription,
        SubscriptionCharge,
        Transaction,
        TransactionKind,
        TransactionUpdate,
    },
    traits::{StoreError, SubscriptionStore, TransactionStore},
};

const DEFAULT_POOL_SIZE: u32 = 16;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, reading the URL from the environment.
    pub async fn new() -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), DEFAULT_POOL_SIZE).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any schema migrations the database file has not seen yet.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database schema is up to date");
        Ok(())
    }

    /// The charge audit trail for a subscription, oldest first.
    pub async fn charges_for_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<SubscriptionCharge>, SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        subscriptions::charges_for_subscription(subscription_id, &mut conn).await
    }
}

impl TransactionStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_transaction_by_uuid(&self, uuid: &str) -> Result<Option<Transaction>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_by_uuid(uuid, &mut conn).await?)
    }

    async fn fetch_transaction_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_by_provider_id(provider, provider_id, &mut conn).await?)
    }

    async fn fetch_related_transaction(
        &self,
        transaction_id: i64,
        kind: TransactionKind,
    ) -> Result<Option<Transaction>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_related(transaction_id, kind, &mut conn).await?)
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::insert(new, &mut conn).await?;
        debug!("🗃️ Transaction {} has been saved in the DB with id {}", tx.uuid, tx.id);
        Ok(tx)
    }

    async fn update_transaction(&self, id: i64, update: TransactionUpdate) -> Result<Transaction, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = transactions::update(id, update, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Transaction {} updated ({})", updated.uuid, updated.status);
        Ok(updated)
    }

    async fn insert_derivative(
        &self,
        related_to: i64,
        new: NewTransaction,
    ) -> Result<(Transaction, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let (derivative, created) = transactions::insert_derivative(related_to, new, &mut tx).await?;
        tx.commit().await?;
        if created {
            debug!("🗃️ {} {} recorded against transaction #{related_to}", derivative.kind, derivative.uuid);
        }
        Ok((derivative, created))
    }
}

impl SubscriptionStore for SqliteDatabase {
    async fn fetch_subscription_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(subscriptions::fetch_by_uid(provider, provider_id, &mut conn).await?)
    }

    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let sub = subscriptions::insert(new, &mut conn).await?;
        debug!("🗃️ Subscription {} ({}) registered with id {}", sub.uid, sub.provider, sub.id);
        Ok(sub)
    }

    /// In a single atomic transaction: creates the charge transaction (if its provider id is new) and the audit
    /// record tying it to the billing period. When a redelivered or racing webhook got there first, the existing
    /// transaction is returned and no audit record is written.
    async fn record_subscription_charge(
        &self,
        subscription_id: i64,
        new: NewTransaction,
        period: BillingPeriod,
    ) -> Result<(Transaction, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let _ = subscriptions::fetch_by_id(subscription_id, &mut tx)
            .await?
            .ok_or(SqliteDatabaseError::SubscriptionNotFound(subscription_id))?;
        let provider = new.provider;
        let uid = new.uid_support.clone();
        let (record, created) = match transactions::insert(new, &mut tx).await {
            Ok(t) => (t, true),
            Err(SqliteDatabaseError::DuplicateTransaction(_)) => {
                let uid = uid
                    .ok_or_else(|| SqliteDatabaseError::QueryError("charge carries no provider id".to_string()))?;
                let existing = transactions::fetch_by_provider_id(provider, &uid, &mut tx).await?.ok_or_else(
                    || SqliteDatabaseError::QueryError(format!("charge {uid} conflicted but cannot be re-read")),
                )?;
                (existing, false)
            },
            Err(e) => return Err(e.into()),
        };
        if created {
            subscriptions::insert_charge(subscription_id, record.id, period, &mut tx).await?;
        }
        tx.commit().await?;
        if created {
            debug!("🗃️ Charge {} recorded for subscription #{subscription_id}", record.uuid);
        }
        Ok((record, created))
    }

    async fn set_subscription_active(&self, subscription_id: i64, active: bool) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let changed = subscriptions::set_active(subscription_id, active, &mut tx).await?;
        tx.commit().await?;
        if changed {
            debug!("🗃️ Subscription #{subscription_id} active flag is now {active}");
        }
        Ok(changed)
    }
}
