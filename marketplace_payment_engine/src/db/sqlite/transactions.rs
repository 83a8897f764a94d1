use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewTransaction, PaymentProvider, Transaction, TransactionKind, TransactionUpdate},
};

pub async fn fetch_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_by_uuid(
    uuid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE uuid = ?").bind(uuid).fetch_optional(conn).await?;
    Ok(tx)
}

/// Searches both provider-assigned id columns. `uid_pay` is handed out at initiation time, `uid_support` arrives in
/// a later notification, and providers are not consistent about which one they echo back.
pub async fn fetch_by_provider_id(
    provider: PaymentProvider,
    provider_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as(
        "SELECT * FROM transactions WHERE provider = ? AND (uid_pay = ? OR uid_support = ?) ORDER BY id LIMIT 1",
    )
    .bind(provider)
    .bind(provider_id)
    .bind(provider_id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

pub async fn fetch_related(
    transaction_id: i64,
    kind: TransactionKind,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SqliteDatabaseError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE related_id = ? AND kind = ?")
        .bind(transaction_id)
        .bind(kind)
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// Inserts a brand-new transaction. This is not atomic on its own; embed the call in a transaction and pass
/// `&mut *tx` if you need atomicity with other statements.
pub async fn insert(new: NewTransaction, conn: &mut SqliteConnection) -> Result<Transaction, SqliteDatabaseError> {
    let uuid = new.uuid.as_str().to_string();
    let result = sqlx::query_as(
        r#"
            INSERT INTO transactions
                (uuid, amount, currency, provider, kind, status, uid_pay, uid_support, status_reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(new.uuid)
    .bind(new.amount)
    .bind(new.currency)
    .bind(new.provider)
    .bind(new.kind)
    .bind(new.status)
    .bind(new.uid_pay)
    .bind(new.uid_support)
    .bind(new.status_reason)
    .bind(new.created_at)
    .fetch_one(conn)
    .await;
    match result {
        Ok(tx) => Ok(tx),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SqliteDatabaseError::DuplicateTransaction(uuid))
        },
        Err(e) => Err(e.into()),
    }
}

/// Inserts a derivative of `related_to`, leaning on the partial unique index over `(related_id, kind)` to stay
/// race-safe: when two deliveries insert concurrently, the loser re-reads the winner's row and reports `false`.
pub async fn insert_derivative(
    related_to: i64,
    new: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, bool), SqliteDatabaseError> {
    let kind = new.kind;
    let result = sqlx::query_as(
        r#"
            INSERT INTO transactions
                (uuid, amount, currency, provider, kind, status, uid_pay, uid_support, status_reason, related_id,
                 created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(new.uuid)
    .bind(new.amount)
    .bind(new.currency)
    .bind(new.provider)
    .bind(new.kind)
    .bind(new.status)
    .bind(new.uid_pay)
    .bind(new.uid_support)
    .bind(new.status_reason)
    .bind(related_to)
    .bind(new.created_at)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(tx) => Ok((tx, true)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            let existing = fetch_related(related_to, kind, conn).await?.ok_or_else(|| {
                SqliteDatabaseError::QueryError(format!(
                    "derivative insert for transaction {related_to} hit a uniqueness conflict outside (related_id, \
                     kind)"
                ))
            })?;
            Ok((existing, false))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn update(
    id: i64,
    update: TransactionUpdate,
    conn: &mut SqliteConnection,
) -> Result<Transaction, SqliteDatabaseError> {
    if !update.is_empty() {
        let mut builder = QueryBuilder::new("UPDATE transactions SET updated_at = CURRENT_TIMESTAMP,");
        let mut set_clause = builder.separated(", ");
        if let Some(status) = update.status {
            set_clause.push("status = ");
            set_clause.push_bind_unseparated(status.to_string());
        }
        if let Some(amount) = update.amount {
            set_clause.push("amount = ");
            set_clause.push_bind_unseparated(amount);
        }
        if let Some(currency) = update.currency {
            set_clause.push("currency = ");
            set_clause.push_bind_unseparated(currency);
        }
        if let Some(uid_support) = update.uid_support {
            set_clause.push("uid_support = ");
            set_clause.push_bind_unseparated(uid_support);
        }
        if let Some(carrier) = update.carrier {
            set_clause.push("carrier = ");
            set_clause.push_bind_unseparated(carrier);
        }
        if let Some(region) = update.region {
            set_clause.push("region = ");
            set_clause.push_bind_unseparated(region);
        }
        if let Some(reason) = update.status_reason {
            set_clause.push("status_reason = ");
            set_clause.push_bind_unseparated(reason);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        trace!("🗃️ Executing query: {}", builder.sql());
        let _ = builder.build().execute(&mut *conn).await?;
    }
    fetch_by_id(id, conn).await?.ok_or(SqliteDatabaseError::TransactionNotFound(id))
}
