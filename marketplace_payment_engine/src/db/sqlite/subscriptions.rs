use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{BillingPeriod, NewSubscription, PaymentProvider, Subscription, SubscriptionCharge},
};

pub async fn fetch_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Subscription>, SqliteDatabaseError> {
    let sub = sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(sub)
}

pub async fn fetch_by_uid(
    provider: PaymentProvider,
    uid: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Subscription>, SqliteDatabaseError> {
    let sub = sqlx::query_as("SELECT * FROM subscriptions WHERE provider = ? AND uid = ?")
        .bind(provider)
        .bind(uid)
        .fetch_optional(conn)
        .await?;
    Ok(sub)
}

pub async fn insert(
    new: NewSubscription,
    conn: &mut SqliteConnection,
) -> Result<Subscription, SqliteDatabaseError> {
    let uid = new.uid.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO subscriptions (provider, uid, active) VALUES (?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(new.provider)
    .bind(new.uid)
    .bind(new.active)
    .fetch_one(conn)
    .await;
    match result {
        Ok(sub) => Ok(sub),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SqliteDatabaseError::QueryError(format!("subscription {uid} is already registered")))
        },
        Err(e) => Err(e.into()),
    }
}

/// Writes the audit record tying a charge transaction to the billing period it covers.
pub async fn insert_charge(
    subscription_id: i64,
    transaction_id: i64,
    period: BillingPeriod,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let _ = sqlx::query(
        "INSERT INTO subscription_charges (subscription_id, transaction_id, period_start, period_end) VALUES (?, ?, \
         ?, ?)",
    )
    .bind(subscription_id)
    .bind(transaction_id)
    .bind(period.start)
    .bind(period.end)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn charges_for_subscription(
    subscription_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SubscriptionCharge>, SqliteDatabaseError> {
    let charges = sqlx::query_as("SELECT * FROM subscription_charges WHERE subscription_id = ? ORDER BY id")
        .bind(subscription_id)
        .fetch_all(conn)
        .await?;
    Ok(charges)
}

/// Brings the active flag in line with the given value, reporting whether anything changed. Fetch-then-write keeps
/// "no such subscription" distinguishable from "flag already had that value".
pub async fn set_active(
    subscription_id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let current = fetch_by_id(subscription_id, &mut *conn)
        .await?
        .ok_or(SqliteDatabaseError::SubscriptionNotFound(subscription_id))?;
    if current.active == active {
        return Ok(false);
    }
    let _ = sqlx::query("UPDATE subscriptions SET active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(active)
        .bind(subscription_id)
        .execute(conn)
        .await?;
    Ok(true)
}
