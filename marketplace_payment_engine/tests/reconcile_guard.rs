//! The transition guard exercised against a real database.

use std::str::FromStr;

use chrono::{Duration, Utc};
use marketplace_payment_engine::{
    db_types::{
        NewTransaction,
        PaymentProvider,
        TransactionKind,
        TransactionStatus,
        TransactionUpdate,
        TransactionUuid,
    },
    errors::{ProcessError, TransitionError},
    notification::NotificationContext,
    traits::TransactionStore,
    Reconciler,
};
use mpg_common::MarketAmount;

mod support;
use support::new_db;

fn uuid(s: &str) -> TransactionUuid {
    TransactionUuid::from(s.to_string())
}

#[tokio::test]
async fn terminal_states_never_move() {
    let db = new_db().await;
    let tx = db
        .create_transaction(
            NewTransaction::new(uuid("uuid-t1"), PaymentProvider::Boku).with_status(TransactionStatus::Failed),
        )
        .await
        .unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Boku);

    for to in [
        TransactionStatus::Pending,
        TransactionStatus::Received,
        TransactionStatus::Completed,
        TransactionStatus::Checked,
        TransactionStatus::Cancelled,
    ] {
        let err =
            reconciler.apply_status(&ctx, &tx, TransactionUpdate::default().with_status(to)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Transition(TransitionError::Terminal { .. })), "{to} got through");
    }
    let stored = db.fetch_transaction_by_uuid("uuid-t1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn completed_payments_cannot_revert() {
    let db = new_db().await;
    let tx = db
        .create_transaction(
            NewTransaction::new(uuid("uuid-t2"), PaymentProvider::Paypal).with_status(TransactionStatus::Completed),
        )
        .await
        .unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Paypal);

    let err = reconciler
        .apply_status(&ctx, &tx, TransactionUpdate::default().with_status(TransactionStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Transition(TransitionError::Forbidden { .. })));

    // The one legal forward move is to Checked.
    let checked = reconciler
        .apply_status(&ctx, &tx, TransactionUpdate::default().with_status(TransactionStatus::Checked))
        .await
        .unwrap();
    assert_eq!(checked.status, TransactionStatus::Checked);
}

#[tokio::test]
async fn the_lockdown_window_freezes_financial_fields() {
    let db = new_db().await;
    let old = db
        .create_transaction(
            NewTransaction::new(uuid("uuid-t3"), PaymentProvider::Paypal)
                .with_uid_pay("AP-OLD")
                .created_at(Utc::now() - Duration::hours(30)),
        )
        .await
        .unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Paypal);

    let update = TransactionUpdate::default()
        .with_status(TransactionStatus::Completed)
        .with_amount(MarketAmount::from_str("3.00").unwrap(), "USD");
    let err = reconciler.apply_status(&ctx, &old, update).await.unwrap_err();
    assert!(matches!(err, ProcessError::Transition(TransitionError::LockedDown { .. })));
    let stored = db.fetch_transaction_by_uuid("uuid-t3").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert!(stored.amount.is_none());

    // Note-only fields stay mutable for audit trails.
    let updated = reconciler
        .apply_status(&ctx, &old, TransactionUpdate::default().with_status_reason("late notification"))
        .await
        .unwrap();
    assert_eq!(updated.status_reason.as_deref(), Some("late notification"));

    // A wider window admits the same change.
    let relaxed = Reconciler::new(db.clone()).with_lockdown_window(Duration::hours(48));
    let update = TransactionUpdate::default().with_status(TransactionStatus::Completed);
    let updated = relaxed.apply_status(&ctx, &old, update).await.unwrap();
    assert_eq!(updated.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn only_completed_payments_spawn_derivatives() {
    let db = new_db().await;
    let pending =
        db.create_transaction(NewTransaction::new(uuid("uuid-t4"), PaymentProvider::Paypal)).await.unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Paypal);

    let err =
        reconciler.derive(&ctx, &pending, TransactionKind::Refund, None, None, None).await.unwrap_err();
    assert!(matches!(err, ProcessError::Transition(TransitionError::NotDerivable { .. })));
}

#[tokio::test]
async fn derivatives_cannot_spawn_derivatives() {
    let db = new_db().await;
    let original = db
        .create_transaction(
            NewTransaction::new(uuid("uuid-t5"), PaymentProvider::Paypal).with_status(TransactionStatus::Completed),
        )
        .await
        .unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Paypal);

    let (refund, created) =
        reconciler.derive(&ctx, &original, TransactionKind::Refund, None, None, None).await.unwrap();
    assert!(created);
    let err = reconciler.derive(&ctx, &refund, TransactionKind::Reversal, None, None, None).await.unwrap_err();
    assert!(matches!(err, ProcessError::Transition(TransitionError::DerivativeOfDerivative { .. })));
}

#[tokio::test]
async fn a_payment_carries_at_most_one_derivative_of_each_kind() {
    let db = new_db().await;
    let original = db
        .create_transaction(
            NewTransaction::new(uuid("uuid-t6"), PaymentProvider::Braintree)
                .with_status(TransactionStatus::Completed)
                .with_amount(MarketAmount::from_str("8.00").unwrap(), "USD"),
        )
        .await
        .unwrap();
    let reconciler = Reconciler::new(db.clone());
    let ctx = NotificationContext::new(PaymentProvider::Braintree);

    let (refund, created) =
        reconciler.derive(&ctx, &original, TransactionKind::Refund, None, None, None).await.unwrap();
    assert!(created);
    // The refund inherits the original's amount, negated.
    assert_eq!(refund.amount, Some(MarketAmount::from_str("-8.00").unwrap()));

    let (reversal, created) =
        reconciler.derive(&ctx, &original, TransactionKind::Reversal, None, None, None).await.unwrap();
    assert!(created);
    assert_ne!(reversal.id, refund.id);

    let (again, created) =
        reconciler.derive(&ctx, &original, TransactionKind::Refund, None, None, None).await.unwrap();
    assert!(!created);
    assert_eq!(again.id, refund.id);
}
