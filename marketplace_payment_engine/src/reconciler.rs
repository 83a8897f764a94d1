//! The guard that decides whether a verified, parsed notification may touch the ledger, and applies it if so.
//!
//! All legality judgments live here, behind [`can_transition`], so that no provider processor carries its own
//! variant of the rules. The three operations mirror the three things a notification can mean:
//! * [`Reconciler::apply_status`]: mutate the status (and any reported fields) of an existing transaction;
//! * [`Reconciler::derive`]: spawn a refund or reversal off a completed payment, exactly once;
//! * [`Reconciler::reconcile_subscription_charge`]: fold a recurring-billing webhook into charge records.
//!
//! Every mutation is a single atomic store call. Rejections never mutate: a notification that fails the guard
//! leaves the ledger exactly as it found it.

use chrono::Duration;
use log::{debug, info, warn};

use crate::{
    db_types::{
        BillingPeriod,
        NewTransaction,
        Subscription,
        Transaction,
        TransactionKind,
        TransactionStatus,
        TransactionUpdate,
        TransactionUuid,
    },
    errors::{ConsistencyError, ProcessError, TransitionError},
    mapper::{map_status, CanonicalOutcome},
    notification::NotificationContext,
    traits::{SubscriptionStore, TransactionStore},
};

/// How long a transaction's financial fields stay open to mutation by notifications.
pub const DEFAULT_LOCKDOWN_HOURS: i64 = 24;

/// The single source of truth for status-transition legality.
///
/// | from \ to | PENDING | RECEIVED | COMPLETED | CHECKED | FAILED | CANCELLED |
/// |-----------|---------|----------|-----------|---------|--------|-----------|
/// | PENDING   |    •    |    ✓     |     ✓     |    ✓    |   ✓    |     ✓     |
/// | RECEIVED  |    ✗    |    •     |     ✓     |    ✓    |   ✓    |     ✓     |
/// | COMPLETED |    ✗    |    ✗     |     •     |    ✓    |   ✗    |     ✗     |
/// | CHECKED   |    ✗    |    ✗     |     ✗     |    •    |   ✗    |     ✗     |
/// | FAILED    |    ✗    |    ✗     |     ✗     |    ✗    |   •    |     ✗     |
/// | CANCELLED |    ✗    |    ✗     |     ✗     |    ✗    |   ✗    |     •     |
///
/// `•` marks the trivial self-transition, which is always allowed so that redelivered notifications are no-ops
/// rather than errors. Every other transition is additionally denied once `age` exceeds the `lockdown` window,
/// however legal the table says it is.
pub fn can_transition(from: TransactionStatus, to: TransactionStatus, age: Duration, lockdown: Duration) -> bool {
    use TransactionStatus::*;
    if from == to {
        return true;
    }
    if age > lockdown {
        return false;
    }
    match (from, to) {
        (Pending, _) => true,
        (Received, Completed | Checked | Failed | Cancelled) => true,
        (Completed, Checked) => true,
        _ => false,
    }
}

//--------------------------------------      Reconciler       -------------------------------------------------------

/// Applies verified notifications to the transaction ledger, enforcing the transition rules.
#[derive(Debug, Clone)]
pub struct Reconciler<B> {
    db: B,
    lockdown: Duration,
}

impl<B> Reconciler<B> {
    pub fn new(db: B) -> Self {
        Self { db, lockdown: Duration::hours(DEFAULT_LOCKDOWN_HOURS) }
    }

    pub fn with_lockdown_window(mut self, window: Duration) -> Self {
        self.lockdown = window;
        self
    }

    pub fn lockdown_window(&self) -> Duration {
        self.lockdown
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

impl<B> Reconciler<B>
where B: TransactionStore
{
    /// Applies a status change (and any other fields the notification reported) to `tx`.
    ///
    /// Rejections are judged against the transaction's age at the moment the notification was *received*, so a
    /// slow request cannot push a transaction over the lockdown boundary mid-flight. An empty update and a
    /// same-status update inside the window are both accepted no-ops.
    pub async fn apply_status(
        &self,
        ctx: &NotificationContext,
        tx: &Transaction,
        update: TransactionUpdate,
    ) -> Result<Transaction, ProcessError> {
        if update.is_empty() {
            debug!("🔄️ [{ctx}] empty update for transaction {}, nothing to do", tx.uuid);
            return Ok(tx.clone());
        }
        let age = tx.age_at(ctx.received_at);
        if update.is_financial() && age > self.lockdown {
            warn!("🔄️ [{ctx}] transaction {} is past the lockdown window, rejecting financial update", tx.uuid);
            return Err(TransitionError::LockedDown {
                uuid: tx.uuid.to_string(),
                age_hours: age.num_hours(),
                window_hours: self.lockdown.num_hours(),
            }
            .into());
        }
        if let Some(to) = update.status {
            if !can_transition(tx.status, to, age, self.lockdown) {
                let err = if tx.status.is_terminal() {
                    TransitionError::Terminal { uuid: tx.uuid.to_string(), status: tx.status }
                } else {
                    TransitionError::Forbidden { uuid: tx.uuid.to_string(), from: tx.status, to }
                };
                warn!("🔄️ [{ctx}] {err}");
                return Err(err.into());
            }
        }
        let updated = self.db.update_transaction(tx.id, update).await?;
        info!("🔄️ [{ctx}] transaction {} is now {} ({})", updated.uuid, updated.status, updated.kind);
        Ok(updated)
    }

    /// Creates the refund or reversal that `tx` has spawned, exactly once.
    ///
    /// If a derivative of the requested kind already exists it is returned unchanged with a `false` flag, which is
    /// what makes redelivered refund notifications safe. Only an original payment in `Completed` may spawn one.
    /// The derivative records the money moving the other way, so its amount is stored negated.
    pub async fn derive(
        &self,
        ctx: &NotificationContext,
        tx: &Transaction,
        kind: TransactionKind,
        amount: Option<mpg_common::MarketAmount>,
        currency: Option<String>,
        provider_id: Option<String>,
    ) -> Result<(Transaction, bool), ProcessError> {
        if tx.kind != TransactionKind::Payment {
            return Err(TransitionError::DerivativeOfDerivative { uuid: tx.uuid.to_string(), kind: tx.kind }.into());
        }
        if tx.status != TransactionStatus::Completed {
            return Err(
                TransitionError::NotDerivable { uuid: tx.uuid.to_string(), status: tx.status, kind }.into()
            );
        }
        if let Some(existing) = self.db.fetch_related_transaction(tx.id, kind).await? {
            debug!("🔄️ [{ctx}] {kind} {} already recorded for transaction {}", existing.uuid, tx.uuid);
            return Ok((existing, false));
        }
        let amount = amount.or(tx.amount).map(|a| if a.is_negative() { a } else { -a });
        let currency = currency.or_else(|| tx.currency.clone());
        let mut new = NewTransaction::new(TransactionUuid::fresh(), tx.provider)
            .with_kind(kind)
            .with_status(TransactionStatus::Completed);
        if let (Some(amount), Some(currency)) = (amount, currency) {
            new = new.with_amount(amount, currency);
        }
        if let Some(id) = provider_id {
            new = new.with_uid_support(id);
        }
        let (derivative, created) = self.db.insert_derivative(tx.id, new).await?;
        if created {
            info!("🔄️ [{ctx}] recorded {kind} {} against transaction {}", derivative.uuid, tx.uuid);
        } else {
            debug!("🔄️ [{ctx}] lost the race to record {kind} for transaction {}, using {}", tx.uuid, derivative.uuid);
        }
        Ok((derivative, created))
    }
}

//--------------------------------------  Subscription charges  ------------------------------------------------------

/// One charge attempt as reported inside a recurring-billing webhook, in the provider's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedCharge {
    /// The provider-assigned transaction id for this charge attempt.
    pub provider_id: String,
    /// The provider's sub-status string, untranslated.
    pub status: String,
    pub amount: Option<mpg_common::MarketAmount>,
    pub currency: Option<String>,
}

/// What a subscription webhook did to the ledger.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOutcome {
    /// Charge records created by this webhook.
    pub created: Vec<Transaction>,
    /// Charges that were already recorded with the expected status.
    pub verified: usize,
    /// Charges skipped as transient or as older attempts with an already-handled status.
    pub skipped: usize,
    /// Whether the subscription's active flag actually changed.
    pub active_changed: bool,
}

impl<B> Reconciler<B>
where B: TransactionStore + SubscriptionStore
{
    /// Folds the charge attempts reported by a subscription webhook into the ledger and brings the subscription's
    /// `active` flag in line with the event (`true` for a successful charge, `false` for a cancellation).
    ///
    /// Charges arrive most-recent-first and only the first attempt per canonical status is considered; transient
    /// sub-statuses are skipped outright. A charge we already hold must still carry the status the provider now
    /// reports; a disagreement means the ledger and the provider have diverged about settled money, and it surfaces
    /// as a [`ConsistencyError`] that is never auto-healed.
    pub async fn reconcile_subscription_charge(
        &self,
        ctx: &NotificationContext,
        sub: &Subscription,
        charges: &[ReportedCharge],
        period: BillingPeriod,
        active: bool,
    ) -> Result<SubscriptionOutcome, ProcessError> {
        let mut outcome = SubscriptionOutcome::default();
        let mut handled: Vec<TransactionStatus> = Vec::new();
        for charge in charges {
            let status = match map_status(sub.provider, &charge.status)? {
                CanonicalOutcome::Status(s) => s,
                _ => {
                    debug!("🔄️ [{ctx}] skipping transient charge {} ({})", charge.provider_id, charge.status);
                    outcome.skipped += 1;
                    continue;
                },
            };
            if handled.contains(&status) {
                debug!("🔄️ [{ctx}] already handled a {status} charge in this event, skipping {}", charge.provider_id);
                outcome.skipped += 1;
                continue;
            }
            handled.push(status);
            match self.db.fetch_transaction_by_provider_id(sub.provider, &charge.provider_id).await? {
                Some(existing) if existing.status == status => {
                    debug!("🔄️ [{ctx}] charge {} already recorded as {status}", charge.provider_id);
                    outcome.verified += 1;
                },
                Some(existing) => {
                    let err = ConsistencyError::StatusMismatch {
                        provider_id: charge.provider_id.clone(),
                        stored: existing.status,
                        reported: status,
                    };
                    warn!("🔄️ [{ctx}] {err}");
                    return Err(err.into());
                },
                None => {
                    let mut new = NewTransaction::new(TransactionUuid::fresh(), sub.provider)
                        .with_status(status)
                        .with_uid_support(charge.provider_id.clone())
                        .with_status_reason(charge.status.clone());
                    if let (Some(amount), Some(currency)) = (charge.amount, charge.currency.clone()) {
                        new = new.with_amount(amount, currency);
                    }
                    let (tx, created) = self.db.record_subscription_charge(sub.id, new, period).await?;
                    if created {
                        info!("🔄️ [{ctx}] recorded {status} charge {} for subscription {}", tx.uuid, sub.id);
                        outcome.created.push(tx);
                    } else {
                        debug!("🔄️ [{ctx}] charge {} landed concurrently, nothing to do", charge.provider_id);
                        outcome.verified += 1;
                    }
                },
            }
        }
        outcome.active_changed = self.db.set_subscription_active(sub.id, active).await?;
        if outcome.active_changed {
            info!("🔄️ [{ctx}] subscription {} is now {}", sub.id, if active { "active" } else { "inactive" });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::TransactionStatus::*;

    fn fresh() -> Duration {
        Duration::hours(1)
    }

    fn stale() -> Duration {
        Duration::hours(25)
    }

    fn window() -> Duration {
        Duration::hours(DEFAULT_LOCKDOWN_HOURS)
    }

    #[test]
    fn self_transitions_are_always_allowed() {
        for s in [Pending, Completed, Checked, Received, Failed, Cancelled] {
            assert!(can_transition(s, s, fresh(), window()));
            assert!(can_transition(s, s, stale(), window()));
        }
    }

    #[test]
    fn pending_may_move_anywhere() {
        for to in [Received, Completed, Checked, Failed, Cancelled] {
            assert!(can_transition(Pending, to, fresh(), window()));
        }
    }

    #[test]
    fn received_is_an_intermediate_state() {
        for to in [Completed, Checked, Failed, Cancelled] {
            assert!(can_transition(Received, to, fresh(), window()));
        }
        assert!(!can_transition(Received, Pending, fresh(), window()));
    }

    #[test]
    fn completed_only_advances_to_checked() {
        assert!(can_transition(Completed, Checked, fresh(), window()));
        for to in [Pending, Received, Failed, Cancelled] {
            assert!(!can_transition(Completed, to, fresh(), window()), "Completed -> {to} must be denied");
        }
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for from in [Failed, Cancelled, Checked] {
            for to in [Pending, Received, Completed, Failed, Cancelled, Checked] {
                if from == to {
                    continue;
                }
                assert!(!can_transition(from, to, fresh(), window()), "{from} -> {to} must be denied");
            }
        }
    }

    #[test]
    fn the_window_freezes_every_real_transition() {
        assert!(can_transition(Pending, Completed, fresh(), window()));
        assert!(!can_transition(Pending, Completed, stale(), window()));
        assert!(!can_transition(Received, Failed, stale(), window()));
        // exactly at the boundary is still inside the window
        assert!(can_transition(Pending, Completed, window(), window()));
    }
}
