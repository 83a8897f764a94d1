//! # The per-provider notification processors.
//!
//! One processor per provider, each wiring the same stages in the same order: parse the wire shape, authenticate,
//! translate the provider vocabulary, locate the local record, and hand the mutation to the reconciliation guard.
//! A processor contributes only what is genuinely provider-specific (the wire format, the authenticity scheme, and
//! which guard operation each event drives). The transition rules live in one place, behind the guard, and no
//! processor carries its own copy.
//!
//! Nothing is ever written before authentication passes, and a notification that fails any stage leaves the ledger
//! untouched. Outcomes that mutate nothing ([`ProcessOutcome::Ignored`]) are still successes: the provider gets an
//! acknowledgment so it stops redelivering.

use std::fmt::Display;

mod bango;
mod boku;
mod braintree;
mod paypal;
mod registry;

pub use bango::{sign_redirect_query, verify_redirect_signature, BangoEvent, BangoProcessor, BangoRedirect};
pub use boku::{boku_signature, BokuNotification, BokuProcessor};
pub use braintree::{BraintreeProcessor, BraintreeSubscription, BraintreeWebhook};
pub use paypal::{PaypalCharge, PaypalIpn, PaypalProcessor};
pub use registry::{EventHandler, HandlerRegistry, RegistryError};

use crate::{db_types::Transaction, reconciler::SubscriptionOutcome};

//--------------------------------------    ProcessOutcome     -------------------------------------------------------

/// What one fully processed, authentic notification did to the ledger.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// An existing transaction was brought up to date (a no-op update for a redelivery also lands here).
    Applied(Transaction),
    /// A refund or reversal now exists for the original payment. `created` is `false` when an earlier delivery
    /// already recorded it.
    Derived { transaction: Transaction, created: bool },
    /// A recurring-billing webhook was folded into charge records.
    Subscription(SubscriptionOutcome),
    /// Acknowledged without touching the ledger.
    Ignored(IgnoreReason),
}

impl ProcessOutcome {
    /// True if this outcome wrote anything.
    pub fn mutated(&self) -> bool {
        match self {
            ProcessOutcome::Applied(_) => true,
            ProcessOutcome::Derived { created, .. } => *created,
            ProcessOutcome::Subscription(s) => !s.created.is_empty() || s.active_changed,
            ProcessOutcome::Ignored(_) => false,
        }
    }
}

/// Why a notification was acknowledged without touching the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The top-level payment status says the payment is not complete yet; there is nothing to reconcile.
    NotCompleted(String),
    /// No chained-payment leg carried an actionable status.
    NoDrivingCharge,
    /// No local record matches the notification's correlation keys.
    NoMatch { tried: String },
    /// The event kind has no registered handler.
    UnhandledKind(String),
}

impl Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::NotCompleted(s) => write!(f, "payment status is '{s}', not 'completed'"),
            IgnoreReason::NoDrivingCharge => write!(f, "no charge leg drives reconciliation"),
            IgnoreReason::NoMatch { tried } => write!(f, "no local record matches ({tried})"),
            IgnoreReason::UnhandledKind(k) => write!(f, "no handler registered for event kind '{k}'"),
        }
    }
}
