//! # Collaborator interfaces.
//!
//! This module defines the contracts between the reconciliation engine and the outside world. The engine itself
//! never opens a socket and never writes a row directly; everything flows through these traits. The HTTP layer
//! supplies real clients and a real store, tests supply canned ones.
//!
//! ## Traits
//! * [`TransactionStore`] is the persistent record store for transactions. The engine is the sole owner of the
//!   transaction state machine, but the store owns uniqueness: the derivative-insert operation must be race-safe at
//!   the storage layer because redelivered notifications can be processed concurrently.
//! * [`SubscriptionStore`] extends a backend with recurring-billing records and the charge audit trail.
//! * [`IpnValidator`], [`TokenChecker`] and [`WebhookDecoder`] are the provider auth services: the outbound
//!   round-trips (or local SDK schemes) that prove a notification is genuine.

mod auth_services;
mod subscription_store;
mod transaction_store;

pub use auth_services::{AuthServiceError, IpnValidator, IpnVerdict, TokenChecker, TokenReport, WebhookDecoder};
pub use subscription_store::SubscriptionStore;
pub use transaction_store::{StoreError, TransactionStore};
