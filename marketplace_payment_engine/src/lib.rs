//! Marketplace Payment Engine
//!
//! The engine verifies and reconciles the asynchronous payment notifications that providers deliver to the
//! Marketplace Payment Gateway. It is transport-agnostic: the HTTP server hands raw payloads to the per-provider
//! processors and everything from authenticity checking to the ledger write happens here.
//!
//! The library is divided into four main sections:
//! 1. Database management and control (the `db` module, [`db_types`]). Sqlite is the supported backend. You should never
//!    need to touch the database directly; the processors and the [`reconciler`] drive all writes through the
//!    [`traits`]. The data types stored in the database are public.
//! 2. The provider processors ([`providers`]). One per provider (PayPal IPN, Bango carrier billing, Boku carrier
//!    billing and Braintree recurring billing), each wiring the same parse / authenticate / translate / locate /
//!    reconcile pipeline around its own wire format and authenticity scheme.
//! 3. The shared pipeline stages: the provider-vocabulary translation tables ([`mapper`]), the correlation lookup
//!    ([`locator`]) and the transition-guarding ledger writer ([`reconciler`]).
//! 4. The collaborator contracts ([`traits`]): the store backends and the outbound provider auth services. Tests
//!    substitute canned implementations; the server supplies real clients.

mod db;

pub mod db_types;
pub mod errors;
pub mod helpers;
pub mod locator;
pub mod mapper;
pub mod notification;
pub mod providers;
pub mod reconciler;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use locator::TransactionLocator;
pub use providers::{
    BangoProcessor,
    BokuProcessor,
    BraintreeProcessor,
    HandlerRegistry,
    IgnoreReason,
    PaypalProcessor,
    ProcessOutcome,
};
pub use reconciler::{Reconciler, DEFAULT_LOCKDOWN_HOURS};
