//! Event-kind dispatch for webhook providers.
//!
//! Webhook kinds are routed through an explicit table built once at startup, so that the full set of handled kinds
//! is visible in one place and a misconfiguration (registering the same kind twice) fails at boot instead of
//! surfacing as a silently shadowed handler. A kind with no entry is acknowledged and logged, never guessed at.

use std::collections::BTreeMap;

use thiserror::Error;

/// The reconciliation behavior registered for one event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventHandler {
    /// Fold the reported charges into the ledger and mark the subscription active.
    SubscriptionCharged,
    /// Fold any final charges and mark the subscription inactive.
    SubscriptionCancelled,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("a handler for event kind '{0}' is already registered")]
    Duplicate(String),
}

/// The kind-to-handler table, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, EventHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard table for Braintree's recurring-billing webhooks.
    pub fn bootstrap() -> Result<Self, RegistryError> {
        Self::new()
            .register("subscription_charged_successfully", EventHandler::SubscriptionCharged)?
            .register("subscription_canceled", EventHandler::SubscriptionCancelled)
    }

    /// Registers a handler for a kind. Registering the same kind twice is a configuration bug and fails fast.
    pub fn register(mut self, kind: &str, handler: EventHandler) -> Result<Self, RegistryError> {
        if self.handlers.contains_key(kind) {
            return Err(RegistryError::Duplicate(kind.to_string()));
        }
        self.handlers.insert(kind.to_string(), handler);
        Ok(self)
    }

    pub fn handler_for(&self, kind: &str) -> Option<EventHandler> {
        self.handlers.get(kind).copied()
    }

    /// The registered kinds, for the startup log.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
