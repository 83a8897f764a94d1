//! Request-scoped context and correlation data for inbound notifications.
//!
//! Every inbound callback gets a [`NotificationContext`] at the edge, and the context is passed explicitly through
//! every verification, parsing, location and reconciliation call. Log lines about a notification always carry the
//! context so that the full life of a single delivery can be grepped out of the logs, even when providers redeliver
//! concurrently.

use std::fmt::Display;

use chrono::{DateTime, Utc};

use crate::db_types::PaymentProvider;

//--------------------------------------  NotificationContext  -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NotificationContext {
    /// Short random id identifying this delivery in the logs.
    pub id: String,
    pub provider: PaymentProvider,
    /// The peer that delivered the notification, when the transport knows it.
    pub remote_addr: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl NotificationContext {
    pub fn new(provider: PaymentProvider) -> Self {
        Self { id: format!("{:08x}", rand::random::<u32>()), provider, remote_addr: None, received_at: Utc::now() }
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Fixes the receipt time. Only useful in tests that need to age a transaction artificially.
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

impl Display for NotificationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

//--------------------------------------   CorrelationKeys     -------------------------------------------------------

/// The identifiers a notification carries that can tie it back to a local transaction.
///
/// `provider_id` is the provider-assigned transaction id (matched against `uid_pay`/`uid_support`); `uuid` is our own
/// id, echoed back by providers that support a passthrough parameter.
#[derive(Debug, Clone, Default)]
pub struct CorrelationKeys {
    pub provider_id: Option<String>,
    pub uuid: Option<String>,
}

impl CorrelationKeys {
    pub fn provider_id(id: impl Into<String>) -> Self {
        Self { provider_id: Some(id.into()), uuid: None }
    }

    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self { provider_id: None, uuid: Some(uuid.into()) }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.provider_id.is_none() && self.uuid.is_none()
    }

    /// Human-readable list of the keys present, for NotFound diagnostics.
    pub fn describe(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if let Some(id) = &self.provider_id {
            parts.push(format!("provider_id={id}"));
        }
        if let Some(uuid) = &self.uuid {
            parts.push(format!("uuid={uuid}"));
        }
        if parts.is_empty() {
            "no correlation keys".to_string()
        } else {
            parts.join(", ")
        }
    }
}
