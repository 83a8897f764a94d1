use thiserror::Error;

use crate::{errors::AuthenticationError, notification::NotificationContext};

/// A provider auth-service call failed before producing a verdict.
///
/// Every variant converts into an authentication failure at the processor boundary. A timed-out or failed check
/// leaves the notification unverified; it is never folded into "verified" or "ignored".
#[derive(Debug, Clone, Error)]
pub enum AuthServiceError {
    #[error("request to the provider timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider answered with HTTP status {0}")]
    BadStatus(u16),
    #[error("provider response could not be interpreted: {0}")]
    InvalidResponse(String),
}

/// The provider's answer to a PayPal IPN revalidation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpnVerdict {
    /// The provider answered with the literal body `VERIFIED`.
    Verified,
    /// Anything else the provider answered with, carried for the audit log.
    Invalid(String),
}

/// Replays an IPN body to PayPal's validation endpoint.
///
/// Implementations must post the *exact raw bytes* that were received, plus the `cmd=_notify-validate` marker, and
/// report the literal response. The engine decides what the verdict means.
#[allow(async_fn_in_trait)]
pub trait IpnValidator {
    async fn validate_ipn(&self, ctx: &NotificationContext, raw_body: &[u8]) -> Result<IpnVerdict, AuthServiceError>;
}

/// What Bango's token-check service reports for an opaque notification token.
///
/// The five fields mirror the redirect notification exactly; the verifier compares them field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReport {
    pub signature: Option<String>,
    pub transaction_uuid: Option<String>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub trans_id: Option<String>,
}

/// Calls back to Bango's token-check service, the second, independent verification path for redirect notifications.
#[allow(async_fn_in_trait)]
pub trait TokenChecker {
    async fn check_token(&self, ctx: &NotificationContext, token: &str) -> Result<TokenReport, AuthServiceError>;
}

/// Verifies and decodes a Braintree webhook payload.
///
/// The digest scheme is the provider SDK's own public/private-key construction; the engine treats it as a black box
/// that either yields the decoded XML bytes or refuses. A refusal is an authentication failure, not a transport
/// error, so the trait returns [`AuthenticationError`] directly.
pub trait WebhookDecoder {
    fn verify_and_decode(
        &self,
        ctx: &NotificationContext,
        bt_signature: &str,
        bt_payload: &str,
    ) -> Result<Vec<u8>, AuthenticationError>;

    /// Computes the answer to the provider's endpoint-verification challenge.
    fn challenge_response(&self, challenge: &str) -> Result<String, AuthenticationError>;
}
