//! Provider-facing service clients: the outbound half of notification verification.
//!
//! The engine defines what each verification service must answer ([`marketplace_payment_engine::traits`]); these
//! are the live implementations. Every outbound call carries the configured timeout, and a call that times out or
//! fails in transport surfaces as an auth-service error, which the engine treats as a failed verification.

pub mod bango;
pub mod braintree;
pub mod paypal;

pub use bango::TokenCheckClient;
pub use braintree::KeypairDecoder;
pub use paypal::IpnRoundTripper;

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> marketplace_payment_engine::traits::AuthServiceError {
    use marketplace_payment_engine::traits::AuthServiceError;
    if e.is_timeout() {
        AuthServiceError::Timeout
    } else {
        AuthServiceError::Transport(e.to_string())
    }
}
