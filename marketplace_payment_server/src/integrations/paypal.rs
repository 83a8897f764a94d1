use log::*;
use marketplace_payment_engine::{
    notification::NotificationContext,
    traits::{AuthServiceError, IpnValidator, IpnVerdict},
};
use reqwest::Client;

use crate::{config::PaypalConfig, errors::ServerError, integrations::map_reqwest_error};

/// Replays IPN messages to PayPal for verification.
///
/// PayPal's protocol requires the message to be posted back byte-for-byte as it was received, with
/// `cmd=_notify-validate` appended, and answers with the literal body `VERIFIED` or `INVALID`.
#[derive(Clone)]
pub struct IpnRoundTripper {
    url: String,
    client: Client,
}

impl IpnRoundTripper {
    pub fn new(config: &PaypalConfig, timeout: std::time::Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not construct the PayPal client. {e}")))?;
        Ok(Self { url: config.validation_url.clone(), client })
    }
}

impl IpnValidator for IpnRoundTripper {
    async fn validate_ipn(&self, ctx: &NotificationContext, raw_body: &[u8]) -> Result<IpnVerdict, AuthServiceError> {
        let mut body = Vec::with_capacity(raw_body.len() + 21);
        body.extend_from_slice(raw_body);
        if !raw_body.is_empty() {
            body.push(b'&');
        }
        body.extend_from_slice(b"cmd=_notify-validate");
        trace!("💸️ [{ctx}] Replaying {} bytes to {}", body.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            warn!("💸️ [{ctx}] PayPal's validation endpoint answered with status {status}");
            return Err(AuthServiceError::BadStatus(status.as_u16()));
        }
        let text = response.text().await.map_err(map_reqwest_error)?;
        let verdict = if text == "VERIFIED" { IpnVerdict::Verified } else { IpnVerdict::Invalid(text) };
        Ok(verdict)
    }
}
