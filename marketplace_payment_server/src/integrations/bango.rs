use log::*;
use marketplace_payment_engine::{
    helpers::FormFields,
    notification::NotificationContext,
    traits::{AuthServiceError, TokenChecker, TokenReport},
};
use reqwest::Client;

use crate::{config::BangoConfig, errors::ServerError, integrations::map_reqwest_error};

/// Calls Bango's token-check service.
///
/// The service takes the opaque token that arrived with a redirect notification and echoes back the
/// notification fields it issued that token for, as a url-encoded document. The [`TokenReport`] it
/// produces lets the engine cross-check the redirect against Bango's own record of the transaction.
#[derive(Clone)]
pub struct TokenCheckClient {
    url: String,
    client: Client,
}

impl TokenCheckClient {
    pub fn new(config: &BangoConfig, timeout: std::time::Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not construct the Bango client. {e}")))?;
        Ok(Self { url: config.token_check_url.clone(), client })
    }
}

impl TokenChecker for TokenCheckClient {
    async fn check_token(&self, ctx: &NotificationContext, token: &str) -> Result<TokenReport, AuthServiceError> {
        trace!("📡️ [{ctx}] Checking the notification token against {}", self.url);
        let response =
            self.client.post(&self.url).form(&[("token", token)]).send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            warn!("📡️ [{ctx}] The token-check service answered with status {status}");
            return Err(AuthServiceError::BadStatus(status.as_u16()));
        }
        let text = response.text().await.map_err(map_reqwest_error)?;
        let fields = FormFields::from_query(&text)
            .map_err(|e| AuthServiceError::InvalidResponse(format!("The token report is not url-encoded. {e}")))?;
        Ok(TokenReport {
            signature: fields.get("moz_signature").map(String::from),
            transaction_uuid: fields.get("moz_transaction").map(String::from),
            response_code: fields.get("bango_response_code").map(String::from),
            response_message: fields.get("bango_response_message").map(String::from),
            trans_id: fields.get("bango_trans_id").map(String::from),
        })
    }
}
