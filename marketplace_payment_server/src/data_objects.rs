use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The form body Braintree posts to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BraintreeWebhookForm {
    pub bt_signature: String,
    pub bt_payload: String,
}

/// The query string on Braintree's endpoint-verification probe.
#[derive(Debug, Clone, Deserialize)]
pub struct BraintreeChallengeQuery {
    pub bt_challenge: String,
}
