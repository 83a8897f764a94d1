use marketplace_payment_engine::{
    errors::AuthenticationError,
    notification::NotificationContext,
    traits::{AuthServiceError, IpnValidator, IpnVerdict, TokenChecker, TokenReport, WebhookDecoder},
};
use mockall::mock;

mock! {
    pub Validator {}
    impl IpnValidator for Validator {
        async fn validate_ipn(&self, ctx: &NotificationContext, raw_body: &[u8]) -> Result<IpnVerdict, AuthServiceError>;
    }
}

mock! {
    pub Checker {}
    impl TokenChecker for Checker {
        async fn check_token(&self, ctx: &NotificationContext, token: &str) -> Result<TokenReport, AuthServiceError>;
    }
}

mock! {
    pub Decoder {}
    impl WebhookDecoder for Decoder {
        fn verify_and_decode(&self, ctx: &NotificationContext, bt_signature: &str, bt_payload: &str) -> Result<Vec<u8>, AuthenticationError>;
        fn challenge_response(&self, challenge: &str) -> Result<String, AuthenticationError>;
    }
}
