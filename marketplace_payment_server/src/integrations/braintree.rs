use hmac::{Hmac, Mac};
use log::*;
use marketplace_payment_engine::{errors::AuthenticationError, notification::NotificationContext, traits::WebhookDecoder};
use mpg_common::Secret;
use sha1::{Digest, Sha1};

use crate::config::BraintreeConfig;

type HmacSha1 = Hmac<Sha1>;

/// Verifies Braintree webhooks with the gateway's keypair scheme. No callback is involved.
///
/// `bt_signature` is a set of `public_key|hex_digest` pairs joined by `&`, one per keypair the gateway knows for
/// the merchant. The digest is HMAC-SHA1 over `bt_payload`, keyed with the SHA1 digest of the private key. Once
/// the pair matching this server's public key checks out, `bt_payload` base64-decodes to the webhook XML.
#[derive(Clone)]
pub struct KeypairDecoder {
    public_key: String,
    private_key: Secret<String>,
}

impl KeypairDecoder {
    pub fn new(config: &BraintreeConfig) -> Self {
        Self { public_key: config.public_key.clone(), private_key: config.private_key.clone() }
    }

    fn hexdigest(&self, data: &str) -> String {
        let key = Sha1::digest(self.private_key.reveal().as_bytes());
        let mut mac = HmacSha1::new_from_slice(&key).expect("HMAC accepts keys of any length");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Picks the digest that was produced with this server's keypair out of the signature field.
    fn digest_for_our_key<'a>(&self, bt_signature: &'a str) -> Option<&'a str> {
        bt_signature
            .split('&')
            .filter_map(|pair| pair.split_once('|'))
            .find(|(public, _)| *public == self.public_key)
            .map(|(_, digest)| digest)
    }
}

impl WebhookDecoder for KeypairDecoder {
    fn verify_and_decode(
        &self,
        ctx: &NotificationContext,
        bt_signature: &str,
        bt_payload: &str,
    ) -> Result<Vec<u8>, AuthenticationError> {
        let digest = self.digest_for_our_key(bt_signature).ok_or_else(|| {
            AuthenticationError::Rejected("no signature pair matches this server's public key".to_string())
        })?;
        // The gateway signs the payload as transmitted, which may or may not carry a trailing newline.
        let matches = digest == self.hexdigest(bt_payload) || digest == self.hexdigest(&format!("{bt_payload}\n"));
        if !matches {
            return Err(AuthenticationError::Rejected("the webhook digest does not match the payload".to_string()));
        }
        trace!("🌳️ [{ctx}] Webhook digest verified");
        let compact: String = bt_payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::decode(&compact)
            .map_err(|e| AuthenticationError::Rejected(format!("the payload is not valid base64. {e}")))
    }

    fn challenge_response(&self, challenge: &str) -> Result<String, AuthenticationError> {
        if challenge.is_empty() || !challenge.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AuthenticationError::Rejected("the challenge is not a hex string".to_string()));
        }
        Ok(format!("{}|{}", self.public_key, self.hexdigest(challenge)))
    }
}
