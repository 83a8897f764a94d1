//! Shared scaffolding for the integration tests: throwaway databases and canned provider auth services.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use log::*;
use marketplace_payment_engine::{
    errors::AuthenticationError,
    notification::NotificationContext,
    traits::{AuthServiceError, IpnValidator, IpnVerdict, TokenChecker, TokenReport, WebhookDecoder},
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

/// Creates, migrates and connects to a fresh database under the system temp directory.
pub async fn new_db() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = format!("sqlite://{}/mpg_test_store_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    if let Err(e) = Sqlite::drop_database(&url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(&url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

//--------------------------------------  Canned auth services -------------------------------------------------------

/// An IPN validator with a fixed answer that counts how many round-trips were attempted.
#[derive(Clone)]
pub struct CannedIpnValidator {
    answer: IpnVerdict,
    calls: Arc<AtomicUsize>,
}

impl CannedIpnValidator {
    pub fn verified() -> Self {
        Self::answering(IpnVerdict::Verified)
    }

    pub fn invalid(body: &str) -> Self {
        Self::answering(IpnVerdict::Invalid(body.to_string()))
    }

    fn answering(answer: IpnVerdict) -> Self {
        Self { answer, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// How many validation round-trips the processor made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IpnValidator for CannedIpnValidator {
    async fn validate_ipn(
        &self,
        _ctx: &NotificationContext,
        _raw_body: &[u8],
    ) -> Result<IpnVerdict, AuthServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// A token-check service that reports a fixed [`TokenReport`] for any token.
#[derive(Clone)]
pub struct CannedTokenChecker {
    report: TokenReport,
}

impl CannedTokenChecker {
    pub fn reporting(report: TokenReport) -> Self {
        Self { report }
    }
}

impl TokenChecker for CannedTokenChecker {
    async fn check_token(&self, _ctx: &NotificationContext, _token: &str) -> Result<TokenReport, AuthServiceError> {
        Ok(self.report.clone())
    }
}

/// A webhook decoder that accepts the signature `"good"` and hands the payload through unchanged.
#[derive(Clone)]
pub struct CannedDecoder;

impl WebhookDecoder for CannedDecoder {
    fn verify_and_decode(
        &self,
        _ctx: &NotificationContext,
        bt_signature: &str,
        bt_payload: &str,
    ) -> Result<Vec<u8>, AuthenticationError> {
        if bt_signature == "good" {
            Ok(bt_payload.as_bytes().to_vec())
        } else {
            Err(AuthenticationError::Rejected("signature did not match any known public key".to_string()))
        }
    }

    fn challenge_response(&self, challenge: &str) -> Result<String, AuthenticationError> {
        Ok(format!("echo|{challenge}"))
    }
}
