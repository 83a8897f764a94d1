//! # Boku mobile-carrier notification processing.
//!
//! Boku posts flat parameters whose names use hyphens (`trx-id`, `result-code`, …) and signs them with a shared
//! secret:
//!
//! ```text
//!    sig = hex( MD5( secret_key || k1 || v1 || k2 || v2 || … ) )
//! ```
//!
//! where the pairs are every parameter except `sig` itself, sorted lexicographically by key, each key immediately
//! followed by its value with no delimiter. The digest is computed over the parameters *as received*: the
//! hyphen-to-underscore normalization that field extraction relies on happens afterwards and never feeds the
//! signature.
//!
//! Result codes are numeric and the table is closed: a code this build does not know is a hard parse error, never
//! a silent ignore.

use std::str::FromStr;

use log::debug;
use md5::{Digest, Md5};
use mpg_common::{MarketAmount, Secret};

use crate::{
    db_types::TransactionUpdate,
    errors::{AuthenticationError, ParseError, ProcessError},
    helpers::FormFields,
    locator::{LocateError, TransactionLocator},
    mapper::map_boku_code,
    notification::{CorrelationKeys, NotificationContext},
    providers::{IgnoreReason, ProcessOutcome},
    reconciler::Reconciler,
    traits::TransactionStore,
};

/// Computes the notification digest over wire pairs already sorted by key. `sig` itself is excluded.
pub fn boku_signature<'a>(secret: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    for (k, v) in pairs {
        if k == "sig" {
            continue;
        }
        hasher.update(k.as_bytes());
        hasher.update(v.as_bytes());
    }
    hex::encode(hasher.finalize())
}

//--------------------------------------   BokuNotification    -------------------------------------------------------

/// A decoded Boku event. Field names here are the underscored forms; the original wire pairs are retained for
/// signature verification.
#[derive(Debug, Clone)]
pub struct BokuNotification {
    /// Boku's transaction id.
    pub trx_id: Option<String>,
    /// The numeric result code, untranslated.
    pub result_code: String,
    /// Our transaction uuid, echoed through Boku's passthrough parameter.
    pub param: Option<String>,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    raw: FormFields,
}

impl BokuNotification {
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        let raw = FormFields::from_bytes(body)?;
        let fields = raw.underscore_keys();
        let result_code = fields.require("result_code")?.to_string();
        let amount = fields
            .get("amount")
            .filter(|a| !a.is_empty())
            .map(|a| {
                MarketAmount::from_str(a).map_err(|e| ParseError::InvalidField {
                    field: "amount".to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            trx_id: fields.get("trx_id").filter(|v| !v.is_empty()).map(String::from),
            result_code,
            param: fields.get("param").filter(|v| !v.is_empty()).map(String::from),
            amount,
            currency: fields.get("currency").filter(|v| !v.is_empty()).map(String::from),
            raw,
        })
    }

    /// Verifies the `sig` parameter against the recomputed digest.
    pub fn verify(&self, secret: &str) -> Result<(), AuthenticationError> {
        let supplied = self.raw.get("sig").ok_or(AuthenticationError::MissingSignature)?;
        let expected = boku_signature(secret, self.raw.pairs());
        if supplied == expected {
            Ok(())
        } else {
            let uuid = self.param.clone().unwrap_or_else(|| "unknown".to_string());
            Err(AuthenticationError::SignatureMismatch { uuid })
        }
    }

    pub fn correlation_keys(&self) -> CorrelationKeys {
        CorrelationKeys { provider_id: self.trx_id.clone(), uuid: self.param.clone() }
    }
}

//--------------------------------------     BokuProcessor     -------------------------------------------------------

/// Drives a Boku event body through signature verification and reconciliation.
#[derive(Debug, Clone)]
pub struct BokuProcessor<B> {
    secret: Secret<String>,
    locator: TransactionLocator<B>,
    reconciler: Reconciler<B>,
}

impl<B> BokuProcessor<B>
where B: TransactionStore
{
    pub fn new(db: B, secret: Secret<String>) -> Self {
        Self { secret, locator: TransactionLocator::new(db.clone()), reconciler: Reconciler::new(db) }
    }

    pub fn with_lockdown_window(mut self, window: chrono::Duration) -> Self {
        self.reconciler = self.reconciler.with_lockdown_window(window);
        self
    }

    pub async fn process(&self, ctx: &NotificationContext, body: &[u8]) -> Result<ProcessOutcome, ProcessError> {
        let note = BokuNotification::parse(body)?;
        note.verify(self.secret.reveal())?;
        debug!("📱️ [{ctx}] signature verified for result code {}", note.result_code);
        let status = map_boku_code(&note.result_code)?;
        let mut update =
            TransactionUpdate::default().with_status(status).with_status_reason(note.result_code.clone());
        if let (Some(amount), Some(currency)) = (note.amount, note.currency.clone()) {
            update = update.with_amount(amount, currency);
        }
        if let Some(id) = note.trx_id.clone() {
            update = update.with_uid_support(id);
        }
        let tx = match self.locator.locate(ctx, &note.correlation_keys()).await {
            Ok(tx) => tx,
            Err(LocateError::NotFound(e)) => {
                return Ok(ProcessOutcome::Ignored(IgnoreReason::NoMatch { tried: e.tried }))
            },
            Err(LocateError::Store(e)) => return Err(e.into()),
        };
        let updated = self.reconciler.apply_status(ctx, &tx, update).await?;
        Ok(ProcessOutcome::Applied(updated))
    }
}
