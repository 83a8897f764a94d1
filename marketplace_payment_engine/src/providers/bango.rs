//! # Bango carrier-billing notification processing.
//!
//! Bango talks to us on two channels about the same payment, and they are authenticated differently.
//!
//! ## Redirect notifications and their signature
//!
//! The user's browser is redirected back to us with the outcome in the query string. Since the query string passes
//! through the user's hands, it carries a signature over our own transaction uuid:
//!
//! ```text
//!    moz_signature = hex( HMAC_SHA256( secret_key, ascii_bytes(moz_transaction) ) )
//! ```
//!
//! The input must be ASCII; a non-ASCII uuid is rejected with its own error rather than a generic auth failure, so
//! that an encoding bug upstream is distinguishable from tampering in the audit log. Verification recomputes the
//! digest and compares the hex strings.
//!
//! A second, independent check exists for the same callback: the query carries an opaque `bango_token`, which can be
//! presented to Bango's token-check service. The service echoes back what *it* believes the notification said, and
//! five fields (signature, transaction uuid, response code, response message, gateway transaction id) are compared
//! one by one. Any disagreement means the query string was altered in flight; the mismatching field names are part
//! of the error for the audit trail.
//!
//! ## Event notifications
//!
//! Bango's server also posts an XML event directly (transport-authenticated with Basic Auth at the HTTP edge).
//! The body may lead with a UTF-8 byte-order-mark, the `eventList/event/action` must be `PAYMENT`, and the event's
//! `data` block carries flat `(name, value)` attribute pairs. At least one of `externalCPTransId` (our uuid) or
//! `transId` (Bango's id) must be present or there is nothing to correlate against.

use std::{collections::BTreeMap, str::FromStr};

use hmac::{Hmac, Mac};
use log::{debug, warn};
use mpg_common::{MarketAmount, Secret};
use quick_xml::{events::Event, Reader};
use sha2::Sha256;

use crate::{
    db_types::{PaymentProvider, TransactionUpdate},
    errors::{AuthenticationError, ParseError, ProcessError},
    helpers::{carrier_for_network, FormFields, MobileNetwork},
    locator::{LocateError, TransactionLocator},
    mapper::map_bango_code,
    notification::{CorrelationKeys, NotificationContext},
    providers::{IgnoreReason, ProcessOutcome},
    reconciler::Reconciler,
    traits::{TokenChecker, TokenReport, TransactionStore},
};

type HmacSha256 = Hmac<Sha256>;

//--------------------------------------  Redirect signature   -------------------------------------------------------

/// Computes the redirect signature over our transaction uuid.
pub fn sign_redirect_query(secret: &str, transaction_uuid: &str) -> Result<String, AuthenticationError> {
    if !transaction_uuid.is_ascii() {
        return Err(AuthenticationError::NonAsciiInput { field: "moz_transaction" });
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(transaction_uuid.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recomputes the signature and compares the hex digests byte for byte.
pub fn verify_redirect_signature(
    secret: &str,
    transaction_uuid: &str,
    signature: &str,
) -> Result<(), AuthenticationError> {
    let expected = sign_redirect_query(secret, transaction_uuid)?;
    if expected == signature {
        Ok(())
    } else {
        Err(AuthenticationError::SignatureMismatch { uuid: transaction_uuid.to_string() })
    }
}

/// Field-by-field comparison of the notification against what Bango's token-check service reports.
///
/// Fields the service did not echo are not compared; every echoed field must agree exactly.
fn verify_token_report(redirect: &BangoRedirect, report: &TokenReport) -> Result<(), AuthenticationError> {
    fn differs(reported: &Option<String>, ours: Option<&str>) -> bool {
        reported.as_deref().is_some_and(|r| ours != Some(r))
    }
    let mut mismatched = Vec::new();
    if differs(&report.signature, redirect.signature.as_deref()) {
        mismatched.push("signature");
    }
    if differs(&report.transaction_uuid, Some(redirect.transaction_uuid.as_str())) {
        mismatched.push("transaction uuid");
    }
    if differs(&report.response_code, Some(redirect.response_code.as_str())) {
        mismatched.push("response code");
    }
    if differs(&report.response_message, redirect.response_message.as_deref()) {
        mismatched.push("response message");
    }
    if differs(&report.trans_id, redirect.trans_id.as_deref()) {
        mismatched.push("transaction id");
    }
    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(AuthenticationError::TokenMismatch { fields: mismatched.join(", ") })
    }
}

//--------------------------------------     BangoRedirect     -------------------------------------------------------

/// A decoded redirect/query-string notification.
#[derive(Debug, Clone)]
pub struct BangoRedirect {
    pub response_code: String,
    pub response_message: Option<String>,
    /// Bango's own transaction id.
    pub trans_id: Option<String>,
    /// Our transaction uuid, the signature input.
    pub transaction_uuid: String,
    pub signature: Option<String>,
    /// Opaque handle for the token-check service.
    pub token: Option<String>,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    pub network: Option<MobileNetwork>,
}

impl BangoRedirect {
    pub fn parse(query: &str) -> Result<Self, ParseError> {
        let fields = FormFields::from_query(query)?;
        let response_code = fields.require("bango_response_code")?.to_string();
        let transaction_uuid = fields.require("moz_transaction")?.to_string();
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
        let network = fields.get("network").filter(|n| !n.is_empty()).map(carrier_for_network).transpose()?;
        Ok(Self {
            response_code,
            response_message: fields.get("bango_response_message").map(String::from),
            trans_id: fields.get("bango_trans_id").filter(|v| !v.is_empty()).map(String::from),
            transaction_uuid,
            signature: fields.get("moz_signature").filter(|v| !v.is_empty()).map(String::from),
            token: fields.get("bango_token").filter(|v| !v.is_empty()).map(String::from),
            amount,
            currency: fields.get("currency").filter(|v| !v.is_empty()).map(String::from),
            network,
        })
    }

    pub fn correlation_keys(&self) -> CorrelationKeys {
        CorrelationKeys { provider_id: self.trans_id.clone(), uuid: Some(self.transaction_uuid.clone()) }
    }

    /// The audit line stored as the transaction's status reason.
    fn status_reason(&self) -> String {
        match &self.response_message {
            Some(m) => format!("{}: {m}", self.response_code),
            None => self.response_code.clone(),
        }
    }
}

//--------------------------------------      BangoEvent       -------------------------------------------------------

/// A decoded server-to-server event notification.
#[derive(Debug, Clone)]
pub struct BangoEvent {
    pub action: String,
    /// The event's data block, flattened into `(name, value)` pairs.
    pub data: BTreeMap<String, String>,
}

impl BangoEvent {
    /// Parses the XML body. A leading byte-order-mark is stripped; anything that is not UTF-8 is an encoding error.
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(body).map_err(|_| ParseError::Encoding)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut events_seen = 0usize;
        let mut action: Option<String> = None;
        let mut data = BTreeMap::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    if name == "event" && path == ["eventList"] {
                        events_seen += 1;
                    }
                    if events_seen <= 1 && path == ["eventList", "event", "data"] {
                        collect_pair(&e, &mut data)?;
                    }
                    path.push(name);
                },
                Event::Empty(e) => {
                    if events_seen <= 1 && path == ["eventList", "event", "data"] {
                        collect_pair(&e, &mut data)?;
                    }
                },
                Event::Text(t) => {
                    if events_seen <= 1 && path == ["eventList", "event", "action"] {
                        action = Some(t.unescape()?.into_owned());
                    }
                },
                Event::End(_) => {
                    path.pop();
                },
                Event::Eof => break,
                _ => {},
            }
        }
        if events_seen > 1 {
            debug!("📡️ event list carried {events_seen} events; only the first is processed");
        }

        let action = action.ok_or_else(|| ParseError::MissingField("action".to_string()))?;
        if action != "PAYMENT" {
            return Err(ParseError::UnsupportedAction(action));
        }
        let event = Self { action, data };
        if event.external_cp_trans_id().is_none() && event.trans_id().is_none() {
            return Err(ParseError::MissingField("externalCPTransId or transId".to_string()));
        }
        Ok(event)
    }

    /// Our transaction uuid, when Bango echoed it.
    pub fn external_cp_trans_id(&self) -> Option<&str> {
        self.data.get("externalCPTransId").map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Bango's own transaction id.
    pub fn trans_id(&self) -> Option<&str> {
        self.data.get("transId").map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn response_code(&self) -> Result<&str, ParseError> {
        self.data
            .get("responseCode")
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParseError::MissingField("responseCode".to_string()))
    }

    pub fn response_message(&self) -> Option<&str> {
        self.data.get("responseMessage").map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn correlation_keys(&self) -> CorrelationKeys {
        CorrelationKeys {
            provider_id: self.trans_id().map(String::from),
            uuid: self.external_cp_trans_id().map(String::from),
        }
    }
}

/// Reads the `name`/`value` attribute pair off one element inside the data block.
fn collect_pair(e: &quick_xml::events::BytesStart<'_>, data: &mut BTreeMap<String, String>) -> Result<(), ParseError> {
    let mut name = None;
    let mut value = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let val = attr.unescape_value()?.into_owned();
        match key.as_str() {
            "name" => name = Some(val),
            "value" => value = Some(val),
            _ => {},
        }
    }
    if let (Some(name), Some(value)) = (name, value) {
        data.insert(name, value);
    }
    Ok(())
}

//--------------------------------------    BangoProcessor     -------------------------------------------------------

/// Drives both Bango notification shapes through verification and reconciliation.
#[derive(Debug, Clone)]
pub struct BangoProcessor<B, T> {
    secret: Secret<String>,
    checker: T,
    token_checks: bool,
    locator: TransactionLocator<B>,
    reconciler: Reconciler<B>,
}

impl<B, T> BangoProcessor<B, T>
where
    B: TransactionStore,
    T: TokenChecker,
{
    pub fn new(db: B, secret: Secret<String>, checker: T) -> Self {
        Self {
            secret,
            checker,
            token_checks: true,
            locator: TransactionLocator::new(db.clone()),
            reconciler: Reconciler::new(db),
        }
    }

    /// Disables the token-check round-trip. Intended for local development against captured notifications; the
    /// signature check always runs.
    pub fn with_token_checks(mut self, enabled: bool) -> Self {
        self.token_checks = enabled;
        self
    }

    pub fn with_lockdown_window(mut self, window: chrono::Duration) -> Self {
        self.reconciler = self.reconciler.with_lockdown_window(window);
        self
    }

    /// Handles the browser-redirect notification: signature, then token check, then reconciliation.
    pub async fn process_redirect(&self, ctx: &NotificationContext, query: &str) -> Result<ProcessOutcome, ProcessError> {
        let redirect = BangoRedirect::parse(query)?;
        let signature = redirect.signature.as_deref().ok_or(AuthenticationError::MissingSignature)?;
        verify_redirect_signature(self.secret.reveal(), &redirect.transaction_uuid, signature)?;
        debug!("📡️ [{ctx}] signature verified for transaction {}", redirect.transaction_uuid);
        match (&redirect.token, self.token_checks) {
            (Some(token), true) => {
                let report = self.checker.check_token(ctx, token).await.map_err(AuthenticationError::from)?;
                if let Err(e) = verify_token_report(&redirect, &report) {
                    warn!("📡️ [{ctx}] token check failed: {e}");
                    return Err(e.into());
                }
                debug!("📡️ [{ctx}] token report agrees with the notification");
            },
            (Some(_), false) => debug!("📡️ [{ctx}] token checks are disabled, skipping the round-trip"),
            (None, _) => debug!("📡️ [{ctx}] notification carries no token, skipping the round-trip"),
        }

        let status = map_bango_code(&redirect.response_code);
        let mut update = TransactionUpdate::default().with_status(status).with_status_reason(redirect.status_reason());
        if let (Some(amount), Some(currency)) = (redirect.amount, redirect.currency.clone()) {
            update = update.with_amount(amount, currency);
        }
        if let Some(id) = redirect.trans_id.clone() {
            update = update.with_uid_support(id);
        }
        if let Some(net) = redirect.network.clone() {
            update = update.with_carrier(net.carrier, net.region);
        }
        self.apply(ctx, &redirect.correlation_keys(), update).await
    }

    /// Handles the server-to-server event notification. The transport is authenticated with Basic Auth at the HTTP
    /// edge; this layer validates the payload shape and reconciles.
    pub async fn process_event(&self, ctx: &NotificationContext, body: &[u8]) -> Result<ProcessOutcome, ProcessError> {
        let event = BangoEvent::parse(body)?;
        let code = event.response_code()?;
        let status = map_bango_code(code);
        let reason = match event.response_message() {
            Some(m) => format!("{code}: {m}"),
            None => code.to_string(),
        };
        let mut update = TransactionUpdate::default().with_status(status).with_status_reason(reason);
        if let Some(id) = event.trans_id() {
            update = update.with_uid_support(id);
        }
        self.apply(ctx, &event.correlation_keys(), update).await
    }

    async fn apply(
        &self,
        ctx: &NotificationContext,
        keys: &CorrelationKeys,
        update: TransactionUpdate,
    ) -> Result<ProcessOutcome, ProcessError> {
        let tx = match self.locator.locate(ctx, keys).await {
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
