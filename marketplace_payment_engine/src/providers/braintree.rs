//! Braintree recurring-billing webhooks.
//!
//! Braintree signs each webhook with a public/private key pair and delivers it as a base64 payload plus a
//! signature header. Verification and decoding are the SDK's own construction, so the engine treats them as a
//! black box behind [`WebhookDecoder`] and only ever sees the decoded XML. Inside is a `notification` document:
//! a `kind` string, and for the kinds we care about a `subject/subscription` block carrying the subscription's
//! provider id, the billing period, and the charge attempts for that period (most recent first, in document
//! order). The processor routes the kind through the [`HandlerRegistry`] and folds the charges into the ledger via
//! the reconciliation guard; kinds with no registered handler are acknowledged untouched so Braintree stops
//! redelivering them.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use log::{debug, info};
use mpg_common::MarketAmount;
use quick_xml::{events::Event, Reader};

use crate::{
    db_types::BillingPeriod,
    errors::{AuthenticationError, ParseError, ProcessError},
    notification::NotificationContext,
    providers::{
        registry::{EventHandler, HandlerRegistry},
        IgnoreReason,
        ProcessOutcome,
    },
    reconciler::{Reconciler, ReportedCharge},
    traits::{SubscriptionStore, TransactionStore, WebhookDecoder},
};

const SUBSCRIPTION_PATH: [&str; 3] = ["notification", "subject", "subscription"];
const CHARGE_PATH: [&str; 5] = ["notification", "subject", "subscription", "transactions", "transaction"];

//--------------------------------------   BraintreeWebhook    -------------------------------------------------------

/// A decoded webhook document. Only the fields the reconciler needs are extracted; everything else in the XML is
/// ignored without complaint, since Braintree adds fields freely between API versions.
#[derive(Debug, Clone)]
pub struct BraintreeWebhook {
    pub kind: String,
    /// Present when the webhook's subject is a subscription. Other subjects are left unparsed.
    pub subscription: Option<BraintreeSubscription>,
}

/// The `subject/subscription` block of a webhook.
#[derive(Debug, Clone)]
pub struct BraintreeSubscription {
    /// The provider-assigned subscription id. Matched against the stored subscription's `uid`.
    pub id: String,
    pub billing_period: BillingPeriod,
    /// Charge attempts for the period, in the order Braintree reports them (most recent first).
    pub transactions: Vec<ReportedCharge>,
}

#[derive(Debug, Default)]
struct ChargeDraft {
    id: Option<String>,
    status: Option<String>,
    amount: Option<MarketAmount>,
    currency: Option<String>,
}

impl ChargeDraft {
    fn finalize(self) -> Result<ReportedCharge, ParseError> {
        let provider_id = self.id.ok_or_else(|| ParseError::MissingField("transaction.id".to_string()))?;
        let status = self.status.ok_or_else(|| ParseError::MissingField("transaction.status".to_string()))?;
        Ok(ReportedCharge { provider_id, status, amount: self.amount, currency: self.currency })
    }
}

impl BraintreeWebhook {
    /// Parses the decoded XML document.
    ///
    /// Elements are matched by their full path, never by name alone: a transaction's `<id>` must not be confused
    /// with the subscription's, and Braintree nests a copy of the subscription inside each transaction.
    pub fn parse(xml: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(xml).map_err(|_| ParseError::Encoding)?;
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut kind: Option<String> = None;
        let mut saw_subscription = false;
        let mut sub_id: Option<String> = None;
        let mut period = BillingPeriod::default();
        let mut charges: Vec<ReportedCharge> = Vec::new();
        let mut current: Option<ChargeDraft> = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
                    if path == SUBSCRIPTION_PATH {
                        saw_subscription = true;
                    }
                },
                Event::Text(t) => {
                    let text = t.unescape()?;
                    if path == ["notification", "kind"] {
                        kind = Some(text.into_owned());
                    } else if path.len() == 4 && path[..3] == SUBSCRIPTION_PATH {
                        match path[3].as_str() {
                            "id" => sub_id = Some(text.into_owned()),
                            "billing-period-start-date" => {
                                period.start = Some(parse_provider_date("billing-period-start-date", &text)?);
                            },
                            "billing-period-end-date" => {
                                period.end = Some(parse_provider_date("billing-period-end-date", &text)?);
                            },
                            _ => {},
                        }
                    } else if path.len() == 6 && path[..5] == CHARGE_PATH {
                        let draft = current.get_or_insert_with(ChargeDraft::default);
                        match path[5].as_str() {
                            "id" => draft.id = Some(text.into_owned()),
                            "status" => draft.status = Some(text.into_owned()),
                            "amount" => {
                                draft.amount =
                                    Some(MarketAmount::from_str(&text).map_err(|e| ParseError::InvalidField {
                                        field: "transaction.amount".to_string(),
                                        reason: e.to_string(),
                                    })?);
                            },
                            "currency-iso-code" => draft.currency = Some(text.into_owned()),
                            _ => {},
                        }
                    }
                },
                Event::End(_) => {
                    if path == CHARGE_PATH {
                        if let Some(draft) = current.take() {
                            charges.push(draft.finalize()?);
                        }
                    }
                    path.pop();
                },
                Event::Eof => break,
                _ => {},
            }
        }

        let kind = kind.ok_or_else(|| ParseError::MissingField("kind".to_string()))?;
        let subscription = match (saw_subscription, sub_id) {
            (true, Some(id)) => Some(BraintreeSubscription { id, billing_period: period, transactions: charges }),
            (true, None) => return Err(ParseError::MissingField("subscription.id".to_string())),
            (false, _) => None,
        };
        Ok(Self { kind, subscription })
    }
}

/// Braintree reports plain dates for billing periods and full timestamps elsewhere; accept either.
fn parse_provider_date(field: &str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| ParseError::InvalidField { field: field.to_string(), reason: e.to_string() })?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

//--------------------------------------  BraintreeProcessor   -------------------------------------------------------

/// Drives a signed webhook through decoding, kind dispatch and subscription reconciliation.
#[derive(Debug, Clone)]
pub struct BraintreeProcessor<B, D> {
    decoder: D,
    registry: HandlerRegistry,
    reconciler: Reconciler<B>,
}

impl<B, D> BraintreeProcessor<B, D>
where
    B: TransactionStore + SubscriptionStore,
    D: WebhookDecoder,
{
    /// The registry is built by the caller (normally [`HandlerRegistry::bootstrap`]) so that a bad handler table
    /// fails at startup, not on the first webhook.
    pub fn new(db: B, decoder: D, registry: HandlerRegistry) -> Self {
        Self { decoder, registry, reconciler: Reconciler::new(db) }
    }

    pub fn with_lockdown_window(mut self, window: chrono::Duration) -> Self {
        self.reconciler = self.reconciler.with_lockdown_window(window);
        self
    }

    /// Answers the endpoint-verification challenge Braintree sends when a webhook URL is registered.
    pub fn challenge(&self, challenge: &str) -> Result<String, AuthenticationError> {
        debug!("🌳️ answering an endpoint-verification challenge");
        self.decoder.challenge_response(challenge)
    }

    pub async fn process(
        &self,
        ctx: &NotificationContext,
        bt_signature: &str,
        bt_payload: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        let xml = self.decoder.verify_and_decode(ctx, bt_signature, bt_payload)?;
        let webhook = BraintreeWebhook::parse(&xml)?;
        info!("🌳️ [{ctx}] webhook '{}' passed signature verification", webhook.kind);
        let Some(handler) = self.registry.handler_for(&webhook.kind) else {
            debug!("🌳️ [{ctx}] no handler registered for '{}', acknowledging", webhook.kind);
            return Ok(ProcessOutcome::Ignored(IgnoreReason::UnhandledKind(webhook.kind)));
        };
        let Some(subscription) = webhook.subscription else {
            return Err(ParseError::MissingField("subject.subscription".to_string()).into());
        };
        let sub = match self.reconciler.db().fetch_subscription_by_provider_id(ctx.provider, &subscription.id).await? {
            Some(sub) => sub,
            None => {
                info!("🌳️ [{ctx}] no subscription on file with uid {}, acknowledging", subscription.id);
                return Ok(ProcessOutcome::Ignored(IgnoreReason::NoMatch {
                    tried: format!("subscription uid={}", subscription.id),
                }));
            },
        };
        let active = handler == EventHandler::SubscriptionCharged;
        let outcome = self
            .reconciler
            .reconcile_subscription_charge(ctx, &sub, &subscription.transactions, subscription.billing_period, active)
            .await?;
        info!(
            "🌳️ [{ctx}] subscription {}: {} charge(s) recorded, {} verified, {} skipped",
            sub.uid,
            outcome.created.len(),
            outcome.verified,
            outcome.skipped
        );
        Ok(ProcessOutcome::Subscription(outcome))
    }
}

#[cfg(test)]
mod test {
    use chrono::Datelike;

    use super::*;

    fn charged_webhook_xml() -> &'static [u8] {
        br#"<notification>
            <timestamp type="datetime">2026-08-01T10:15:30Z</timestamp>
            <kind>subscription_charged_successfully</kind>
            <subject>
              <subscription>
                <id>sub-991</id>
                <billing-period-start-date type="date">2026-08-01</billing-period-start-date>
                <billing-period-end-date type="date">2026-08-31</billing-period-end-date>
                <transactions type="array">
                  <transaction>
                    <id>bt-202</id>
                    <status>settled</status>
                    <amount>9.99</amount>
                    <currency-iso-code>USD</currency-iso-code>
                    <subscription>
                      <id>sub-991</id>
                    </subscription>
                  </transaction>
                  <transaction>
                    <id>bt-201</id>
                    <status>processor_declined</status>
                    <amount>9.99</amount>
                    <currency-iso-code>USD</currency-iso-code>
                  </transaction>
                </transactions>
              </subscription>
            </subject>
          </notification>"#
    }

    #[test]
    fn parses_a_subscription_webhook() {
        let webhook = BraintreeWebhook::parse(charged_webhook_xml()).unwrap();
        assert_eq!(webhook.kind, "subscription_charged_successfully");
        let sub = webhook.subscription.unwrap();
        assert_eq!(sub.id, "sub-991");
        let start = sub.billing_period.start.unwrap();
        assert_eq!((start.year(), start.month(), start.day()), (2026, 8, 1));
        assert_eq!(sub.billing_period.end.unwrap().day(), 31);
        assert_eq!(sub.transactions.len(), 2);
        assert_eq!(sub.transactions[0].provider_id, "bt-202");
        assert_eq!(sub.transactions[0].status, "settled");
        assert_eq!(sub.transactions[0].amount, Some(MarketAmount::from_str("9.99").unwrap()));
        assert_eq!(sub.transactions[0].currency.as_deref(), Some("USD"));
        assert_eq!(sub.transactions[1].provider_id, "bt-201");
        assert_eq!(sub.transactions[1].status, "processor_declined");
    }

    #[test]
    fn charge_order_follows_the_document() {
        // Braintree reports the newest attempt first; the reconciler depends on that order surviving the parse.
        let webhook = BraintreeWebhook::parse(charged_webhook_xml()).unwrap();
        let sub = webhook.subscription.unwrap();
        let ids: Vec<&str> = sub.transactions.iter().map(|c| c.provider_id.as_str()).collect();
        assert_eq!(ids, ["bt-202", "bt-201"]);
    }

    #[test]
    fn nested_subscription_copies_do_not_leak_into_fields() {
        // The <subscription> echoed inside a transaction must not overwrite the subject's id or add charges.
        let webhook = BraintreeWebhook::parse(charged_webhook_xml()).unwrap();
        assert_eq!(webhook.subscription.unwrap().id, "sub-991");
    }

    #[test]
    fn webhooks_without_a_subscription_subject_still_parse() {
        let xml = b"<notification><kind>check</kind><subject></subject></notification>";
        let webhook = BraintreeWebhook::parse(xml).unwrap();
        assert_eq!(webhook.kind, "check");
        assert!(webhook.subscription.is_none());
    }

    #[test]
    fn a_subscription_subject_must_carry_an_id() {
        let xml = b"<notification><kind>subscription_canceled</kind><subject><subscription>\
                    <billing-period-start-date>2026-08-01</billing-period-start-date>\
                    </subscription></subject></notification>";
        let err = BraintreeWebhook::parse(xml).unwrap_err();
        assert!(matches!(err, ParseError::MissingField(f) if f == "subscription.id"));
    }

    #[test]
    fn charges_must_carry_id_and_status() {
        let xml = b"<notification><kind>subscription_charged_successfully</kind><subject><subscription>\
                    <id>sub-1</id><transactions type=\"array\"><transaction><status>settled</status>\
                    </transaction></transactions></subscription></subject></notification>";
        let err = BraintreeWebhook::parse(xml).unwrap_err();
        assert!(matches!(err, ParseError::MissingField(f) if f == "transaction.id"));
    }

    #[test]
    fn malformed_amounts_name_the_field() {
        let xml = b"<notification><kind>subscription_charged_successfully</kind><subject><subscription>\
                    <id>sub-1</id><transactions><transaction><id>bt-1</id><status>settled</status>\
                    <amount>nine dollars</amount></transaction></transactions>\
                    </subscription></subject></notification>";
        let err = BraintreeWebhook::parse(xml).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field, .. } if field == "transaction.amount"));
    }

    #[test]
    fn billing_dates_accept_full_timestamps() {
        let ts = parse_provider_date("billing-period-start-date", "2026-08-01T06:00:00-05:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-08-01T11:00:00+00:00");
        let plain = parse_provider_date("billing-period-start-date", "2026-08-01").unwrap();
        assert_eq!((plain.year(), plain.month(), plain.day()), (2026, 8, 1));
        assert!(parse_provider_date("billing-period-start-date", "01/08/2026").is_err());
    }

    #[test]
    fn the_kind_element_is_required() {
        let err = BraintreeWebhook::parse(b"<notification><subject></subject></notification>").unwrap_err();
        assert!(matches!(err, ParseError::MissingField(f) if f == "kind"));
    }

    #[test]
    fn non_utf8_payloads_are_encoding_errors() {
        let err = BraintreeWebhook::parse(&[0x3c, 0xff, 0xfe, 0x3e]).unwrap_err();
        assert!(matches!(err, ParseError::Encoding));
    }
}
