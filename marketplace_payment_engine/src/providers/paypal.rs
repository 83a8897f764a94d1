//! # PayPal IPN processing.
//!
//! PayPal's Instant Payment Notification has no local secret. Authenticity is proven by replaying the exact raw
//! byte body back to PayPal's validation endpoint with a `cmd=_notify-validate` marker and requiring the literal
//! answer `VERIFIED`. The replay is the expensive step, so notifications whose top-level `status` is anything but
//! `completed` are acknowledged before the round-trip is attempted; the short-circuit is an optimization, not a
//! security check, since nothing is mutated either way.
//!
//! A single logical payment can arrive as a *chained payment*: several `transaction[N].*` legs in one body, of
//! which exactly one (the primary receiver's) represents the transaction of interest. One refund can therefore
//! appear as several refund legs, and reconciling more than one of them would double-count. The selection rule is:
//! scan legs in ascending index order and take the first whose status is actionable and, when the body carries more
//! than one leg, which is flagged `is_primary_receiver`. Everything else in the body is informational.

use log::{debug, info, warn};
use mpg_common::{helpers::parse_boolean_flag, MarketAmount};

use crate::{
    db_types::{PaymentProvider, TransactionUpdate},
    errors::{AuthenticationError, ParseError, ProcessError},
    helpers::{split_currency_amount, FormFields},
    locator::{LocateError, TransactionLocator},
    mapper::{map_status, CanonicalOutcome},
    notification::{CorrelationKeys, NotificationContext},
    providers::{IgnoreReason, ProcessOutcome},
    reconciler::Reconciler,
    traits::{IpnValidator, IpnVerdict, TransactionStore},
};

//--------------------------------------      PaypalIpn        -------------------------------------------------------

/// One `transaction[N]` leg of a chained payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaypalCharge {
    pub index: usize,
    /// The leg's own status (`Completed`, `Refunded`, …), distinct from the body's top-level status.
    pub status: Option<String>,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    /// PayPal's transaction id for this leg.
    pub id: Option<String>,
    pub is_primary_receiver: Option<bool>,
}

/// A decoded IPN body: scalar top-level fields plus the chained-payment legs in ascending index order.
#[derive(Debug, Clone)]
pub struct PaypalIpn {
    fields: FormFields,
    charges: Vec<PaypalCharge>,
}

impl PaypalIpn {
    /// Decodes an urlencoded IPN body. Amounts inside legs have the combined `"USD 1.00"` form and are split here,
    /// exactly, so that a malformed amount is a parse failure instead of a silently skipped field.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let fields = FormFields::from_bytes(raw)?;
        let mut charges = Vec::new();
        for (index, group) in fields.indexed_groups("transaction") {
            let (currency, amount) = match group.get("amount") {
                Some(a) => {
                    let (c, a) = split_currency_amount(&format!("transaction[{index}].amount"), a)?;
                    (Some(c), Some(a))
                },
                None => (None, None),
            };
            charges.push(PaypalCharge {
                index,
                status: group.get("status").cloned(),
                amount,
                currency,
                id: group.get("id").or_else(|| group.get("id_for_sender_txn")).cloned(),
                is_primary_receiver: group
                    .get("is_primary_receiver")
                    .map(|v| parse_boolean_flag(Some(v.clone()), false)),
            });
        }
        Ok(Self { fields, charges })
    }

    /// The body's top-level status: the state of the payment as a whole.
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status")
    }

    /// The pay key PayPal assigned when the payment was initiated.
    pub fn pay_key(&self) -> Option<&str> {
        self.fields.get("pay_key")
    }

    /// Our own transaction uuid, echoed back through the `tracking_id` passthrough parameter.
    pub fn tracking_id(&self) -> Option<&str> {
        self.fields.get("tracking_id")
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }

    /// The chained-payment legs exactly as they appeared on the wire.
    pub fn charges(&self) -> &[PaypalCharge] {
        &self.charges
    }

    pub fn correlation_keys(&self) -> CorrelationKeys {
        CorrelationKeys {
            provider_id: self.pay_key().map(String::from),
            uuid: self.tracking_id().map(String::from),
        }
    }

    /// Selects the leg that drives reconciliation, per the chained-payment rule. Bodies without any `transaction[N]`
    /// group are treated as their own single leg, built from the top-level fields.
    pub fn driving_charge(&self) -> Option<(PaypalCharge, CanonicalOutcome)> {
        let charges = if self.charges.is_empty() { vec![self.synthetic_charge()] } else { self.charges.clone() };
        let multiple = charges.len() > 1;
        for charge in charges {
            let Some(status) = charge.status.as_deref() else { continue };
            let outcome = match map_status(PaymentProvider::Paypal, status) {
                Ok(CanonicalOutcome::Ignore) | Err(_) => continue,
                Ok(outcome) => outcome,
            };
            if multiple && charge.is_primary_receiver != Some(true) {
                continue;
            }
            return Some((charge, outcome));
        }
        None
    }

    /// A single-receiver IPN carries its facts at the top level. The top-level amount, when present, does not
    /// always use the combined form, so it is taken only when it splits cleanly.
    fn synthetic_charge(&self) -> PaypalCharge {
        let (currency, amount) = match self.fields.get("amount").and_then(|a| split_currency_amount("amount", a).ok())
        {
            Some((c, a)) => (Some(c), Some(a)),
            None => (None, None),
        };
        PaypalCharge {
            index: 0,
            status: self.status().map(String::from),
            amount,
            currency,
            id: self.fields.get("txn_id").map(String::from),
            is_primary_receiver: None,
        }
    }
}

//--------------------------------------    PaypalProcessor    -------------------------------------------------------

/// Drives a raw IPN body through revalidation, leg selection and reconciliation.
#[derive(Debug, Clone)]
pub struct PaypalProcessor<B, V> {
    validator: V,
    locator: TransactionLocator<B>,
    reconciler: Reconciler<B>,
}

impl<B, V> PaypalProcessor<B, V>
where
    B: TransactionStore,
    V: IpnValidator,
{
    pub fn new(db: B, validator: V) -> Self {
        Self { validator, locator: TransactionLocator::new(db.clone()), reconciler: Reconciler::new(db) }
    }

    pub fn with_lockdown_window(mut self, window: chrono::Duration) -> Self {
        self.reconciler = self.reconciler.with_lockdown_window(window);
        self
    }

    pub async fn process(&self, ctx: &NotificationContext, raw: &[u8]) -> Result<ProcessOutcome, ProcessError> {
        let ipn = PaypalIpn::parse(raw)?;
        let status = ipn.status().unwrap_or_default().to_string();
        if !status.eq_ignore_ascii_case("completed") {
            debug!("💸️ [{ctx}] IPN reports payment status '{status}', acknowledging without the round-trip");
            return Ok(ProcessOutcome::Ignored(IgnoreReason::NotCompleted(status)));
        }
        match self.validator.validate_ipn(ctx, raw).await.map_err(AuthenticationError::from)? {
            IpnVerdict::Verified => debug!("💸️ [{ctx}] IPN revalidated by the provider"),
            IpnVerdict::Invalid(answer) => {
                warn!("💸️ [{ctx}] IPN failed revalidation, provider answered '{answer}'");
                return Err(AuthenticationError::Rejected(answer).into());
            },
        }
        let Some((charge, outcome)) = ipn.driving_charge() else {
            info!("💸️ [{ctx}] no leg of this IPN drives reconciliation, acknowledging");
            return Ok(ProcessOutcome::Ignored(IgnoreReason::NoDrivingCharge));
        };
        debug!("💸️ [{ctx}] leg {} drives reconciliation ({:?})", charge.index, charge.status);
        let keys = ipn.correlation_keys();
        let tx = match self.locator.locate(ctx, &keys).await {
            Ok(tx) => tx,
            Err(LocateError::NotFound(e)) => {
                return Ok(ProcessOutcome::Ignored(IgnoreReason::NoMatch { tried: e.tried }))
            },
            Err(LocateError::Store(e)) => return Err(e.into()),
        };
        match outcome {
            CanonicalOutcome::Status(status) => {
                let mut update = TransactionUpdate::default().with_status(status);
                if let (Some(amount), Some(currency)) = (charge.amount, charge.currency.clone()) {
                    update = update.with_amount(amount, currency);
                }
                if let Some(id) = charge.id.clone() {
                    update = update.with_uid_support(id);
                }
                let updated = self.reconciler.apply_status(ctx, &tx, update).await?;
                Ok(ProcessOutcome::Applied(updated))
            },
            CanonicalOutcome::Derive(kind) => {
                let (transaction, created) =
                    self.reconciler.derive(ctx, &tx, kind, charge.amount, charge.currency, charge.id).await?;
                Ok(ProcessOutcome::Derived { transaction, created })
            },
            CanonicalOutcome::Ignore => Ok(ProcessOutcome::Ignored(IgnoreReason::NoDrivingCharge)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::TransactionKind;

    fn chained_refund_body() -> &'static [u8] {
        b"status=COMPLETED&pay_key=AP-4WG88734&tracking_id=uuid-77&\
          transaction%5B0%5D.status=Refunded&transaction%5B0%5D.amount=USD%201.00&\
          transaction%5B0%5D.is_primary_receiver=true&transaction%5B0%5D.id=8RS55531&\
          transaction%5B1%5D.status=Refunded&transaction%5B1%5D.amount=USD%200.30&\
          transaction%5B1%5D.is_primary_receiver=false&transaction%5B1%5D.id=7XX91002"
    }

    #[test]
    fn parses_legs_in_ascending_order() {
        let ipn = PaypalIpn::parse(chained_refund_body()).unwrap();
        assert_eq!(ipn.status(), Some("COMPLETED"));
        assert_eq!(ipn.pay_key(), Some("AP-4WG88734"));
        assert_eq!(ipn.tracking_id(), Some("uuid-77"));
        let charges = ipn.charges();
        assert_eq!(charges.len(), 2);
        assert_eq!(charges[0].index, 0);
        assert_eq!(charges[0].amount.unwrap().to_string(), "1.00");
        assert_eq!(charges[0].currency.as_deref(), Some("USD"));
        assert_eq!(charges[1].index, 1);
        assert_eq!(charges[1].is_primary_receiver, Some(false));
    }

    #[test]
    fn primary_receiver_leg_drives_reconciliation() {
        let ipn = PaypalIpn::parse(chained_refund_body()).unwrap();
        let (charge, outcome) = ipn.driving_charge().unwrap();
        assert_eq!(charge.index, 0);
        assert_eq!(charge.id.as_deref(), Some("8RS55531"));
        assert_eq!(outcome, CanonicalOutcome::Derive(TransactionKind::Refund));
    }

    #[test]
    fn non_primary_legs_never_drive() {
        // leg 0 is actionable but not primary; leg 1 is primary with an unknown status
        let body = b"status=COMPLETED&pay_key=AP-1&\
              transaction%5B0%5D.status=Refunded&transaction%5B0%5D.is_primary_receiver=false&\
              transaction%5B1%5D.status=Pending&transaction%5B1%5D.is_primary_receiver=true";
        let ipn = PaypalIpn::parse(body).unwrap();
        assert!(ipn.driving_charge().is_none());
    }

    #[test]
    fn single_leg_needs_no_primary_flag() {
        let body = b"status=COMPLETED&pay_key=AP-1&transaction%5B0%5D.status=Completed";
        let ipn = PaypalIpn::parse(body).unwrap();
        let (charge, outcome) = ipn.driving_charge().unwrap();
        assert_eq!(charge.index, 0);
        assert_eq!(outcome, CanonicalOutcome::Status(crate::db_types::TransactionStatus::Completed));
    }

    #[test]
    fn bodies_without_legs_fall_back_to_top_level_fields() {
        let body = b"status=Completed&pay_key=AP-9&txn_id=5TY11203&amount=USD%203.50";
        let ipn = PaypalIpn::parse(body).unwrap();
        let (charge, _) = ipn.driving_charge().unwrap();
        assert_eq!(charge.id.as_deref(), Some("5TY11203"));
        assert_eq!(charge.amount.unwrap().to_string(), "3.50");
        assert_eq!(charge.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn malformed_leg_amounts_fail_the_parse() {
        let body = b"status=COMPLETED&transaction%5B0%5D.status=Completed&transaction%5B0%5D.amount=1.00";
        let err = PaypalIpn::parse(body).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { ref field, .. } if field == "transaction[0].amount"));
    }
}
