use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use mpg_common::MarketAmount;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   TransactionStatus   -------------------------------------------------------

/// The canonical transaction lifecycle that every provider's status vocabulary maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The transaction was created by the payment-initiation flow and no notification has arrived yet.
    Pending,
    /// The provider reports that the money moved.
    Completed,
    /// The provider reports settled funds *and* our own secondary verification step has run.
    Checked,
    /// A notification was received but the funds are not confirmed yet.
    Received,
    /// The payment failed at the provider. Terminal.
    Failed,
    /// The payment was cancelled by the buyer or the provider. Terminal.
    Cancelled,
}

impl TransactionStatus {
    /// Terminal statuses never transition to anything else.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Failed | TransactionStatus::Cancelled)
    }

    /// Settled statuses are the only ones that may spawn derivative transactions.
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Checked)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Checked => write!(f, "Checked"),
            TransactionStatus::Received => write!(f, "Received"),
            TransactionStatus::Failed => write!(f, "Failed"),
            TransactionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Checked" => Ok(Self::Checked),
            "Received" => Ok(Self::Received),
            "Failed" => Ok(Self::Failed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction status: {value}. But this conversion cannot fail. Defaulting to Pending");
            TransactionStatus::Pending
        })
    }
}

//--------------------------------------    TransactionKind    -------------------------------------------------------

/// What a transaction record represents. Derivatives always point at the payment they derive from via `related_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionKind {
    /// An ordinary buyer payment.
    Payment,
    /// Money returned to the buyer at the merchant's or buyer's request.
    Refund,
    /// Money clawed back by the provider (chargeback or ACH reversal).
    Reversal,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Payment => write!(f, "Payment"),
            TransactionKind::Refund => write!(f, "Refund"),
            TransactionKind::Reversal => write!(f, "Reversal"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Payment" => Ok(Self::Payment),
            "Refund" => Ok(Self::Refund),
            "Reversal" => Ok(Self::Reversal),
            s => Err(ConversionError(format!("Invalid transaction kind: {s}"))),
        }
    }
}

impl From<String> for TransactionKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid transaction kind: {value}. But this conversion cannot fail. Defaulting to Payment");
            TransactionKind::Payment
        })
    }
}

//--------------------------------------    PaymentProvider    -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Paypal,
    Bango,
    Boku,
    Braintree,
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProvider::Paypal => write!(f, "paypal"),
            PaymentProvider::Bango => write!(f, "bango"),
            PaymentProvider::Boku => write!(f, "boku"),
            PaymentProvider::Braintree => write!(f, "braintree"),
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paypal" => Ok(Self::Paypal),
            "bango" => Ok(Self::Bango),
            "boku" => Ok(Self::Boku),
            "braintree" => Ok(Self::Braintree),
            s => Err(ConversionError(format!("Unknown payment provider: {s}"))),
        }
    }
}

//--------------------------------------    TransactionUuid    -------------------------------------------------------

/// A lightweight wrapper around the globally unique id we assign to a transaction at initiation time.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TransactionUuid(pub String);

impl TransactionUuid {
    /// Mints a brand-new random uuid. Used at initiation time and when spawning derivatives.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TransactionUuid {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TransactionUuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TransactionUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      Transaction      -------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub uuid: TransactionUuid,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    pub provider: PaymentProvider,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Provider-assigned id handed out when the payment was initiated (e.g. a PayPal pay key).
    pub uid_pay: Option<String>,
    /// Provider-assigned id that arrives later, in a notification (e.g. a gateway transaction id).
    pub uid_support: Option<String>,
    pub related_id: Option<i64>,
    pub status_reason: Option<String>,
    pub carrier: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// The age of the transaction at the given instant. Saturates to zero for clock skew.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.created_at).max(chrono::Duration::zero())
    }
}

//--------------------------------------     NewTransaction    -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub uuid: TransactionUuid,
    pub provider: PaymentProvider,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    pub uid_pay: Option<String>,
    pub uid_support: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewTransaction {
    pub fn new(uuid: TransactionUuid, provider: PaymentProvider) -> Self {
        Self {
            uuid,
            provider,
            kind: TransactionKind::Payment,
            status: TransactionStatus::Pending,
            amount: None,
            currency: None,
            uid_pay: None,
            uid_support: None,
            status_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_amount(mut self, amount: MarketAmount, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_uid_pay(mut self, uid_pay: impl Into<String>) -> Self {
        self.uid_pay = Some(uid_pay.into());
        self
    }

    pub fn with_uid_support(mut self, uid_support: impl Into<String>) -> Self {
        self.uid_support = Some(uid_support.into());
        self
    }

    pub fn with_status_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

//--------------------------------------   TransactionUpdate   -------------------------------------------------------

/// The set of fields a notification is allowed to change on an existing transaction. Everything else (uuid, provider,
/// kind, relations) is immutable once the record exists.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    pub amount: Option<MarketAmount>,
    pub currency: Option<String>,
    pub uid_support: Option<String>,
    pub carrier: Option<String>,
    pub region: Option<String>,
    pub status_reason: Option<String>,
}

impl TransactionUpdate {
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_amount(mut self, amount: MarketAmount, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_uid_support(mut self, uid_support: impl Into<String>) -> Self {
        self.uid_support = Some(uid_support.into());
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>, region: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self.region = Some(region.into());
        self
    }

    pub fn with_status_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() &&
            self.amount.is_none() &&
            self.currency.is_none() &&
            self.uid_support.is_none() &&
            self.carrier.is_none() &&
            self.region.is_none() &&
            self.status_reason.is_none()
    }

    /// True if the update touches the financially significant fields that freeze after the lockdown window.
    pub fn is_financial(&self) -> bool {
        self.status.is_some() || self.amount.is_some() || self.currency.is_some()
    }
}

//--------------------------------------     Subscription      -------------------------------------------------------

/// A recurring-billing agreement held at a provider. Charges against it arrive as webhook notifications.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub provider: PaymentProvider,
    /// The provider-assigned subscription id; the correlation key for webhook events.
    pub uid: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub provider: PaymentProvider,
    pub uid: String,
    pub active: bool,
}

impl NewSubscription {
    pub fn new(provider: PaymentProvider, uid: impl Into<String>) -> Self {
        Self { provider, uid: uid.into(), active: true }
    }
}

//--------------------------------------    BillingPeriod      -------------------------------------------------------

/// The billing interval a subscription charge covers, as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

//--------------------------------------  SubscriptionCharge   -------------------------------------------------------

/// Audit record linking a subscription to the transaction created for one billing period.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionCharge {
    pub id: i64,
    pub subscription_id: i64,
    pub transaction_id: i64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
