//! The error taxonomy for notification processing.
//!
//! Each stage of the pipeline has its own error type, and [`ProcessError`] is the union the provider processors
//! return. The split matters because the HTTP layer treats the classes differently: authentication and parse
//! failures are rejected so the provider redelivers, transition and consistency failures are surfaced for operator
//! review, and a missing local transaction is acknowledged as a no-op so the provider stops retrying.

use thiserror::Error;

use crate::{
    db_types::{PaymentProvider, TransactionKind, TransactionStatus},
    traits::{AuthServiceError, StoreError},
};

//--------------------------------------  AuthenticationError  -------------------------------------------------------

/// A notification failed authenticity checks. Nothing is ever mutated on this path.
#[derive(Debug, Clone, Error)]
pub enum AuthenticationError {
    #[error("signature mismatch for transaction {uuid}")]
    SignatureMismatch { uuid: String },
    #[error("the notification carries no signature")]
    MissingSignature,
    #[error("signature input must be ASCII, but '{field}' contains non-ASCII data")]
    NonAsciiInput { field: &'static str },
    #[error("the provider's verification service rejected the notification: {0}")]
    Rejected(String),
    #[error("token report disagrees with the notification on: {fields}")]
    TokenMismatch { fields: String },
    #[error("verification round-trip failed: {0}")]
    RoundTrip(String),
}

impl From<AuthServiceError> for AuthenticationError {
    fn from(e: AuthServiceError) -> Self {
        AuthenticationError::RoundTrip(e.to_string())
    }
}

//--------------------------------------      ParseError       -------------------------------------------------------

/// The wire payload could not be decoded into a notification. Nothing is ever mutated on this path.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("required field '{0}' is missing")]
    MissingField(String),
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("payload is not valid UTF-8")]
    Encoding,
    #[error("unrecognized {provider} result code '{code}'")]
    UnknownCode { provider: PaymentProvider, code: String },
    #[error("unsupported event action '{0}'")]
    UnsupportedAction(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        ParseError::Xml(e.to_string())
    }
}

//--------------------------------------     NotFoundError     -------------------------------------------------------

/// No local transaction matches the notification's correlation keys. Acknowledged as a no-op, never retried.
#[derive(Debug, Clone, Error)]
#[error("no transaction matches this notification (tried {tried})")]
pub struct NotFoundError {
    pub tried: String,
}

//--------------------------------------    TransitionError    -------------------------------------------------------

/// A legal-but-conflicting state change was rejected. The stored transaction is left untouched.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("transaction {uuid} is {status}, which is terminal")]
    Terminal { uuid: String, status: TransactionStatus },
    #[error("transition {from} -> {to} is not allowed for transaction {uuid}")]
    Forbidden { uuid: String, from: TransactionStatus, to: TransactionStatus },
    #[error("transaction {uuid} is {age_hours}h old, past the {window_hours}h lockdown window, so its financial fields are frozen")]
    LockedDown { uuid: String, age_hours: i64, window_hours: i64 },
    #[error("transaction {uuid} is {status}; only Completed payments may spawn a {kind}")]
    NotDerivable { uuid: String, status: TransactionStatus, kind: TransactionKind },
    #[error("transaction {uuid} is a {kind} and cannot spawn further derivatives")]
    DerivativeOfDerivative { uuid: String, kind: TransactionKind },
}

//--------------------------------------   ConsistencyError    -------------------------------------------------------

/// The store and the provider disagree about settled state. Fatal: requires manual intervention, never auto-healed.
#[derive(Debug, Clone, Error)]
pub enum ConsistencyError {
    #[error(
        "stored status {stored} for provider transaction {provider_id} does not match the reported status \
         {reported}; manual intervention required"
    )]
    StatusMismatch { provider_id: String, stored: TransactionStatus, reported: TransactionStatus },
}

//--------------------------------------     ProcessError      -------------------------------------------------------

/// The union of failures a provider processor can produce for one notification.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),
    #[error("could not parse the notification: {0}")]
    Parse(#[from] ParseError),
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),
    #[error("consistency violation: {0}")]
    Consistency(#[from] ConsistencyError),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}
