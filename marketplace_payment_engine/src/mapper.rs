//! Translation tables from provider status vocabularies into the canonical lifecycle.
//!
//! The tables are deliberately small and closed. Two of them have asymmetric defaults that are load-bearing for
//! callers and must not be "fixed":
//! * Bango codes outside the table map to `Failed`: a Bango notification always reports a terminal outcome.
//! * Boku codes outside the table are a hard parse error, never a silent ignore.
//!
//! PayPal and Braintree treat unknown vocabulary as ignorable; both providers emit event noise that is irrelevant
//! to reconciliation.

use crate::{
    db_types::{PaymentProvider, TransactionKind, TransactionStatus},
    errors::ParseError,
};

/// What a provider status means for the local transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalOutcome {
    /// Set the transaction to this status.
    Status(TransactionStatus),
    /// Spawn a derivative of this kind off the original payment.
    Derive(TransactionKind),
    /// Recognized but irrelevant; acknowledge and do nothing.
    Ignore,
}

/// Maps one provider status code to its canonical outcome.
///
/// The only fallible row is Boku: a numeric code outside its table is a [`ParseError::UnknownCode`], not an ignore.
pub fn map_status(provider: PaymentProvider, code: &str) -> Result<CanonicalOutcome, ParseError> {
    match provider {
        PaymentProvider::Paypal => Ok(map_paypal_status(code)),
        PaymentProvider::Bango => Ok(CanonicalOutcome::Status(map_bango_code(code))),
        PaymentProvider::Boku => map_boku_code(code).map(CanonicalOutcome::Status),
        PaymentProvider::Braintree => Ok(map_braintree_status(code)),
    }
}

/// PayPal IPN statuses, compared case-insensitively. `Refunded`/`Reversal` do not set a status directly; they
/// trigger the derivative path.
pub fn map_paypal_status(status: &str) -> CanonicalOutcome {
    match status.to_ascii_lowercase().as_str() {
        "completed" => CanonicalOutcome::Status(TransactionStatus::Completed),
        "refunded" => CanonicalOutcome::Derive(TransactionKind::Refund),
        "reversal" => CanonicalOutcome::Derive(TransactionKind::Reversal),
        _ => CanonicalOutcome::Ignore,
    }
}

/// Bango response codes. Anything that is not `OK` or `CANCEL` is a failure, including codes this table has never
/// seen.
pub fn map_bango_code(code: &str) -> TransactionStatus {
    match code {
        "OK" => TransactionStatus::Completed,
        "CANCEL" => TransactionStatus::Cancelled,
        _ => TransactionStatus::Failed,
    }
}

/// Boku numeric result codes. The table is closed: untabled codes, including apparent successes, are a parse
/// error.
pub fn map_boku_code(code: &str) -> Result<TransactionStatus, ParseError> {
    match code {
        "4" | "5" | "7" | "11" => Ok(TransactionStatus::Failed),
        "8" => Ok(TransactionStatus::Cancelled),
        _ => Err(ParseError::UnknownCode { provider: PaymentProvider::Boku, code: code.to_string() }),
    }
}

/// Braintree transaction sub-statuses. Transient states (authorizing, settling, …) are ignored and never create
/// or mutate a local record.
pub fn map_braintree_status(status: &str) -> CanonicalOutcome {
    match status {
        "settled" => CanonicalOutcome::Status(TransactionStatus::Checked),
        "processor_declined" | "gateway_rejected" | "settlement_declined" | "failed" => {
            CanonicalOutcome::Status(TransactionStatus::Failed)
        },
        _ => CanonicalOutcome::Ignore,
    }
}
