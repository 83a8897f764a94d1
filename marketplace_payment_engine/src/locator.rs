//! Correlates an inbound notification with its local transaction.
//!
//! Providers do not agree on which identifier they echo back: some send the id *they* assigned (sometimes before we
//! ever saw it), some send our own uuid through a passthrough parameter, and some send both. The locator tries the
//! keys in one fixed order and stops at the first hit, so that the same notification always resolves to the same
//! record regardless of which delivery attempt got there first.

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    db_types::Transaction,
    errors::NotFoundError,
    notification::{CorrelationKeys, NotificationContext},
    traits::{StoreError, TransactionStore},
};

#[derive(Debug, Clone, Error)]
pub enum LocateError {
    /// No local transaction matches any of the supplied keys. Callers acknowledge this as a no-op.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves correlation keys to a stored transaction.
///
/// Lookup priority is fixed: the provider-assigned id first, then our own uuid. A miss on every key is
/// [`LocateError::NotFound`], carrying the keys that were tried for the audit log.
#[derive(Debug, Clone)]
pub struct TransactionLocator<B> {
    db: B,
}

impl<B> TransactionLocator<B>
where B: TransactionStore
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn locate(&self, ctx: &NotificationContext, keys: &CorrelationKeys) -> Result<Transaction, LocateError> {
        if keys.is_empty() {
            warn!("🔍️ [{ctx}] notification carries no correlation keys at all");
            return Err(NotFoundError { tried: keys.describe() }.into());
        }
        if let Some(id) = keys.provider_id.as_deref() {
            if let Some(tx) = self.db.fetch_transaction_by_provider_id(ctx.provider, id).await? {
                debug!("🔍️ [{ctx}] matched transaction {} by provider id {id}", tx.uuid);
                return Ok(tx);
            }
        }
        if let Some(uuid) = keys.uuid.as_deref() {
            if let Some(tx) = self.db.fetch_transaction_by_uuid(uuid).await? {
                debug!("🔍️ [{ctx}] matched transaction {uuid} by uuid");
                return Ok(tx);
            }
        }
        info!("🔍️ [{ctx}] no transaction matches this notification ({})", keys.describe());
        Err(NotFoundError { tried: keys.describe() }.into())
    }
}
