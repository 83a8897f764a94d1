use crate::{
    db_types::{BillingPeriod, NewSubscription, NewTransaction, PaymentProvider, Subscription, Transaction},
    traits::StoreError,
};

/// Recurring-billing records for backends that support subscription providers.
#[allow(async_fn_in_trait)]
pub trait SubscriptionStore: Clone {
    /// Fetches the subscription that the given provider knows under `provider_id`.
    async fn fetch_subscription_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Creates a subscription record. Used by the sign-up flow and by tests.
    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription, StoreError>;

    /// Records one billing-period charge against a subscription, in a single atomic unit:
    /// * if a transaction with the given `uid_support` already exists for the provider, it is returned unchanged
    ///   and no audit record is written (`false` flag), so redelivered webhooks are a no-op;
    /// * otherwise the transaction is created together with a charge audit record carrying the billing period
    ///   (`true` flag).
    async fn record_subscription_charge(
        &self,
        subscription_id: i64,
        new: NewTransaction,
        period: BillingPeriod,
    ) -> Result<(Transaction, bool), StoreError>;

    /// Sets the subscription's active flag, returning `true` if the value actually changed.
    /// Setting the flag to its current value is a no-op.
    async fn set_subscription_active(&self, subscription_id: i64, active: bool) -> Result<bool, StoreError>;
}
