//! Provider gateway: the capability interface over the billing provider
//!
//! Everything the core needs from Stripe goes through this trait, so the
//! orchestrator can be exercised against a test double and the provider
//! stays the single source of truth for subscription state.

use async_trait::async_trait;

use crate::error::BillingResult;
use crate::types::{
    Customer, PaymentBehavior, PhaseSpec, Price, ProrationBehavior, ProviderEvent, Schedule,
    Subscription, SubscriptionItemSpec,
};

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Look up a customer by email. At most one match is considered.
    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<Customer>>;

    /// Create a customer with the given payment method as the default
    /// for invoices.
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        payment_method_id: &str,
    ) -> BillingResult<Customer>;

    /// Create a subscription; the result carries the latest invoice with
    /// its payment intent expanded.
    async fn create_subscription(
        &self,
        customer_id: &str,
        items: &[SubscriptionItemSpec],
    ) -> BillingResult<Subscription>;

    /// Fetch a subscription. `None` when the id does not resolve; other
    /// provider failures are errors.
    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>>;

    /// Fetch a subscription with `latest_invoice.payment_intent`
    /// expanded. The subscription must exist.
    async fn get_subscription_expanded(&self, id: &str) -> BillingResult<Subscription>;

    /// Flag a subscription for cancellation at the end of the current
    /// billing period. Idempotent.
    async fn cancel_at_period_end(&self, id: &str) -> BillingResult<Subscription>;

    /// Swap one line item's price in place.
    async fn update_subscription_item(
        &self,
        subscription_id: &str,
        item_id: &str,
        new_price_id: &str,
        proration: ProrationBehavior,
        payment: PaymentBehavior,
    ) -> BillingResult<()>;

    /// Fetch a price. `PriceNotFound` when the id does not resolve.
    async fn get_price(&self, id: &str) -> BillingResult<Price>;

    /// List all subscription schedules for a customer.
    async fn list_schedules(&self, customer_id: &str) -> BillingResult<Vec<Schedule>>;

    /// Release a schedule, detaching it from its subscription. A no-op
    /// when the schedule is already terminal.
    async fn release_schedule(&self, id: &str) -> BillingResult<()>;

    /// Create a schedule seeded from the subscription's current state.
    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Schedule>;

    /// Replace a schedule's phases.
    async fn update_schedule_phases(
        &self,
        schedule_id: &str,
        phases: &[PhaseSpec],
    ) -> BillingResult<Schedule>;

    /// Verify a webhook delivery against its signature header and decode
    /// it. The signing secret is owned by the implementation.
    fn decode_webhook_event(&self, payload: &str, signature: &str) -> BillingResult<ProviderEvent>;
}
