//! Subscription lifecycle orchestration
//!
//! `SubscriptionService` owns the subscribe/cancel flows and the plan
//! change state machine: upgrades apply immediately with prorated
//! invoicing, downgrades and lateral moves are deferred to the next
//! renewal through a two-phase schedule. The provider is the sole
//! source of truth; every decision starts from a fresh fetch.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{BillingError, BillingResult};
use crate::gateway::ProviderGateway;
use crate::pricing::{PriceChange, PriceComparator};
use crate::schedule::ScheduleReconciler;
use crate::types::{
    Customer, PaymentBehavior, PhaseItemSpec, PhaseSpec, ProrationBehavior, Schedule,
    Subscription, SubscriptionItemSpec,
};

/// Outcome of a plan change. Serialized untagged so API callers
/// discriminate by shape, as with the provider's own objects.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PlanChange {
    /// Upgrade applied in place; the subscription carries the prorated
    /// invoice and its payment intent.
    Applied(Subscription),
    /// Downgrade or lateral move deferred to the next renewal.
    Deferred(Schedule),
}

#[derive(Clone)]
pub struct SubscriptionService {
    gateway: Arc<dyn ProviderGateway>,
    comparator: PriceComparator,
    reconciler: ScheduleReconciler,
}

/// Replace a provider failure with the user-facing message for the
/// stage it happened in, logging the underlying cause.
fn stage_failure(detail: &'static str, err: BillingError) -> BillingError {
    tracing::error!(cause = %err, "{}", detail);
    BillingError::provider(detail)
}

impl SubscriptionService {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            comparator: PriceComparator::new(gateway.clone()),
            reconciler: ScheduleReconciler::new(gateway.clone()),
            gateway,
        }
    }

    /// Look the customer up by email, creating one lazily with the
    /// given payment method as invoice default.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: &str,
        payment_method_id: &str,
    ) -> BillingResult<Customer> {
        let existing = self
            .gateway
            .find_customer_by_email(email)
            .await
            .map_err(|e| {
                stage_failure(
                    "Erro ao criar ou buscar cliente. Verifique os dados fornecidos.",
                    e,
                )
            })?;
        if let Some(existing) = existing {
            tracing::debug!(customer_id = %existing.id, email, "Reusing existing customer");
            return Ok(existing);
        }
        self.gateway
            .create_customer(email, name, payment_method_id)
            .await
            .map_err(|e| {
                stage_failure(
                    "Erro ao criar ou buscar cliente. Verifique os dados fornecidos.",
                    e,
                )
            })
    }

    /// Create a subscription for the given price ids, one unit each.
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_ids: &[String],
    ) -> BillingResult<Subscription> {
        let items: Vec<SubscriptionItemSpec> = price_ids
            .iter()
            .map(|price| SubscriptionItemSpec {
                price: price.clone(),
                quantity: 1,
            })
            .collect();

        let subscription = self
            .gateway
            .create_subscription(customer_id, &items)
            .await
            .map_err(|e| {
                stage_failure("Erro ao criar assinatura. Verifique os dados fornecidos.", e)
            })?;
        tracing::info!(
            subscription_id = %subscription.id,
            customer_id,
            status = %subscription.status,
            "Created subscription"
        );
        Ok(subscription)
    }

    /// Flag the subscription for cancellation at the end of the current
    /// period. Already-flagged subscriptions succeed again unchanged.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> BillingResult<Subscription> {
        self.gateway
            .cancel_at_period_end(subscription_id)
            .await
            .map_err(|e| stage_failure("Não foi possível cancelar a assinatura.", e))
    }

    /// Move the subscription to a new price.
    ///
    /// Upgrades swap the line item in place with an immediate prorated
    /// invoice. Downgrades and lateral moves build a two-phase schedule
    /// so the current period finishes untouched and the new price takes
    /// over for exactly one renewal. In both cases every pending
    /// schedule the customer holds is released first.
    pub async fn change_plan(
        &self,
        subscription_id: &str,
        new_price_id: &str,
    ) -> BillingResult<PlanChange> {
        let subscription = self
            .gateway
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;

        let current_item = subscription
            .items
            .first()
            .ok_or_else(|| BillingError::NoLineItems(subscription_id.to_string()))?
            .clone();

        let change = self
            .comparator
            .classify(&current_item.price_id, new_price_id)
            .await?;

        // Invariant: at most one pending schedule per customer. Always
        // reconcile before mutating anything.
        self.reconciler
            .reconcile(&subscription.customer_id)
            .await
            .map_err(|e| stage_failure("Erro ao cancelar schedules existentes.", e))?;

        match change {
            PriceChange::Upgrade => {
                tracing::info!(
                    subscription_id,
                    new_price_id,
                    "Applying upgrade with immediate proration"
                );
                self.gateway
                    .update_subscription_item(
                        subscription_id,
                        &current_item.id,
                        new_price_id,
                        ProrationBehavior::AlwaysInvoice,
                        PaymentBehavior::AllowIncomplete,
                    )
                    .await
                    .map_err(|e| stage_failure("Erro ao atualizar itens da assinatura.", e))?;
                let updated = self
                    .gateway
                    .get_subscription_expanded(subscription_id)
                    .await
                    .map_err(|e| stage_failure("Erro ao atualizar itens da assinatura.", e))?;
                Ok(PlanChange::Applied(updated))
            }
            PriceChange::Downgrade | PriceChange::Lateral => {
                tracing::info!(
                    subscription_id,
                    new_price_id,
                    change = ?change,
                    "Deferring plan change to next renewal"
                );
                let schedule = self
                    .defer_to_next_cycle(subscription_id, new_price_id)
                    .await
                    .map_err(|e| stage_failure("Erro ao criar ou atualizar cronograma.", e))?;
                Ok(PlanChange::Deferred(schedule))
            }
        }
    }

    /// Seed a schedule from the subscription's current state, then
    /// rewrite it to two phases: the current phase untouched, one
    /// iteration of the new price after it.
    async fn defer_to_next_cycle(
        &self,
        subscription_id: &str,
        new_price_id: &str,
    ) -> BillingResult<Schedule> {
        let template = self
            .gateway
            .create_schedule_from_subscription(subscription_id)
            .await?;

        let current_phase = template.phases.first().ok_or_else(|| {
            BillingError::provider(format!(
                "schedule {} created without an initial phase",
                template.id
            ))
        })?;

        let phases = vec![
            PhaseSpec {
                items: current_phase
                    .items
                    .iter()
                    .map(|item| PhaseItemSpec {
                        price: item.price.id().to_string(),
                        quantity: item.quantity.unwrap_or(1),
                    })
                    .collect(),
                start_date: Some(current_phase.start_date),
                end_date: Some(current_phase.end_date),
                iterations: None,
                proration_behavior: ProrationBehavior::None,
            },
            PhaseSpec {
                items: vec![PhaseItemSpec {
                    price: new_price_id.to_string(),
                    quantity: 1,
                }],
                start_date: None,
                end_date: None,
                iterations: Some(1),
                proration_behavior: ProrationBehavior::None,
            },
        ];

        self.gateway
            .update_schedule_phases(&template.id, &phases)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use crate::types::{Price, SubscriptionItem};

    fn price(id: &str, amount: i64) -> Price {
        Price {
            id: id.to_string(),
            unit_amount: Some(amount),
            currency: "brl".to_string(),
        }
    }

    fn subscription(id: &str, price_id: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            customer_id: "cus_123".to_string(),
            status: "active".to_string(),
            items: vec![SubscriptionItem {
                id: "si_1".to_string(),
                price_id: price_id.to_string(),
                quantity: 1,
            }],
            start_date: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
            latest_invoice: None,
        }
    }

    fn service(mock: MockGateway) -> (SubscriptionService, Arc<MockGateway>) {
        let gateway = Arc::new(mock);
        (SubscriptionService::new(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn upgrade_applies_immediately() {
        let mock = MockGateway::new();
        mock.add_price(price("price_basic", 1000));
        mock.add_price(price("price_pro", 2500));
        mock.add_subscription(subscription("sub_1", "price_basic"));
        let (service, gateway) = service(mock);

        let result = service.change_plan("sub_1", "price_pro").await.unwrap();

        match result {
            PlanChange::Applied(sub) => {
                assert_eq!(sub.items[0].price_id, "price_pro");
            }
            PlanChange::Deferred(_) => panic!("upgrade must not be deferred"),
        }
        assert!(gateway.phase_updates().is_empty());
    }

    #[tokio::test]
    async fn downgrade_builds_two_phase_schedule() {
        let mock = MockGateway::new();
        mock.add_price(price("price_pro", 2500));
        mock.add_price(price("price_basic", 1000));
        mock.add_subscription(subscription("sub_1", "price_pro"));
        let (service, gateway) = service(mock);

        let result = service.change_plan("sub_1", "price_basic").await.unwrap();

        let schedule = match result {
            PlanChange::Deferred(schedule) => schedule,
            PlanChange::Applied(_) => panic!("downgrade must be deferred"),
        };
        assert_eq!(schedule.phases.len(), 2);

        let (_, phases) = gateway.phase_updates().pop().unwrap();
        assert_eq!(phases.len(), 2);

        let current = &phases[0];
        assert_eq!(current.items[0].price, "price_pro");
        assert_eq!(current.items[0].quantity, 1);
        assert_eq!(current.start_date, Some(1_700_000_000));
        assert_eq!(current.end_date, Some(1_702_592_000));
        assert_eq!(current.proration_behavior, ProrationBehavior::None);

        let next = &phases[1];
        assert_eq!(next.items[0].price, "price_basic");
        assert_eq!(next.items[0].quantity, 1);
        assert_eq!(next.iterations, Some(1));
        assert_eq!(next.proration_behavior, ProrationBehavior::None);
    }

    #[tokio::test]
    async fn lateral_change_is_deferred() {
        let mock = MockGateway::new();
        mock.add_price(price("price_a", 1500));
        mock.add_price(price("price_b", 1500));
        mock.add_subscription(subscription("sub_1", "price_a"));
        let (service, _) = service(mock);

        let result = service.change_plan("sub_1", "price_b").await.unwrap();
        assert!(matches!(result, PlanChange::Deferred(_)));
    }

    #[tokio::test]
    async fn reconciliation_precedes_any_mutation() {
        let mock = MockGateway::new();
        mock.add_price(price("price_pro", 2500));
        mock.add_price(price("price_basic", 1000));
        mock.add_subscription(subscription("sub_1", "price_pro"));
        let (service, gateway) = service(mock);

        service.change_plan("sub_1", "price_basic").await.unwrap();

        let calls = gateway.calls();
        let reconcile_at = calls
            .iter()
            .position(|c| c == "list_schedules")
            .unwrap();
        let create_at = calls
            .iter()
            .position(|c| c == "create_schedule_from_subscription")
            .unwrap();
        assert!(reconcile_at < create_at);
    }

    #[tokio::test]
    async fn reconciliation_also_runs_for_upgrades() {
        let mock = MockGateway::new();
        mock.add_price(price("price_basic", 1000));
        mock.add_price(price("price_pro", 2500));
        mock.add_subscription(subscription("sub_1", "price_basic"));
        let (service, gateway) = service(mock);

        service.change_plan("sub_1", "price_pro").await.unwrap();

        let calls = gateway.calls();
        let reconcile_at = calls
            .iter()
            .position(|c| c == "list_schedules")
            .unwrap();
        let update_at = calls
            .iter()
            .position(|c| c == "update_subscription_item")
            .unwrap();
        assert!(reconcile_at < update_at);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let (service, _) = service(MockGateway::new());
        let err = service
            .change_plan("sub_missing", "price_basic")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound(_)));
    }

    #[tokio::test]
    async fn subscription_without_items_fails() {
        let mock = MockGateway::new();
        let mut sub = subscription("sub_1", "price_basic");
        sub.items.clear();
        mock.add_subscription(sub);
        let (service, _) = service(mock);

        let err = service
            .change_plan("sub_1", "price_basic")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NoLineItems(_)));
    }

    #[tokio::test]
    async fn reconcile_failure_aborts_the_change() {
        let mock = MockGateway::new();
        mock.add_price(price("price_pro", 2500));
        mock.add_price(price("price_basic", 1000));
        mock.add_subscription(subscription("sub_1", "price_pro"));
        mock.fail_next("list_schedules");
        let (service, gateway) = service(mock);

        let err = service
            .change_plan("sub_1", "price_basic")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Provider { .. }));
        assert!(!gateway
            .calls()
            .contains(&"create_schedule_from_subscription".to_string()));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let mock = MockGateway::new();
        let mut sub = subscription("sub_1", "price_basic");
        sub.cancel_at_period_end = true;
        mock.add_subscription(sub);
        let (service, _) = service(mock);

        let cancelled = service.cancel_subscription("sub_1").await.unwrap();
        assert!(cancelled.cancel_at_period_end);
    }

    #[tokio::test]
    async fn existing_customer_is_reused() {
        let mock = MockGateway::new();
        mock.add_customer(Customer {
            id: "cus_existing".to_string(),
            email: Some("ana@example.com".to_string()),
            name: Some("Ana".to_string()),
        });
        let (service, gateway) = service(mock);

        let customer = service
            .find_or_create_customer("ana@example.com", "Ana", "pm_123")
            .await
            .unwrap();
        assert_eq!(customer.id, "cus_existing");
        assert!(!gateway.calls().contains(&"create_customer".to_string()));
    }

    #[tokio::test]
    async fn new_subscriptions_pin_quantity_to_one() {
        let (service, gateway) = service(MockGateway::new());
        let subscription = service
            .create_subscription("cus_123", &["price_basic".to_string()])
            .await
            .unwrap();
        assert_eq!(subscription.items[0].quantity, 1);
        assert!(gateway.calls().contains(&"create_subscription".to_string()));
    }

    #[tokio::test]
    async fn plan_change_serializes_by_shape() {
        let schedule = Schedule {
            id: "sub_sched_1".to_string(),
            customer_id: "cus_123".to_string(),
            status: crate::types::ScheduleStatus::Active,
            phases: vec![],
        };
        let value = serde_json::to_value(PlanChange::Deferred(schedule)).unwrap();
        assert_eq!(value["id"], "sub_sched_1");
        assert!(value.get("items").is_none());
    }
}
