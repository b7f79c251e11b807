//! In-memory gateway double for unit tests
//!
//! Backed by mutex-protected maps with an ordered call log, so tests
//! can assert both outcomes and the order of provider round trips.
//! Compiled only for tests and the `testing` feature.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{BillingError, BillingResult};
use crate::gateway::ProviderGateway;
use crate::types::{
    Customer, PaymentBehavior, PhaseItem, PhaseSpec, Price, PriceRef, ProrationBehavior,
    ProviderEvent, Schedule, SchedulePhase, ScheduleStatus, Subscription, SubscriptionItemSpec,
};

pub const VALID_SIGNATURE: &str = "t=1,v1=mock_valid";

#[derive(Default)]
pub struct MockGateway {
    customers: Mutex<Vec<Customer>>,
    prices: Mutex<HashMap<String, Price>>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    schedules: Mutex<Vec<Schedule>>,
    released: Mutex<Vec<String>>,
    phase_updates: Mutex<Vec<(String, Vec<PhaseSpec>)>>,
    next_event: Mutex<Option<ProviderEvent>>,
    failures: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: Customer) {
        self.customers.lock().unwrap().push(customer);
    }

    pub fn add_price(&self, price: Price) {
        self.prices.lock().unwrap().insert(price.id.clone(), price);
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn add_schedule(&self, schedule: Schedule) {
        self.schedules.lock().unwrap().push(schedule);
    }

    /// Event returned by the next successful `decode_webhook_event`.
    pub fn set_event(&self, event: ProviderEvent) {
        *self.next_event.lock().unwrap() = Some(event);
    }

    /// Make the named operation fail with a provider error on its next
    /// invocation.
    pub fn fail_next(&self, operation: &'static str) {
        self.failures.lock().unwrap().insert(operation);
    }

    pub fn released_schedules(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }

    pub fn phase_updates(&self) -> Vec<(String, Vec<PhaseSpec>)> {
        self.phase_updates.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> BillingResult<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failures.lock().unwrap().remove(operation) {
            return Err(BillingError::provider(format!("{operation} failed (mock)")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<Customer>> {
        self.record("find_customer_by_email")?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        _payment_method_id: &str,
    ) -> BillingResult<Customer> {
        self.record("create_customer")?;
        let customer = Customer {
            id: format!("cus_mock_{}", self.customers.lock().unwrap().len()),
            email: Some(email.to_string()),
            name: Some(name.to_string()),
        };
        self.customers.lock().unwrap().push(customer.clone());
        Ok(customer)
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        items: &[SubscriptionItemSpec],
    ) -> BillingResult<Subscription> {
        self.record("create_subscription")?;
        let subscription = Subscription {
            id: format!("sub_mock_{}", self.subscriptions.lock().unwrap().len()),
            customer_id: customer_id.to_string(),
            status: "active".to_string(),
            items: items
                .iter()
                .enumerate()
                .map(|(i, item)| crate::types::SubscriptionItem {
                    id: format!("si_mock_{i}"),
                    price_id: item.price.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            start_date: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
            latest_invoice: None,
        };
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>> {
        self.record("get_subscription")?;
        Ok(self.subscriptions.lock().unwrap().get(id).cloned())
    }

    async fn get_subscription_expanded(&self, id: &str) -> BillingResult<Subscription> {
        self.record("get_subscription_expanded")?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| BillingError::SubscriptionNotFound(id.to_string()))
    }

    async fn cancel_at_period_end(&self, id: &str) -> BillingResult<Subscription> {
        self.record("cancel_at_period_end")?;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(id.to_string()))?;
        subscription.cancel_at_period_end = true;
        Ok(subscription.clone())
    }

    async fn update_subscription_item(
        &self,
        subscription_id: &str,
        item_id: &str,
        new_price_id: &str,
        _proration: ProrationBehavior,
        _payment: PaymentBehavior,
    ) -> BillingResult<()> {
        self.record("update_subscription_item")?;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;
        for item in &mut subscription.items {
            if item.id == item_id {
                item.price_id = new_price_id.to_string();
            }
        }
        Ok(())
    }

    async fn get_price(&self, id: &str) -> BillingResult<Price> {
        self.record("get_price")?;
        self.prices
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| BillingError::PriceNotFound(id.to_string()))
    }

    async fn list_schedules(&self, customer_id: &str) -> BillingResult<Vec<Schedule>> {
        self.record("list_schedules")?;
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn release_schedule(&self, id: &str) -> BillingResult<()> {
        self.record("release_schedule")?;
        self.released.lock().unwrap().push(id.to_string());
        let mut schedules = self.schedules.lock().unwrap();
        for schedule in schedules.iter_mut() {
            if schedule.id == id {
                schedule.status = ScheduleStatus::Released;
            }
        }
        Ok(())
    }

    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Schedule> {
        self.record("create_schedule_from_subscription")?;
        let subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get(subscription_id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;

        // Stripe seeds the schedule with one phase mirroring the
        // subscription's current item and period.
        let schedule = Schedule {
            id: format!("sub_sched_mock_{}", self.schedules.lock().unwrap().len()),
            customer_id: subscription.customer_id.clone(),
            status: ScheduleStatus::Active,
            phases: vec![SchedulePhase {
                items: subscription
                    .items
                    .iter()
                    .map(|item| PhaseItem {
                        price: PriceRef::Id(item.price_id.clone()),
                        quantity: Some(item.quantity),
                    })
                    .collect(),
                start_date: subscription.start_date,
                end_date: subscription.current_period_end,
            }],
        };
        self.schedules.lock().unwrap().push(schedule.clone());
        Ok(schedule)
    }

    async fn update_schedule_phases(
        &self,
        schedule_id: &str,
        phases: &[PhaseSpec],
    ) -> BillingResult<Schedule> {
        self.record("update_schedule_phases")?;
        self.phase_updates
            .lock()
            .unwrap()
            .push((schedule_id.to_string(), phases.to_vec()));

        let schedules = self.schedules.lock().unwrap();
        let existing = schedules
            .iter()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| BillingError::provider(format!("no such schedule: {schedule_id}")))?;

        Ok(Schedule {
            id: existing.id.clone(),
            customer_id: existing.customer_id.clone(),
            status: existing.status,
            phases: phases
                .iter()
                .map(|phase| SchedulePhase {
                    items: phase
                        .items
                        .iter()
                        .map(|item| PhaseItem {
                            price: PriceRef::Id(item.price.clone()),
                            quantity: Some(item.quantity),
                        })
                        .collect(),
                    start_date: phase.start_date.unwrap_or_default(),
                    end_date: phase.end_date.unwrap_or_default(),
                })
                .collect(),
        })
    }

    fn decode_webhook_event(&self, _payload: &str, signature: &str) -> BillingResult<ProviderEvent> {
        if signature != VALID_SIGNATURE {
            return Err(BillingError::WebhookSignatureInvalid);
        }
        self.next_event
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BillingError::Internal("no event staged".to_string()))
    }
}
