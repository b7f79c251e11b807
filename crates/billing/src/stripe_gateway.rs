//! Stripe-backed implementation of the provider gateway
//!
//! Customer, subscription and price operations go through async-stripe.
//! Subscription-schedule endpoints are not usable through the 0.39
//! bindings, so those four calls hit the Stripe REST API directly with
//! the same form encoding the bindings would produce.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
// Import the behavior enums from the subscription module (not subscription_item)
use stripe::generated::billing::subscription::{
    SubscriptionPaymentBehavior, SubscriptionProrationBehavior,
};
use stripe::{EventObject, Expandable, Webhook};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::gateway::ProviderGateway;
use crate::types::{
    Customer, EventPayload, InvoiceSnapshot, LatestInvoice, PaymentBehavior, PaymentIntentInfo,
    PhaseSpec, Price, ProrationBehavior, ProviderEvent, Schedule, Subscription, SubscriptionItem,
    SubscriptionItemSpec,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

type HmacSha256 = Hmac<Sha256>;

/// Gateway over the live Stripe API.
#[derive(Clone)]
pub struct StripeGateway {
    stripe: StripeClient,
}

impl StripeGateway {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    fn secret_key(&self) -> &str {
        &self.stripe.config().secret_key
    }

    /// POST a form to a raw Stripe endpoint and decode the schedule in
    /// the response.
    async fn post_schedule(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> BillingResult<Schedule> {
        let response = self
            .stripe
            .http()
            .post(format!("{STRIPE_API_BASE}{path}"))
            .bearer_auth(self.secret_key())
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::provider(format!("Failed to call Stripe API: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                path,
                status = %status,
                error_body = %body,
                "Stripe subscription_schedules API failed"
            );
            return Err(BillingError::provider(format!(
                "Stripe API error ({status}): {body}"
            )));
        }

        response
            .json::<Schedule>()
            .await
            .map_err(|e| BillingError::provider(format!("Failed to parse Stripe response: {e}")))
    }

    /// Parse the `t=...,v1=...` signature header and check the HMAC
    /// ourselves. Fallback for payloads whose API version async-stripe
    /// refuses to parse through `construct_event`.
    fn verify_signature_manually(&self, payload: &str, signature: &str) -> BillingResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;

        for part in signature.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
        let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

        // 5 minute tolerance, same as Stripe's SDKs
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;
        if (now - timestamp).abs() > 300 {
            tracing::warn!(timestamp, now, "Webhook timestamp outside tolerance");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let webhook_secret = &self.stripe.config().webhook_secret;
        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{timestamp}.{payload}");

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            return Err(BillingError::WebhookSignatureInvalid);
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderGateway for StripeGateway {
    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<Customer>> {
        let params = stripe::ListCustomers {
            email: Some(email),
            limit: Some(1),
            ..Default::default()
        };
        let found = stripe::Customer::list(self.stripe.inner(), &params).await?;
        Ok(found.data.into_iter().next().map(map_customer))
    }

    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        payment_method_id: &str,
    ) -> BillingResult<Customer> {
        let payment_method = payment_method_id
            .parse::<stripe::PaymentMethodId>()
            .map_err(|e| BillingError::provider(format!("Invalid payment method ID: {e}")))?;

        let params = stripe::CreateCustomer {
            email: Some(email),
            name: Some(name),
            payment_method: Some(payment_method),
            invoice_settings: Some(stripe::CustomerInvoiceSettings {
                default_payment_method: Some(payment_method_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let customer = stripe::Customer::create(self.stripe.inner(), params).await?;
        tracing::info!(customer_id = %customer.id, "Created Stripe customer");
        Ok(map_customer(customer))
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        items: &[SubscriptionItemSpec],
    ) -> BillingResult<Subscription> {
        let customer_id = customer_id
            .parse::<stripe::CustomerId>()
            .map_err(|e| BillingError::provider(format!("Invalid customer ID: {e}")))?;

        let mut params = stripe::CreateSubscription::new(customer_id);
        params.items = Some(
            items
                .iter()
                .map(|item| stripe::CreateSubscriptionItems {
                    price: Some(item.price.clone()),
                    quantity: Some(item.quantity),
                    ..Default::default()
                })
                .collect(),
        );
        params.expand = &["latest_invoice.payment_intent"];

        let subscription = stripe::Subscription::create(self.stripe.inner(), params).await?;
        Ok(map_subscription(subscription))
    }

    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>> {
        let sub_id = match id.parse::<stripe::SubscriptionId>() {
            Ok(sub_id) => sub_id,
            // An id Stripe could never have issued resolves to nothing.
            Err(_) => return Ok(None),
        };
        match stripe::Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await {
            Ok(subscription) => Ok(Some(map_subscription(subscription))),
            Err(stripe::StripeError::Stripe(ref e)) if e.http_status == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_subscription_expanded(&self, id: &str) -> BillingResult<Subscription> {
        let sub_id = id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| BillingError::provider(format!("Invalid subscription ID: {e}")))?;
        let subscription = stripe::Subscription::retrieve(
            self.stripe.inner(),
            &sub_id,
            &["latest_invoice.payment_intent"],
        )
        .await?;
        Ok(map_subscription(subscription))
    }

    async fn cancel_at_period_end(&self, id: &str) -> BillingResult<Subscription> {
        let sub_id = id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| BillingError::provider(format!("Invalid subscription ID: {e}")))?;

        let params = stripe::UpdateSubscription {
            cancel_at_period_end: Some(true),
            ..Default::default()
        };
        let subscription = stripe::Subscription::update(self.stripe.inner(), &sub_id, params).await?;
        tracing::info!(subscription_id = %subscription.id, "Flagged subscription for cancellation at period end");
        Ok(map_subscription(subscription))
    }

    async fn update_subscription_item(
        &self,
        subscription_id: &str,
        item_id: &str,
        new_price_id: &str,
        proration: ProrationBehavior,
        payment: PaymentBehavior,
    ) -> BillingResult<()> {
        let sub_id = subscription_id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| BillingError::provider(format!("Invalid subscription ID: {e}")))?;

        let params = stripe::UpdateSubscription {
            items: Some(vec![stripe::UpdateSubscriptionItems {
                id: Some(item_id.to_string()),
                price: Some(new_price_id.to_string()),
                ..Default::default()
            }]),
            proration_behavior: Some(proration_param(proration)),
            payment_behavior: Some(payment_param(payment)),
            ..Default::default()
        };

        stripe::Subscription::update(self.stripe.inner(), &sub_id, params).await?;
        Ok(())
    }

    async fn get_price(&self, id: &str) -> BillingResult<Price> {
        let price_id = id
            .parse::<stripe::PriceId>()
            .map_err(|_| BillingError::PriceNotFound(id.to_string()))?;
        match stripe::Price::retrieve(self.stripe.inner(), &price_id, &[]).await {
            Ok(price) => Ok(map_price(price)),
            Err(stripe::StripeError::Stripe(ref e)) if e.http_status == 404 => {
                Err(BillingError::PriceNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_schedules(&self, customer_id: &str) -> BillingResult<Vec<Schedule>> {
        let response = self
            .stripe
            .http()
            .get(format!("{STRIPE_API_BASE}/subscription_schedules"))
            .bearer_auth(self.secret_key())
            .query(&[("customer", customer_id)])
            .send()
            .await
            .map_err(|e| BillingError::provider(format!("Failed to call Stripe API: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                customer_id,
                status = %status,
                error_body = %body,
                "Stripe subscription_schedules list failed"
            );
            return Err(BillingError::provider(format!(
                "Stripe API error ({status}): {body}"
            )));
        }

        #[derive(Deserialize)]
        struct ScheduleList {
            data: Vec<Schedule>,
        }

        let list = response
            .json::<ScheduleList>()
            .await
            .map_err(|e| BillingError::provider(format!("Failed to parse Stripe response: {e}")))?;
        Ok(list.data)
    }

    async fn release_schedule(&self, id: &str) -> BillingResult<()> {
        let response = self
            .stripe
            .http()
            .post(format!("{STRIPE_API_BASE}/subscription_schedules/{id}/release"))
            .bearer_auth(self.secret_key())
            .send()
            .await
            .map_err(|e| BillingError::provider(format!("Failed to call Stripe API: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Stripe rejects releasing a schedule that is already
            // terminal; callers treat that as done.
            if status == reqwest::StatusCode::BAD_REQUEST
                && ["released", "canceled", "completed"]
                    .iter()
                    .any(|s| body.contains(s))
            {
                tracing::debug!(schedule_id = id, "Schedule already terminal, release skipped");
                return Ok(());
            }
            tracing::error!(
                schedule_id = id,
                status = %status,
                error_body = %body,
                "Stripe subscription_schedules release failed"
            );
            return Err(BillingError::provider(format!(
                "Stripe API error ({status}): {body}"
            )));
        }
        Ok(())
    }

    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &str,
    ) -> BillingResult<Schedule> {
        let form = vec![(
            "from_subscription".to_string(),
            subscription_id.to_string(),
        )];
        self.post_schedule("/subscription_schedules", &form).await
    }

    async fn update_schedule_phases(
        &self,
        schedule_id: &str,
        phases: &[PhaseSpec],
    ) -> BillingResult<Schedule> {
        let mut form: Vec<(String, String)> = Vec::new();
        for (i, phase) in phases.iter().enumerate() {
            for (j, item) in phase.items.iter().enumerate() {
                form.push((format!("phases[{i}][items][{j}][price]"), item.price.clone()));
                form.push((
                    format!("phases[{i}][items][{j}][quantity]"),
                    item.quantity.to_string(),
                ));
            }
            if let Some(start_date) = phase.start_date {
                form.push((format!("phases[{i}][start_date]"), start_date.to_string()));
            }
            if let Some(end_date) = phase.end_date {
                form.push((format!("phases[{i}][end_date]"), end_date.to_string()));
            }
            if let Some(iterations) = phase.iterations {
                form.push((format!("phases[{i}][iterations]"), iterations.to_string()));
            }
            form.push((
                format!("phases[{i}][proration_behavior]"),
                phase.proration_behavior.as_str().to_string(),
            ));
        }

        self.post_schedule(&format!("/subscription_schedules/{schedule_id}"), &form)
            .await
    }

    fn decode_webhook_event(&self, payload: &str, signature: &str) -> BillingResult<ProviderEvent> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(map_event(event)),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        // Manual verification covers API versions the bindings reject.
        self.verify_signature_manually(payload, signature)?;

        let event: stripe::Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;
        Ok(map_event(event))
    }
}

fn proration_param(proration: ProrationBehavior) -> SubscriptionProrationBehavior {
    match proration {
        ProrationBehavior::AlwaysInvoice => SubscriptionProrationBehavior::AlwaysInvoice,
        ProrationBehavior::CreateProrations => SubscriptionProrationBehavior::CreateProrations,
        ProrationBehavior::None => SubscriptionProrationBehavior::None,
    }
}

fn payment_param(payment: PaymentBehavior) -> SubscriptionPaymentBehavior {
    match payment {
        PaymentBehavior::AllowIncomplete => SubscriptionPaymentBehavior::AllowIncomplete,
        PaymentBehavior::DefaultIncomplete => SubscriptionPaymentBehavior::DefaultIncomplete,
        PaymentBehavior::ErrorIfIncomplete => SubscriptionPaymentBehavior::ErrorIfIncomplete,
        PaymentBehavior::PendingIfIncomplete => SubscriptionPaymentBehavior::PendingIfIncomplete,
    }
}

fn map_customer(customer: stripe::Customer) -> Customer {
    Customer {
        id: customer.id.to_string(),
        email: customer.email,
        name: customer.name,
    }
}

fn map_price(price: stripe::Price) -> Price {
    Price {
        id: price.id.to_string(),
        unit_amount: price.unit_amount,
        currency: price
            .currency
            .map(|c| c.to_string())
            .unwrap_or_default(),
    }
}

fn map_subscription(subscription: stripe::Subscription) -> Subscription {
    let items = subscription
        .items
        .data
        .iter()
        .map(|item| SubscriptionItem {
            id: item.id.to_string(),
            price_id: item
                .price
                .as_ref()
                .map(|p| p.id.to_string())
                .unwrap_or_default(),
            quantity: item.quantity.unwrap_or(1),
        })
        .collect();

    let latest_invoice = subscription.latest_invoice.map(|invoice| match invoice {
        Expandable::Object(invoice) => map_latest_invoice(*invoice),
        Expandable::Id(id) => LatestInvoice {
            id: id.to_string(),
            status: None,
            payment_intent: None,
        },
    });

    Subscription {
        id: subscription.id.to_string(),
        customer_id: subscription.customer.id().to_string(),
        status: subscription.status.to_string(),
        items,
        start_date: subscription.start_date,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
        latest_invoice,
    }
}

fn map_latest_invoice(invoice: stripe::Invoice) -> LatestInvoice {
    let payment_intent = invoice.payment_intent.map(|pi| match pi {
        Expandable::Object(pi) => PaymentIntentInfo {
            id: pi.id.to_string(),
            status: Some(pi.status.to_string()),
            client_secret: pi.client_secret,
        },
        Expandable::Id(id) => PaymentIntentInfo {
            id: id.to_string(),
            status: None,
            client_secret: None,
        },
    });

    LatestInvoice {
        id: invoice.id.to_string(),
        status: invoice.status.map(|s| s.to_string()),
        payment_intent,
    }
}

fn map_invoice(invoice: stripe::Invoice) -> InvoiceSnapshot {
    InvoiceSnapshot {
        id: invoice.id.to_string(),
        customer_id: invoice.customer.as_ref().map(|c| c.id().to_string()),
        amount_paid: invoice.amount_paid,
        status: invoice.status.map(|s| s.to_string()),
        payment_intent_id: invoice.payment_intent.as_ref().map(|pi| pi.id().to_string()),
        subscription_id: invoice.subscription.as_ref().map(|s| s.id().to_string()),
    }
}

fn map_event(event: stripe::Event) -> ProviderEvent {
    let payload = match event.data.object {
        EventObject::Subscription(subscription) => {
            EventPayload::Subscription(map_subscription(subscription))
        }
        EventObject::Invoice(invoice) => EventPayload::Invoice(map_invoice(invoice)),
        _ => EventPayload::Other,
    };
    ProviderEvent {
        id: event.id.to_string(),
        event_type: event.type_.to_string(),
        payload,
    }
}
