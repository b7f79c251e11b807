//! Webhook event normalization
//!
//! Pure mapping from verified provider events into the stable records
//! downstream consumers see. Unrecognized event types produce nothing.

use serde::Serialize;

use crate::types::{EventPayload, InvoiceSnapshot, ProviderEvent, Subscription};

/// One normalized webhook record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub event_type: String,
    pub data: EventData,
}

/// The two payload shapes this service recognizes.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Subscription(SubscriptionEventData),
    Invoice(InvoiceEventData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventData {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: String,
    pub items: Vec<ItemSummary>,
    pub start_date: i64,
    pub current_period_end: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub price_id: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEventData {
    pub invoice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

const SUBSCRIPTION_EVENTS: &[&str] = &[
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

const INVOICE_EVENTS: &[&str] = &["invoice.payment_succeeded", "invoice.payment_failed"];

/// Map a verified event into zero or one normalized records.
pub fn normalize(event: &ProviderEvent) -> Vec<ProcessedEvent> {
    let data = match (&event.payload, event.event_type.as_str()) {
        (EventPayload::Subscription(subscription), event_type)
            if SUBSCRIPTION_EVENTS.contains(&event_type) =>
        {
            EventData::Subscription(subscription_data(subscription))
        }
        (EventPayload::Invoice(invoice), event_type) if INVOICE_EVENTS.contains(&event_type) => {
            EventData::Invoice(invoice_data(invoice))
        }
        _ => {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Ignoring unhandled webhook event type"
            );
            return Vec::new();
        }
    };

    vec![ProcessedEvent {
        event_type: event.event_type.clone(),
        data,
    }]
}

fn subscription_data(subscription: &Subscription) -> SubscriptionEventData {
    SubscriptionEventData {
        subscription_id: subscription.id.clone(),
        customer_id: subscription.customer_id.clone(),
        status: subscription.status.clone(),
        items: subscription
            .items
            .iter()
            .map(|item| ItemSummary {
                price_id: item.price_id.clone(),
                quantity: item.quantity,
            })
            .collect(),
        start_date: subscription.start_date,
        current_period_end: subscription.current_period_end,
    }
}

fn invoice_data(invoice: &InvoiceSnapshot) -> InvoiceEventData {
    InvoiceEventData {
        invoice_id: invoice.id.clone(),
        customer_id: invoice.customer_id.clone(),
        amount_paid: invoice.amount_paid,
        status: invoice.status.clone(),
        payment_intent_id: invoice.payment_intent_id.clone(),
        subscription_id: invoice.subscription_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionItem;

    fn subscription_event(event_type: &str) -> ProviderEvent {
        ProviderEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            payload: EventPayload::Subscription(Subscription {
                id: "sub_1".to_string(),
                customer_id: "cus_123".to_string(),
                status: "active".to_string(),
                items: vec![
                    SubscriptionItem {
                        id: "si_1".to_string(),
                        price_id: "price_basic".to_string(),
                        quantity: 1,
                    },
                    SubscriptionItem {
                        id: "si_2".to_string(),
                        price_id: "price_addon".to_string(),
                        quantity: 3,
                    },
                ],
                start_date: 1_700_000_000,
                current_period_end: 1_702_592_000,
                cancel_at_period_end: false,
                latest_invoice: None,
            }),
        }
    }

    #[test]
    fn subscription_update_keeps_all_items() {
        let records = normalize(&subscription_event("customer.subscription.updated"));
        assert_eq!(records.len(), 1);

        let EventData::Subscription(data) = &records[0].data else {
            panic!("expected a subscription record");
        };
        assert_eq!(data.items.len(), 2);
        assert_eq!(data.items[1].price_id, "price_addon");
        assert_eq!(data.items[1].quantity, 3);
    }

    #[test]
    fn items_expose_only_price_and_quantity() {
        let records = normalize(&subscription_event("customer.subscription.created"));
        let value = serde_json::to_value(&records[0]).unwrap();

        let item = &value["data"]["items"][0];
        let keys: Vec<&String> = item.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["priceId", "quantity"]);
        assert!(value["data"]["items"][0].get("id").is_none());
    }

    #[test]
    fn record_fields_are_camel_case() {
        let records = normalize(&subscription_event("customer.subscription.deleted"));
        let value = serde_json::to_value(&records[0]).unwrap();

        assert_eq!(value["eventType"], "customer.subscription.deleted");
        assert_eq!(value["data"]["subscriptionId"], "sub_1");
        assert_eq!(value["data"]["customerId"], "cus_123");
        assert_eq!(value["data"]["currentPeriodEnd"], 1_702_592_000);
    }

    #[test]
    fn payment_succeeded_maps_invoice_fields() {
        let event = ProviderEvent {
            id: "evt_2".to_string(),
            event_type: "invoice.payment_succeeded".to_string(),
            payload: EventPayload::Invoice(InvoiceSnapshot {
                id: "in_1".to_string(),
                customer_id: Some("cus_123".to_string()),
                amount_paid: Some(2500),
                status: Some("paid".to_string()),
                payment_intent_id: Some("pi_1".to_string()),
                subscription_id: Some("sub_1".to_string()),
            }),
        };

        let records = normalize(&event);
        let value = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(value["data"]["invoiceId"], "in_1");
        assert_eq!(value["data"]["amountPaid"], 2500);
        assert_eq!(value["data"]["paymentIntentId"], "pi_1");
    }

    #[test]
    fn unrecognized_event_type_produces_nothing() {
        let event = ProviderEvent {
            id: "evt_3".to_string(),
            event_type: "charge.refunded".to_string(),
            payload: EventPayload::Other,
        };
        assert!(normalize(&event).is_empty());
    }

    #[test]
    fn mismatched_payload_is_ignored() {
        // An invoice event carrying no invoice object is dropped rather
        // than panicking.
        let event = ProviderEvent {
            id: "evt_4".to_string(),
            event_type: "invoice.payment_failed".to_string(),
            payload: EventPayload::Other,
        };
        assert!(normalize(&event).is_empty());
    }
}
