//! Domain model for the billing core
//!
//! These types mirror the slice of the Stripe objects this service
//! actually consumes. The orchestrator, reconciler and normalizer work
//! exclusively against them, so test doubles never need provider SDK
//! values and the gateway remains swappable.

use serde::{Deserialize, Serialize};

/// A billing customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A recurring subscription with its current line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub items: Vec<SubscriptionItem>,
    pub start_date: i64,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_invoice: Option<LatestInvoice>,
}

/// One line item on a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price_id: String,
    pub quantity: u64,
}

/// The subscription's latest invoice, expanded on creation and upgrade
/// so the caller can drive payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestInvoice {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntentInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// A price; read-only to this system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
}

/// Line item for a new subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionItemSpec {
    pub price: String,
    pub quantity: u64,
}

/// A plan of future subscription states, as returned by Stripe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    #[serde(rename = "customer")]
    pub customer_id: String,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub phases: Vec<SchedulePhase>,
}

/// Schedule lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    NotStarted,
    Active,
    Completed,
    Released,
    Canceled,
}

impl ScheduleStatus {
    /// Whether the schedule still governs future billing and must be
    /// released before a new one may exist for the customer.
    pub fn is_pending(self) -> bool {
        matches!(self, ScheduleStatus::Active | ScheduleStatus::NotStarted)
    }
}

/// One phase of a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePhase {
    #[serde(default)]
    pub items: Vec<PhaseItem>,
    pub start_date: i64,
    pub end_date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseItem {
    pub price: PriceRef,
    pub quantity: Option<u64>,
}

/// Phase item prices arrive either as a bare id or as an embedded price
/// object, depending on expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceRef {
    Id(String),
    Object { id: String },
}

impl PriceRef {
    pub fn id(&self) -> &str {
        match self {
            PriceRef::Id(id) => id,
            PriceRef::Object { id } => id,
        }
    }
}

/// Outgoing description of a schedule phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub items: Vec<PhaseItemSpec>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub iterations: Option<u32>,
    pub proration_behavior: ProrationBehavior,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseItemSpec {
    pub price: String,
    pub quantity: u64,
}

/// Proration behavior for subscription and phase updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProrationBehavior {
    AlwaysInvoice,
    CreateProrations,
    None,
}

impl ProrationBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            ProrationBehavior::AlwaysInvoice => "always_invoice",
            ProrationBehavior::CreateProrations => "create_prorations",
            ProrationBehavior::None => "none",
        }
    }
}

/// Payment behavior for subscription updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentBehavior {
    AllowIncomplete,
    DefaultIncomplete,
    ErrorIfIncomplete,
    PendingIfIncomplete,
}

/// A verified webhook event, reduced to the shapes this service reads.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub id: String,
    pub event_type: String,
    pub payload: EventPayload,
}

/// The object embedded in a webhook event at the time it fired.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Subscription(Subscription),
    Invoice(InvoiceSnapshot),
    Other,
}

/// Invoice fields surfaced by payment webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: String,
    pub customer_id: Option<String>,
    pub amount_paid: Option<i64>,
    pub status: Option<String>,
    pub payment_intent_id: Option<String>,
    pub subscription_id: Option<String>,
}
