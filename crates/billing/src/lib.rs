//! Stripe subscription billing core
//!
//! Customer and subscription lifecycle against Stripe, with plan
//! changes reconciled into at most one pending schedule per customer:
//! upgrades apply immediately with prorated invoicing, downgrades wait
//! for the next renewal behind a two-phase schedule. Webhook deliveries
//! are verified and normalized into stable records.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod error;
pub mod gateway;
pub mod pricing;
pub mod schedule;
pub mod stripe_gateway;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod webhook;

pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use gateway::ProviderGateway;
pub use pricing::{PriceChange, PriceComparator};
pub use schedule::ScheduleReconciler;
pub use stripe_gateway::StripeGateway;
pub use subscription::{PlanChange, SubscriptionService};
