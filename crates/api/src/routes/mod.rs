//! API routes

pub mod health;
pub mod payment;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_api_key, state::AppState};

/// Create all API routes
///
/// Everything under `/payment` requires the API key except the webhook,
/// which authenticates by signature over the raw body instead.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(payment::index))
        .route("/subscribe", post(payment::subscribe))
        .route("/cancelSubscription", post(payment::cancel_subscription))
        .route("/updateSubscription", post(payment::update_subscription))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let webhook = Router::new().route("/handleWebhook", post(payment::handle_webhook));

    Router::new()
        .route("/health", get(health::health))
        .nest("/payment", protected.merge(webhook))
        .with_state(state)
}
