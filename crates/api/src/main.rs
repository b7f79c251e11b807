//! Billflow API Server
//!
//! Subscription billing endpoints backed by Stripe.

use std::sync::Arc;

use axum::http::Method;
use billflow_api::{routes::create_router, AppState, Config};
use billflow_billing::{ProviderGateway, StripeClient, StripeGateway};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,billflow_api=debug,billflow_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Billflow API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let stripe = StripeClient::from_env()?;
    let gateway: Arc<dyn ProviderGateway> = Arc::new(StripeGateway::new(stripe));
    let state = AppState::new(config.clone(), gateway);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", config.bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}
