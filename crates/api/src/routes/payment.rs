//! Payment routes: subscribe, cancel, plan change and webhook intake

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use billflow_billing::types::Customer;
use billflow_billing::webhook::normalize;
use billflow_billing::{BillingError, ProviderGateway as _};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub user: Option<UserInfo>,
    /// Pre-existing customer id; skips lookup/creation when present
    pub customer: Option<String>,
    pub currency: Option<String>,
    pub items: Option<Vec<ItemRequest>>,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub subscription_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub subscription_id: Option<String>,
    pub new_price_id: Option<String>,
}

pub async fn index() -> &'static str {
    "API de pagamento utilizando o stripe!"
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<SubscribeRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(user), Some(_currency), Some(items), Some(payment_method_id)) =
        (body.user, body.currency, body.items, body.payment_method_id)
    else {
        return Err(ApiError::Validation(
            "User, currency, items e paymentMethodId são obrigatórios.".to_string(),
        ));
    };
    if items.is_empty() {
        return Err(ApiError::Validation(
            "User, currency, items e paymentMethodId são obrigatórios.".to_string(),
        ));
    }

    let customer = match body.customer {
        Some(id) => Customer {
            id,
            email: None,
            name: None,
        },
        None => state
            .subscriptions
            .find_or_create_customer(&user.email, &user.name, &payment_method_id)
            .await
            .map_err(|e| {
                ApiError::provider("Erro ao criar subscrição. Tente novamente mais tarde.", e)
            })?,
    };

    let price_ids: Vec<String> = items.into_iter().map(|item| item.price).collect();
    let subscription = state
        .subscriptions
        .create_subscription(&customer.id, &price_ids)
        .await
        .map_err(|e| {
            ApiError::provider("Erro ao criar subscrição. Tente novamente mais tarde.", e)
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Subscrição criada com sucesso!",
            "customer": customer,
            "subscription": subscription,
        })),
    ))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(subscription_id) = body.subscription_id else {
        return Err(ApiError::Validation(
            "O ID da assinatura é obrigatório.".to_string(),
        ));
    };

    let cancellation = state
        .subscriptions
        .cancel_subscription(&subscription_id)
        .await
        .map_err(|e| {
            ApiError::provider("Erro ao cancelar assinatura. Tente novamente mais tarde.", e)
        })?;

    Ok(Json(json!({
        "message": "Assinatura cancelada com sucesso!",
        "cancellationResult": cancellation,
    })))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Json(body): Json<UpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(subscription_id), Some(new_price_id)) = (body.subscription_id, body.new_price_id)
    else {
        return Err(ApiError::Validation(
            "O ID da assinatura e o novo priceId são obrigatórios.".to_string(),
        ));
    };

    let updated = state
        .subscriptions
        .change_plan(&subscription_id, &new_price_id)
        .await
        .map_err(|e| match e {
            BillingError::SubscriptionNotFound(_) => {
                ApiError::NotFound("Assinatura não encontrada.".to_string())
            }
            other => ApiError::provider(
                "Erro ao atualizar assinatura. Tente novamente mais tarde.",
                other,
            ),
        })?;

    Ok(Json(json!({
        "message": "Assinatura atualizada com sucesso!",
        "updatedSubscription": updated,
    })))
}

/// Webhook intake. Takes the raw body so the signature can be verified
/// over the exact bytes Stripe signed; exempt from the API-key check.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<impl IntoResponse> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::Webhook("Webhook Error: cabeçalho stripe-signature ausente".to_string())
        })?;

    let event = state
        .gateway
        .decode_webhook_event(&body, signature)
        .map_err(|e| ApiError::Webhook(format!("Webhook Error: {e}")))?;

    let processed = normalize(&event);
    Ok(Json(json!({ "processedEvents": processed })))
}
