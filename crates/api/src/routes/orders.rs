//! Checkout and order read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use domain::{Cart, CartEntry, PlaceOrder};
use serde::{Deserialize, Serialize};
use store::{OrderWithLines, PaymentMethod, Store};

use crate::AppState;
use crate::auth::{authenticate, require_customer};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub payment_method: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderPlacedResponse {
    pub order_id: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub staff_id: String,
    pub payment_method: String,
    pub payment_status: String,
    pub total_cents: i64,
    pub created_at: String,
    pub lines: Vec<OrderLineResponse>,
}

impl From<OrderWithLines> for OrderResponse {
    fn from(order: OrderWithLines) -> Self {
        Self {
            id: order.header.id.to_string(),
            customer_id: order.header.customer_id.to_string(),
            staff_id: order.header.staff_id.to_string(),
            payment_method: order.header.payment_method.as_str().to_string(),
            payment_status: order.header.payment_status.as_str().to_string(),
            total_cents: order.header.total.cents(),
            created_at: order.header.created_at.to_rfc3339(),
            lines: order
                .lines
                .into_iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                })
                .collect(),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order for the authenticated customer.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;
    let customer_id = require_customer(&identity)?;

    let payment_method = PaymentMethod::parse(&req.payment_method).ok_or_else(|| {
        ApiError::BadRequest(format!("unknown payment method: {}", req.payment_method))
    })?;

    let mut entries = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let uuid = uuid::Uuid::parse_str(&item.product_id)
            .map_err(|e| ApiError::BadRequest(format!("invalid product id: {e}")))?;
        entries.push(CartEntry::new(uuid.into(), item.quantity));
    }
    let cart = Cart::new(entries)?;

    let order_id = state
        .checkout
        .place_order(PlaceOrder {
            customer_id,
            staff_id: state.default_staff,
            payment_method,
            cart,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderPlacedResponse {
            order_id: order_id.to_string(),
        }),
    ))
}

/// GET /orders/{id} — load an order; owner or staff only.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let identity = authenticate(&headers, state.directory.as_ref()).await?;

    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    let order_id = OrderId::from_uuid(uuid);

    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;

    if !identity.is_staff() && identity.customer_id() != Some(order.header.customer_id) {
        return Err(ApiError::Forbidden(
            "orders are only visible to their owner".to_string(),
        ));
    }

    Ok(Json(order.into()))
}
