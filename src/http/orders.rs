//! Checkout and order history. Orders are read-only over HTTP once created;
//! later status transitions belong to fulfillment tooling, not this API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{ContactInfo, Identity, Order, OrderView};
use crate::error::Result;
use crate::http::AppState;

pub async fn checkout(
    State(state): State<AppState>,
    identity: Identity,
    Json(contact): Json<ContactInfo>,
) -> Result<impl IntoResponse> {
    let user_id = identity.user_id()?;
    // Reject malformed contact data before any transaction opens.
    contact.validate()?;
    let (order, items) = state.store.checkout(user_id, contact).await?;
    publish_order_created(&state, &order).await;
    Ok((StatusCode::CREATED, Json(OrderView::new(order, items))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<OrderView>>> {
    let user_id = identity.user_id()?;
    let orders = state
        .store
        .orders(user_id)
        .await?
        .into_iter()
        .map(|(order, items)| OrderView::new(order, items))
        .collect();
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    identity: Identity,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>> {
    let user_id = identity.user_id()?;
    let (order, items) = state.store.order(user_id, order_id).await?;
    Ok(Json(OrderView::new(order, items)))
}

/// Best-effort event for downstream consumers; a committed order is never
/// failed over a publish problem.
async fn publish_order_created(state: &AppState, order: &Order) {
    let Some(nats) = &state.nats else { return };
    let payload = serde_json::json!({
        "order_id": order.id,
        "user_id": order.user_id,
        "total_price": order.total_price,
    });
    match serde_json::to_vec(&payload) {
        Ok(bytes) => {
            if let Err(e) = nats.publish("orders.created".to_string(), bytes.into()).await {
                tracing::warn!(error = %e, order_id = %order.id, "orders.created publish failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "orders.created payload encoding failed"),
    }
}
