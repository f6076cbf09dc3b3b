//! Cart endpoints. Every handler first resolves the requester's single cart,
//! creating it on first access.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{CartItemView, CartView, Identity};
use crate::error::Result;
use crate::http::{with_session, AppState};

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

pub async fn get_cart(State(state): State<AppState>, identity: Identity) -> Result<Response> {
    let cart = state.store.resolve_cart(&identity).await?;
    let items = state.store.cart_items(cart.id).await?;
    let view = CartView::assemble(&cart, items);
    Ok(with_session(&cart, Json(view)))
}

pub async fn add_item(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Response> {
    let cart = state.store.resolve_cart(&identity).await?;
    let item = state
        .store
        .add_item(cart.id, req.product_id, req.quantity.unwrap_or(1))
        .await?;
    let product = state.store.product(item.product_id).await?;
    let view = CartItemView::new(item, product);
    Ok(with_session(&cart, (StatusCode::CREATED, Json(view))))
}

pub async fn update_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartItemView>> {
    let cart = state.store.resolve_cart(&identity).await?;
    let item = state
        .store
        .set_item_quantity(cart.id, item_id, req.quantity)
        .await?;
    let product = state.store.product(item.product_id).await?;
    Ok(Json(CartItemView::new(item, product)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode> {
    let cart = state.store.resolve_cart(&identity).await?;
    state.store.remove_item(cart.id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(State(state): State<AppState>, identity: Identity) -> Result<StatusCode> {
    let cart = state.store.resolve_cart(&identity).await?;
    state.store.clear_cart(cart.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
