//! HTTP surface: router, shared state, and request identity extraction.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod wishlist;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::account::{Mailer, VerificationCodes};
use crate::domain::{Cart, Identity};
use crate::error::Error;
use crate::store::Store;

/// Set by the external auth layer for authenticated requests.
pub const USER_HEADER: &str = "x-user-id";
/// Anonymous session key; echoed back on cart responses when freshly minted.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub codes: Arc<VerificationCodes>,
    pub mailer: Arc<dyn Mailer>,
    pub nats: Option<async_nats::Client>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/products", get(catalog::list_products))
        .route("/api/v1/products/:id", get(catalog::get_product))
        .route("/api/v1/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route(
            "/api/v1/cart/items/:id",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/api/v1/wishlist", get(wishlist::list).post(wishlist::toggle))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::checkout))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/auth/register", post(account::register))
        .route("/api/v1/auth/verify", post(account::verify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront-backend"}))
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(raw) = parts.headers.get(USER_HEADER) {
            let id = raw
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| Error::Validation("invalid x-user-id header".into()))?;
            return Ok(Identity::User(id));
        }
        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok(Identity::Anonymous(session))
    }
}

/// Attach the cart's session key to the response so an anonymous client can
/// keep its cart across requests.
pub(crate) fn with_session(cart: &Cart, resp: impl IntoResponse) -> Response {
    let mut resp = resp.into_response();
    if let Some(key) = cart.session_id.as_deref() {
        if let Ok(value) = HeaderValue::from_str(key) {
            resp.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    resp
}
