//! Wishlist endpoints. Registered users only; posting an already-saved
//! product toggles it off rather than erroring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Identity, Product};
use crate::error::Result;
use crate::http::AppState;
use crate::store::WishlistToggle;

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct WishlistEntry {
    pub id: Uuid,
    pub product: Product,
    pub added_at: DateTime<Utc>,
}

pub async fn list(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<WishlistEntry>>> {
    let user_id = identity.user_id()?;
    let entries = state
        .store
        .wishlist(user_id)
        .await?
        .into_iter()
        .map(|(item, product)| WishlistEntry {
            id: item.id,
            product,
            added_at: item.added_at,
        })
        .collect();
    Ok(Json(entries))
}

pub async fn toggle(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<ToggleRequest>,
) -> Result<Response> {
    let user_id = identity.user_id()?;
    match state.store.toggle_wishlist(user_id, req.product_id).await? {
        WishlistToggle::Added(item) => {
            let product = state.store.product(item.product_id).await?;
            let body = serde_json::json!({
                "id": item.id,
                "product": product,
                "added_at": item.added_at,
                "is_in_wishlist": true,
            });
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        WishlistToggle::Removed => {
            let body = serde_json::json!({
                "message": "removed from wishlist",
                "is_in_wishlist": false,
            });
            Ok(Json(body).into_response())
        }
    }
}
