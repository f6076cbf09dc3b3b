//! Carts and their line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Product;

/// Mutable pre-order collection tied to one identity. Exactly one of
/// `user_id` / `session_id` is set. The row is created lazily on first access
/// and survives checkout; only its items are cleared.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One product line in a cart. At most one row per `(cart, product)`; repeat
/// adds merge into the existing row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Cart line joined with its product, as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub subtotal: Decimal,
}

impl CartItemView {
    pub fn new(item: CartItem, product: Product) -> Self {
        let subtotal = product.current_price() * Decimal::from(item.quantity);
        Self {
            id: item.id,
            product,
            quantity: item.quantity,
            subtotal,
        }
    }
}

/// Whole-cart read model with recomputed totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub items: Vec<CartItemView>,
    pub total_price: Decimal,
    pub total_items: i32,
}

impl CartView {
    pub fn assemble(cart: &Cart, items: Vec<(CartItem, Product)>) -> Self {
        let items: Vec<CartItemView> = items
            .into_iter()
            .map(|(item, product)| CartItemView::new(item, product))
            .collect();
        let total_price = items.iter().map(|i| i.subtotal).sum();
        let total_items = items.iter().map(|i| i.quantity).sum();
        Self {
            id: cart.id,
            session_id: cart.session_id.clone(),
            items,
            total_price,
            total_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: Decimal, discount: Option<Decimal>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: name.to_lowercase(),
            description: None,
            price,
            discount_price: discount,
            stock: 100,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(cart_id: Uuid, product: &Product, quantity: i32) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id,
            product_id: product.id,
            quantity,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn view_totals_use_current_price() {
        let cart = Cart {
            id: Uuid::new_v4(),
            user_id: None,
            session_id: Some("s1".into()),
            created_at: Utc::now(),
        };
        let full = product("Widget", Decimal::new(1000, 2), None);
        let discounted = product("Gadget", Decimal::new(2000, 2), Some(Decimal::new(1500, 2)));
        let view = CartView::assemble(
            &cart,
            vec![
                (line(cart.id, &full, 2), full.clone()),
                (line(cart.id, &discounted, 1), discounted.clone()),
            ],
        );
        assert_eq!(view.items.len(), 2);
        // 2 * 10.00 + 1 * 15.00
        assert_eq!(view.total_price, Decimal::new(3500, 2));
        assert_eq!(view.total_items, 3);
        assert_eq!(view.items[0].subtotal, Decimal::new(2000, 2));
        assert_eq!(view.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn empty_cart_view_is_zeroed() {
        let cart = Cart {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            session_id: None,
            created_at: Utc::now(),
        };
        let view = CartView::assemble(&cart, vec![]);
        assert_eq!(view.total_price, Decimal::ZERO);
        assert_eq!(view.total_items, 0);
    }
}
