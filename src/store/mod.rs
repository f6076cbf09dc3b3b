//! Storage backends.
//!
//! One trait, two implementations: [`MemoryStore`] for tests and development,
//! [`PgStore`] for production. Backends own the consistency-critical paths
//! (cart find-or-create, the line-item upsert, the checkout transaction) so
//! each can use its native form of atomicity: a single write lock, or a
//! database transaction with row locks.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Cart, CartItem, ContactInfo, Identity, NewUser, Order, OrderItem, Product, User, WishlistItem,
};
use crate::error::Result;

/// Outcome of a wishlist toggle: the item was added, or it was already there
/// and has been removed.
#[derive(Debug, Clone)]
pub enum WishlistToggle {
    Added(WishlistItem),
    Removed,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- catalog (read-only here; administration is external) ---

    /// Active products, newest first, with the total count for pagination.
    async fn list_products(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, i64)>;

    /// A single active product.
    async fn product(&self, id: Uuid) -> Result<Product>;

    // --- users ---

    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> Result<()>;
    async fn mark_verified(&self, email: &str) -> Result<User>;

    // --- cart ---

    /// Find-or-create the single cart for this identity. For an anonymous
    /// identity without a session key, a fresh key is generated and stored on
    /// the new cart. Concurrent first accesses settle on one row: the insert
    /// loser re-reads the winner's cart.
    async fn resolve_cart(&self, identity: &Identity) -> Result<Cart>;

    /// Cart lines in insertion order, each with its product.
    async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<(CartItem, Product)>>;

    /// Add a product to the cart, merging with an existing line for the same
    /// product. The stock check is increment-aware: it validates the merged
    /// quantity, not just the requested one. Stock itself is not touched.
    async fn add_item(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartItem>;

    /// Set a line's quantity to an absolute value (>= 1), re-checking stock
    /// against the new value.
    async fn set_item_quantity(&self, cart_id: Uuid, item_id: Uuid, quantity: i32)
        -> Result<CartItem>;

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()>;
    async fn clear_cart(&self, cart_id: Uuid) -> Result<()>;

    // --- wishlist ---

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<(WishlistItem, Product)>>;
    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistToggle>;

    // --- checkout and orders ---

    /// Atomically convert the user's cart into an order: fresh-read each
    /// product, enforce stock, snapshot name/price into order lines,
    /// decrement stock, total up, empty the cart. All-or-nothing; on any
    /// failure no order, stock change, or cart change survives.
    async fn checkout(&self, user_id: Uuid, contact: ContactInfo)
        -> Result<(Order, Vec<OrderItem>)>;

    /// The user's orders, newest first, each with its lines.
    async fn orders(&self, user_id: Uuid) -> Result<Vec<(Order, Vec<OrderItem>)>>;

    /// One order, scoped to its owner.
    async fn order(&self, user_id: Uuid, order_id: Uuid) -> Result<(Order, Vec<OrderItem>)>;
}
