//! In-memory implementation of [`Store`] for testing and development.
//!
//! The write lock doubles as the transaction boundary: every mutating
//! operation runs start-to-finish under it, and `checkout` validates all cart
//! lines against fresh product state before applying any mutation, so a
//! failure leaves the state untouched and concurrent checkouts are
//! serialized.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::order::STATUS_NEW;
use crate::domain::{
    Cart, CartItem, ContactInfo, Identity, NewUser, Order, OrderItem, Product, User, WishlistItem,
};
use crate::error::{Error, Result};
use crate::store::{Store, WishlistToggle};

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    users: HashMap<Uuid, User>,
    carts: Vec<Cart>,
    cart_items: Vec<CartItem>,
    wishlist: Vec<WishlistItem>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a product row. Catalog administration is out of scope for the
    /// service itself, so seeding goes through this instead of the trait.
    pub fn insert_product(&self, product: Product) {
        if let Ok(mut s) = self.state.write() {
            s.products.insert(product.id, product);
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Storage("state lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Storage("state lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_products(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, i64)> {
        let s = self.read()?;
        let mut active: Vec<Product> = s.products.values().filter(|p| p.is_active).cloned().collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = active.len() as i64;
        let offset = ((page.max(1) - 1) * per_page) as usize;
        let items = active.into_iter().skip(offset).take(per_page as usize).collect();
        Ok((items, total))
    }

    async fn product(&self, id: Uuid) -> Result<Product> {
        let s = self.read()?;
        s.products
            .get(&id)
            .filter(|p| p.is_active)
            .cloned()
            .ok_or(Error::NotFound("product"))
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut s = self.write()?;
        if s.users.values().any(|u| u.email == user.email) {
            return Err(Error::Validation("email already registered".into()));
        }
        let row = User {
            id: Uuid::now_v7(),
            email: user.email,
            phone_number: user.phone_number,
            password_hash: user.password_hash,
            is_verified: false,
            created_at: Utc::now(),
        };
        s.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let s = self.read()?;
        Ok(s.users.values().find(|u| u.email == email).cloned())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut s = self.write()?;
        s.users.remove(&id);
        let cart_ids: Vec<Uuid> = s
            .carts
            .iter()
            .filter(|c| c.user_id == Some(id))
            .map(|c| c.id)
            .collect();
        s.carts.retain(|c| c.user_id != Some(id));
        s.cart_items.retain(|i| !cart_ids.contains(&i.cart_id));
        s.wishlist.retain(|w| w.user_id != id);
        Ok(())
    }

    async fn mark_verified(&self, email: &str) -> Result<User> {
        let mut s = self.write()?;
        let user = s
            .users
            .values_mut()
            .find(|u| u.email == email)
            .ok_or(Error::NotFound("user"))?;
        user.is_verified = true;
        Ok(user.clone())
    }

    async fn resolve_cart(&self, identity: &Identity) -> Result<Cart> {
        let mut s = self.write()?;
        let existing = match identity {
            Identity::User(uid) => s.carts.iter().find(|c| c.user_id == Some(*uid)),
            Identity::Anonymous(Some(key)) => {
                s.carts.iter().find(|c| c.session_id.as_deref() == Some(key))
            }
            Identity::Anonymous(None) => None,
        };
        if let Some(cart) = existing {
            return Ok(cart.clone());
        }
        let (user_id, session_id) = match identity {
            Identity::User(uid) => (Some(*uid), None),
            Identity::Anonymous(Some(key)) => (None, Some(key.clone())),
            // First cart access without a session: mint the session key now.
            Identity::Anonymous(None) => (None, Some(Uuid::new_v4().to_string())),
        };
        let cart = Cart {
            id: Uuid::now_v7(),
            user_id,
            session_id,
            created_at: Utc::now(),
        };
        s.carts.push(cart.clone());
        Ok(cart)
    }

    async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<(CartItem, Product)>> {
        let s = self.read()?;
        s.cart_items
            .iter()
            .filter(|i| i.cart_id == cart_id)
            .map(|i| {
                let product = s
                    .products
                    .get(&i.product_id)
                    .cloned()
                    .ok_or(Error::NotFound("product"))?;
                Ok((i.clone(), product))
            })
            .collect()
    }

    async fn add_item(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartItem> {
        if quantity < 1 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }
        let mut s = self.write()?;
        if !s.carts.iter().any(|c| c.id == cart_id) {
            return Err(Error::NotFound("cart"));
        }
        let product = s
            .products
            .get(&product_id)
            .filter(|p| p.is_active)
            .cloned()
            .ok_or(Error::NotFound("product"))?;
        let existing_qty = s
            .cart_items
            .iter()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
            .map_or(0, |i| i.quantity);
        // Merged quantity, not just the requested one.
        let effective = existing_qty + quantity;
        if product.stock < effective {
            return Err(Error::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }
        if let Some(item) = s
            .cart_items
            .iter_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
        {
            item.quantity = effective;
            return Ok(item.clone());
        }
        let item = CartItem {
            id: Uuid::now_v7(),
            cart_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        };
        s.cart_items.push(item.clone());
        Ok(item)
    }

    async fn set_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartItem> {
        if quantity < 1 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }
        let mut s = self.write()?;
        let product_id = s
            .cart_items
            .iter()
            .find(|i| i.cart_id == cart_id && i.id == item_id)
            .map(|i| i.product_id)
            .ok_or(Error::NotFound("cart item"))?;
        let product = s
            .products
            .get(&product_id)
            .cloned()
            .ok_or(Error::NotFound("product"))?;
        if product.stock < quantity {
            return Err(Error::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }
        let item = s
            .cart_items
            .iter_mut()
            .find(|i| i.cart_id == cart_id && i.id == item_id)
            .ok_or(Error::NotFound("cart item"))?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()> {
        let mut s = self.write()?;
        let before = s.cart_items.len();
        s.cart_items.retain(|i| !(i.cart_id == cart_id && i.id == item_id));
        if s.cart_items.len() == before {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<()> {
        let mut s = self.write()?;
        s.cart_items.retain(|i| i.cart_id != cart_id);
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<(WishlistItem, Product)>> {
        let s = self.read()?;
        s.wishlist
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| {
                let product = s
                    .products
                    .get(&w.product_id)
                    .cloned()
                    .ok_or(Error::NotFound("product"))?;
                Ok((w.clone(), product))
            })
            .collect()
    }

    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistToggle> {
        let mut s = self.write()?;
        if !s.products.get(&product_id).is_some_and(|p| p.is_active) {
            return Err(Error::NotFound("product"));
        }
        if let Some(pos) = s
            .wishlist
            .iter()
            .position(|w| w.user_id == user_id && w.product_id == product_id)
        {
            s.wishlist.remove(pos);
            return Ok(WishlistToggle::Removed);
        }
        let item = WishlistItem {
            id: Uuid::now_v7(),
            user_id,
            product_id,
            added_at: Utc::now(),
        };
        s.wishlist.push(item.clone());
        Ok(WishlistToggle::Added(item))
    }

    async fn checkout(
        &self,
        user_id: Uuid,
        contact: ContactInfo,
    ) -> Result<(Order, Vec<OrderItem>)> {
        let mut s = self.write()?;
        let user = s.users.get(&user_id).cloned().ok_or(Error::NotFound("user"))?;
        let cart = s
            .carts
            .iter()
            .find(|c| c.user_id == Some(user_id))
            .cloned()
            .ok_or(Error::EmptyCart)?;
        let lines: Vec<CartItem> = s
            .cart_items
            .iter()
            .filter(|i| i.cart_id == cart.id)
            .cloned()
            .collect();
        if lines.is_empty() {
            return Err(Error::EmptyCart);
        }

        let now = Utc::now();
        let order_id = Uuid::now_v7();

        // Validate every line against fresh product state before mutating
        // anything, so an insufficient line aborts with the state untouched.
        let mut items = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        for line in &lines {
            let product = s
                .products
                .get(&line.product_id)
                .ok_or(Error::NotFound("product"))?;
            if product.stock < line.quantity {
                return Err(Error::InsufficientStock {
                    product: product.name.clone(),
                    available: product.stock,
                });
            }
            let item = OrderItem {
                id: Uuid::now_v7(),
                order_id,
                product_id: Some(product.id),
                product_name: product.name.clone(),
                price: product.current_price(),
                quantity: line.quantity,
                created_at: now,
            };
            total += item.cost();
            items.push(item);
        }

        for line in &lines {
            if let Some(product) = s.products.get_mut(&line.product_id) {
                product.stock -= line.quantity;
                product.updated_at = now;
            }
        }
        let order = Order {
            id: order_id,
            user_id,
            status: STATUS_NEW.to_string(),
            first_name: contact.first_name,
            last_name: contact.last_name,
            phone: contact.phone,
            email: contact.email.unwrap_or(user.email),
            delivery_address: contact.delivery_address,
            total_price: total,
            is_paid: false,
            created_at: now,
            updated_at: now,
        };
        s.orders.push(order.clone());
        s.order_items.extend(items.iter().cloned());
        s.cart_items.retain(|i| i.cart_id != cart.id);
        Ok((order, items))
    }

    async fn orders(&self, user_id: Uuid) -> Result<Vec<(Order, Vec<OrderItem>)>> {
        let s = self.read()?;
        let mut orders: Vec<Order> =
            s.orders.iter().filter(|o| o.user_id == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders
            .into_iter()
            .map(|o| {
                let items = s
                    .order_items
                    .iter()
                    .filter(|i| i.order_id == o.id)
                    .cloned()
                    .collect();
                (o, items)
            })
            .collect())
    }

    async fn order(&self, user_id: Uuid, order_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
        let s = self.read()?;
        let order = s
            .orders
            .iter()
            .find(|o| o.id == order_id && o.user_id == user_id)
            .cloned()
            .ok_or(Error::NotFound("order"))?;
        let items = s
            .order_items
            .iter()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect();
        Ok((order, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, stock: i32, price: Decimal) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: name.to_lowercase().replace(' ', "-"),
            description: None,
            price,
            discount_price: None,
            stock,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn contact() -> ContactInfo {
        ContactInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: "+79991234567".into(),
            email: None,
            delivery_address: "1 Analytical Engine Way".into(),
        }
    }

    async fn verified_user(store: &MemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                email: email.into(),
                phone_number: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        store.mark_verified(email).await.unwrap()
    }

    #[tokio::test]
    async fn resolve_cart_is_stable_per_identity() {
        let store = MemoryStore::new();
        let user = verified_user(&store, "ada@example.com").await;
        let identity = Identity::User(user.id);
        let first = store.resolve_cart(&identity).await.unwrap();
        let second = store.resolve_cart(&identity).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.user_id, Some(user.id));
        assert!(first.session_id.is_none());
    }

    #[tokio::test]
    async fn anonymous_cart_mints_session_key_lazily() {
        let store = MemoryStore::new();
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();
        let key = cart.session_id.clone().expect("generated session key");
        assert!(cart.user_id.is_none());

        let again = store
            .resolve_cart(&Identity::Anonymous(Some(key)))
            .await
            .unwrap();
        assert_eq!(again.id, cart.id);
    }

    #[tokio::test]
    async fn add_item_merges_into_single_line() {
        let store = MemoryStore::new();
        let p = product("Widget", 10, Decimal::new(1000, 2));
        store.insert_product(p.clone());
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();

        store.add_item(cart.id, p.id, 1).await.unwrap();
        let merged = store.add_item(cart.id, p.id, 1).await.unwrap();

        assert_eq!(merged.quantity, 2);
        let items = store.cart_items(cart.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0.quantity, 2);
    }

    #[tokio::test]
    async fn add_item_stock_check_counts_existing_line() {
        let store = MemoryStore::new();
        let p = product("Widget", 5, Decimal::new(1000, 2));
        store.insert_product(p.clone());
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();

        store.add_item(cart.id, p.id, 3).await.unwrap();
        let err = store.add_item(cart.id, p.id, 3).await.unwrap_err();
        match err {
            Error::InsufficientStock { product, available } => {
                assert_eq!(product, "Widget");
                assert_eq!(available, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        // The existing line is untouched by the failed add.
        let items = store.cart_items(cart.id).await.unwrap();
        assert_eq!(items[0].0.quantity, 3);
    }

    #[tokio::test]
    async fn add_item_rejects_unknown_product_and_bad_quantity() {
        let store = MemoryStore::new();
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();
        assert!(matches!(
            store.add_item(cart.id, Uuid::new_v4(), 1).await,
            Err(Error::NotFound("product"))
        ));

        let mut inactive = product("Ghost", 5, Decimal::new(100, 2));
        inactive.is_active = false;
        store.insert_product(inactive.clone());
        assert!(matches!(
            store.add_item(cart.id, inactive.id, 1).await,
            Err(Error::NotFound("product"))
        ));

        let p = product("Widget", 5, Decimal::new(100, 2));
        store.insert_product(p.clone());
        assert!(matches!(
            store.add_item(cart.id, p.id, 0).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn set_item_quantity_checks_stock_against_new_value() {
        let store = MemoryStore::new();
        let p = product("Widget", 4, Decimal::new(1000, 2));
        store.insert_product(p.clone());
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();
        let item = store.add_item(cart.id, p.id, 1).await.unwrap();

        let updated = store.set_item_quantity(cart.id, item.id, 4).await.unwrap();
        assert_eq!(updated.quantity, 4);

        assert!(matches!(
            store.set_item_quantity(cart.id, item.id, 5).await,
            Err(Error::InsufficientStock { .. })
        ));
        assert!(matches!(
            store.set_item_quantity(cart.id, Uuid::new_v4(), 1).await,
            Err(Error::NotFound("cart item"))
        ));
    }

    #[tokio::test]
    async fn remove_and_clear_cart_items() {
        let store = MemoryStore::new();
        let a = product("A", 5, Decimal::new(100, 2));
        let b = product("B", 5, Decimal::new(200, 2));
        store.insert_product(a.clone());
        store.insert_product(b.clone());
        let cart = store.resolve_cart(&Identity::Anonymous(None)).await.unwrap();
        let item_a = store.add_item(cart.id, a.id, 1).await.unwrap();
        store.add_item(cart.id, b.id, 1).await.unwrap();

        store.remove_item(cart.id, item_a.id).await.unwrap();
        assert_eq!(store.cart_items(cart.id).await.unwrap().len(), 1);
        assert!(matches!(
            store.remove_item(cart.id, item_a.id).await,
            Err(Error::NotFound("cart item"))
        ));

        store.clear_cart(cart.id).await.unwrap();
        assert!(store.cart_items(cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_converts_cart_into_order() {
        let store = MemoryStore::new();
        let a = product("Product A", 5, Decimal::new(1000, 2));
        let b = product("Product B", 1, Decimal::new(500, 2));
        store.insert_product(a.clone());
        store.insert_product(b.clone());
        let user = verified_user(&store, "ada@example.com").await;
        let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        store.add_item(cart.id, a.id, 2).await.unwrap();
        store.add_item(cart.id, b.id, 1).await.unwrap();

        let (order, items) = store.checkout(user.id, contact()).await.unwrap();

        assert_eq!(order.total_price, Decimal::new(2500, 2));
        assert_eq!(order.status, STATUS_NEW);
        assert!(!order.is_paid);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_name, "Product A");
        assert_eq!(items[0].price, Decimal::new(1000, 2));
        assert_eq!(items[0].quantity, 2);
        assert_eq!(store.product(a.id).await.unwrap().stock, 3);
        assert_eq!(store.product(b.id).await.unwrap().stock, 0);
        assert!(store.cart_items(cart.id).await.unwrap().is_empty());
        // The cart row itself survives for reuse.
        let again = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        assert_eq!(again.id, cart.id);
    }

    #[tokio::test]
    async fn checkout_total_matches_item_costs() {
        let store = MemoryStore::new();
        let mut discounted = product("Deal", 10, Decimal::new(2000, 2));
        discounted.discount_price = Some(Decimal::new(1500, 2));
        let plain = product("Plain", 10, Decimal::new(750, 2));
        store.insert_product(discounted.clone());
        store.insert_product(plain.clone());
        let user = verified_user(&store, "ada@example.com").await;
        let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        store.add_item(cart.id, discounted.id, 3).await.unwrap();
        store.add_item(cart.id, plain.id, 2).await.unwrap();

        let (order, items) = store.checkout(user.id, contact()).await.unwrap();
        let summed: Decimal = items.iter().map(|i| i.cost()).sum();
        assert_eq!(order.total_price, summed);
        // The discounted line snapshots the discount price.
        assert_eq!(items[0].price, Decimal::new(1500, 2));
    }

    #[tokio::test]
    async fn failed_checkout_rolls_back_everything() {
        let store = MemoryStore::new();
        let a = product("Product A", 5, Decimal::new(1000, 2));
        let mut c = product("Product C", 2, Decimal::new(300, 2));
        store.insert_product(a.clone());
        store.insert_product(c.clone());
        let user = verified_user(&store, "ada@example.com").await;
        let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        store.add_item(cart.id, a.id, 2).await.unwrap();
        store.add_item(cart.id, c.id, 2).await.unwrap();

        // Stock for C drops to 1 after it was added to the cart.
        c.stock = 1;
        store.insert_product(c.clone());

        let err = store.checkout(user.id, contact()).await.unwrap_err();
        match err {
            Error::InsufficientStock { product, available } => {
                assert_eq!(product, "Product C");
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        // No order, no stock mutation, cart untouched.
        assert!(store.orders(user.id).await.unwrap().is_empty());
        assert_eq!(store.product(a.id).await.unwrap().stock, 5);
        assert_eq!(store.product(c.id).await.unwrap().stock, 1);
        assert_eq!(store.cart_items(cart.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn checkout_on_empty_or_missing_cart_fails() {
        let store = MemoryStore::new();
        let user = verified_user(&store, "ada@example.com").await;
        assert!(matches!(
            store.checkout(user.id, contact()).await,
            Err(Error::EmptyCart)
        ));

        store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        assert!(matches!(
            store.checkout(user.id, contact()).await,
            Err(Error::EmptyCart)
        ));
        assert!(store.orders(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_email_defaults_to_profile() {
        let store = MemoryStore::new();
        let p = product("Widget", 5, Decimal::new(100, 2));
        store.insert_product(p.clone());
        let user = verified_user(&store, "ada@example.com").await;
        let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        store.add_item(cart.id, p.id, 1).await.unwrap();

        let (order, _) = store.checkout(user.id, contact()).await.unwrap();
        assert_eq!(order.email, "ada@example.com");

        store.add_item(cart.id, p.id, 1).await.unwrap();
        let mut c = contact();
        c.email = Some("other@example.com".into());
        let (order, _) = store.checkout(user.id, c).await.unwrap();
        assert_eq!(order.email, "other@example.com");
    }

    #[tokio::test]
    async fn order_snapshot_survives_catalog_changes() {
        let store = MemoryStore::new();
        let mut p = product("Widget", 5, Decimal::new(1000, 2));
        store.insert_product(p.clone());
        let user = verified_user(&store, "ada@example.com").await;
        let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
        store.add_item(cart.id, p.id, 1).await.unwrap();
        let (order, _) = store.checkout(user.id, contact()).await.unwrap();

        // Reprice and rename the product after the sale.
        p.name = "Widget v2".into();
        p.price = Decimal::new(9900, 2);
        p.discount_price = Some(Decimal::new(5000, 2));
        p.stock = 4;
        store.insert_product(p);

        let (order, items) = store.order(user.id, order.id).await.unwrap();
        assert_eq!(items[0].price, Decimal::new(1000, 2));
        assert_eq!(items[0].product_name, "Widget");
        assert_eq!(order.total_price, Decimal::new(1000, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let store = MemoryStore::new();
        let p = product("Last One", 1, Decimal::new(1000, 2));
        store.insert_product(p.clone());
        let ada = verified_user(&store, "ada@example.com").await;
        let bob = verified_user(&store, "bob@example.com").await;
        for user in [&ada, &bob] {
            let cart = store.resolve_cart(&Identity::User(user.id)).await.unwrap();
            store.add_item(cart.id, p.id, 1).await.unwrap();
        }

        let (s1, s2) = (store.clone(), store.clone());
        let (ada_id, bob_id) = (ada.id, bob.id);
        let h1 = tokio::spawn(async move { s1.checkout(ada_id, contact()).await });
        let h2 = tokio::spawn(async move { s2.checkout(bob_id, contact()).await });
        let results = [h1.await.unwrap(), h2.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::InsufficientStock { .. }))));
        assert_eq!(store.product(p.id).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn orders_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let p = product("Widget", 5, Decimal::new(100, 2));
        store.insert_product(p.clone());
        let ada = verified_user(&store, "ada@example.com").await;
        let bob = verified_user(&store, "bob@example.com").await;
        let cart = store.resolve_cart(&Identity::User(ada.id)).await.unwrap();
        store.add_item(cart.id, p.id, 1).await.unwrap();
        let (order, _) = store.checkout(ada.id, contact()).await.unwrap();

        assert!(store.order(ada.id, order.id).await.is_ok());
        assert!(matches!(
            store.order(bob.id, order.id).await,
            Err(Error::NotFound("order"))
        ));
        assert!(store.orders(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wishlist_toggle_round_trip() {
        let store = MemoryStore::new();
        let p = product("Widget", 5, Decimal::new(100, 2));
        store.insert_product(p.clone());
        let user = verified_user(&store, "ada@example.com").await;

        match store.toggle_wishlist(user.id, p.id).await.unwrap() {
            WishlistToggle::Added(item) => assert_eq!(item.product_id, p.id),
            WishlistToggle::Removed => panic!("first toggle should add"),
        }
        assert_eq!(store.wishlist(user.id).await.unwrap().len(), 1);

        assert!(matches!(
            store.toggle_wishlist(user.id, p.id).await.unwrap(),
            WishlistToggle::Removed
        ));
        assert!(store.wishlist(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_registration_is_rejected() {
        let store = MemoryStore::new();
        verified_user(&store, "ada@example.com").await;
        let err = store
            .create_user(NewUser {
                email: "ada@example.com".into(),
                phone_number: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
