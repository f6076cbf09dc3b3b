//! PostgreSQL implementation of [`Store`] backed by sqlx.
//!
//! Checkout runs inside a single database transaction; products are re-read
//! with `FOR UPDATE` so concurrent checkouts against the same row serialize
//! on the stock check. An early return drops the transaction and rolls back.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::order::STATUS_NEW;
use crate::domain::{
    Cart, CartItem, ContactInfo, Identity, NewUser, Order, OrderItem, Product, User, WishlistItem,
};
use crate::error::{Error, Result};
use crate::store::{Store, WishlistToggle};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn products_by_id(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        let products: Vec<Product> = sqlx::query_as("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(sqlx::query_as(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Store for PgStore {
    async fn list_products(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, i64)> {
        let page = page.max(1);
        let products: Vec<Product> = sqlx::query_as(
            "SELECT * FROM products WHERE is_active ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page as i64)
        .bind(((page - 1) * per_page) as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE is_active")
            .fetch_one(&self.pool)
            .await?;
        Ok((products, total.0))
    }

    async fn product(&self, id: Uuid) -> Result<Product> {
        sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound("product"))
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let inserted = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, phone_number, password_hash, is_verified, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;
        match inserted {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::Validation("email already registered".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, email: &str) -> Result<User> {
        sqlx::query_as("UPDATE users SET is_verified = TRUE WHERE email = $1 RETURNING *")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound("user"))
    }

    async fn resolve_cart(&self, identity: &Identity) -> Result<Cart> {
        let existing: Option<Cart> = match identity {
            Identity::User(uid) => {
                sqlx::query_as("SELECT * FROM carts WHERE user_id = $1")
                    .bind(uid)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Identity::Anonymous(Some(key)) => {
                sqlx::query_as("SELECT * FROM carts WHERE session_id = $1")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?
            }
            // No session yet, so no cart to find; mint the key below.
            Identity::Anonymous(None) => None,
        };
        if let Some(cart) = existing {
            return Ok(cart);
        }

        let (user_id, session_id) = match identity {
            Identity::User(uid) => (Some(*uid), None),
            Identity::Anonymous(Some(key)) => (None, Some(key.clone())),
            Identity::Anonymous(None) => (None, Some(Uuid::new_v4().to_string())),
        };
        let inserted = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (id, user_id, session_id, created_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&session_id)
        .fetch_one(&self.pool)
        .await;
        match inserted {
            Ok(cart) => Ok(cart),
            // Lost the first-access race; the winner's row is the cart.
            Err(e) if is_unique_violation(&e) => {
                let cart = if let Some(uid) = user_id {
                    sqlx::query_as("SELECT * FROM carts WHERE user_id = $1")
                        .bind(uid)
                        .fetch_one(&self.pool)
                        .await?
                } else {
                    sqlx::query_as("SELECT * FROM carts WHERE session_id = $1")
                        .bind(&session_id)
                        .fetch_one(&self.pool)
                        .await?
                };
                Ok(cart)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<(CartItem, Product)>> {
        let items: Vec<CartItem> =
            sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id")
                .bind(cart_id)
                .fetch_all(&self.pool)
                .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.products_by_id(&ids).await?;
        items
            .into_iter()
            .map(|item| {
                let product = products
                    .get(&item.product_id)
                    .cloned()
                    .ok_or(Error::NotFound("product"))?;
                Ok((item, product))
            })
            .collect()
    }

    async fn add_item(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartItem> {
        if quantity < 1 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }
        let mut tx = self.pool.begin().await?;
        let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::NotFound("product"))?;
        let existing: Option<CartItem> =
            sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id)
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
        // Merged quantity, not just the requested one.
        let effective = existing.as_ref().map_or(0, |i| i.quantity) + quantity;
        if product.stock < effective {
            return Err(Error::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }
        let item: CartItem = sqlx::query_as(
            "INSERT INTO cart_items (id, cart_id, product_id, quantity, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (cart_id, product_id) \
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        let item: CartItem =
            sqlx::query_as("SELECT * FROM cart_items WHERE id = $1 AND cart_id = $2")
                .bind(item_id)
                .bind(cart_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(Error::NotFound("cart item"))?;
        let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1")
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::NotFound("product"))?;
        if product.stock < quantity {
            return Err(Error::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }
        let item: CartItem =
            sqlx::query_as("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND cart_id = $2 RETURNING *")
                .bind(item_id)
                .bind(cart_id)
                .bind(quantity)
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("cart item"));
        }
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<(WishlistItem, Product)>> {
        let rows: Vec<WishlistItem> =
            sqlx::query_as("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY added_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        let ids: Vec<Uuid> = rows.iter().map(|w| w.product_id).collect();
        let products = self.products_by_id(&ids).await?;
        Ok(rows
            .into_iter()
            .filter_map(|w| products.get(&w.product_id).cloned().map(|p| (w, p)))
            .collect())
    }

    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistToggle> {
        self.product(product_id).await?;
        let existing: Option<WishlistItem> =
            sqlx::query_as("SELECT * FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
                .bind(user_id)
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(item) = existing {
            sqlx::query("DELETE FROM wishlist_items WHERE id = $1")
                .bind(item.id)
                .execute(&self.pool)
                .await?;
            return Ok(WishlistToggle::Removed);
        }
        let inserted: Option<WishlistItem> = sqlx::query_as(
            "INSERT INTO wishlist_items (id, user_id, product_id, added_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (user_id, product_id) DO NOTHING RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        match inserted {
            Some(item) => Ok(WishlistToggle::Added(item)),
            // Raced with another add; treat this call as the removing toggle.
            None => {
                sqlx::query(
                    "DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2",
                )
                .bind(user_id)
                .bind(product_id)
                .execute(&self.pool)
                .await?;
                Ok(WishlistToggle::Removed)
            }
        }
    }

    async fn checkout(
        &self,
        user_id: Uuid,
        contact: ContactInfo,
    ) -> Result<(Order, Vec<OrderItem>)> {
        let mut tx = self.pool.begin().await?;

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let cart: Cart = sqlx::query_as("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::EmptyCart)?;
        let lines: Vec<CartItem> =
            sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id")
                .bind(cart.id)
                .fetch_all(&mut *tx)
                .await?;
        if lines.is_empty() {
            return Err(Error::EmptyCart);
        }

        let order: Order = sqlx::query_as(
            "INSERT INTO orders (id, user_id, status, first_name, last_name, phone, email, \
                                 delivery_address, total_price, is_paid, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, FALSE, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(STATUS_NEW)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.phone)
        .bind(contact.email.as_deref().unwrap_or(&user.email))
        .bind(&contact.delivery_address)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;
        for line in &lines {
            // Fresh read under a row lock: stock may have moved since the
            // item went into the cart, and concurrent checkouts must not both
            // pass the check.
            let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(line.product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(Error::NotFound("product"))?;
            if product.stock < line.quantity {
                // Dropping the transaction rolls back the header insert and
                // every decrement made so far.
                return Err(Error::InsufficientStock {
                    product: product.name,
                    available: product.stock,
                });
            }
            let item = OrderItem {
                id: Uuid::now_v7(),
                order_id: order.id,
                product_id: Some(product.id),
                product_name: product.name.clone(),
                price: product.current_price(),
                quantity: line.quantity,
                created_at: order.created_at,
            };
            total += item.cost();
            items.push(item);
            sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1")
                .bind(line.product_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_items (id, order_id, product_id, product_name, price, quantity, created_at) ",
        );
        qb.push_values(&items, |mut b, item| {
            b.push_bind(item.id)
                .push_bind(item.order_id)
                .push_bind(item.product_id)
                .push_bind(item.product_name.clone())
                .push_bind(item.price)
                .push_bind(item.quantity)
                .push_bind(item.created_at);
        });
        qb.build().execute(&mut *tx).await?;

        let order: Order = sqlx::query_as(
            "UPDATE orders SET total_price = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(order.id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((order, items))
    }

    async fn orders(&self, user_id: Uuid) -> Result<Vec<(Order, Vec<OrderItem>)>> {
        let orders: Vec<Order> =
            sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.order_items(order.id).await?;
            out.push((order, items));
        }
        Ok(out)
    }

    async fn order(&self, user_id: Uuid, order_id: Uuid) -> Result<(Order, Vec<OrderItem>)> {
        let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(order_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound("order"))?;
        let items = self.order_items(order.id).await?;
        Ok((order, items))
    }
}
