//! Catalog product as the storefront sees it.
//!
//! Catalog administration lives elsewhere; this service reads products and is
//! the sole writer of `stock`, which the checkout transaction decrements.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Effective selling price: the discount price when one is set.
    pub fn current_price(&self) -> Decimal {
        self.discount_price.unwrap_or(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: Decimal, discount: Option<Decimal>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Widget".into(),
            slug: "widget".into(),
            description: None,
            price,
            discount_price: discount,
            stock: 10,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn current_price_prefers_discount() {
        let p = product(Decimal::new(1000, 2), Some(Decimal::new(750, 2)));
        assert_eq!(p.current_price(), Decimal::new(750, 2));
    }

    #[test]
    fn current_price_falls_back_to_list_price() {
        let p = product(Decimal::new(1000, 2), None);
        assert_eq!(p.current_price(), Decimal::new(1000, 2));
    }
}
