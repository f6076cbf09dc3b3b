//! Orders: the immutable result of a checkout.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Order status at creation. Later workflow transitions (payment, shipping)
/// belong to other services; this one only ever writes `new`.
pub const STATUS_NEW: &str = "new";

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?1?\d{9,15}$").unwrap());

/// Order header. Contact fields and `delivery_address` are snapshots of what
/// the buyer typed at checkout, independent of any saved profile data.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
    pub delivery_address: String,
    pub total_price: Decimal,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order line. `product_name` and `price` are copied from the product at
/// checkout time and never updated afterwards; `product_id` goes NULL if the
/// product is later deleted, without touching the snapshot.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn cost(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Recipient data supplied by the buyer at checkout. Validated before the
/// checkout transaction opens; a missing email falls back to the profile
/// email inside the transaction.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactInfo {
    #[validate(length(min = 1, max = 50, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50, message = "last name is required"))]
    pub last_name: String,
    #[validate(regex(path = "PHONE_RE", message = "phone must look like +999999999"))]
    pub phone: String,
    #[validate(email(message = "invalid email"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "delivery address is required"))]
    pub delivery_address: String,
}

/// Order with its lines, as returned from checkout and the order endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderView {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> ContactInfo {
        ContactInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone: "+79991234567".into(),
            email: None,
            delivery_address: "1 Analytical Engine Way".into(),
        }
    }

    #[test]
    fn contact_info_accepts_complete_data() {
        assert!(contact().validate().is_ok());
    }

    #[test]
    fn contact_info_rejects_blank_fields() {
        let mut c = contact();
        c.first_name = String::new();
        assert!(c.validate().is_err());

        let mut c = contact();
        c.delivery_address = String::new();
        assert!(c.validate().is_err());
    }

    #[test]
    fn contact_info_rejects_bad_phone() {
        let mut c = contact();
        c.phone = "not-a-phone".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn order_item_cost_multiplies_snapshot_price() {
        let item = OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: None,
            product_name: "Widget".into(),
            price: Decimal::new(1250, 2),
            quantity: 3,
            created_at: Utc::now(),
        };
        assert_eq!(item.cost(), Decimal::new(3750, 2));
    }
}
