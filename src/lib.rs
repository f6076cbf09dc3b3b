//! Storefront backend.
//!
//! Catalog browsing, shopping cart, wishlist, checkout, and user
//! registration with email verification, served as a REST API.
//!
//! The consistency-critical paths are the cart line-item upsert (one row per
//! product per cart, merged additively, stock-checked against the merged
//! quantity) and the checkout transaction (all-or-nothing conversion of a
//! cart into an order with snapshotted prices and in-transaction stock
//! decrements). Both live behind the [`store::Store`] trait, with a Postgres
//! backend for production and an in-memory backend for tests and development.

pub mod account;
pub mod domain;
pub mod error;
pub mod http;
pub mod store;

pub use error::{Error, Result};
