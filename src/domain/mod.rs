//! Domain types: catalog products, carts, orders, users, request identity.

pub mod cart;
pub mod identity;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartItem, CartItemView, CartView};
pub use identity::Identity;
pub use order::{ContactInfo, Order, OrderItem, OrderView};
pub use product::Product;
pub use user::{NewUser, User, WishlistItem};
