//! Who is making the request: a registered user or an anonymous session.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Resolved by the HTTP layer from headers placed by the external auth/session
/// subsystem. An anonymous caller may not have a session key yet; one is
/// generated lazily on first cart access, not eagerly per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(Uuid),
    Anonymous(Option<String>),
}

impl Identity {
    /// The registered user id, for operations that require an account
    /// (checkout, orders, wishlist).
    pub fn user_id(&self) -> Result<Uuid> {
        match self {
            Self::User(id) => Ok(*id),
            Self::Anonymous(_) => Err(Error::Unauthorized),
        }
    }
}
