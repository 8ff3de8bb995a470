//! Contract with the external session/identity collaborator.
//!
//! Session bootstrap (magic links, token refresh) lives elsewhere. This crate
//! only needs the current user, to populate `userId` in join messages, and a
//! ready-made `Authorization` header for REST calls.

use serde::{Deserialize, Serialize};

use crate::protocol::UserId;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl UserIdentity {
    /// Create a user identity.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Supplies identity and auth headers. Implemented by the host application.
pub trait IdentityProvider: Send + Sync + 'static {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<UserIdentity>;

    /// Value of the `Authorization` header for REST calls (e.g. `Bearer …`).
    fn authorization_header(&self) -> Option<String>;
}
